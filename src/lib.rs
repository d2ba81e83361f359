pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod notify;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    CatalogSource, ConversionSource, DataSourceError, MockDataSource, ReferralSource,
};
pub use db::{init_db, Repository};
pub use domain::{
    Amount, AttributionConfidence, AttributionMethod, AttributionResult, Commission,
    CommissionId, CommissionStatus, ConversionEvent, TimeMs,
};
pub use error::{AppError, LedgerError};
pub use notify::{EligibleConversion, NotificationHub};
