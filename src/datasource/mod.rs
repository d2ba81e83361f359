//! Interfaces consumed from neighbouring subsystems: link directory, click
//! ledger, product/marketer catalogs, and prior conversions.

use crate::domain::{
    ClickEvent, ConversionEvent, CustomerId, Marketer, MarketerId, Product, ProductId,
    ReferralLink, TimeMs, TrackingCode,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod mock;

pub use mock::MockDataSource;

/// Click-ledger signal to search on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickMatch<'a> {
    Session(&'a str),
    Fingerprint(&'a str),
    Ip(&'a str),
}

/// Link directory and click ledger.
#[async_trait]
pub trait ReferralSource: Send + Sync {
    /// Link for `tracking_code` if it is active and unexpired at `now`.
    async fn find_active_referral_link(
        &self,
        tracking_code: &TrackingCode,
        now: TimeMs,
    ) -> Result<Option<ReferralLink>, DataSourceError>;

    /// Clicks matching the signal with `timestamp >= since`, ordered most
    /// recent first (ties: most recently inserted first).
    async fn find_clicks_matching(
        &self,
        signal: ClickMatch<'_>,
        since: TimeMs,
    ) -> Result<Vec<ClickEvent>, DataSourceError>;
}

/// Product and marketer catalogs.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn get_active_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<Product>, DataSourceError>;

    async fn get_active_marketer(
        &self,
        marketer_id: &MarketerId,
    ) -> Result<Option<Marketer>, DataSourceError>;
}

/// Read access to recorded conversions for the heuristic duplicate check.
#[async_trait]
pub trait ConversionSource: Send + Sync {
    async fn find_recent_conversions(
        &self,
        customer_id: &CustomerId,
        product_id: &ProductId,
        since: TimeMs,
    ) -> Result<Vec<ConversionEvent>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone, Error)]
pub enum DataSourceError {
    /// Store unreachable, timed out, or otherwise failing.
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for DataSourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DataSourceError::Corrupt(err.to_string())
            }
            other => DataSourceError::Unavailable(other.to_string()),
        }
    }
}
