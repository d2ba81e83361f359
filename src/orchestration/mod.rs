//! Stateful services that combine the datasources, the repository and the
//! pure engines into the operations the HTTP layer exposes.

pub mod adjustments;
pub mod dedup;
pub mod lifecycle;
pub mod recorder;
pub mod resolver;

pub use adjustments::{
    AdjustmentLedger, ClawbackRequest, CommissionStatement, ManualAdjustmentRequest,
};
pub use dedup::DeduplicationChecker;
pub use lifecycle::{
    BulkApprovalFailure, BulkApprovalReport, CommissionAction, CommissionManager,
    TransitionRequest,
};
pub use recorder::{ConversionRecorder, RecordedConversion};
pub use resolver::AttributionResolver;
