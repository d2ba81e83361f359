//! Domain types for the affiliate attribution and commission ledger.
//!
//! This module provides:
//! - Lossless monetary amounts via the Amount wrapper
//! - Primitives: TimeMs and identifier newtypes
//! - Click, conversion, and attribution records
//! - Commission status machine, rule shapes, and adjustment ledger entries
//! - Catalog records consumed from neighbouring subsystems

pub mod adjustment;
pub mod amount;
pub mod attribution;
pub mod catalog;
pub mod click;
pub mod commission;
pub mod conversion;
pub mod primitives;

pub use adjustment::{
    AdjustmentType, ClawbackKind, CommissionAdjustment, ManualAdjustmentKind, NewAdjustment,
};
pub use amount::Amount;
pub use attribution::{
    AttributionCandidate, AttributionConfidence, AttributionMethod, AttributionResult, MatchSignal,
};
pub use catalog::{
    CommissionType, Marketer, MarketerStatus, MissingRuleField, Product, ReferralLink, UserRole,
};
pub use click::{compute_fingerprint, ClickEvent, NewClick, UserAgentFacets};
pub use commission::{
    Commission, CommissionOverride, CommissionQuote, CommissionRules, CommissionStatus,
    CommissionTier, NewCommission, DEFAULT_CLEARANCE_PERIOD_DAYS,
};
pub use conversion::{
    deduplication_key, ConversionCandidate, ConversionEvent, DeduplicationResult, DuplicateRule,
    ATTRIBUTION_WINDOW_RANGE, DEFAULT_ATTRIBUTION_WINDOW_DAYS,
};
pub use primitives::{
    ActorId, CommissionId, CustomerId, MarketerId, ProductId, TimeMs, TrackingCode, DAY_MS, HOUR_MS,
};
