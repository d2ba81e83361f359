//! Pure computation engines for deterministic commission logic.

pub mod calculator;
pub mod dedup;
pub mod ledger;

pub use calculator::{calculate, override_quote};
pub use dedup::DedupPolicy;
pub use ledger::{clawed_back_total, net_amount, ClawbackStats};
