//! Domain primitives: TimeMs and identifier newtypes.

use chrono::TimeZone;
use serde::{Deserialize, Serialize};

/// Milliseconds in one day.
pub const DAY_MS: i64 = 86_400_000;

/// Milliseconds in one hour.
pub const HOUR_MS: i64 = 3_600_000;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Shift forward by whole days.
    pub fn plus_days(&self, days: i64) -> Self {
        TimeMs(self.0.saturating_add(days.saturating_mul(DAY_MS)))
    }

    /// Shift backward by whole days.
    pub fn minus_days(&self, days: i64) -> Self {
        TimeMs(self.0.saturating_sub(days.saturating_mul(DAY_MS)))
    }

    /// Shift backward by a raw millisecond span.
    pub fn minus_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_sub(ms))
    }

    /// Absolute distance to another instant, in milliseconds. Saturates at
    /// `i64::MAX`.
    pub fn abs_diff_ms(&self, other: TimeMs) -> i64 {
        i64::try_from(self.0.abs_diff(other.0)).unwrap_or(i64::MAX)
    }

    /// UTC calendar date as `YYYY-MM-DD`, or `None` if out of chrono's range.
    pub fn utc_date(&self) -> Option<String> {
        chrono::Utc
            .timestamp_millis_opt(self.0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d").to_string())
    }
}

impl std::fmt::Display for TimeMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Referral tracking code carried by links, clicks and conversions.
    TrackingCode
);
string_id!(
    /// Customer identifier issued by the onboarding subsystem.
    CustomerId
);
string_id!(
    /// Product identifier from the catalog.
    ProductId
);
string_id!(
    /// Marketer (affiliate) identifier.
    MarketerId
);
string_id!(
    /// Identifier of the admin or system actor performing an operation.
    ActorId
);

/// Row id of a persisted commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionId(pub i64);

impl std::fmt::Display for CommissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_arithmetic() {
        let t = TimeMs::new(1_000);
        assert_eq!(t.plus_days(30).as_ms(), 1_000 + 30 * DAY_MS);
        assert_eq!(t.plus_days(2).minus_days(2), t);
    }

    #[test]
    fn test_abs_diff_saturates() {
        assert_eq!(TimeMs::new(5).abs_diff_ms(TimeMs::new(12)), 7);
        assert_eq!(TimeMs::new(12).abs_diff_ms(TimeMs::new(5)), 7);
        assert_eq!(TimeMs::new(i64::MIN).abs_diff_ms(TimeMs::new(i64::MAX)), i64::MAX);
    }

    #[test]
    fn test_utc_date() {
        assert_eq!(TimeMs::new(0).utc_date().as_deref(), Some("1970-01-01"));
        // 2024-03-01T23:59:59.999Z
        assert_eq!(
            TimeMs::new(1_709_337_599_999).utc_date().as_deref(),
            Some("2024-03-01")
        );
        assert_eq!(TimeMs::new(i64::MAX).utc_date(), None);
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = CustomerId::new("c1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"c1\"");
        assert_eq!(id.to_string(), "c1");
    }
}
