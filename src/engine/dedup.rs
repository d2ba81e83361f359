//! Heuristic duplicate-conversion rules.

use crate::domain::{Amount, ConversionEvent, DeduplicationResult, DuplicateRule, TimeMs, DAY_MS, HOUR_MS};

/// Thresholds for the heuristic duplicate check.
///
/// The hour rule carries the looser amount tolerance. Both tolerances are
/// configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupPolicy {
    pub same_day_window_ms: i64,
    pub same_day_tolerance: Amount,
    pub same_hour_window_ms: i64,
    pub same_hour_tolerance: Amount,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            same_day_window_ms: DAY_MS,
            same_day_tolerance: Amount::from_int(1),
            same_hour_window_ms: HOUR_MS,
            same_hour_tolerance: Amount::from_int(100),
        }
    }
}

impl DedupPolicy {
    /// Earliest conversion timestamp worth fetching for a check at `at`.
    pub fn lookback_start(&self, at: TimeMs) -> TimeMs {
        at.minus_ms(self.same_day_window_ms.max(self.same_hour_window_ms))
    }

    /// Which rule, if any, makes `prior` a duplicate of a conversion at `at`
    /// for `amount`. The hour rule is checked first.
    pub fn rule_for(
        &self,
        at: TimeMs,
        amount: Amount,
        prior_at: TimeMs,
        prior_amount: Amount,
    ) -> Option<DuplicateRule> {
        let dt = at.abs_diff_ms(prior_at);
        let da = amount.checked_sub(prior_amount)?.abs();

        if dt <= self.same_hour_window_ms && da <= self.same_hour_tolerance {
            Some(DuplicateRule::SameHour)
        } else if dt <= self.same_day_window_ms && da <= self.same_day_tolerance {
            Some(DuplicateRule::SameDay)
        } else {
            None
        }
    }

    /// Classify against prior conversions of the same customer and product.
    /// The most recent conflicting record is reported.
    pub fn classify(
        &self,
        at: TimeMs,
        amount: Amount,
        prior: &[ConversionEvent],
    ) -> DeduplicationResult {
        let mut ordered: Vec<&ConversionEvent> = prior.iter().collect();
        ordered.sort_by(|a, b| {
            b.conversion_timestamp
                .cmp(&a.conversion_timestamp)
                .then(b.id.cmp(&a.id))
        });

        ordered
            .into_iter()
            .find_map(|c| {
                self.rule_for(at, amount, c.conversion_timestamp, c.initial_spend_amount)
                    .map(|rule| DeduplicationResult::duplicate_of(c.id, rule))
            })
            .unwrap_or_else(DeduplicationResult::unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttributionMethod, CustomerId, ProductId};

    const MINUTE_MS: i64 = 60_000;

    fn prior(id: i64, at: i64, amount: &str) -> ConversionEvent {
        ConversionEvent {
            id,
            tracking_code: String::new(),
            customer_id: CustomerId::new("c1"),
            product_id: ProductId::new("p1"),
            initial_spend_amount: Amount::parse(amount).unwrap(),
            conversion_timestamp: TimeMs::new(at),
            attribution_method: AttributionMethod::None,
            commission_eligible: false,
            marketer_id: None,
            session_id: None,
            fingerprint: None,
            ip_address: None,
            user_agent: None,
            click_event_id: None,
            attribution_window_days: 30,
            deduplication_key: format!("k{}", id),
        }
    }

    #[test]
    fn test_five_minutes_apart_same_amount_is_hour_duplicate() {
        let policy = DedupPolicy::default();
        let t0 = 1_700_000_000_000;
        let result = policy.classify(
            TimeMs::new(t0 + 5 * MINUTE_MS),
            Amount::from_int(1000),
            &[prior(1, t0, "1000")],
        );
        assert!(result.is_duplicate);
        assert_eq!(result.existing_conversion_id, Some(1));
        assert_eq!(result.reason, Some(DuplicateRule::SameHour));
    }

    #[test]
    fn test_hour_rule_tolerates_amount_noise() {
        let policy = DedupPolicy::default();
        let t0 = 1_700_000_000_000;
        let result = policy.classify(
            TimeMs::new(t0 + 30 * MINUTE_MS),
            Amount::from_int(1090),
            &[prior(1, t0, "1000")],
        );
        assert_eq!(result.reason, Some(DuplicateRule::SameHour));
    }

    #[test]
    fn test_day_rule_requires_tight_amount() {
        let policy = DedupPolicy::default();
        let t0 = 1_700_000_000_000;
        let later = TimeMs::new(t0 + 5 * HOUR_MS);

        let close = policy.classify(later, Amount::parse("1000.5").unwrap(), &[prior(1, t0, "1000")]);
        assert_eq!(close.reason, Some(DuplicateRule::SameDay));

        let far = policy.classify(later, Amount::from_int(1050), &[prior(1, t0, "1000")]);
        assert!(!far.is_duplicate);
    }

    #[test]
    fn test_older_than_a_day_is_not_duplicate() {
        let policy = DedupPolicy::default();
        let t0 = 1_700_000_000_000;
        let result = policy.classify(
            TimeMs::new(t0 + DAY_MS + 1),
            Amount::from_int(1000),
            &[prior(1, t0, "1000")],
        );
        assert_eq!(result, DeduplicationResult::unique());
    }

    #[test]
    fn test_reports_most_recent_conflict() {
        let policy = DedupPolicy::default();
        let t0 = 1_700_000_000_000;
        let result = policy.classify(
            TimeMs::new(t0 + 3 * HOUR_MS),
            Amount::from_int(1000),
            &[prior(1, t0, "1000"), prior(2, t0 + HOUR_MS, "1000")],
        );
        assert_eq!(result.existing_conversion_id, Some(2));
        assert_eq!(result.reason, Some(DuplicateRule::SameDay));
    }

    #[test]
    fn test_lookback_covers_widest_window() {
        let policy = DedupPolicy::default();
        assert_eq!(
            policy.lookback_start(TimeMs::new(DAY_MS * 2)),
            TimeMs::new(DAY_MS)
        );
    }
}
