//! Heuristic duplicate check against recorded conversions.

use crate::datasource::ConversionSource;
use crate::domain::{Amount, CustomerId, DeduplicationResult, ProductId, TimeMs};
use crate::engine::DedupPolicy;
use std::sync::Arc;
use tracing::{info, warn};

/// Advisory pre-insert check. The unique deduplication key on the store is
/// the authoritative layer; this one fails open when the store is down.
#[derive(Clone)]
pub struct DeduplicationChecker {
    source: Arc<dyn ConversionSource>,
    policy: DedupPolicy,
}

impl DeduplicationChecker {
    pub fn new(source: Arc<dyn ConversionSource>, policy: DedupPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &DedupPolicy {
        &self.policy
    }

    /// Compare a conversion at `at` for `amount` with recent conversions of the
    /// same customer and product.
    pub async fn check_duplicate(
        &self,
        customer_id: &CustomerId,
        product_id: &ProductId,
        amount: Amount,
        at: TimeMs,
    ) -> DeduplicationResult {
        let since = self.policy.lookback_start(at);
        let prior = match self
            .source
            .find_recent_conversions(customer_id, product_id, since)
            .await
        {
            Ok(prior) => prior,
            Err(e) => {
                warn!(
                    customer_id = %customer_id,
                    product_id = %product_id,
                    error = %e,
                    "Duplicate check unavailable, treating conversion as unique"
                );
                return DeduplicationResult::unique();
            }
        };

        let result = self.policy.classify(at, amount, &prior);
        if let (Some(existing), Some(rule)) = (result.existing_conversion_id, result.reason) {
            info!(
                customer_id = %customer_id,
                product_id = %product_id,
                existing_conversion_id = existing,
                rule = %rule,
                "Duplicate conversion detected"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockDataSource;
    use crate::domain::{AttributionMethod, ConversionEvent, DuplicateRule, HOUR_MS};

    fn recorded(id: i64, at: i64, amount: i64) -> ConversionEvent {
        ConversionEvent {
            id,
            tracking_code: String::new(),
            customer_id: CustomerId::new("c1"),
            product_id: ProductId::new("p1"),
            initial_spend_amount: Amount::from_int(amount),
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
            deduplication_key: format!("key-{}", id),
        }
    }

    #[tokio::test]
    async fn test_flags_recent_same_amount() {
        let t0 = 1_700_000_000_000;
        let checker = DeduplicationChecker::new(
            Arc::new(MockDataSource::new().with_conversion(recorded(4, t0, 1000))),
            DedupPolicy::default(),
        );
        let result = checker
            .check_duplicate(
                &CustomerId::new("c1"),
                &ProductId::new("p1"),
                Amount::from_int(1000),
                TimeMs::new(t0 + HOUR_MS / 2),
            )
            .await;
        assert!(result.is_duplicate);
        assert_eq!(result.existing_conversion_id, Some(4));
        assert_eq!(result.reason, Some(DuplicateRule::SameHour));
    }

    #[tokio::test]
    async fn test_other_product_is_not_compared() {
        let t0 = 1_700_000_000_000;
        let checker = DeduplicationChecker::new(
            Arc::new(MockDataSource::new().with_conversion(recorded(4, t0, 1000))),
            DedupPolicy::default(),
        );
        let result = checker
            .check_duplicate(
                &CustomerId::new("c1"),
                &ProductId::new("p2"),
                Amount::from_int(1000),
                TimeMs::new(t0 + 60_000),
            )
            .await;
        assert!(!result.is_duplicate);
    }

    #[tokio::test]
    async fn test_fails_open_when_store_is_down() {
        let checker = DeduplicationChecker::new(
            Arc::new(MockDataSource::new().unavailable()),
            DedupPolicy::default(),
        );
        let result = checker
            .check_duplicate(
                &CustomerId::new("c1"),
                &ProductId::new("p1"),
                Amount::from_int(1000),
                TimeMs::new(1_700_000_000_000),
            )
            .await;
        assert_eq!(result, DeduplicationResult::unique());
    }
}
