//! Conversion recording: attribution, duplicate checks, persistence, fan-out.

use crate::db::repo::is_unique_violation;
use crate::db::Repository;
use crate::domain::{
    compute_fingerprint, deduplication_key, AttributionResult, ConversionCandidate,
    ConversionEvent, DeduplicationResult, TimeMs,
};
use crate::error::LedgerError;
use crate::notify::{EligibleConversion, NotificationHub};
use crate::orchestration::{AttributionResolver, DeduplicationChecker};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// A persisted conversion with the attribution that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedConversion {
    pub conversion: ConversionEvent,
    pub attribution: AttributionResult,
}

#[derive(Clone)]
pub struct ConversionRecorder {
    repo: Arc<Repository>,
    resolver: AttributionResolver,
    checker: DeduplicationChecker,
    hub: Arc<NotificationHub>,
}

impl ConversionRecorder {
    pub fn new(
        repo: Arc<Repository>,
        resolver: AttributionResolver,
        checker: DeduplicationChecker,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            repo,
            resolver,
            checker,
            hub,
        }
    }

    /// Heuristic duplicate check for a candidate without recording it.
    pub async fn check_deduplication(
        &self,
        candidate: &ConversionCandidate,
        now: TimeMs,
    ) -> DeduplicationResult {
        let at = candidate.conversion_timestamp.unwrap_or(now);
        self.checker
            .check_duplicate(
                &candidate.attribution.customer_id,
                &candidate.product_id,
                candidate.initial_spend_amount,
                at,
            )
            .await
    }

    /// Record a conversion.
    ///
    /// Fails with [`LedgerError::Duplicate`] when the heuristic check flags the
    /// candidate or when the deduplication key is already taken. Eligible
    /// conversions are published to the hub after the insert commits.
    pub async fn record(
        &self,
        candidate: ConversionCandidate,
        now: TimeMs,
    ) -> Result<RecordedConversion, LedgerError> {
        if candidate.attribution.customer_id.as_str().trim().is_empty() {
            return Err(LedgerError::validation("customerId is required"));
        }
        if candidate.product_id.as_str().trim().is_empty() {
            return Err(LedgerError::validation("productId is required"));
        }
        if candidate.initial_spend_amount.is_negative() {
            return Err(LedgerError::validation(format!(
                "spend amount {} must not be negative",
                candidate.initial_spend_amount
            )));
        }

        let at = candidate.conversion_timestamp.unwrap_or(now);
        let key = deduplication_key(&candidate.attribution.customer_id, &candidate.product_id, at)
            .ok_or_else(|| {
                LedgerError::validation(format!("conversion timestamp {} is out of range", at))
            })?;
        let attribution = self.resolver.resolve(&candidate.attribution, now).await?;

        let dedup = self.check_deduplication(&candidate, now).await;
        if dedup.is_duplicate {
            let rule = dedup.reason.map(|r| r.as_str()).unwrap_or("heuristic");
            return Err(LedgerError::duplicate(
                format!("conversion matches an existing record ({})", rule),
                dedup.existing_conversion_id,
            ));
        }

        let attr = candidate.attribution;
        let fingerprint = match (attr.ip_address.as_deref(), attr.user_agent.as_deref()) {
            (Some(ip), Some(ua)) => Some(compute_fingerprint(ip, ua, attr.session_id.as_deref())),
            _ => None,
        };

        let mut conversion = ConversionEvent {
            id: 0,
            tracking_code: attribution
                .tracking_code
                .as_ref()
                .map(|c| c.as_str().to_string())
                .unwrap_or_default(),
            customer_id: attr.customer_id,
            product_id: candidate.product_id,
            initial_spend_amount: candidate.initial_spend_amount,
            conversion_timestamp: at,
            attribution_method: attribution.method,
            commission_eligible: attribution.success,
            marketer_id: attribution.marketer_id.clone(),
            session_id: attr.session_id,
            fingerprint,
            ip_address: attr.ip_address,
            user_agent: attr.user_agent,
            click_event_id: attribution.click_event_id,
            attribution_window_days: attribution.window_days,
            deduplication_key: key,
        };

        match self.repo.insert_conversion(&conversion, now).await {
            Ok(id) => conversion.id = id,
            Err(e) if is_unique_violation(&e) => {
                let existing = match self
                    .repo
                    .get_conversion_by_dedup_key(&conversion.deduplication_key)
                    .await
                {
                    Ok(found) => found.map(|c| c.id),
                    Err(lookup) => {
                        warn!(error = %lookup, "Could not load conflicting conversion");
                        None
                    }
                };
                info!(
                    customer_id = %conversion.customer_id,
                    product_id = %conversion.product_id,
                    "Conversion rejected by deduplication key"
                );
                return Err(LedgerError::duplicate(
                    "a conversion for this customer and product already exists for that day",
                    existing,
                ));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            conversion_id = conversion.id,
            customer_id = %conversion.customer_id,
            method = conversion.attribution_method.as_str(),
            eligible = conversion.commission_eligible,
            "Conversion recorded"
        );

        if conversion.commission_eligible {
            self.hub
                .publish(EligibleConversion::new(conversion.clone(), now));
        }

        Ok(RecordedConversion {
            conversion,
            attribution,
        })
    }
}
