//! Attribution resolution: tie a conversion candidate to a marketer.

use crate::datasource::{ClickMatch, ReferralSource};
use crate::domain::{
    compute_fingerprint, AttributionCandidate, AttributionMethod, AttributionResult, ClickEvent,
    MatchSignal, TimeMs, ATTRIBUTION_WINDOW_RANGE,
};
use crate::error::LedgerError;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves attribution in fixed priority order: direct tracking code, then
/// session, fingerprint and IP click matches. The first success wins and
/// signals are never merged.
#[derive(Clone)]
pub struct AttributionResolver {
    source: Arc<dyn ReferralSource>,
    window_days: i64,
    direct_window_days: i64,
}

impl AttributionResolver {
    pub fn new(source: Arc<dyn ReferralSource>, window_days: i64, direct_window_days: i64) -> Self {
        Self {
            source,
            window_days,
            direct_window_days,
        }
    }

    pub async fn resolve(
        &self,
        candidate: &AttributionCandidate,
        now: TimeMs,
    ) -> Result<AttributionResult, LedgerError> {
        let window_days = candidate.attribution_window_days.unwrap_or(self.window_days);
        if !ATTRIBUTION_WINDOW_RANGE.contains(&window_days) {
            return Err(LedgerError::validation(format!(
                "attribution window {} days is outside 1..=90",
                window_days
            )));
        }

        if let Some(result) = self.resolve_direct(candidate, now).await? {
            return Ok(result);
        }

        let since = now.minus_days(window_days);
        let Some((signal, click)) = self.find_click(candidate, since).await? else {
            debug!(customer_id = %candidate.customer_id, "No attribution signal matched");
            return Ok(AttributionResult::unattributed(window_days));
        };

        // A matched click only counts if its link is still live.
        match self
            .source
            .find_active_referral_link(&click.tracking_code, now)
            .await?
        {
            Some(link) => {
                info!(
                    customer_id = %candidate.customer_id,
                    tracking_code = %link.tracking_code,
                    signal = ?signal,
                    click_id = click.id,
                    "Cookie attribution resolved"
                );
                Ok(AttributionResult::matched(
                    link.tracking_code,
                    link.marketer_id,
                    AttributionMethod::Cookie,
                    signal,
                    Some(click.id),
                    window_days,
                ))
            }
            None => {
                debug!(
                    tracking_code = %click.tracking_code,
                    click_id = click.id,
                    "Matched click has no live referral link"
                );
                Ok(AttributionResult::unattributed(window_days))
            }
        }
    }

    /// Portal or server-to-server attribution from a supplied tracking code.
    /// An unknown or inactive code yields `None` so cookie matching can run.
    async fn resolve_direct(
        &self,
        candidate: &AttributionCandidate,
        now: TimeMs,
    ) -> Result<Option<AttributionResult>, LedgerError> {
        let Some(code) = candidate
            .tracking_code
            .as_ref()
            .filter(|c| !c.as_str().trim().is_empty())
        else {
            return Ok(None);
        };

        let method = match candidate.declared_method {
            None | Some(AttributionMethod::Portal) => AttributionMethod::Portal,
            Some(AttributionMethod::S2s) => AttributionMethod::S2s,
            Some(other) => {
                return Err(LedgerError::validation(format!(
                    "declared method {} is not valid for a supplied tracking code",
                    other.as_str()
                )))
            }
        };

        let Some(link) = self.source.find_active_referral_link(code, now).await? else {
            debug!(tracking_code = %code, "Supplied tracking code has no live link");
            return Ok(None);
        };

        info!(
            customer_id = %candidate.customer_id,
            tracking_code = %link.tracking_code,
            method = method.as_str(),
            "Direct attribution resolved"
        );
        Ok(Some(AttributionResult::matched(
            link.tracking_code,
            link.marketer_id,
            method,
            MatchSignal::Direct,
            None,
            self.direct_window_days,
        )))
    }

    async fn find_click(
        &self,
        candidate: &AttributionCandidate,
        since: TimeMs,
    ) -> Result<Option<(MatchSignal, ClickEvent)>, LedgerError> {
        let session = non_empty(candidate.session_id.as_deref());
        let ip = non_empty(candidate.ip_address.as_deref());
        let user_agent = non_empty(candidate.user_agent.as_deref());

        if let Some(session) = session {
            if let Some(click) = self.most_recent(ClickMatch::Session(session), since).await? {
                return Ok(Some((MatchSignal::Session, click)));
            }
        }

        if let (Some(ip), Some(user_agent)) = (ip, user_agent) {
            let fingerprint = compute_fingerprint(ip, user_agent, session);
            if let Some(click) = self
                .most_recent(ClickMatch::Fingerprint(&fingerprint), since)
                .await?
            {
                return Ok(Some((MatchSignal::Fingerprint, click)));
            }
        }

        if let Some(ip) = ip {
            if let Some(click) = self.most_recent(ClickMatch::Ip(ip), since).await? {
                return Ok(Some((MatchSignal::Ip, click)));
            }
        }

        Ok(None)
    }

    async fn most_recent(
        &self,
        signal: ClickMatch<'_>,
        since: TimeMs,
    ) -> Result<Option<ClickEvent>, LedgerError> {
        let clicks = self.source.find_clicks_matching(signal, since).await?;
        Ok(clicks.into_iter().next())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
