//! Click ledger operations.

use super::{time_col, Repository};
use crate::datasource::{ClickMatch, DataSourceError, ReferralSource};
use crate::domain::{ClickEvent, CustomerId, NewClick, ReferralLink, TimeMs, TrackingCode};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

const CLICK_COLUMNS: &str = r#"
    id, tracking_code, ip_address, user_agent, referrer, session_id,
    customer_id, fingerprint, device, browser, os, timestamp_ms
"#;

impl Repository {
    /// Record a click. Fingerprint and user-agent facets are derived here.
    pub async fn record_click(
        &self,
        click: NewClick,
        now: TimeMs,
    ) -> Result<ClickEvent, sqlx::Error> {
        let mut event = ClickEvent::from_new(click, now);

        let result = sqlx::query(
            r#"
            INSERT INTO click_events (
                tracking_code, ip_address, user_agent, referrer, session_id,
                customer_id, fingerprint, device, browser, os, timestamp_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.tracking_code.as_str())
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.referrer)
        .bind(&event.session_id)
        .bind(event.customer_id.as_ref().map(|c| c.as_str()))
        .bind(&event.fingerprint)
        .bind(&event.device)
        .bind(&event.browser)
        .bind(&event.os)
        .bind(event.timestamp.as_ms())
        .execute(&self.pool)
        .await?;

        event.id = result.last_insert_rowid();
        Ok(event)
    }

    async fn clicks_where(
        &self,
        column: &'static str,
        value: &str,
        since: TimeMs,
    ) -> Result<Vec<ClickEvent>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM click_events WHERE {} = ? AND timestamp_ms >= ? \
             ORDER BY timestamp_ms DESC, id DESC",
            CLICK_COLUMNS, column
        );
        let rows = sqlx::query(&sql)
            .bind(value)
            .bind(since.as_ms())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(click_from_row).collect()
    }
}

#[async_trait]
impl ReferralSource for Repository {
    async fn find_active_referral_link(
        &self,
        tracking_code: &TrackingCode,
        now: TimeMs,
    ) -> Result<Option<ReferralLink>, DataSourceError> {
        let link = self.get_referral_link(tracking_code).await?;
        Ok(link.filter(|l| l.is_live(now)))
    }

    async fn find_clicks_matching(
        &self,
        signal: ClickMatch<'_>,
        since: TimeMs,
    ) -> Result<Vec<ClickEvent>, DataSourceError> {
        let clicks = match signal {
            ClickMatch::Session(s) => self.clicks_where("session_id", s, since).await?,
            ClickMatch::Fingerprint(f) => self.clicks_where("fingerprint", f, since).await?,
            ClickMatch::Ip(ip) => self.clicks_where("ip_address", ip, since).await?,
        };
        Ok(clicks)
    }
}

fn click_from_row(row: &SqliteRow) -> Result<ClickEvent, sqlx::Error> {
    Ok(ClickEvent {
        id: row.try_get("id")?,
        tracking_code: TrackingCode::new(row.try_get::<String, _>("tracking_code")?),
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        referrer: row.try_get("referrer")?,
        session_id: row.try_get("session_id")?,
        customer_id: row
            .try_get::<Option<String>, _>("customer_id")?
            .map(CustomerId::new),
        fingerprint: row.try_get("fingerprint")?,
        device: row.try_get("device")?,
        browser: row.try_get("browser")?,
        os: row.try_get("os")?,
        timestamp: time_col(row, "timestamp_ms")?,
    })
}
