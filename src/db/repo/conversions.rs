//! Conversion event operations.

use super::{amount_col, decode_error, time_col, Repository};
use crate::datasource::{ConversionSource, DataSourceError};
use crate::domain::{
    AttributionMethod, ConversionEvent, CustomerId, MarketerId, ProductId, TimeMs,
};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

const CONVERSION_COLUMNS: &str = r#"
    id, tracking_code, customer_id, product_id, initial_spend_amount, conversion_ms,
    attribution_method, commission_eligible, marketer_id, session_id, fingerprint,
    ip_address, user_agent, click_event_id, attribution_window_days, deduplication_key
"#;

impl Repository {
    /// Insert a conversion and return its row id.
    ///
    /// A second insert with the same `deduplication_key` fails with a UNIQUE
    /// violation; see [`super::is_unique_violation`].
    pub async fn insert_conversion(
        &self,
        conversion: &ConversionEvent,
        now: TimeMs,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO conversion_events (
                tracking_code, customer_id, product_id, initial_spend_amount, conversion_ms,
                attribution_method, commission_eligible, marketer_id, session_id, fingerprint,
                ip_address, user_agent, click_event_id, attribution_window_days,
                deduplication_key, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conversion.tracking_code)
        .bind(conversion.customer_id.as_str())
        .bind(conversion.product_id.as_str())
        .bind(conversion.initial_spend_amount.to_canonical_string())
        .bind(conversion.conversion_timestamp.as_ms())
        .bind(conversion.attribution_method.as_str())
        .bind(conversion.commission_eligible)
        .bind(conversion.marketer_id.as_ref().map(|m| m.as_str()))
        .bind(&conversion.session_id)
        .bind(&conversion.fingerprint)
        .bind(&conversion.ip_address)
        .bind(&conversion.user_agent)
        .bind(conversion.click_event_id)
        .bind(conversion.attribution_window_days)
        .bind(&conversion.deduplication_key)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_conversion(&self, id: i64) -> Result<Option<ConversionEvent>, sqlx::Error> {
        let sql = format!("SELECT {} FROM conversion_events WHERE id = ?", CONVERSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(conversion_from_row).transpose()
    }

    /// Conversion holding a given deduplication key, if any.
    pub async fn get_conversion_by_dedup_key(
        &self,
        key: &str,
    ) -> Result<Option<ConversionEvent>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM conversion_events WHERE deduplication_key = ?",
            CONVERSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(conversion_from_row).transpose()
    }
}

#[async_trait]
impl ConversionSource for Repository {
    async fn find_recent_conversions(
        &self,
        customer_id: &CustomerId,
        product_id: &ProductId,
        since: TimeMs,
    ) -> Result<Vec<ConversionEvent>, DataSourceError> {
        let sql = format!(
            "SELECT {} FROM conversion_events \
             WHERE customer_id = ? AND product_id = ? AND conversion_ms >= ? \
             ORDER BY conversion_ms DESC, id DESC",
            CONVERSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(customer_id.as_str())
            .bind(product_id.as_str())
            .bind(since.as_ms())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(conversion_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

fn conversion_from_row(row: &SqliteRow) -> Result<ConversionEvent, sqlx::Error> {
    let method: String = row.try_get("attribution_method")?;
    Ok(ConversionEvent {
        id: row.try_get("id")?,
        tracking_code: row.try_get("tracking_code")?,
        customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        initial_spend_amount: amount_col(row, "initial_spend_amount")?,
        conversion_timestamp: time_col(row, "conversion_ms")?,
        attribution_method: AttributionMethod::parse(&method)
            .ok_or_else(|| decode_error(format!("attribution_method {:?}", method)))?,
        commission_eligible: row.try_get("commission_eligible")?,
        marketer_id: row
            .try_get::<Option<String>, _>("marketer_id")?
            .map(MarketerId::new),
        session_id: row.try_get("session_id")?,
        fingerprint: row.try_get("fingerprint")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        click_event_id: row.try_get("click_event_id")?,
        attribution_window_days: row.try_get("attribution_window_days")?,
        deduplication_key: row.try_get("deduplication_key")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::{is_unique_violation, test_support::setup_test_db};
    use crate::domain::{deduplication_key, Amount, HOUR_MS};

    fn conversion(customer: &str, at: i64) -> ConversionEvent {
        let customer_id = CustomerId::new(customer);
        let product_id = ProductId::new("p1");
        let at = TimeMs::new(at);
        ConversionEvent {
            id: 0,
            tracking_code: "abc".to_string(),
            deduplication_key: deduplication_key(&customer_id, &product_id, at).unwrap(),
            customer_id,
            product_id,
            initial_spend_amount: Amount::from_int(1500),
            conversion_timestamp: at,
            attribution_method: AttributionMethod::Portal,
            commission_eligible: true,
            marketer_id: Some(MarketerId::new("m1")),
            session_id: None,
            fingerprint: None,
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
            click_event_id: None,
            attribution_window_days: 30,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_conversion() {
        let (repo, _temp) = setup_test_db().await;
        let c = conversion("c1", 1_700_000_000_000);
        let id = repo.insert_conversion(&c, TimeMs::new(1)).await.unwrap();

        let loaded = repo.get_conversion(id).await.unwrap().expect("conversion");
        assert_eq!(loaded, ConversionEvent { id, ..c });
    }

    #[tokio::test]
    async fn test_same_day_insert_violates_unique_key() {
        let (repo, _temp) = setup_test_db().await;
        let base = 1_700_000_000_000 - (1_700_000_000_000 % (24 * HOUR_MS));
        repo.insert_conversion(&conversion("c1", base + HOUR_MS), TimeMs::new(1))
            .await
            .unwrap();

        let err = repo
            .insert_conversion(&conversion("c1", base + 5 * HOUR_MS), TimeMs::new(2))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_find_recent_conversions_respects_lookback() {
        let (repo, _temp) = setup_test_db().await;
        let day = 24 * HOUR_MS;
        repo.insert_conversion(&conversion("c1", 10 * day), TimeMs::new(1))
            .await
            .unwrap();
        repo.insert_conversion(&conversion("c1", 12 * day), TimeMs::new(1))
            .await
            .unwrap();

        let recent = repo
            .find_recent_conversions(&CustomerId::new("c1"), &ProductId::new("p1"), TimeMs::new(11 * day))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].conversion_timestamp, TimeMs::new(12 * day));
    }
}
