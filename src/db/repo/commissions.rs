//! Commission and adjustment ledger operations.
//!
//! The `*_tx` functions take a connection rather than `&self` so several of
//! them can share one transaction. Status updates are compare-and-set on the
//! current status and report rows affected; zero means another writer won.

use super::{amount_col, decode_error, time_col, Repository};
use crate::domain::{
    ActorId, AdjustmentType, Amount, Commission, CommissionAdjustment, CommissionId,
    CommissionStatus, CustomerId, MarketerId, NewAdjustment, ProductId, TimeMs, TrackingCode,
};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

const COMMISSION_COLUMNS: &str = r#"
    id, marketer_id, customer_id, product_id, tracking_code, initial_spend_amount,
    commission_rate, commission_amount, status, conversion_ms, approval_ms,
    clearance_period_days, eligible_for_payout_ms, created_at_ms, updated_at_ms
"#;

const ADJUSTMENT_COLUMNS: &str =
    "id, commission_id, adjustment_type, amount, reason, reference, admin_id, created_at_ms";

/// Commission counts for a conversion-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodCounts {
    pub total: u64,
    /// Commissions with at least one clawback entry.
    pub clawed_back: u64,
}

impl Repository {
    pub async fn find_commission_for_triple_tx(
        conn: &mut SqliteConnection,
        customer_id: &CustomerId,
        product_id: &ProductId,
        tracking_code: &TrackingCode,
    ) -> Result<Option<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions \
             WHERE customer_id = ? AND product_id = ? AND tracking_code = ?",
            COMMISSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(customer_id.as_str())
            .bind(product_id.as_str())
            .bind(tracking_code.as_str())
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(commission_from_row).transpose()
    }

    /// Insert a commission; the `id` field is ignored and the new id returned.
    pub async fn insert_commission_tx(
        conn: &mut SqliteConnection,
        commission: &Commission,
    ) -> Result<CommissionId, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO commissions (
                marketer_id, customer_id, product_id, tracking_code, initial_spend_amount,
                commission_rate, commission_amount, status, conversion_ms, approval_ms,
                clearance_period_days, eligible_for_payout_ms, created_at_ms, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(commission.marketer_id.as_str())
        .bind(commission.customer_id.as_str())
        .bind(commission.product_id.as_str())
        .bind(commission.tracking_code.as_str())
        .bind(commission.initial_spend_amount.to_canonical_string())
        .bind(commission.commission_rate.to_canonical_string())
        .bind(commission.commission_amount.to_canonical_string())
        .bind(commission.status.as_str())
        .bind(commission.conversion_date.as_ms())
        .bind(commission.approval_date.map(|t| t.as_ms()))
        .bind(commission.clearance_period_days)
        .bind(commission.eligible_for_payout_date.as_ms())
        .bind(commission.created_at.as_ms())
        .bind(commission.updated_at.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(CommissionId(result.last_insert_rowid()))
    }

    pub async fn load_commission_tx(
        conn: &mut SqliteConnection,
        id: CommissionId,
    ) -> Result<Option<Commission>, sqlx::Error> {
        let sql = format!("SELECT {} FROM commissions WHERE id = ?", COMMISSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(commission_from_row).transpose()
    }

    /// Move `id` from `expected` to `next`. Returns rows affected (0 or 1).
    ///
    /// `approval_date` is only written when `Some`.
    pub async fn update_commission_status_tx(
        conn: &mut SqliteConnection,
        id: CommissionId,
        expected: CommissionStatus,
        next: CommissionStatus,
        approval_date: Option<TimeMs>,
        now: TimeMs,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE commissions
            SET status = ?, approval_ms = COALESCE(?, approval_ms), updated_at_ms = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(next.as_str())
        .bind(approval_date.map(|t| t.as_ms()))
        .bind(now.as_ms())
        .bind(id.0)
        .bind(expected.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Rewrite amount and rate, guarded on the current status.
    pub async fn update_commission_amount_tx(
        conn: &mut SqliteConnection,
        id: CommissionId,
        expected: CommissionStatus,
        commission_amount: Amount,
        commission_rate: Amount,
        now: TimeMs,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE commissions
            SET commission_amount = ?, commission_rate = ?, updated_at_ms = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(commission_amount.to_canonical_string())
        .bind(commission_rate.to_canonical_string())
        .bind(now.as_ms())
        .bind(id.0)
        .bind(expected.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn insert_adjustment_tx(
        conn: &mut SqliteConnection,
        adjustment: &NewAdjustment,
        now: TimeMs,
    ) -> Result<CommissionAdjustment, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO commission_adjustments (
                commission_id, adjustment_type, amount, reason, reference, admin_id, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(adjustment.commission_id.0)
        .bind(adjustment.adjustment_type.as_str())
        .bind(adjustment.amount.to_canonical_string())
        .bind(&adjustment.reason)
        .bind(&adjustment.reference)
        .bind(adjustment.admin_id.as_str())
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(CommissionAdjustment {
            id: result.last_insert_rowid(),
            commission_id: adjustment.commission_id,
            adjustment_type: adjustment.adjustment_type,
            amount: adjustment.amount,
            reason: adjustment.reason.clone(),
            reference: adjustment.reference.clone(),
            admin_id: adjustment.admin_id.clone(),
            created_at: now,
        })
    }

    /// Ledger entries for a commission in creation order.
    pub async fn list_adjustments_tx(
        conn: &mut SqliteConnection,
        id: CommissionId,
    ) -> Result<Vec<CommissionAdjustment>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commission_adjustments WHERE commission_id = ? \
             ORDER BY created_at_ms ASC, id ASC",
            ADJUSTMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(id.0)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(adjustment_from_row).collect()
    }

    pub async fn get_commission(&self, id: CommissionId) -> Result<Option<Commission>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::load_commission_tx(&mut conn, id).await
    }

    pub async fn get_adjustments(
        &self,
        id: CommissionId,
    ) -> Result<Vec<CommissionAdjustment>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::list_adjustments_tx(&mut conn, id).await
    }

    /// Pending commissions whose clearance period has elapsed at `now`.
    pub async fn list_eligible_pending(
        &self,
        now: TimeMs,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions \
             WHERE status = ? AND eligible_for_payout_ms <= ? \
             ORDER BY eligible_for_payout_ms ASC, id ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(CommissionStatus::Pending.as_str())
            .bind(now.as_ms())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(commission_from_row).collect()
    }

    /// Counts for commissions converted in `[from, to)`.
    pub async fn period_counts(&self, from: TimeMs, to: TimeMs) -> Result<PeriodCounts, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM commissions
                 WHERE conversion_ms >= ?1 AND conversion_ms < ?2) AS total,
                (SELECT COUNT(DISTINCT ca.commission_id)
                 FROM commission_adjustments ca
                 JOIN commissions c ON c.id = ca.commission_id
                 WHERE ca.adjustment_type = ?3
                   AND c.conversion_ms >= ?1 AND c.conversion_ms < ?2) AS clawed_back
            "#,
        )
        .bind(from.as_ms())
        .bind(to.as_ms())
        .bind(AdjustmentType::Clawback.as_str())
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let clawed_back: i64 = row.try_get("clawed_back")?;
        Ok(PeriodCounts {
            total: total.max(0) as u64,
            clawed_back: clawed_back.max(0) as u64,
        })
    }
}

fn commission_from_row(row: &SqliteRow) -> Result<Commission, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Commission {
        id: CommissionId(row.try_get("id")?),
        marketer_id: MarketerId::new(row.try_get::<String, _>("marketer_id")?),
        customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        tracking_code: TrackingCode::new(row.try_get::<String, _>("tracking_code")?),
        initial_spend_amount: amount_col(row, "initial_spend_amount")?,
        commission_rate: amount_col(row, "commission_rate")?,
        commission_amount: amount_col(row, "commission_amount")?,
        status: CommissionStatus::parse(&status)
            .ok_or_else(|| decode_error(format!("commission status {:?}", status)))?,
        conversion_date: time_col(row, "conversion_ms")?,
        approval_date: row.try_get::<Option<i64>, _>("approval_ms")?.map(TimeMs::new),
        clearance_period_days: row.try_get("clearance_period_days")?,
        eligible_for_payout_date: time_col(row, "eligible_for_payout_ms")?,
        created_at: time_col(row, "created_at_ms")?,
        updated_at: time_col(row, "updated_at_ms")?,
    })
}

fn adjustment_from_row(row: &SqliteRow) -> Result<CommissionAdjustment, sqlx::Error> {
    let adjustment_type: String = row.try_get("adjustment_type")?;
    Ok(CommissionAdjustment {
        id: row.try_get("id")?,
        commission_id: CommissionId(row.try_get("commission_id")?),
        adjustment_type: AdjustmentType::parse(&adjustment_type)
            .ok_or_else(|| decode_error(format!("adjustment_type {:?}", adjustment_type)))?,
        amount: amount_col(row, "amount")?,
        reason: row.try_get("reason")?,
        reference: row.try_get("reference")?,
        admin_id: ActorId::new(row.try_get::<String, _>("admin_id")?),
        created_at: time_col(row, "created_at_ms")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::{is_unique_violation, test_support::setup_test_db};

    fn commission(customer: &str, conversion_ms: i64) -> Commission {
        Commission {
            id: CommissionId(0),
            marketer_id: MarketerId::new("m1"),
            customer_id: CustomerId::new(customer),
            product_id: ProductId::new("p1"),
            tracking_code: TrackingCode::new("abc"),
            initial_spend_amount: Amount::from_int(2000),
            commission_rate: Amount::parse("0.05").unwrap(),
            commission_amount: Amount::from_int(100),
            status: CommissionStatus::Pending,
            conversion_date: TimeMs::new(conversion_ms),
            approval_date: None,
            clearance_period_days: 30,
            eligible_for_payout_date: TimeMs::new(conversion_ms).plus_days(30),
            created_at: TimeMs::new(conversion_ms),
            updated_at: TimeMs::new(conversion_ms),
        }
    }

    fn clawback(id: CommissionId, amount: i64) -> NewAdjustment {
        NewAdjustment {
            commission_id: id,
            adjustment_type: AdjustmentType::Clawback,
            amount: Amount::from_int(amount),
            reason: "refund".to_string(),
            reference: Some("refund".to_string()),
            admin_id: ActorId::new("admin"),
        }
    }

    #[tokio::test]
    async fn test_commission_round_trip() {
        let (repo, _temp) = setup_test_db().await;
        let mut tx = repo.begin().await.unwrap();
        let id = Repository::insert_commission_tx(&mut tx, &commission("c1", 1_000))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let loaded = repo.get_commission(id).await.unwrap().expect("commission");
        assert_eq!(loaded, Commission { id, ..commission("c1", 1_000) });
    }

    #[tokio::test]
    async fn test_triple_is_unique() {
        let (repo, _temp) = setup_test_db().await;
        let mut tx = repo.begin().await.unwrap();
        Repository::insert_commission_tx(&mut tx, &commission("c1", 1_000))
            .await
            .unwrap();
        let err = Repository::insert_commission_tx(&mut tx, &commission("c1", 2_000))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_set() {
        let (repo, _temp) = setup_test_db().await;
        let mut tx = repo.begin().await.unwrap();
        let id = Repository::insert_commission_tx(&mut tx, &commission("c1", 1_000))
            .await
            .unwrap();

        let first = Repository::update_commission_status_tx(
            &mut tx,
            id,
            CommissionStatus::Pending,
            CommissionStatus::Approved,
            Some(TimeMs::new(5_000)),
            TimeMs::new(5_000),
        )
        .await
        .unwrap();
        let second = Repository::update_commission_status_tx(
            &mut tx,
            id,
            CommissionStatus::Pending,
            CommissionStatus::Rejected,
            None,
            TimeMs::new(6_000),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        let loaded = repo.get_commission(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CommissionStatus::Approved);
        assert_eq!(loaded.approval_date, Some(TimeMs::new(5_000)));
    }

    #[tokio::test]
    async fn test_eligible_pending_respects_clearance() {
        let (repo, _temp) = setup_test_db().await;
        let mut tx = repo.begin().await.unwrap();
        Repository::insert_commission_tx(&mut tx, &commission("c1", 0))
            .await
            .unwrap();
        Repository::insert_commission_tx(&mut tx, &commission("c2", 10 * crate::domain::DAY_MS))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let eligible = repo
            .list_eligible_pending(TimeMs::new(0).plus_days(31))
            .await
            .unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].customer_id.as_str(), "c1");
    }

    #[tokio::test]
    async fn test_period_counts_count_each_commission_once() {
        let (repo, _temp) = setup_test_db().await;
        let mut tx = repo.begin().await.unwrap();
        let a = Repository::insert_commission_tx(&mut tx, &commission("c1", 100))
            .await
            .unwrap();
        Repository::insert_commission_tx(&mut tx, &commission("c2", 200))
            .await
            .unwrap();
        Repository::insert_adjustment_tx(&mut tx, &clawback(a, -10), TimeMs::new(300))
            .await
            .unwrap();
        Repository::insert_adjustment_tx(&mut tx, &clawback(a, -20), TimeMs::new(400))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let counts = repo
            .period_counts(TimeMs::new(0), TimeMs::new(1_000))
            .await
            .unwrap();
        assert_eq!(counts, PeriodCounts { total: 2, clawed_back: 1 });

        let adjustments = repo.get_adjustments(a).await.unwrap();
        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[0].amount, Amount::from_int(-10));
    }
}
