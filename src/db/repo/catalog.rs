//! Referral link, product, and marketer operations.

use super::{decode_error, opt_amount_col, Repository};
use crate::datasource::{CatalogSource, DataSourceError};
use crate::domain::{
    CommissionTier, CommissionType, Marketer, MarketerId, MarketerStatus, Product, ProductId,
    ReferralLink, TimeMs, TrackingCode, UserRole,
};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl Repository {
    /// Insert or replace a referral link.
    pub async fn upsert_referral_link(&self, link: &ReferralLink) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO referral_links (tracking_code, marketer_id, product_id, is_active, expires_at_ms)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(tracking_code) DO UPDATE SET
                marketer_id = excluded.marketer_id,
                product_id = excluded.product_id,
                is_active = excluded.is_active,
                expires_at_ms = excluded.expires_at_ms
            "#,
        )
        .bind(link.tracking_code.as_str())
        .bind(link.marketer_id.as_str())
        .bind(link.product_id.as_str())
        .bind(link.is_active)
        .bind(link.expires_at.map(|t| t.as_ms()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Referral link by code regardless of state.
    pub async fn get_referral_link(
        &self,
        tracking_code: &TrackingCode,
    ) -> Result<Option<ReferralLink>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT tracking_code, marketer_id, product_id, is_active, expires_at_ms
            FROM referral_links
            WHERE tracking_code = ?
            "#,
        )
        .bind(tracking_code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(ReferralLink {
                tracking_code: TrackingCode::new(r.try_get::<String, _>("tracking_code")?),
                marketer_id: MarketerId::new(r.try_get::<String, _>("marketer_id")?),
                product_id: ProductId::new(r.try_get::<String, _>("product_id")?),
                is_active: r.try_get("is_active")?,
                expires_at: r.try_get::<Option<i64>, _>("expires_at_ms")?.map(TimeMs::new),
            })
        })
        .transpose()
    }

    /// Insert or replace a product with its commission rules.
    pub async fn upsert_product(&self, product: &Product) -> Result<(), sqlx::Error> {
        let tiers_json = if product.tiers.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&product.tiers)
                    .map_err(|e| sqlx::Error::Protocol(format!("tiers encode: {}", e)))?,
            )
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, is_active, commission_type, commission_rate,
                commission_flat_amount, tiers_json, minimum_spend
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_active = excluded.is_active,
                commission_type = excluded.commission_type,
                commission_rate = excluded.commission_rate,
                commission_flat_amount = excluded.commission_flat_amount,
                tiers_json = excluded.tiers_json,
                minimum_spend = excluded.minimum_spend
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.is_active)
        .bind(commission_type_str(product.commission_type))
        .bind(product.commission_rate.map(|a| a.to_canonical_string()))
        .bind(product.commission_flat_amount.map(|a| a.to_canonical_string()))
        .bind(tiers_json)
        .bind(product.minimum_spend.map(|a| a.to_canonical_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace a marketer profile.
    pub async fn upsert_marketer(&self, marketer: &Marketer) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO marketers (id, status, role) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET status = excluded.status, role = excluded.role
            "#,
        )
        .bind(marketer.id.as_str())
        .bind(marketer_status_str(marketer.status))
        .bind(user_role_str(marketer.role))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, name, is_active, commission_type, commission_rate,
                   commission_flat_amount, tiers_json, minimum_spend
            FROM products
            WHERE id = ?
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn get_marketer(&self, marketer_id: &MarketerId) -> Result<Option<Marketer>, sqlx::Error> {
        let row = sqlx::query("SELECT id, status, role FROM marketers WHERE id = ?")
            .bind(marketer_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let status: String = r.try_get("status")?;
            let role: String = r.try_get("role")?;
            Ok(Marketer {
                id: MarketerId::new(r.try_get::<String, _>("id")?),
                status: parse_marketer_status(&status)
                    .ok_or_else(|| decode_error(format!("marketer status {:?}", status)))?,
                role: parse_user_role(&role)
                    .ok_or_else(|| decode_error(format!("marketer role {:?}", role)))?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl CatalogSource for Repository {
    async fn get_active_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<Product>, DataSourceError> {
        Ok(self.get_product(product_id).await?)
    }

    async fn get_active_marketer(
        &self,
        marketer_id: &MarketerId,
    ) -> Result<Option<Marketer>, DataSourceError> {
        Ok(self.get_marketer(marketer_id).await?)
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product, sqlx::Error> {
    let commission_type: String = row.try_get("commission_type")?;
    let tiers_json: Option<String> = row.try_get("tiers_json")?;
    let tiers: Vec<CommissionTier> = match tiers_json.as_deref() {
        Some(json) if !json.trim().is_empty() => serde_json::from_str(json)
            .map_err(|e| decode_error(format!("tiers_json: {}", e)))?,
        _ => Vec::new(),
    };

    Ok(Product {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        is_active: row.try_get("is_active")?,
        commission_type: match commission_type.as_str() {
            "percentage" => CommissionType::Percentage,
            "flat" => CommissionType::Flat,
            other => return Err(decode_error(format!("commission_type {:?}", other))),
        },
        commission_rate: opt_amount_col(row, "commission_rate")?,
        commission_flat_amount: opt_amount_col(row, "commission_flat_amount")?,
        tiers,
        minimum_spend: opt_amount_col(row, "minimum_spend")?,
    })
}

fn commission_type_str(t: CommissionType) -> &'static str {
    match t {
        CommissionType::Percentage => "percentage",
        CommissionType::Flat => "flat",
    }
}

fn marketer_status_str(s: MarketerStatus) -> &'static str {
    match s {
        MarketerStatus::Active => "active",
        MarketerStatus::Suspended => "suspended",
        MarketerStatus::Inactive => "inactive",
    }
}

fn parse_marketer_status(s: &str) -> Option<MarketerStatus> {
    match s {
        "active" => Some(MarketerStatus::Active),
        "suspended" => Some(MarketerStatus::Suspended),
        "inactive" => Some(MarketerStatus::Inactive),
        _ => None,
    }
}

fn user_role_str(r: UserRole) -> &'static str {
    match r {
        UserRole::Marketer => "marketer",
        UserRole::Customer => "customer",
        UserRole::Admin => "admin",
    }
}

fn parse_user_role(s: &str) -> Option<UserRole> {
    match s {
        "marketer" => Some(UserRole::Marketer),
        "customer" => Some(UserRole::Customer),
        "admin" => Some(UserRole::Admin),
        _ => None,
    }
}
