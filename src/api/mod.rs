pub mod clicks;
pub mod commissions;
pub mod conversions;
pub mod health;

use crate::config::Config;
use crate::datasource::{CatalogSource, ConversionSource, ReferralSource};
use crate::db::Repository;
use crate::notify::NotificationHub;
use crate::orchestration::{
    AdjustmentLedger, AttributionResolver, CommissionManager, ConversionRecorder,
    DeduplicationChecker,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub catalog: Arc<dyn CatalogSource>,
    pub recorder: ConversionRecorder,
    pub commissions: CommissionManager,
    pub ledger: AdjustmentLedger,
    pub hub: Arc<NotificationHub>,
}

impl AppState {
    /// Wire every service against the SQLite repository.
    pub fn new(repo: Arc<Repository>, config: &Config, hub: Arc<NotificationHub>) -> Self {
        let referrals: Arc<dyn ReferralSource> = repo.clone();
        let conversions: Arc<dyn ConversionSource> = repo.clone();
        let catalog: Arc<dyn CatalogSource> = repo.clone();

        let resolver = AttributionResolver::new(
            referrals,
            config.attribution_window_days,
            config.direct_attribution_window_days,
        );
        let checker = DeduplicationChecker::new(conversions, config.dedup_policy.clone());
        let recorder = ConversionRecorder::new(repo.clone(), resolver, checker, hub.clone());
        let commissions =
            CommissionManager::new(repo.clone(), catalog.clone(), config.clearance_period_days);
        let ledger = AdjustmentLedger::new(repo.clone());

        Self {
            repo,
            catalog,
            recorder,
            commissions,
            ledger,
            hub,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/v1/clicks", post(clicks::record_click))
        .route("/v1/conversions", post(conversions::record_conversion))
        .route(
            "/v1/conversions/dedup-check",
            post(conversions::check_deduplication),
        )
        .route(
            "/v1/conversions/:id/commission",
            post(commissions::create_from_conversion),
        )
        .route("/v1/commissions", post(commissions::create_commission))
        .route("/v1/commissions/quote", post(commissions::quote))
        .route("/v1/commissions/bulk-approve", post(commissions::bulk_approve))
        .route("/v1/commissions/clawback-stats", get(commissions::clawback_stats))
        .route("/v1/commissions/:id", get(commissions::get_commission))
        .route(
            "/v1/commissions/:id/transition",
            post(commissions::transition),
        )
        .route(
            "/v1/commissions/:id/recalculate",
            post(commissions::recalculate),
        )
        .route(
            "/v1/commissions/:id/adjustments",
            post(commissions::apply_adjustment),
        )
        .route("/v1/commissions/:id/clawbacks", post(commissions::clawback))
        .layer(cors)
        .with_state(state)
}
