use affiliate_ledger::api;
use affiliate_ledger::config::Config;
use affiliate_ledger::db::init_db;
use affiliate_ledger::domain::{
    Amount, CommissionType, Marketer, MarketerId, MarketerStatus, Product, ProductId,
    ReferralLink, TrackingCode, UserRole,
};
use affiliate_ledger::engine::DedupPolicy;
use affiliate_ledger::{NotificationHub, Repository};
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    _repo: Arc<Repository>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    repo.upsert_referral_link(&ReferralLink {
        tracking_code: TrackingCode::new("MKT-1"),
        marketer_id: MarketerId::new("m1"),
        product_id: ProductId::new("p1"),
        is_active: true,
        expires_at: None,
    })
    .await
    .unwrap();
    repo.upsert_product(&Product {
        id: ProductId::new("p1"),
        name: "Premium plan".to_string(),
        is_active: true,
        commission_type: CommissionType::Flat,
        commission_rate: None,
        commission_flat_amount: Some(Amount::from_int(25)),
        tiers: vec![],
        minimum_spend: None,
    })
    .await
    .unwrap();
    repo.upsert_marketer(&Marketer {
        id: MarketerId::new("m1"),
        status: MarketerStatus::Active,
        role: UserRole::Marketer,
    })
    .await
    .unwrap();

    let config = Config {
        port: 0,
        database_path: db_path,
        attribution_window_days: 30,
        direct_attribution_window_days: 30,
        clearance_period_days: 30,
        dedup_policy: DedupPolicy::default(),
        notification_capacity: 16,
    };
    let hub = Arc::new(NotificationHub::new(config.notification_capacity));
    let state = api::AppState::new(repo.clone(), &config, hub);
    let app = api::create_router(state);

    TestApp {
        app,
        _repo: repo,
        _temp: temp_dir,
    }
}

async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn amount(v: &Value) -> Amount {
    Amount::parse(v.as_str().expect("amount is a string")).unwrap()
}

#[tokio::test]
async fn health_reports_database() {
    let t = setup_test_app().await;
    let (status, json) = request(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn click_then_conversion_attributes_by_session() {
    let t = setup_test_app().await;

    let (status, click) = request(
        &t.app,
        "POST",
        "/v1/clicks",
        Some(json!({
            "trackingCode": "MKT-1",
            "ipAddress": "10.0.0.1",
            "userAgent": "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
            "sessionId": "sess-1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(click["fingerprint"].as_str().unwrap().len(), 64);

    let conversion = json!({
        "customerId": "cust-1",
        "productId": "p1",
        "initialSpendAmount": "120.50",
        "sessionId": "sess-1"
    });
    let (status, recorded) = request(&t.app, "POST", "/v1/conversions", Some(conversion.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(recorded["attribution"]["method"], "cookie");
    assert_eq!(recorded["attribution"]["confidence"], "high");
    assert_eq!(recorded["conversion"]["commissionEligible"], true);
    assert_eq!(recorded["conversion"]["clickEventId"], click["id"]);

    let (status, check) = request(
        &t.app,
        "POST",
        "/v1/conversions/dedup-check",
        Some(conversion.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["isDuplicate"], true);
    assert_eq!(check["reason"], "same_customer_product_hour");

    let (status, err) = request(&t.app, "POST", "/v1/conversions", Some(conversion)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "duplicate");
}

#[tokio::test]
async fn click_without_session_is_bad_request() {
    let t = setup_test_app().await;
    let (status, err) = request(
        &t.app,
        "POST",
        "/v1/clicks",
        Some(json!({
            "trackingCode": "MKT-1",
            "ipAddress": "10.0.0.1",
            "userAgent": "curl/8.0",
            "sessionId": " "
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "bad_request");
}

#[tokio::test]
async fn commission_from_conversion_through_payout() {
    let t = setup_test_app().await;

    let (status, recorded) = request(
        &t.app,
        "POST",
        "/v1/conversions",
        Some(json!({
            "trackingCode": "MKT-1",
            "customerId": "cust-7",
            "productId": "p1",
            "initialSpendAmount": "100"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(recorded["attribution"]["method"], "portal");
    let conversion_id = recorded["conversion"]["id"].as_i64().unwrap();

    let (status, commission) = request(
        &t.app,
        "POST",
        &format!("/v1/conversions/{}/commission", conversion_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(commission["status"], "pending");
    assert_eq!(amount(&commission["commissionAmount"]), Amount::from_int(25));
    let id = commission["id"].as_i64().unwrap();

    // Pending cannot be paid directly.
    let (status, err) = request(
        &t.app,
        "POST",
        &format!("/v1/commissions/{}/transition", id),
        Some(json!({"action": "mark_paid", "actorId": "admin-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "invalid_transition");

    let (status, approved) = request(
        &t.app,
        "POST",
        &format!("/v1/commissions/{}/transition", id),
        Some(json!({"action": "approve", "actorId": "admin-1", "bypassClearance": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (status, statement) = request(
        &t.app,
        "POST",
        &format!("/v1/commissions/{}/adjustments", id),
        Some(json!({
            "amount": "5",
            "type": "bonus",
            "reason": "launch week",
            "adminId": "admin-1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(amount(&statement["netAmount"]), Amount::from_int(30));

    let (status, err) = request(
        &t.app,
        "POST",
        &format!("/v1/commissions/{}/clawbacks", id),
        Some(json!({
            "amount": "40",
            "reason": "chargeback",
            "adminId": "admin-1",
            "type": "chargeback"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"]
        .as_str()
        .unwrap()
        .contains("cannot exceed original commission amount"));

    let (status, statement) = request(
        &t.app,
        "POST",
        &format!("/v1/commissions/{}/clawbacks", id),
        Some(json!({
            "amount": "10",
            "reason": "partial refund",
            "adminId": "admin-1",
            "type": "refund",
            "partial": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(statement["commission"]["status"], "approved");
    assert_eq!(amount(&statement["netAmount"]), Amount::from_int(20));

    let (status, statement) = request(&t.app, "GET", &format!("/v1/commissions/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    // status_change, bonus, clawback
    assert_eq!(statement["adjustments"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unknown_commission_is_not_found() {
    let t = setup_test_app().await;
    let (status, err) = request(&t.app, "GET", "/v1/commissions/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["kind"], "not_found");
}

#[tokio::test]
async fn quote_uses_inline_rules_or_product() {
    let t = setup_test_app().await;

    let (status, quote) = request(
        &t.app,
        "POST",
        "/v1/commissions/quote",
        Some(json!({
            "spendAmount": "1500",
            "rules": {"type": "tiered", "tiers": [
                {"minAmount": "0", "maxAmount": "999.99", "rate": "0.05"},
                {"minAmount": "1000", "rate": "0.1"}
            ]}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&quote["commissionAmount"]), Amount::from_int(150));

    let (status, quote) = request(
        &t.app,
        "POST",
        "/v1/commissions/quote",
        Some(json!({"spendAmount": "50", "productId": "p1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&quote["commissionAmount"]), Amount::from_int(25));
    assert_eq!(amount(&quote["commissionRate"]), Amount::parse("0.5").unwrap());

    let (status, _) = request(
        &t.app,
        "POST",
        "/v1/commissions/quote",
        Some(json!({"spendAmount": "50"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_approve_and_stats_endpoints() {
    let t = setup_test_app().await;

    let (status, report) = request(
        &t.app,
        "POST",
        "/v1/commissions/bulk-approve",
        Some(json!({"actorId": "scheduler"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["approved"].as_array().unwrap().len(), 0);

    let (status, stats) = request(
        &t.app,
        "GET",
        "/v1/commissions/clawback-stats?fromMs=0&toMs=1000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalCommissions"], 0);
    assert_eq!(amount(&stats["clawbackRate"]), Amount::ZERO);

    let (status, _) = request(
        &t.app,
        "GET",
        "/v1/commissions/clawback-stats?fromMs=1000&toMs=1000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
