use affiliate_ledger::{api, config::Config, db::init_db, NotificationHub, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let hub = Arc::new(NotificationHub::new(config.notification_capacity));

    // Downstream consumers attach here; the default subscriber only logs.
    if let Err(e) = hub.on_eligible_conversion(|event| {
        tracing::info!(
            event_id = %event.event_id,
            conversion_id = event.conversion.id,
            "Eligible conversion published"
        );
        Ok(())
    }) {
        eprintln!("Failed to register notification subscriber: {}", e);
        std::process::exit(1);
    }

    let state = api::AppState::new(repo, &config, hub.clone());
    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    let shutdown_hub = hub.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        shutdown_hub.close();
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
