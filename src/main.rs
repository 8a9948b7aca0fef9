//! Token Launch Radar — Binary Entrypoint
//! Boots the polling producer, the processing pipeline and the Axum HTTP server.

use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tokenlaunch_radar::{api, metrics::Metrics, AppConfig, Services};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tokenlaunch_radar=info,warn"));

    // The platform may have installed a subscriber already.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env()?;
    tracing::info!(
        accounts = cfg.accounts.len(),
        instance = %cfg.nitter_instance,
        interval_secs = cfg.producer.interval.as_secs(),
        "starting"
    );

    let services = Services::from_config(&cfg)?;
    let cancel = CancellationToken::new();
    let _workers = services.spawn_workers(&cfg, cancel.clone());

    let mut router = api::router(services.app_state());
    match Metrics::init(cfg.hub_capacity) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = ?e, "metrics disabled"),
    }

    Ok(router.into())
}
