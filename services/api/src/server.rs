use crate::cli::ServeArgs;
use crate::infra::{AppState, FileCatalogSource, InMemoryProfileStore};
use crate::routes::with_eligibility_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use scheme_finder::config::AppConfig;
use scheme_finder::eligibility::{EligibilityService, InMemoryEligibilityCache};
use scheme_finder::error::AppError;
use scheme_finder::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(catalog) = args.catalog.take() {
        config.eligibility.catalog_path = Some(catalog);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog_source = Arc::new(FileCatalogSource::new(
        config.eligibility.catalog_path.clone(),
    ));
    let cache = Arc::new(InMemoryEligibilityCache::new(config.eligibility.cache_ttl));
    let service = Arc::new(EligibilityService::new(
        Arc::new(InMemoryProfileStore::default()),
        catalog_source.clone(),
        cache.clone(),
    ));

    let report = service.reload_catalog()?;
    for rejected in &report.rejected {
        warn!(
            scheme_id = %rejected.scheme_id,
            reason = %rejected.reason,
            "scheme skipped at startup"
        );
    }
    info!(
        source = %catalog_source.describe(),
        version = %report.version,
        schemes = report.loaded,
        "catalog loaded"
    );

    spawn_cache_sweeper(cache);

    let app = with_eligibility_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        cache_ttl_secs = config.eligibility.cache_ttl.as_secs(),
        "scheme finder ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

// Expiry is passive on read; the sweep only bounds memory held by users who never return.
fn spawn_cache_sweeper(cache: Arc<InMemoryEligibilityCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cache.ttl());
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "expired eligibility entries purged");
            }
        }
    });
}
