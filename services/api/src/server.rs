use crate::cli::ServeArgs;
use crate::infra::{
    seed_credit_packs, AppState, HostedCheckoutGateway, InMemoryIdentityProvider, OutboxNotifier,
};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use movequote::config::AppConfig;
use movequote::error::AppError;
use movequote::marketplace::{
    Collaborators, Marketplace, MarketplaceSettings, MarketplaceStores, MemoryStore,
};
use movequote::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryStore::new());
    let packs = seed_credit_packs(store.as_ref()).map_err(AppError::service)?;
    if config.auth.admin_token.is_none() {
        warn!("ADMIN_API_TOKEN is unset; admin endpoints will refuse every caller");
    }
    let marketplace = Arc::new(Marketplace::new(
        MarketplaceStores::in_memory(store),
        Collaborators {
            identity: Arc::new(InMemoryIdentityProvider::from_config(&config.auth)),
            notifier: Arc::new(OutboxNotifier::from_config(&config.email)),
            payments: Arc::new(HostedCheckoutGateway::from_config(&config.payments)),
        },
        MarketplaceSettings::from_config(&config.marketplace, &config.payments),
    ));

    let app = with_marketplace_routes(marketplace)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        datastore = %config.datastore.describe(),
        credit_packs = packs,
        "movequote marketplace ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
