pub mod classifier;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod query;
pub mod request;
pub mod service;
pub mod telemetry;
pub mod upstream;

#[cfg(test)]
mod testutils;

use errors::RelayError;
use service::RelayService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;

/// Serves storefront queries and the admin probes until either listener fails.
pub async fn run(config: config::Config) -> Result<(), RelayError> {
    config.validate()?;

    tracing::info!(
        upstream = %config.storefront.url,
        telemetry = config.telemetry.is_some(),
        require_query = config.require_query,
        "Starting storefront relay"
    );

    let relay_service = RelayService::new(&config);
    let relay_task = run_http_service(&config.listener.host, config.listener.port, relay_service);

    let admin_service = AdminService::<_, RelayError>::new(|| true);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(relay_task, admin_task)?;
    Ok(())
}
