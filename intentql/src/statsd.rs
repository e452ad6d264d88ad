use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use shared::metrics_defs::describe_metrics;
use storefront_relay::metrics_defs::ALL_METRICS;

use crate::config::MetricsConfig;

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("could not build statsd recorder: {0}")]
    Build(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

pub fn init(config: &MetricsConfig) -> Result<(), MetricsError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(config.prefix.as_str()))?;

    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;
    describe_metrics(ALL_METRICS);

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        prefix = %config.prefix,
        "Sending metrics to statsd"
    );
    Ok(())
}
