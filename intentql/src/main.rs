use clap::Parser;
use std::path::PathBuf;

mod config;
mod logging;
mod statsd;

#[derive(Parser)]
#[command(about = "Relays GraphQL queries to a Storefront API")]
struct Cli {
    /// YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config_file_path: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = config::Config::from_file(&cli.config_file_path)?;
    config
        .relay
        .apply_env_overrides(|key| std::env::var(key).ok())?;

    let _sentry = logging::init(config.common.logging.as_ref());

    if let Some(metrics_config) = &config.common.metrics {
        statsd::init(metrics_config)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    if let Err(e) = rt.block_on(storefront_relay::run(config.relay)) {
        tracing::error!(error = %e, "Relay stopped");
        return Err(e.into());
    }

    Ok(())
}
