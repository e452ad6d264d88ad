use sentry::ClientInitGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::config::LoggingConfig;

/// Installs the global subscriber. `RUST_LOG` controls verbosity, `info` by
/// default.
///
/// Events are also forwarded to Sentry when a DSN is configured. The returned
/// guard flushes Sentry on drop and must be held for the life of the process.
pub fn init(config: Option<&LoggingConfig>) -> Option<ClientInitGuard> {
    let guard = config.map(|config| {
        sentry::init((
            config.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: config.environment.clone().map(Into::into),
                ..Default::default()
            },
        ))
    });

    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}
