use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const STOREFRONT_URL_VAR: &str = "STOREFRONT_URL";
pub const STOREFRONT_ACCESS_TOKEN_VAR: &str = "STOREFRONT_ACCESS_TOKEN";
pub const TELEMETRY_URL_VAR: &str = "TELEMETRY_URL";
pub const TELEMETRY_API_KEY_VAR: &str = "TELEMETRY_API_KEY";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener both bind {0}")]
    ListenerConflict(String),

    #[error("Storefront access token is empty")]
    EmptyAccessToken,

    #[error("Telemetry API key is empty")]
    EmptyTelemetryApiKey,

    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("{0} is set but {1} is missing")]
    IncompleteTelemetry(&'static str, &'static str),
}

/// Relay configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for storefront queries
    #[serde(default = "default_listener")]
    pub listener: Listener,
    /// Listener for health and readiness probes
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// Upstream Storefront API
    pub storefront: StorefrontConfig,
    /// Analytics store. Telemetry is disabled when absent.
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
    /// Reject requests that carry no query instead of running the default one.
    #[serde(default)]
    pub require_query: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::ListenerConflict(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        if self.storefront.access_token.is_empty() {
            return Err(ValidationError::EmptyAccessToken);
        }

        if let Some(telemetry) = &self.telemetry
            && telemetry.api_key.is_empty()
        {
            return Err(ValidationError::EmptyTelemetryApiKey);
        }

        Ok(())
    }

    /// Overrides endpoint URLs and credentials from the environment.
    ///
    /// `lookup` is normally `std::env::var(..).ok()`. A telemetry section is
    /// created when both telemetry variables are set and the file has none.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(STOREFRONT_URL_VAR) {
            self.storefront.url = parse_url(STOREFRONT_URL_VAR, &url)?;
        }
        if let Some(token) = lookup(STOREFRONT_ACCESS_TOKEN_VAR) {
            self.storefront.access_token = token;
        }

        let telemetry_url = lookup(TELEMETRY_URL_VAR)
            .map(|url| parse_url(TELEMETRY_URL_VAR, &url))
            .transpose()?;
        let telemetry_key = lookup(TELEMETRY_API_KEY_VAR);

        match (self.telemetry.as_mut(), telemetry_url, telemetry_key) {
            (Some(telemetry), url, key) => {
                if let Some(url) = url {
                    telemetry.url = url;
                }
                if let Some(key) = key {
                    telemetry.api_key = key;
                }
            }
            (None, Some(url), Some(api_key)) => {
                self.telemetry = Some(TelemetryConfig { url, api_key });
            }
            (None, Some(_), None) => {
                return Err(ValidationError::IncompleteTelemetry(
                    TELEMETRY_URL_VAR,
                    TELEMETRY_API_KEY_VAR,
                ));
            }
            (None, None, Some(_)) => {
                return Err(ValidationError::IncompleteTelemetry(
                    TELEMETRY_API_KEY_VAR,
                    TELEMETRY_URL_VAR,
                ));
            }
            (None, None, None) => {}
        }

        Ok(())
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ValidationError> {
    Url::parse(value).map_err(|e| ValidationError::InvalidUrl {
        var,
        reason: e.to_string(),
    })
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "0.0.0.0".into(),
        port: 3000,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StorefrontConfig {
    /// GraphQL endpoint, e.g. `https://<shop>.myshopify.com/api/2024-01/graphql.json`
    pub url: Url,
    /// Public Storefront access token
    pub access_token: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// REST endpoint of the table that receives one row per request
    pub url: Url,
    /// Sent both as `apikey` and as the bearer token
    pub api_key: String,
}
