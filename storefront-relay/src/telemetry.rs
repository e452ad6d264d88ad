//! Per-request analytics
//!
//! Every relayed query produces one [`TelemetryRecord`] that is appended to an
//! external REST table. Submission runs on its own task and the request path
//! never waits for it. Failures are logged and counted, nothing more.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

use crate::classifier::QueryCategory;
use crate::config::TelemetryConfig;
use crate::errors::{RelayError, Result};
use crate::metrics_defs::TELEMETRY_FAILURES;
use crate::query::ResolvedQuery;
use crate::request::IncomingRequest;
use crate::upstream::UpstreamOutcome;

pub const AGENT_ID_HEADER: &str = "x-agent-id";
pub const AGENT_ID_PARAM: &str = "agent_id";
pub const SOURCE_PARAM: &str = "source";
pub const DEFAULT_SOURCE: &str = "direct";
/// Callers that found the gateway through its published contract
pub const CONTRACT_SOURCE: &str = "contract";
/// Characters of query text kept in a record
pub const QUERY_TEXT_LIMIT: usize = 500;

/// Caller details copied out of the inbound request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub agent_id: Option<String>,
    pub source: String,
}

impl RequestMetadata {
    pub fn from_request(request: &IncomingRequest) -> Self {
        let agent_id = non_empty(request.param(AGENT_ID_PARAM))
            .or_else(|| non_empty(request.header(AGENT_ID_HEADER)));

        RequestMetadata {
            user_agent: request.header("user-agent").map(str::to_string),
            referer: request.header("referer").map(str::to_string),
            agent_id: agent_id.map(str::to_string),
            source: non_empty(request.param(SOURCE_PARAM))
                .unwrap_or(DEFAULT_SOURCE)
                .to_string(),
        }
    }
}

// Blank values count as absent.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Checkpoints recorded for each request
///
/// 1. discovery: the caller arrived through the published contract
/// 2. execution: the gateway was reached, always true once a record exists
/// 3. accuracy: the query succeeded with products or without an error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StageFlags {
    #[serde(rename = "stage_1_discovery")]
    pub discovery: bool,
    #[serde(rename = "stage_2_execution")]
    pub execution: bool,
    #[serde(rename = "stage_3_accuracy")]
    pub accuracy: bool,
}

impl StageFlags {
    pub fn derive(source: &str, outcome: &UpstreamOutcome) -> Self {
        StageFlags {
            discovery: source == CONTRACT_SOURCE,
            execution: true,
            accuracy: outcome.success
                && (outcome.product_count > 0 || outcome.error_message.is_none()),
        }
    }
}

/// One row in the analytics store. Write-only.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub agent_id: Option<String>,
    pub source: String,
    #[serde(flatten)]
    pub stages: StageFlags,
    pub query_type: QueryCategory,
    pub query_text: String,
    pub success: bool,
    pub product_count: u64,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

impl TelemetryRecord {
    pub fn build(
        metadata: RequestMetadata,
        query: &ResolvedQuery,
        category: QueryCategory,
        outcome: &UpstreamOutcome,
        elapsed: Duration,
    ) -> Self {
        let stages = StageFlags::derive(&metadata.source, outcome);

        TelemetryRecord {
            user_agent: metadata.user_agent,
            referer: metadata.referer,
            agent_id: metadata.agent_id,
            source: metadata.source,
            stages,
            query_type: category,
            query_text: query.text().chars().take(QUERY_TEXT_LIMIT).collect(),
            success: outcome.success,
            product_count: outcome.product_count,
            response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error_message: outcome.error_message.clone(),
        }
    }
}

/// Destination for telemetry records
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn submit(&self, record: &TelemetryRecord) -> Result<()>;
}

/// Appends records to a PostgREST-style table
pub struct RestTelemetrySink {
    client: reqwest::Client,
    url: Url,
    api_key: String,
}

impl RestTelemetrySink {
    pub fn new(config: &TelemetryConfig) -> Self {
        RestTelemetrySink {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl TelemetrySink for RestTelemetrySink {
    async fn submit(&self, record: &TelemetryRecord) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::TelemetryRejected(status));
        }
        Ok(())
    }
}

/// Fires records at a sink without waiting for them
#[derive(Clone)]
pub struct TelemetryEmitter {
    sink: Arc<dyn TelemetrySink>,
}

impl TelemetryEmitter {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    /// Schedules delivery of `record` on a new task.
    ///
    /// The handle is only useful to tests; callers on the request path drop it.
    pub fn emit(&self, record: TelemetryRecord) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            match sink.submit(&record).await {
                Ok(()) => {
                    tracing::debug!(query_type = %record.query_type, "Telemetry record stored")
                }
                Err(e) => {
                    shared::counter!(TELEMETRY_FAILURES).increment(1);
                    tracing::warn!(error = %e, "Failed to submit telemetry record");
                }
            }
        })
    }
}
