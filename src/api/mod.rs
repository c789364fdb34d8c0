// API Module
// "Call out before the dive"

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::campaign::{Campaign, CampaignStatus, HostsCount};
use crate::config::ServerConfig;
use crate::error::{KestrelError, KestrelResult};
use crate::logging::PerformanceTimer;
use crate::targets::{SelectedTargets, Target, TargetKind, TargetSearch};

pub const RUN_QUERY_PATH: &str = "/api/v1/kolide/queries/run";
pub const TARGETS_PATH: &str = "/api/v1/kolide/targets";

/// Backend error text for a campaign that already exists
pub const ALREADY_CREATED: &str = "resource already created";
pub const CONFLICT_MESSAGE: &str =
    "A campaign with the provided query text has already been created";

/// The one backend call the controller depends on
#[async_trait]
pub trait CampaignBackend: Send + Sync {
    async fn create_campaign(
        &self,
        query: &str,
        selected: &SelectedTargets,
    ) -> KestrelResult<Campaign>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    selected: &'a SelectedTargets,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CampaignEnvelope {
    Wrapped { campaign: CampaignPayload },
    Bare(CampaignPayload),
}

#[derive(Deserialize)]
struct CampaignPayload {
    id: u64,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    hosts_count: Option<HostsCount>,
}

#[derive(Deserialize, Default)]
struct TargetLists {
    #[serde(default)]
    hosts: Vec<Value>,
    #[serde(default)]
    labels: Vec<Value>,
}

#[derive(Deserialize)]
struct TargetsResponse {
    #[serde(default)]
    targets: TargetLists,
    #[serde(default)]
    targets_count: u64,
    #[serde(default)]
    targets_online: u64,
    #[serde(default)]
    targets_missing_in_action: u64,
}

/// REST client for the fleet server
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ServerConfig) -> KestrelResult<Self> {
        let base_url = config.base_url()?;
        let request_timeout = config.request_timeout();
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| KestrelError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            token: config.token.clone(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> KestrelResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.request_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.request_error(e))?;
        debug!(%url, status = status.as_u16(), bytes = text.len(), "Backend response");

        if !status.is_success() {
            return Err(error_for_status(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn request_error(&self, error: reqwest::Error) -> KestrelError {
        if error.is_timeout() {
            KestrelError::timeout("HTTP request", self.request_timeout.as_millis() as u64)
        } else {
            error.into()
        }
    }

    /// Create a campaign for `query` against `selected`.
    pub async fn create_campaign(
        &self,
        query: &str,
        selected: &SelectedTargets,
    ) -> KestrelResult<Campaign> {
        let timer = PerformanceTimer::start("create_campaign")
            .with_metadata("targets", selected.len().to_string());

        let body = self
            .post(RUN_QUERY_PATH, &QueryRequest { query, selected })
            .await?;
        let payload = match serde_json::from_value::<CampaignEnvelope>(body)? {
            CampaignEnvelope::Wrapped { campaign } => campaign,
            CampaignEnvelope::Bare(campaign) => campaign,
        };

        let mut campaign = Campaign::new(payload.id, query, selected.clone());
        campaign.status = payload
            .status
            .as_ref()
            .map(campaign_status)
            .unwrap_or(CampaignStatus::Running);
        if let Some(hosts_count) = payload.hosts_count {
            campaign.hosts_count = hosts_count;
        }

        info!(
            campaign_id = campaign.id,
            hosts = selected.hosts.len(),
            labels = selected.labels.len(),
            duration_ms = timer.finish(),
            "Campaign created"
        );
        Ok(campaign)
    }

    /// Search the target catalog for hosts and labels matching `query`.
    pub async fn search_targets(
        &self,
        query: &str,
        selected: &SelectedTargets,
    ) -> KestrelResult<TargetSearch> {
        let body = self
            .post(TARGETS_PATH, &QueryRequest { query, selected })
            .await?;
        let response: TargetsResponse = serde_json::from_value(body)?;

        Ok(TargetSearch {
            hosts: tag_targets(response.targets.hosts, TargetKind::Host)?,
            labels: tag_targets(response.targets.labels, TargetKind::Label)?,
            targets_count: response.targets_count,
            targets_online: response.targets_online,
            targets_missing_in_action: response.targets_missing_in_action,
        })
    }
}

#[async_trait]
impl CampaignBackend for ApiClient {
    async fn create_campaign(
        &self,
        query: &str,
        selected: &SelectedTargets,
    ) -> KestrelResult<Campaign> {
        ApiClient::create_campaign(self, query, selected).await
    }
}

/// The catalog lists hosts and labels separately and without `target_type`.
fn tag_targets(entries: Vec<Value>, kind: TargetKind) -> KestrelResult<Vec<Target>> {
    entries
        .into_iter()
        .map(|mut entry| -> KestrelResult<Target> {
            if let Value::Object(ref mut fields) = entry {
                fields.insert("target_type".to_string(), serde_json::to_value(kind)?);
                if !fields.contains_key("display_text") {
                    let fallback = fields
                        .get("hostname")
                        .or_else(|| fields.get("name"))
                        .filter(|name| name.is_string())
                        .cloned();
                    if let Some(fallback) = fallback {
                        fields.insert("display_text".to_string(), fallback);
                    }
                }
            }
            Ok(serde_json::from_value(entry)?)
        })
        .collect()
}

/// Campaign status arrives as the datastore enum (0 running, 1 complete,
/// 2 error) or as a string.
fn campaign_status(value: &Value) -> CampaignStatus {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(0) => CampaignStatus::Running,
            Some(_) => CampaignStatus::Finished,
            None => CampaignStatus::Running,
        },
        Value::String(s) => CampaignStatus::parse(s),
        _ => CampaignStatus::Running,
    }
}

fn error_for_status(status: StatusCode, body: &str) -> KestrelError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    if status == StatusCode::UNAUTHORIZED {
        return KestrelError::authentication(message);
    }
    if status == StatusCode::CONFLICT || body.to_lowercase().contains(ALREADY_CREATED) {
        return KestrelError::conflict(CONFLICT_MESSAGE);
    }
    KestrelError::backend(status.as_u16(), message)
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    let reason = value
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|error| error.get("reason"))
        .and_then(Value::as_str);

    reason
        .or_else(|| value.get("message").and_then(Value::as_str))
        .or_else(|| value.get("error").and_then(Value::as_str))
        .map(str::to_string)
}
