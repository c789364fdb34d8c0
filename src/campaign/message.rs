//! Messages delivered by the streaming channel.
//!
//! Two wire shapes are accepted. The typed envelope
//! `{"type": "result" | "totals" | "status" | "error", "data": ...}` is what the
//! results websocket sends; the untyped `{"data": {"hosts_count", "query_results"}}`
//! batch and a bare top-level `status` are accepted as well.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::{CampaignStatus, HostsCount, ResultRow, TargetTotals};
use crate::error::{KestrelError, KestrelResult};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamingMessage {
    /// Incremental rows plus a replacement host tally
    Batch {
        hosts_count: Option<HostsCount>,
        query_results: Vec<ResultRow>,
    },
    /// Rows returned by a single host
    HostResult {
        hostname: String,
        rows: Vec<ResultRow>,
        error: Option<String>,
    },
    Totals(TargetTotals),
    Status(CampaignStatus),
    Error(String),
}

impl StreamingMessage {
    /// Whether this message ends the campaign
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamingMessage::Status(CampaignStatus::Finished))
    }

    pub fn row_count(&self) -> usize {
        match self {
            StreamingMessage::Batch { query_results, .. } => query_results.len(),
            StreamingMessage::HostResult { rows, .. } => rows.len(),
            _ => 0,
        }
    }

    pub fn from_json(text: &str) -> KestrelResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decode one websocket text frame.
    ///
    /// Only text that is not JSON is an error. Well-formed frames this client
    /// cannot interpret (an unknown `type`, a missing payload) yield `Ok(None)`
    /// and are skipped.
    pub fn decode_frame(text: &str) -> KestrelResult<Option<Self>> {
        let value: Value = serde_json::from_str(text)?;
        match Self::from_value(value) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                warn!(error = %e, "Skipping unrecognised streaming frame");
                Ok(None)
            }
        }
    }

    pub fn from_value(value: Value) -> KestrelResult<Self> {
        let Value::Object(mut envelope) = value else {
            return Err(KestrelError::data_serialization(
                "streaming message is not a JSON object",
            ));
        };

        let kind = envelope
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);
        let data = envelope.remove("data").unwrap_or(Value::Null);

        match kind.as_deref() {
            Some("result") => decode_host_result(data),
            Some("totals") => Ok(StreamingMessage::Totals(serde_json::from_value(data)?)),
            Some("status") => decode_status(&data),
            Some("error") => Ok(StreamingMessage::Error(error_text(&data))),
            Some(other) => Err(KestrelError::data_serialization(format!(
                "unknown streaming message type: {other}"
            ))),
            None => {
                if let Some(status) = envelope.get("status").and_then(Value::as_str) {
                    return Ok(StreamingMessage::Status(CampaignStatus::parse(status)));
                }
                decode_batch(data)
            }
        }
    }
}

#[derive(Deserialize)]
struct BatchPayload {
    #[serde(default)]
    hosts_count: Option<HostsCount>,
    #[serde(default)]
    query_results: Option<Vec<ResultRow>>,
    #[serde(default)]
    status: Option<String>,
}

fn decode_batch(data: Value) -> KestrelResult<StreamingMessage> {
    if data.is_null() {
        return Err(KestrelError::data_serialization(
            "streaming message has neither type, status nor data",
        ));
    }

    let payload: BatchPayload = serde_json::from_value(data)?;
    match payload {
        BatchPayload {
            hosts_count: None,
            query_results: None,
            status: Some(status),
        } => Ok(StreamingMessage::Status(CampaignStatus::parse(&status))),
        BatchPayload {
            hosts_count: None,
            query_results: None,
            status: None,
        } => Err(KestrelError::data_serialization(
            "batch carries neither hosts_count nor query_results",
        )),
        BatchPayload {
            hosts_count,
            query_results,
            ..
        } => Ok(StreamingMessage::Batch {
            hosts_count,
            query_results: query_results.unwrap_or_default(),
        }),
    }
}

#[derive(Deserialize)]
struct HostPayload {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    display_text: Option<String>,
}

#[derive(Deserialize)]
struct HostResultPayload {
    host: HostPayload,
    #[serde(default)]
    rows: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<String>,
}

fn decode_host_result(data: Value) -> KestrelResult<StreamingMessage> {
    let payload: HostResultPayload = serde_json::from_value(data)?;
    let hostname = payload
        .host
        .hostname
        .or(payload.host.display_text)
        .unwrap_or_default();
    let rows = payload
        .rows
        .unwrap_or_default()
        .into_iter()
        .map(|columns| ResultRow::for_host(&hostname, columns))
        .collect();

    Ok(StreamingMessage::HostResult {
        hostname,
        rows,
        error: payload.error.filter(|e| !e.is_empty()),
    })
}

fn decode_status(data: &Value) -> KestrelResult<StreamingMessage> {
    let status = match data {
        Value::String(status) => status.as_str(),
        Value::Object(fields) => fields
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| KestrelError::data_serialization("status message without status"))?,
        _ => {
            return Err(KestrelError::data_serialization(
                "status message without status",
            ))
        }
    };
    Ok(StreamingMessage::Status(CampaignStatus::parse(status)))
}

fn error_text(data: &Value) -> String {
    match data {
        Value::String(text) => text.clone(),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}
