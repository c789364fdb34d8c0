// Campaign Module
// "One strike, many hosts"

pub mod aggregator;
pub mod export;
pub mod filter;
pub mod message;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::targets::SelectedTargets;

pub use aggregator::apply;
pub use export::{export, export_now, ExportedFile, EXPORT_TIMESTAMP_FORMAT};
pub use filter::filter_rows;
pub use message::StreamingMessage;

/// Column every result row carries to identify the host that produced it
pub const HOST_COLUMN: &str = "host_hostname";

/// Host tally for a campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsCount {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub successful: u64,
    #[serde(default)]
    pub failed: u64,
}

impl HostsCount {
    pub fn new(total: u64, successful: u64, failed: u64) -> Self {
        Self {
            total,
            successful,
            failed,
        }
    }

    pub fn responded(&self) -> u64 {
        self.successful + self.failed
    }
}

/// Target totals pushed periodically by the backend while a campaign runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTotals {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub online: u64,
    #[serde(default)]
    pub missing_in_action: u64,
}

/// Lifecycle of a campaign. Variants are ordered; status only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Pending,
    Running,
    Finished,
}

impl CampaignStatus {
    /// Parse a backend status string. Unknown values are treated as still running.
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "finished" => CampaignStatus::Finished,
            "pending" | "waiting" => CampaignStatus::Pending,
            _ => CampaignStatus::Running,
        }
    }
}

/// One host's output row: an ordered column -> value mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRow(Map<String, Value>);

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row with `host_hostname` as its first column.
    pub fn for_host(hostname: &str, columns: Map<String, Value>) -> Self {
        let mut row = Map::with_capacity(columns.len() + 1);
        row.insert(HOST_COLUMN.to_string(), Value::String(hostname.to_string()));
        for (column, value) in columns {
            if column != HOST_COLUMN {
                row.insert(column, value);
            }
        }
        Self(row)
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn hostname(&self) -> Option<&str> {
        self.0.get(HOST_COLUMN).and_then(Value::as_str)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ResultRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One query execution against one target set, with its accumulating results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: u64,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub selected: SelectedTargets,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default)]
    pub hosts_count: HostsCount,
    #[serde(default)]
    pub totals: Option<TargetTotals>,
    #[serde(default)]
    pub query_results: Vec<ResultRow>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(skip)]
    pub(crate) last_message: Option<StreamingMessage>,
}

impl Campaign {
    pub fn new(id: u64, query: impl Into<String>, selected: SelectedTargets) -> Self {
        Self {
            id,
            query: query.into(),
            selected,
            ..Self::default()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == CampaignStatus::Finished
    }

    /// Running but nothing is known about the target set yet.
    pub fn is_loading(&self) -> bool {
        self.status != CampaignStatus::Finished && self.hosts_count.total == 0
    }

    pub fn responded(&self) -> u64 {
        self.hosts_count.responded()
    }

    pub fn row_count(&self) -> usize {
        self.query_results.len()
    }

    /// Header order: `host_hostname` then the first row's remaining columns.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![HOST_COLUMN.to_string()];
        if let Some(first) = self.query_results.first() {
            columns.extend(
                first
                    .columns()
                    .filter(|column| *column != HOST_COLUMN)
                    .map(str::to_string),
            );
        }
        columns
    }
}

impl fmt::Display for Campaign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hosts targeted: {} responded, {} failed, {} rows",
            self.hosts_count.total,
            self.hosts_count.successful,
            self.hosts_count.failed,
            self.query_results.len()
        )
    }
}
