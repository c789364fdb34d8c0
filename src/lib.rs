// Kestrel - Core Library
// "Hover, watch, strike, report"

pub mod api;
pub mod campaign;
pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod query;
pub mod targets;

// Re-export commonly used types
pub use api::{ApiClient, CampaignBackend};
pub use campaign::{Campaign, CampaignStatus, ExportedFile, HostsCount, ResultRow, StreamingMessage};
pub use channel::{ChannelConnector, ChannelEvent, StreamingChannel, WebSocketConnector};
pub use config::Config;
pub use controller::{Completion, QueryRunController, RunEvent, RunPhase};
pub use error::{KestrelError, KestrelResult};
pub use logging::LoggingConfig;
pub use targets::{SelectedTargets, Target, TargetKind, TargetSelector};
