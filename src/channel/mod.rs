// Channel Module
// "Hold the thermal, wait for the movement below"

pub mod websocket;

use async_trait::async_trait;

use crate::campaign::StreamingMessage;
use crate::error::KestrelResult;

pub use websocket::{results_url, WebSocketChannel, WebSocketConnector, RESULTS_PATH};

/// What a streaming channel can hand to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A decoded message for the campaign the channel was opened for
    Message(StreamingMessage),
    /// The transport failed; nothing else will arrive
    Failed(String),
}

/// Ordered, live feed of messages for one campaign.
///
/// `recv` returning `None` means the channel is closed. After `close()` no
/// further events are delivered, even if some were already queued.
#[async_trait]
pub trait StreamingChannel: Send {
    async fn recv(&mut self) -> Option<ChannelEvent>;

    /// Stop delivery and release the transport. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Opens streaming channels bound to a campaign id
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, campaign_id: u64) -> KestrelResult<Box<dyn StreamingChannel>>;
}
