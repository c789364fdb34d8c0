//! Results websocket: authenticate, select a campaign, then forward every
//! decoded frame to the controller in arrival order.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::{ChannelConnector, ChannelEvent, StreamingChannel};
use crate::campaign::StreamingMessage;
use crate::error::{ErrorContext, KestrelError, KestrelResult};

pub const RESULTS_PATH: &str = "/api/v1/kolide/results/websocket";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derive the results websocket URL from the REST base URL.
pub fn results_url(base: &Url) -> KestrelResult<Url> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(KestrelError::invalid_config_value(
                "server.url",
                format!("unsupported scheme {other}"),
            ))
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|_| KestrelError::invalid_config_value("server.url", base.to_string()))?;
    url.set_path(RESULTS_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn frame(kind: &str, data: Value) -> Message {
    Message::Text(json!({ "type": kind, "data": data }).to_string().into())
}

/// Opens one websocket per campaign
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    token: Option<String>,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: Url, token: Option<String>) -> Self {
        Self {
            url,
            token,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn open(&self, campaign_id: u64) -> KestrelResult<Box<dyn StreamingChannel>> {
        info!(url = %self.url, campaign_id, "Opening results websocket");

        let connect = connect_async(self.url.as_str());
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                KestrelError::timeout("websocket connect", self.connect_timeout.as_millis() as u64)
            })?
            .with_channel_context()?;

        let (mut write, read) = stream.split();

        if let Some(token) = &self.token {
            write
                .send(frame("auth", json!({ "token": token })))
                .await
                .with_channel_context()?;
        }
        write
            .send(frame("select_campaign", json!({ "campaign_id": campaign_id })))
            .await
            .with_channel_context()?;

        let (events, receiver) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        tokio::spawn(pump(campaign_id, write, read, events, shutdown_rx));

        debug!(campaign_id, "Results websocket subscribed");
        Ok(Box::new(WebSocketChannel {
            campaign_id,
            events: receiver,
            shutdown: Some(shutdown),
        }))
    }
}

/// Receiving end of a campaign's websocket
#[derive(Debug)]
pub struct WebSocketChannel {
    campaign_id: u64,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl WebSocketChannel {
    pub fn campaign_id(&self) -> u64 {
        self.campaign_id
    }
}

#[async_trait]
impl StreamingChannel for WebSocketChannel {
    async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.is_closed() {
            return None;
        }
        self.events.recv().await
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            self.events.close();
            debug!(campaign_id = self.campaign_id, "Results websocket closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.shutdown.is_none()
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn pump(
    campaign_id: u64,
    mut write: SplitSink<WsStream, Message>,
    mut read: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            incoming = read.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => match StreamingMessage::decode_frame(&text) {
                        Ok(Some(message)) => ChannelEvent::Message(message),
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(campaign_id, error = %e, "Undecodable results frame");
                            ChannelEvent::Failed(e.to_string())
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            ChannelEvent::Failed(format!("failed to answer ping: {e}"))
                        } else {
                            continue;
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        debug!(campaign_id, ?close, "Results websocket closed by server");
                        ChannelEvent::Failed("connection closed by server".to_string())
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(campaign_id, error = %e, "Results websocket error");
                        ChannelEvent::Failed(e.to_string())
                    }
                    None => ChannelEvent::Failed("connection ended".to_string()),
                };

                let failed = matches!(event, ChannelEvent::Failed(_));
                if events.send(event).is_err() || failed {
                    return;
                }
            }
        }
    }
}
