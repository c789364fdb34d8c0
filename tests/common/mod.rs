use futures_util::{FutureExt, SinkExt, StreamExt};
use kestrel::channel::RESULTS_PATH;
use mockito::{Server, ServerGuard};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

pub use mockito::Matcher;

/// Helper to start a mock server safely in sandboxed environments
pub async fn start_mock_server(test_name: &str) -> Option<ServerGuard> {
    match AssertUnwindSafe(Server::new_async()).catch_unwind().await {
        Ok(server) => Some(server),
        Err(_) => {
            eprintln!(
                "skipping {test_name} - unable to start mock server (sandbox may restrict networking)"
            );
            None
        }
    }
}

/// How the scripted results server ends the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hangup {
    /// Keep reading until the client closes
    WaitForClient,
    /// Drop the connection right after the last scripted frame
    Abrupt,
}

/// A one-connection websocket server that plays back `frames` once the
/// client has selected a campaign. A `Value::String` frame is sent as raw
/// text. The handle resolves to every frame the client sent.
pub struct ResultsServer {
    pub url: Url,
    pub handle: JoinHandle<Vec<Value>>,
}

pub async fn start_results_server(
    test_name: &str,
    frames: Vec<Value>,
    hangup: Hangup,
) -> Option<ResultsServer> {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("skipping {test_name} - unable to bind websocket listener: {e}");
            return None;
        }
    };
    let addr = listener.local_addr().ok()?;
    let url = Url::parse(&format!("ws://{addr}{RESULTS_PATH}")).ok()?;

    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        let Ok((stream, _)) = listener.accept().await else {
            return received;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return received;
        };

        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let value: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                let selected = value["type"] == "select_campaign";
                received.push(value);
                if selected {
                    break;
                }
            }
        }

        for frame in frames {
            let text = match frame {
                Value::String(raw) => raw,
                other => other.to_string(),
            };
            if ws.send(Message::Text(text.into())).await.is_err() {
                return received;
            }
        }

        if hangup == Hangup::WaitForClient {
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Close(_) = message {
                    break;
                }
            }
        }
        received
    });

    Some(ResultsServer { url, handle })
}
