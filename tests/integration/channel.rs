use crate::{start_results_server, Hangup};
use kestrel::campaign::{CampaignStatus, StreamingMessage, TargetTotals};
use kestrel::channel::{ChannelConnector, ChannelEvent, StreamingChannel, WebSocketConnector};
use serde_json::json;
use std::time::Duration;
use url::Url;

#[tokio::test]
async fn test_connector_authenticates_and_selects_campaign() {
    let frames = vec![
        json!({"type": "totals", "data": {"count": 3, "online": 2, "missing_in_action": 1}}),
        json!({"type": "result", "data": {"host": {"hostname": "web-1"}, "rows": [{"uid": "0"}]}}),
    ];
    let server = match start_results_server(
        "test_connector_authenticates_and_selects_campaign",
        frames,
        Hangup::WaitForClient,
    )
    .await
    {
        Some(server) => server,
        None => return,
    };

    let connector = WebSocketConnector::new(server.url.clone(), Some("test_token".to_string()));
    let mut channel = connector.open(5).await.unwrap();

    match channel.recv().await {
        Some(ChannelEvent::Message(StreamingMessage::Totals(totals))) => {
            assert_eq!(
                totals,
                TargetTotals {
                    count: 3,
                    online: 2,
                    missing_in_action: 1
                }
            );
        }
        other => panic!("expected totals, got {other:?}"),
    }
    match channel.recv().await {
        Some(ChannelEvent::Message(StreamingMessage::HostResult { hostname, rows, .. })) => {
            assert_eq!(hostname, "web-1");
            assert_eq!(rows.len(), 1);
        }
        other => panic!("expected a host result, got {other:?}"),
    }

    channel.close();
    assert!(channel.is_closed());
    assert!(channel.recv().await.is_none());

    let received = server.handle.await.unwrap();
    assert_eq!(
        received,
        vec![
            json!({"type": "auth", "data": {"token": "test_token"}}),
            json!({"type": "select_campaign", "data": {"campaign_id": 5}}),
        ]
    );
}

#[tokio::test]
async fn test_server_hangup_fails_the_channel() {
    let frames = vec![json!({"type": "status", "data": "running"})];
    let server = match start_results_server(
        "test_server_hangup_fails_the_channel",
        frames,
        Hangup::Abrupt,
    )
    .await
    {
        Some(server) => server,
        None => return,
    };

    let connector = WebSocketConnector::new(server.url.clone(), None);
    let mut channel = connector.open(8).await.unwrap();

    assert!(matches!(
        channel.recv().await,
        Some(ChannelEvent::Message(StreamingMessage::Status(_)))
    ));
    assert!(matches!(channel.recv().await, Some(ChannelEvent::Failed(_))));

    let received = server.handle.await.unwrap();
    assert_eq!(
        received,
        vec![json!({"type": "select_campaign", "data": {"campaign_id": 8}})]
    );
}

#[tokio::test]
async fn test_unknown_frame_type_is_skipped() {
    let frames = vec![
        json!({"type": "result", "data": {"host": {"hostname": "a"}, "rows": [{"uid": "0"}]}}),
        json!({"type": "heartbeat"}),
        json!({"type": "hologram", "data": {}}),
        json!({"type": "result", "data": {"host": {"hostname": "b"}, "rows": [{"uid": "1"}]}}),
        json!({"type": "status", "data": {"status": "finished"}}),
    ];
    let server = match start_results_server(
        "test_unknown_frame_type_is_skipped",
        frames,
        Hangup::WaitForClient,
    )
    .await
    {
        Some(server) => server,
        None => return,
    };

    let connector = WebSocketConnector::new(server.url.clone(), None);
    let mut channel = connector.open(1).await.unwrap();

    let mut hosts = Vec::new();
    loop {
        match channel.recv().await {
            Some(ChannelEvent::Message(StreamingMessage::HostResult { hostname, .. })) => {
                hosts.push(hostname)
            }
            Some(ChannelEvent::Message(StreamingMessage::Status(status))) => {
                assert_eq!(status, CampaignStatus::Finished);
                break;
            }
            other => panic!("expected results then finished, got {other:?}"),
        }
    }
    assert_eq!(hosts, vec!["a", "b"]);

    channel.close();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn test_non_json_frame_fails_the_channel() {
    let frames = vec![json!("<html>502 Bad Gateway</html>")];
    let server = match start_results_server(
        "test_non_json_frame_fails_the_channel",
        frames,
        Hangup::WaitForClient,
    )
    .await
    {
        Some(server) => server,
        None => return,
    };

    let connector = WebSocketConnector::new(server.url.clone(), None);
    let mut channel = connector.open(1).await.unwrap();

    match channel.recv().await {
        Some(ChannelEvent::Failed(reason)) => assert!(reason.contains("Data serialization")),
        other => panic!("expected failure, got {other:?}"),
    }
    channel.close();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_is_a_retryable_error() {
    let url = Url::parse("ws://127.0.0.1:1/api/v1/kolide/results/websocket").unwrap();
    let connector = WebSocketConnector::new(url, None).with_connect_timeout(Duration::from_secs(2));

    let error = match connector.open(1).await {
        Ok(_) => panic!("connect to a closed port should fail"),
        Err(error) => error,
    };
    assert_eq!(error.category(), "channel");
    assert!(error.is_retryable());
}
