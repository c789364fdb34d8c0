use crate::{start_mock_server, start_results_server, Hangup, Matcher};
use chrono::NaiveDate;
use kestrel::api::ApiClient;
use kestrel::campaign::CampaignStatus;
use kestrel::channel::WebSocketConnector;
use kestrel::config::ServerConfig;
use kestrel::controller::{Completion, QueryRunController, RunPhase};
use kestrel::targets::{Target, TargetSelector};
use serde_json::json;
use tempfile::tempdir;

const QUERY: &str = "select username, shell from users";

fn host_rows(hostname: &str, users: &[&str]) -> serde_json::Value {
    let rows: Vec<_> = users
        .iter()
        .map(|user| json!({"username": user, "shell": "/bin/zsh"}))
        .collect();
    json!({"type": "result", "data": {"host": {"hostname": hostname}, "rows": rows}})
}

#[tokio::test]
async fn test_query_run_streams_to_completion_and_exports() {
    let mut server = match start_mock_server("test_query_run_streams_to_completion_and_exports").await {
        Some(server) => server,
        None => return,
    };
    let run_mock = server
        .mock("POST", "/api/v1/kolide/queries/run")
        .match_body(Matcher::PartialJson(json!({
            "query": QUERY,
            "selected": {"hosts": [1, 2], "labels": []}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"campaign": {"id": 42, "status": 0}}).to_string())
        .expect(1)
        .create_async()
        .await;

    let frames = vec![
        json!({"type": "totals", "data": {"count": 2, "online": 2, "missing_in_action": 0}}),
        host_rows("web-1", &["root", "alice"]),
        json!({"type": "heartbeat"}),
        host_rows("web-2", &["root"]),
        host_rows("web-2", &["root"]),
        json!({"type": "status", "data": {"status": "finished"}}),
    ];
    let results = match start_results_server(
        "test_query_run_streams_to_completion_and_exports",
        frames,
        Hangup::WaitForClient,
    )
    .await
    {
        Some(results) => results,
        None => return,
    };

    let config = ServerConfig {
        url: server.url(),
        token: Some("test_token".to_string()),
        ..ServerConfig::default()
    };
    let mut controller = QueryRunController::new(
        ApiClient::new(&config).unwrap(),
        WebSocketConnector::new(results.url.clone(), config.token.clone()),
    );

    let mut selector = TargetSelector::new();
    selector.select(Target::host(1, "web-1"));
    selector.select(Target::host(2, "web-2"));

    let campaign_id = controller.start(QUERY, selector.snapshot()).await.unwrap();
    assert_eq!(campaign_id, 42);
    assert_eq!(controller.state(), RunPhase::Running);

    selector.clear();
    let completion = controller.run_to_completion().await.cloned();
    assert_eq!(completion, Some(Completion::Finished));
    assert_eq!(controller.state(), RunPhase::Idle);

    let campaign = controller.campaign().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Finished);
    assert_eq!(campaign.selected.hosts, vec![1, 2]);
    assert_eq!(campaign.hosts_count.total, 2);
    assert_eq!(campaign.hosts_count.successful, 2);
    assert_eq!(campaign.row_count(), 3);

    let timestamp = NaiveDate::from_ymd_opt(2024, 12, 31)
        .unwrap()
        .and_hms_opt(23, 59, 58)
        .unwrap();
    let file = controller.export_at("Users", timestamp).unwrap();
    assert_eq!(file.filename, "Users (12-31-24 11-59-58).csv");
    assert_eq!(
        file.contents,
        "host_hostname,username,shell\n\
         web-1,root,/bin/zsh\n\
         web-1,alice,/bin/zsh\n\
         web-2,root,/bin/zsh\n"
    );

    let dir = tempdir().unwrap();
    let path = file.save_to(dir.path().join("exports")).unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), file.contents);

    let received = results.handle.await.unwrap();
    assert_eq!(
        received.last(),
        Some(&json!({"type": "select_campaign", "data": {"campaign_id": 42}}))
    );
    run_mock.assert_async().await;
}

#[tokio::test]
async fn test_dropped_results_socket_leaves_partial_results() {
    let mut server = match start_mock_server("test_dropped_results_socket_leaves_partial_results").await {
        Some(server) => server,
        None => return,
    };
    let _run_mock = server
        .mock("POST", "/api/v1/kolide/queries/run")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"campaign": {"id": 7}}).to_string())
        .create_async()
        .await;

    let frames = vec![host_rows("db-1", &["postgres"])];
    let results = match start_results_server(
        "test_dropped_results_socket_leaves_partial_results",
        frames,
        Hangup::Abrupt,
    )
    .await
    {
        Some(results) => results,
        None => return,
    };

    let config = ServerConfig {
        url: server.url(),
        ..ServerConfig::default()
    };
    let mut controller = QueryRunController::new(
        ApiClient::new(&config).unwrap(),
        WebSocketConnector::new(results.url.clone(), None),
    );

    let mut selector = TargetSelector::new();
    selector.select(Target::label(6, "All Hosts"));
    controller.start(QUERY, selector.snapshot()).await.unwrap();

    match controller.run_to_completion().await {
        Some(Completion::Incomplete { .. }) => {}
        other => panic!("expected an incomplete run, got {other:?}"),
    }
    assert!(!controller.is_running());

    let campaign = controller.campaign().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Running);
    assert_eq!(campaign.row_count(), 1);
    assert!(controller.export("Partial").is_ok());

    results.handle.await.unwrap();
}
