use crate::{start_mock_server, Matcher};
use kestrel::api::{ApiClient, CONFLICT_MESSAGE};
use kestrel::campaign::CampaignStatus;
use kestrel::config::ServerConfig;
use kestrel::error::KestrelError;
use kestrel::targets::{SelectedTargets, Target};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

fn client_for(url: String) -> ApiClient {
    ApiClient::new(&ServerConfig {
        url,
        token: Some("test_token".to_string()),
        request_timeout_seconds: 5,
        ..ServerConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_create_campaign_posts_query_and_selection() {
    let mut server = match start_mock_server("test_create_campaign_posts_query_and_selection").await {
        Some(server) => server,
        None => return,
    };

    let run_mock = server
        .mock("POST", "/api/v1/kolide/queries/run")
        .match_header("authorization", "Bearer test_token")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "query": "select * from users",
            "selected": {"hosts": [1, 2], "labels": [6]}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"campaign": {"id": 42, "query_id": 9, "status": 0, "user_id": 1}}).to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = client_for(server.url());
    let selected = SelectedTargets::new(vec![1, 2], vec![6]);
    let campaign = client
        .create_campaign("select * from users", &selected)
        .await
        .unwrap();

    assert_eq!(campaign.id, 42);
    assert_eq!(campaign.status, CampaignStatus::Running);
    assert_eq!(campaign.selected, selected);
    assert_eq!(campaign.query, "select * from users");
    assert!(campaign.query_results.is_empty());
    run_mock.assert_async().await;
}

#[tokio::test]
async fn test_create_campaign_conflict() {
    let mut server = match start_mock_server("test_create_campaign_conflict").await {
        Some(server) => server,
        None => return,
    };

    let _mock = server
        .mock("POST", "/api/v1/kolide/queries/run")
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "message": "Validation Failed",
                "errors": [{"name": "base", "reason": "resource already created"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(server.url());
    let error = client
        .create_campaign("select 1", &SelectedTargets::new(vec![1], vec![]))
        .await
        .unwrap_err();

    match error {
        KestrelError::Conflict { message } => assert_eq!(message, CONFLICT_MESSAGE),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_campaign_backend_errors() {
    let mut server = match start_mock_server("test_create_campaign_backend_errors").await {
        Some(server) => server,
        None => return,
    };

    let unauthorized = server
        .mock("POST", "/api/v1/kolide/queries/run")
        .match_body(Matcher::PartialJson(json!({"query": "select 1"})))
        .with_status(401)
        .with_body(json!({"message": "Authentication required"}).to_string())
        .create_async()
        .await;

    let client = client_for(server.url());
    let selected = SelectedTargets::new(vec![1], vec![]);

    let error = client.create_campaign("select 1", &selected).await.unwrap_err();
    assert_eq!(error.category(), "security");
    assert!(error.to_string().contains("Authentication required"));
    unauthorized.assert_async().await;

    let _failure = server
        .mock("POST", "/api/v1/kolide/queries/run")
        .match_body(Matcher::PartialJson(json!({"query": "select 2"})))
        .with_status(500)
        .with_body(json!({"errors": [{"name": "base", "reason": "datastore offline"}]}).to_string())
        .create_async()
        .await;

    let error = client.create_campaign("select 2", &selected).await.unwrap_err();
    assert_eq!(error.to_string(), "Backend returned 500: datastore offline");
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_search_targets() {
    let mut server = match start_mock_server("test_search_targets").await {
        Some(server) => server,
        None => return,
    };

    let targets_mock = server
        .mock("POST", "/api/v1/kolide/targets")
        .match_header("authorization", "Bearer test_token")
        .match_body(Matcher::PartialJson(json!({"query": "web"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "targets": {
                    "hosts": [{"id": 1, "hostname": "web-1", "status": "online"}],
                    "labels": [{"id": 6, "name": "All Hosts", "display_text": "All Hosts", "count": 2}]
                },
                "targets_count": 2,
                "targets_online": 1,
                "targets_missing_in_action": 1
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = client_for(server.url());
    let search = client
        .search_targets("web", &SelectedTargets::default())
        .await
        .unwrap();

    assert_eq!(search.hosts, vec![Target::host(1, "web-1")]);
    assert_eq!(search.labels, vec![Target::label(6, "All Hosts")]);
    assert_eq!(search.targets_count, 2);
    assert_eq!(search.targets_online, 1);
    assert_eq!(search.targets_missing_in_action, 1);
    assert_eq!(search.all().count(), 2);
    targets_mock.assert_async().await;
}

#[tokio::test]
async fn test_request_timeout_reports_configured_limit() {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("skipping test_request_timeout_reports_configured_limit - unable to bind: {e}");
            return;
        }
    };
    let addr = listener.local_addr().unwrap();
    // Accept and read the request, but never answer.
    let silent = tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        }
    });

    let client = ApiClient::new(&ServerConfig {
        url: format!("http://{addr}"),
        request_timeout_seconds: 1,
        ..ServerConfig::default()
    })
    .unwrap();

    let error = client
        .create_campaign("select 1", &SelectedTargets::new(vec![1], vec![]))
        .await
        .unwrap_err();

    match &error {
        KestrelError::Timeout {
            operation,
            duration_ms,
        } => {
            assert_eq!(operation, "HTTP request");
            assert_eq!(*duration_ms, Some(1000));
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(error.to_string(), "Timeout occurred: HTTP request after 1000ms");
    assert!(error.is_retryable());
    silent.abort();
}
