use chrono::NaiveDate;
use kestrel::campaign::{apply, export, filter_rows, Campaign, CampaignStatus, StreamingMessage};
use kestrel::targets::SelectedTargets;
use std::collections::HashMap;

fn wire(frames: &[&str]) -> Vec<StreamingMessage> {
    frames
        .iter()
        .map(|frame| StreamingMessage::from_json(frame).unwrap())
        .collect()
}

fn fold(messages: &[StreamingMessage]) -> Campaign {
    let campaign = Campaign::new(7, "select name, pid from processes", SelectedTargets::new(vec![1, 2], vec![]));
    messages.iter().fold(campaign, apply)
}

#[test]
fn test_websocket_frames_fold_into_campaign() {
    let messages = wire(&[
        r#"{"type": "totals", "data": {"count": 2, "online": 2, "missing_in_action": 0}}"#,
        r#"{"type": "result", "data": {"host": {"hostname": "web-1"}, "rows": [{"name": "sshd", "pid": "1"}]}}"#,
        r#"{"type": "result", "data": {"host": {"hostname": "web-2"}, "rows": [], "error": "no such table"}}"#,
        r#"{"type": "status", "data": {"status": "finished"}}"#,
    ]);

    let campaign = fold(&messages);

    assert_eq!(campaign.status, CampaignStatus::Finished);
    assert_eq!(campaign.hosts_count.total, 2);
    assert_eq!(campaign.hosts_count.successful, 1);
    assert_eq!(campaign.hosts_count.failed, 1);
    assert_eq!(campaign.errors, vec!["no such table".to_string()]);
    assert_eq!(campaign.row_count(), 1);
    assert_eq!(campaign.query_results[0].hostname(), Some("web-1"));
}

#[test]
fn test_repeated_batch_is_applied_once() {
    let batch = r#"{"data": {"hosts_count": {"total": 3, "successful": 1, "failed": 0},
                             "query_results": [{"host_hostname": "db-1", "uid": "0"}]}}"#;
    let messages = wire(&[batch, batch]);

    let campaign = fold(&messages);
    assert_eq!(campaign.row_count(), 1);
    assert_eq!(campaign.hosts_count.total, 3);
    assert_eq!(campaign.status, CampaignStatus::Running);
}

#[test]
fn test_messages_after_finish_change_nothing() {
    let messages = wire(&[
        r#"{"data": {"hosts_count": {"total": 1, "successful": 1, "failed": 0}, "query_results": [{"host_hostname": "a"}]}}"#,
        r#"{"status": "finished"}"#,
        r#"{"data": {"hosts_count": {"total": 9, "successful": 9, "failed": 0}, "query_results": [{"host_hostname": "b"}]}}"#,
    ]);

    let campaign = fold(&messages);
    assert_eq!(campaign.row_count(), 1);
    assert_eq!(campaign.hosts_count.total, 1);
}

#[test]
fn test_folded_campaign_exports_and_filters() {
    let messages = wire(&[
        r#"{"type": "result", "data": {"host": {"hostname": "web-1"}, "rows": [{"name": "sshd", "pid": "1"}, {"name": "cron", "pid": "12"}]}}"#,
        r#"{"type": "result", "data": {"host": {"display_text": "web-2"}, "rows": [{"name": "sshd", "pid": "40"}]}}"#,
    ]);
    let campaign = fold(&messages);

    let timestamp = NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(15, 4, 5)
        .unwrap();
    let file = export(&campaign, "Processes", timestamp).unwrap();

    assert_eq!(file.filename, "Processes (03-09-24 03-04-05).csv");
    assert_eq!(
        file.contents,
        "host_hostname,name,pid\nweb-1,sshd,1\nweb-1,cron,12\nweb-2,sshd,40\n"
    );

    let filters = HashMap::from([("name".to_string(), "SSH".to_string())]);
    let hosts: Vec<_> = filter_rows(&campaign.query_results, &filters)
        .into_iter()
        .filter_map(|row| row.hostname())
        .collect();
    assert_eq!(hosts, vec!["web-1", "web-2"]);
}
