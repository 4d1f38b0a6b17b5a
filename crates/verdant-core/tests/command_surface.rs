//! Integration tests for the message-style command surface and the
//! SQLite-backed store shared between processes.

use chrono::{Duration, Utc};
use serde_json::json;
use verdant_core::storage::{Config, Database, SharedStateStore};
use verdant_core::{dispatch, dispatch_json, Command, FocusEngine, Session, SessionPhase};

fn engine() -> FocusEngine {
    FocusEngine::new(SharedStateStore::in_memory(), Config::default()).unwrap()
}

#[tokio::test]
async fn test_unknown_action_is_structured_failure() {
    let engine = engine();
    let now = Utc::now();

    let response = dispatch_json(&engine, r#"{"action":"plantMoreTrees"}"#, now).await;
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Unknown action"));

    let response = dispatch_json(&engine, r#"{"tabId":1}"#, now).await;
    assert_eq!(response.error.as_deref(), Some("Unknown action"));

    let response = dispatch_json(&engine, "not json", now).await;
    assert!(!response.success);
    assert!(response.error.unwrap().starts_with("Invalid request"));

    let response = dispatch_json(&engine, r#"{"action":"tabChanged","tabId":1}"#, now).await;
    assert!(!response.success);
    assert!(response.error.unwrap().starts_with("Invalid tabChanged request"));
}

#[tokio::test]
async fn test_session_lifecycle_over_json() {
    let engine = engine();
    let t0 = Utc::now();

    let started = dispatch_json(&engine, r#"{"action":"startSession"}"#, t0).await;
    assert!(started.success);
    let session_id = started.data.unwrap()["sessionId"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(!session_id.is_empty());

    let tab = json!({ "action": "tabChanged", "tabId": 4, "url": "https://www.reddit.com/r/rust" });
    let response = dispatch_json(&engine, &tab.to_string(), t0 + Duration::seconds(5)).await;
    assert!(response.success);

    let activity = r#"{"action":"userActivity","eventType":"keyboard","data":{"keys":3}}"#;
    assert!(dispatch_json(&engine, activity, t0 + Duration::seconds(6)).await.success);

    let analysis = dispatch_json(
        &engine,
        r#"{"action":"triggerFocusAnalysis"}"#,
        t0 + Duration::seconds(20),
    )
    .await;
    assert!(analysis.success);
    assert_eq!(analysis.message.as_deref(), Some("Analysis completed"));

    let data = dispatch(&engine, Command::GetSessionData, t0).await.data.unwrap();
    assert_eq!(data["sessionId"], session_id.as_str());
    assert_eq!(data["active"], true);
    assert_eq!(data["distractionCount"], 1);

    let metrics = dispatch(&engine, Command::GetFocusMetrics, t0).await.data.unwrap();
    assert_eq!(metrics["activeTabId"], 4);
    assert_eq!(metrics["activeUrl"], "https://www.reddit.com/r/rust");

    let forest = dispatch(&engine, Command::GetForestData, t0).await.data.unwrap();
    assert_eq!(forest["sessionId"], session_id.as_str());
    assert!(forest["trees"].as_array().unwrap().len() >= 5);

    let ended = dispatch_json(&engine, r#"{"action":"endSession"}"#, t0 + Duration::minutes(1)).await;
    assert!(ended.success);
    let session: Session = engine.store().get().unwrap();
    assert_eq!(session.phase(), SessionPhase::Ended);
}

#[tokio::test]
async fn test_api_check_in_mock_mode() {
    let engine = engine();
    let response = dispatch_json(&engine, r#"{"action":"testAPI"}"#, Utc::now()).await;
    assert!(response.success);
    assert!(response.message.unwrap().contains("mock mode"));
}

#[tokio::test]
async fn test_processes_share_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verdant.db");
    let now = Utc::now();

    let daemon = FocusEngine::new(
        SharedStateStore::new(Database::open_at(&path).unwrap()),
        Config::default(),
    )
    .unwrap();
    daemon.start_session(now).unwrap();

    // A one-shot CLI invocation opens its own connection.
    let cli = FocusEngine::new(
        SharedStateStore::new(Database::open_at(&path).unwrap()),
        Config::default(),
    )
    .unwrap();
    let session: Session = cli.store().get().unwrap();
    assert!(session.is_running());

    cli.end_session(now + Duration::minutes(2)).unwrap();
    let seen: Session = daemon.store().get().unwrap();
    assert_eq!(seen.phase(), SessionPhase::Ended);
    assert!(daemon.wildfire_tick(now + Duration::minutes(3)).unwrap().is_empty());
}

#[tokio::test]
async fn test_window_signals_update_metrics() {
    let engine = engine();
    let now = Utc::now();
    dispatch_json(&engine, r#"{"action":"startSession"}"#, now).await;

    let response = dispatch_json(&engine, r#"{"action":"windowFocusChanged","focused":false}"#, now).await;
    assert!(response.success);
    let response = dispatch_json(&engine, r#"{"action":"visibilityChanged","visible":false}"#, now).await;
    assert!(response.success);

    let metrics = dispatch_json(&engine, r#"{"action":"getFocusMetrics"}"#, now).await;
    let data = metrics.data.unwrap();
    assert_eq!(data["windowFocused"], json!(false));
    assert_eq!(data["tabVisible"], json!(false));
}
