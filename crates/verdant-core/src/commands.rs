//! Message-style command surface shared by every front end.
//!
//! Requests are JSON objects tagged by `action`; responses always carry
//! `success` plus an optional `data`, `message` or `error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::FocusEngine;
use crate::error::Result;
use crate::focus::{ActivityEvent, ActivityKind, FocusMetrics};
use crate::forest::ForestState;
use crate::session::Session;

/// Actions understood by [`dispatch_json`].
pub const ACTIONS: &[&str] = &[
    "startSession",
    "endSession",
    "getSessionData",
    "getForestData",
    "getFocusMetrics",
    "userActivity",
    "tabChanged",
    "windowFocusChanged",
    "visibilityChanged",
    "triggerFocusAnalysis",
    "testApi",
    "testAPI",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    StartSession,
    EndSession,
    GetSessionData,
    GetForestData,
    GetFocusMetrics,
    #[serde(rename_all = "camelCase")]
    UserActivity {
        event_type: ActivityKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    TabChanged { tab_id: i64, url: String },
    WindowFocusChanged { focused: bool },
    VisibilityChanged { visible: bool },
    TriggerFocusAnalysis,
    #[serde(alias = "testAPI")]
    TestApi,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Run one command. Only unexpected failures (store I/O, exhausted retries)
/// come back as `success: false`.
pub async fn dispatch(engine: &FocusEngine, command: Command, now: DateTime<Utc>) -> CommandResponse {
    match execute(engine, command, now).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "command failed");
            CommandResponse::failure(e.to_string())
        }
    }
}

/// Decode and run a raw JSON request.
pub async fn dispatch_json(engine: &FocusEngine, request: &str, now: DateTime<Utc>) -> CommandResponse {
    let value: Value = match serde_json::from_str(request) {
        Ok(value) => value,
        Err(e) => return CommandResponse::failure(format!("Invalid request: {e}")),
    };
    let action = value
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !ACTIONS.contains(&action.as_str()) {
        debug!(action = %action, "unknown action");
        return CommandResponse::failure("Unknown action");
    }
    match serde_json::from_value::<Command>(value) {
        Ok(command) => dispatch(engine, command, now).await,
        Err(e) => CommandResponse::failure(format!("Invalid {action} request: {e}")),
    }
}

async fn execute(engine: &FocusEngine, command: Command, now: DateTime<Utc>) -> Result<CommandResponse> {
    let events = match command {
        Command::StartSession => {
            let events = engine.start_session(now)?;
            let session: Session = engine.store().get()?;
            log_events(&events);
            return Ok(CommandResponse::with_data(
                serde_json::json!({ "sessionId": session.session_id }),
            ));
        }
        Command::EndSession => engine.end_session(now)?,
        Command::GetSessionData => return data_of::<Session>(engine),
        Command::GetForestData => return data_of::<ForestState>(engine),
        Command::GetFocusMetrics => return data_of::<FocusMetrics>(engine),
        Command::UserActivity { event_type, data } => {
            let event = ActivityEvent {
                data,
                ..ActivityEvent::new(event_type, now)
            };
            engine.handle_activity(&event)?
        }
        Command::TabChanged { tab_id, url } => engine.handle_tab_change(tab_id, &url, now)?,
        Command::WindowFocusChanged { focused } => engine.handle_window_focus(focused, now)?,
        Command::VisibilityChanged { visible } => {
            engine.handle_visibility(visible)?;
            Vec::new()
        }
        Command::TriggerFocusAnalysis => {
            let events = engine.focus_tick(now).await?;
            log_events(&events);
            return Ok(CommandResponse::with_message("Analysis completed"));
        }
        Command::TestApi => {
            let check = engine.test_api().await?;
            return Ok(if check.ok {
                CommandResponse {
                    data: check.reply.map(Value::String),
                    ..CommandResponse::with_message(check.message)
                }
            } else {
                CommandResponse::failure(check.message)
            });
        }
    };
    log_events(&events);
    Ok(CommandResponse::ok())
}

fn data_of<D: crate::storage::Document>(engine: &FocusEngine) -> Result<CommandResponse> {
    let doc: D = engine.store().get()?;
    Ok(CommandResponse::with_data(serde_json::to_value(&doc)?))
}

fn log_events(events: &[crate::events::Event]) {
    for event in events {
        debug!(?event, "command event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_requests() {
        let cmd: Command =
            serde_json::from_str(r#"{"action":"tabChanged","tabId":3,"url":"https://a.dev"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::TabChanged {
                tab_id: 3,
                url: "https://a.dev".into()
            }
        );

        let cmd: Command =
            serde_json::from_str(r#"{"action":"userActivity","eventType":"scroll"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::UserActivity {
                event_type: ActivityKind::Scroll,
                data: None
            }
        );

        let cmd: Command = serde_json::from_str(r#"{"action":"testAPI"}"#).unwrap();
        assert_eq!(cmd, Command::TestApi);
    }

    #[test]
    fn response_omits_empty_fields() {
        let json = serde_json::to_string(&CommandResponse::failure("Unknown action")).unwrap();
        assert_eq!(json, r#"{"success":false,"error":"Unknown action"}"#);
        let json = serde_json::to_string(&CommandResponse::ok()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }

    #[tokio::test]
    async fn payload_errors_name_the_action() {
        let engine = FocusEngine::new(
            crate::storage::SharedStateStore::in_memory(),
            crate::storage::Config::default(),
        )
        .unwrap();
        let response =
            dispatch_json(&engine, r#"{"action":"userActivity","eventType":"blink"}"#, Utc::now()).await;
        assert!(!response.success);
        let error = response.error.unwrap();
        assert!(error.starts_with("Invalid userActivity request"), "{error}");
    }
}
