use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use teloxide::Bot;

use duty_core::domain::NewIncident;
use duty_core::repo;

use crate::publish::publish_incident;
use crate::state::{blocking, BotState};

/// Inbound alert body, field names bit-exact with what the monitoring side
/// sends: `{incident_id, event, node, trigger, severity, details}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AlertPayload {
    #[serde(default)]
    pub incident_id: Option<i64>,
    pub event: String,
    pub node: String,
    pub trigger: String,
    pub severity: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl AlertPayload {
    pub fn into_new_incident(self) -> NewIncident {
        NewIncident {
            event_id: self.incident_id.map(|id| id.to_string()),
            event: self.event,
            node: self.node,
            trigger: self.trigger,
            severity: self.severity,
            details: self.details,
        }
    }
}

#[derive(Clone)]
pub struct WebhookContext {
    pub bot: Bot,
    pub state: BotState,
}

pub fn router(ctx: WebhookContext) -> Router {
    Router::new()
        .route("/alert", post(receive_alert))
        .with_state(ctx)
}

async fn receive_alert(
    State(ctx): State<WebhookContext>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let alert: AlertPayload = match serde_json::from_value(payload) {
        Ok(alert) => alert,
        Err(error) => {
            tracing::warn!(error = %error, "rejected malformed alert payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "message": error.to_string() })),
            );
        }
    };

    tracing::info!(
        event_id = alert.incident_id.unwrap_or_default(),
        node = %alert.node,
        "received alert"
    );

    let event_id = alert.incident_id.map(|id| id.to_string());
    match publish_incident(&ctx.bot, &ctx.state, alert.into_new_incident()).await {
        Ok(incident) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "ok", "incident_id": incident.id })),
        ),
        Err(err) if err.code == "INCIDENT_DUPLICATE_EVENT" => {
            let existing = match event_id {
                Some(event_id) => {
                    let state = ctx.state.clone();
                    blocking(move || {
                        let conn = state.open_db()?;
                        repo::find_by_event_id(&conn, &event_id)
                    })
                    .await
                    .ok()
                    .flatten()
                    .map(|incident| incident.id)
                }
                None => None,
            };
            tracing::warn!(code = %err.code, existing = ?existing, "duplicate alert ignored");
            (
                StatusCode::CONFLICT,
                Json(json!({ "status": "duplicate", "incident_id": existing })),
            )
        }
        Err(err) => {
            tracing::error!(code = %err.code, details = err.details.as_deref().unwrap_or(""), "failed to process alert");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "code": err.code })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn canonical_payload_parses() {
        let raw = r#"{
            "incident_id": 77001,
            "event": "PROBLEM: High CPU",
            "node": "db-01",
            "trigger": "CPU load > 90%",
            "severity": "High",
            "details": "load average 14.2"
        }"#;
        let alert: AlertPayload = serde_json::from_str(raw).expect("parse");
        let new = alert.into_new_incident();
        assert_eq!(new.event_id.as_deref(), Some("77001"));
        assert_eq!(new.node, "db-01");
        assert_eq!(new.details.as_deref(), Some("load average 14.2"));
    }

    #[test]
    fn incident_id_and_details_are_optional() {
        let raw = r#"{
            "event": "PROBLEM: Link down",
            "node": "sw-07",
            "trigger": "Interface eth3 down",
            "severity": "Average"
        }"#;
        let alert: AlertPayload = serde_json::from_str(raw).expect("parse");
        assert_eq!(alert.incident_id, None);
        assert_eq!(alert.details, None);
    }

    #[test]
    fn junk_payload_is_rejected() {
        let raw = r#"{"event": "PROBLEM", "node": "sw-07"}"#;
        assert!(serde_json::from_str::<AlertPayload>(raw).is_err());
    }
}
