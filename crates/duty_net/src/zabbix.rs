use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use duty_core::error::AppError;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// `event.acknowledge` action flag: close the problem.
const ACK_ACTION_CLOSE: i64 = 1;

/// Blocking JSON-RPC client for the monitoring server.
///
/// Logs in on every acknowledge; the bot resolves a handful of incidents per
/// day, so session reuse is not worth the token bookkeeping.
#[derive(Debug, Clone)]
pub struct ZabbixClient {
    api_url: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    pub(crate) result: Option<serde_json::Value>,
    pub(crate) error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcError {
    pub(crate) code: i64,
    pub(crate) message: String,
    pub(crate) data: Option<String>,
}

pub(crate) fn rpc_body(
    method: &str,
    params: serde_json::Value,
    auth: Option<&str>,
    id: u32,
) -> serde_json::Value {
    let mut body = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": id,
    });
    if let Some(token) = auth {
        body["auth"] = json!(token);
    }
    body
}

impl ZabbixClient {
    pub fn new(
        api_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        auth: Option<&str>,
        id: u32,
    ) -> Result<serde_json::Value, AppError> {
        let body = rpc_body(method, params, auth, id);

        let resp = ureq::post(&self.api_url)
            .timeout(RPC_TIMEOUT)
            .send_json(body)
            .map_err(|e| {
                AppError::wrap("ZBX_UNREACHABLE", "Failed to reach the Zabbix API", e)
                    .with_retryable(true)
            })?;

        let rpc: RpcResponse = resp.into_json().map_err(|e| {
            AppError::wrap("ZBX_BAD_RESPONSE", "Zabbix returned malformed JSON", e)
        })?;

        if let Some(err) = rpc.error {
            return Err(AppError::new("ZBX_RPC_ERROR", "Zabbix rejected the request")
                .with_details(format!(
                    "method={method}; code={}; message={}; data={}",
                    err.code,
                    err.message,
                    err.data.unwrap_or_default()
                )));
        }

        rpc.result.ok_or_else(|| {
            AppError::new("ZBX_BAD_RESPONSE", "Zabbix response carried no result")
                .with_details(format!("method={method}"))
        })
    }

    pub fn login(&self) -> Result<String, AppError> {
        let result = self.call(
            "user.login",
            json!({ "user": self.username, "password": self.password }),
            None,
            1,
        )?;

        result
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| AppError::new("ZBX_AUTH_FAILED", "Login returned no auth token"))
    }

    /// Acknowledge and close the upstream event after an operator resolved
    /// the incident in chat.
    pub fn acknowledge_event(&self, event_id: &str, comment: &str) -> Result<(), AppError> {
        let token = self.login()?;

        self.call(
            "event.acknowledge",
            json!({
                "eventids": event_id,
                "message": format!("Resolved via Telegram: {comment}"),
                "action": ACK_ACTION_CLOSE,
            }),
            Some(&token),
            2,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_body_includes_auth_only_when_present() {
        let anonymous = rpc_body("user.login", json!({"user": "svc"}), None, 1);
        assert!(anonymous.get("auth").is_none());
        assert_eq!(anonymous["method"], "user.login");

        let authed = rpc_body("event.acknowledge", json!({}), Some("tok123"), 2);
        assert_eq!(authed["auth"], "tok123");
        assert_eq!(authed["id"], 2);
    }

    #[test]
    fn rpc_error_payload_deserializes() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "error": {"code": -32602, "message": "Invalid params.", "data": "Session terminated."},
            "id": 2
        }"#;
        let resp: RpcResponse = serde_json::from_str(raw).expect("parse");
        assert!(resp.result.is_none());
        let err = resp.error.expect("error present");
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Invalid params.");
    }

    #[test]
    fn rpc_result_payload_deserializes() {
        let raw = r#"{"jsonrpc": "2.0", "result": "0424bd59b807674191e7d77572075f33", "id": 1}"#;
        let resp: RpcResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(
            resp.result.and_then(|v| v.as_str().map(ToString::to_string)),
            Some("0424bd59b807674191e7d77572075f33".to_string())
        );
    }
}
