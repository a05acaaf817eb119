//! W3C WebDriver wire client.
//!
//! Every command is a JSON request answered by `{"value": ...}`. Failed
//! commands carry `{"value": {"error": <code>, "message": ...}}` and a 4xx/5xx
//! status.

use std::time::Duration;

use dgm_pipeline::{BackendError, BackendErrorKind};
use serde_json::Value;
use ureq::Agent;

/// Error code for a selector that matched nothing.
pub(crate) const NO_SUCH_ELEMENT: &str = "no such element";

/// Error code for an element removed from the document after lookup.
pub(crate) const STALE_ELEMENT: &str = "stale element reference";

/// Failed WebDriver call.
#[derive(Debug)]
pub(crate) enum CallError {
    /// The server answered with a WebDriver error.
    Wire {
        status: u16,
        code: String,
        message: String,
    },
    /// The request never got a WebDriver answer.
    Transport(BackendError),
}

impl CallError {
    /// Whether this is the given WebDriver error code.
    pub(crate) fn is(&self, expected: &str) -> bool {
        matches!(self, Self::Wire { code, .. } if code == expected)
    }
}

impl From<CallError> for BackendError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Wire {
                status,
                code,
                message,
            } => BackendError::new(
                classify(&code, &message),
                format!("WebDriver error {status} ({code}): {message}"),
            ),
            CallError::Transport(e) => e,
        }
    }
}

/// Map a WebDriver error code to a backend error kind.
fn classify(code: &str, message: &str) -> BackendErrorKind {
    match code {
        "invalid session id" => BackendErrorKind::Crashed,
        "session not created" => BackendErrorKind::Unavailable,
        "timeout" | "script timeout" => BackendErrorKind::Timeout,
        "unknown error"
            if message.contains("not reachable") || message.contains("disconnected") =>
        {
            BackendErrorKind::Crashed
        }
        "unknown error" => BackendErrorKind::Other,
        _ => BackendErrorKind::Protocol,
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Delete,
}

/// Blocking WebDriver HTTP client.
pub(crate) struct WireClient {
    agent: Agent,
    base_url: String,
}

impl WireClient {
    /// Create a client for the server at `base_url`.
    pub(crate) fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Server base URL.
    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn get(&self, path: &str) -> Result<Value, CallError> {
        self.command(Method::Get, path, None)
    }

    pub(crate) fn post(&self, path: &str, body: &Value) -> Result<Value, CallError> {
        self.command(Method::Post, path, Some(body))
    }

    pub(crate) fn delete(&self, path: &str) -> Result<Value, CallError> {
        self.command(Method::Delete, path, None)
    }

    /// Whether the server reports it can create sessions.
    pub(crate) fn is_ready(&self) -> bool {
        self.get("/status")
            .is_ok_and(|value| value.get("ready").and_then(Value::as_bool) == Some(true))
    }

    fn command(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, CallError> {
        let url = format!("{}{path}", self.base_url);
        tracing::trace!(?method, %url, "WebDriver command");

        let response = match method {
            Method::Get => self.agent.get(&url).call(),
            Method::Delete => self.agent.delete(&url).call(),
            Method::Post => {
                let payload = serde_json::to_vec(body.unwrap_or(&Value::Object(serde_json::Map::new())))
                    .map_err(|e| CallError::Transport(BackendError::protocol(e.to_string())))?;
                self.agent
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .send(&payload[..])
            }
        }
        .map_err(|e| CallError::Transport(transport_error(&url, &e)))?;

        let status = response.status().as_u16();
        let payload: Value = response.into_body().read_json().map_err(|e| {
            CallError::Transport(BackendError::protocol(format!(
                "invalid WebDriver response from {url}: {e}"
            )))
        })?;
        let value = unwrap_value(payload);

        if status >= 400 {
            return Err(wire_error(status, &value));
        }
        Ok(value)
    }
}

fn transport_error(url: &str, e: &ureq::Error) -> BackendError {
    let kind = match e {
        ureq::Error::Timeout(_) => BackendErrorKind::Timeout,
        _ => BackendErrorKind::Unavailable,
    };
    BackendError::new(kind, format!("WebDriver request to {url} failed: {e}"))
}

/// Take the `value` member of a WebDriver response.
fn unwrap_value(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
        other => other,
    }
}

fn wire_error(status: u16, value: &Value) -> CallError {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let code = field("error");
    CallError::Wire {
        status,
        code: if code.is_empty() {
            "unknown error".to_owned()
        } else {
            code
        },
        message: field("message"),
    }
}
