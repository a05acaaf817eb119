//! One WebDriver session as a rendering surface.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use dgm_pipeline::{BackendError, BoundingBox, Surface};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::client::{CallError, NO_SUCH_ELEMENT, STALE_ELEMENT, WireClient};

/// Key of a web element reference in WebDriver responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Returns the window chrome size, so the viewport can be sized exactly.
const FRAME_SCRIPT: &str =
    "return [window.outerWidth - window.innerWidth, window.outerHeight - window.innerHeight];";

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl From<Rect> for BoundingBox {
    fn from(r: Rect) -> Self {
        Self {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

/// A live browser session.
pub(crate) struct WebDriverSurface {
    client: Arc<WireClient>,
    session_id: String,
}

impl WebDriverSurface {
    /// Create a session from a `POST /session` body.
    pub(crate) fn create(client: Arc<WireClient>, body: &Value) -> Result<Self, BackendError> {
        let value = client.post("/session", body).map_err(|e| match e {
            CallError::Transport(e) => e,
            wire => BackendError::unavailable(BackendError::from(wire).message),
        })?;
        let session: NewSession = serde_json::from_value(value)
            .map_err(|e| BackendError::protocol(format!("invalid new session response: {e}")))?;

        tracing::debug!(session = %session.session_id, "Created WebDriver session");
        Ok(Self {
            client,
            session_id: session.session_id,
        })
    }

    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{suffix}", self.session_id)
    }

    /// Reference of the first element matching `selector`.
    fn find(&self, selector: &str) -> Result<Option<String>, BackendError> {
        let body = json!({ "using": "css selector", "value": selector });
        match self.client.post(&self.path("/element"), &body) {
            Ok(value) => element_ref(&value).map(Some),
            Err(e) if e.is(NO_SUCH_ELEMENT) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn execute(&self, script: &str) -> Result<Value, BackendError> {
        let body = json!({ "script": script, "args": [] });
        Ok(self.client.post(&self.path("/execute/sync"), &body)?)
    }
}

impl Surface for WebDriverSurface {
    fn load(&mut self, url: &str) -> Result<(), BackendError> {
        self.client.post(&self.path("/url"), &json!({ "url": url }))?;
        Ok(())
    }

    fn is_visible(&mut self, selector: &str) -> Result<bool, BackendError> {
        let Some(element) = self.find(selector)? else {
            return Ok(false);
        };
        match self.client.get(&self.path(&format!("/element/{element}/displayed"))) {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(e) if e.is(STALE_ELEMENT) || e.is(NO_SUCH_ELEMENT) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn bounding_box(&mut self, selector: &str) -> Result<Option<BoundingBox>, BackendError> {
        let Some(element) = self.find(selector)? else {
            return Ok(None);
        };
        match self.client.get(&self.path(&format!("/element/{element}/rect"))) {
            Ok(value) => {
                let rect: Rect = serde_json::from_value(value)
                    .map_err(|e| BackendError::protocol(format!("invalid element rect: {e}")))?;
                Ok(Some(rect.into()))
            }
            Err(e) if e.is(STALE_ELEMENT) || e.is(NO_SUCH_ELEMENT) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        let (frame_width, frame_height) = window_frame(&self.execute(FRAME_SCRIPT)?);
        let body = json!({
            "width": width.saturating_add(frame_width),
            "height": height.saturating_add(frame_height),
        });
        self.client.post(&self.path("/window/rect"), &body)?;
        Ok(())
    }

    fn capture(&mut self, selector: &str) -> Result<Vec<u8>, BackendError> {
        let element = self
            .find(selector)?
            .ok_or_else(|| BackendError::protocol(format!("no element matches {selector}")))?;
        let value = self
            .client
            .get(&self.path(&format!("/element/{element}/screenshot")))?;
        decode_screenshot(&value)
    }

    fn close(self: Box<Self>) -> Result<(), BackendError> {
        self.client.delete(&self.path(""))?;
        tracing::debug!(session = %self.session_id, "Deleted WebDriver session");
        Ok(())
    }
}

fn element_ref(value: &Value) -> Result<String, BackendError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| BackendError::protocol("element response has no reference"))
}

/// Width and height the window adds around the viewport.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn window_frame(value: &Value) -> (u32, u32) {
    let dimension = |i: usize| {
        value
            .get(i)
            .and_then(Value::as_f64)
            .map_or(0, |v| v.max(0.0).round() as u32)
    };
    (dimension(0), dimension(1))
}

fn decode_screenshot(value: &Value) -> Result<Vec<u8>, BackendError> {
    let encoded = value
        .as_str()
        .ok_or_else(|| BackendError::protocol("screenshot response is not a string"))?;
    BASE64
        .decode(encoded)
        .map_err(|e| BackendError::protocol(format!("invalid screenshot encoding: {e}")))
}
