//! Rendering backend contract.
//!
//! The pipeline never talks to a browser directly. A [`RenderBackend`] launches
//! [`Surface`]s; a surface loads a page, answers visibility and geometry queries
//! and captures element screenshots. `dgm-webdriver` provides the production
//! implementation.

use crate::renderer::RenderFidelity;

/// Semantic error categories reported by backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendErrorKind {
    /// Backend could not be started or reached.
    Unavailable,
    /// Backend lost the session (process died, session id invalidated).
    ///
    /// The surface must not be reused after this error.
    Crashed,
    /// A single call exceeded its time bound.
    Timeout,
    /// Backend rejected a request (bad selector, script error, ...).
    Protocol,
    /// Other/unknown error category.
    Other,
}

/// Error returned by a rendering backend.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    /// Create an error of the given kind.
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Backend could not be started or reached.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unavailable, message)
    }

    /// Backend lost the session.
    pub fn crashed(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Crashed, message)
    }

    /// Backend rejected a request.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Protocol, message)
    }

    /// Whether the surface that produced this error is unusable.
    #[must_use]
    pub fn is_fatal_for_surface(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::Crashed | BackendErrorKind::Unavailable
        )
    }
}

/// Rectangle of a rendered element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Factory for rendering surfaces.
///
/// Implementations must be shareable across worker threads; each launched
/// surface is owned by exactly one render slot.
pub trait RenderBackend: Send + Sync {
    /// Start a surface rendering at the given fidelity.
    ///
    /// May block while the backend initializes.
    fn launch(&self, fidelity: &RenderFidelity) -> Result<Box<dyn Surface>, BackendError>;
}

/// One live rendering surface (a browser tab, a WebDriver session, ...).
pub trait Surface: Send {
    /// Navigate to `url` and return once the document has loaded.
    fn load(&mut self, url: &str) -> Result<(), BackendError>;

    /// Whether an element matching `selector` exists and is displayed.
    fn is_visible(&mut self, selector: &str) -> Result<bool, BackendError>;

    /// Bounding box of the first element matching `selector`, if present.
    fn bounding_box(&mut self, selector: &str) -> Result<Option<BoundingBox>, BackendError>;

    /// Resize the viewport, in CSS pixels.
    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), BackendError>;

    /// Capture a PNG of the first element matching `selector`.
    fn capture(&mut self, selector: &str) -> Result<Vec<u8>, BackendError>;

    /// Tear the surface down, releasing its OS-level resources.
    fn close(self: Box<Self>) -> Result<(), BackendError>;
}
