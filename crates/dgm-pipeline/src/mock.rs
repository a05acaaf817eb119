//! Mock rendering backend for testing.
//!
//! Provides [`MockBackend`] for exercising sessions, the renderer and the batch
//! orchestrator without a browser. The mock reads the page it is asked to load
//! and decides how to behave from markers in the diagram source:
//!
//! - the reject marker (default `???`) makes the library "draw" its error graphic
//! - the hang marker (default `%%hang%%`) keeps the ready signal from ever appearing
//! - the crash marker (default `%%crash%%`) loses the session during load

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{BackendError, BoundingBox, RenderBackend, Surface};
use crate::consts::{CONTAINER_SELECTOR, ERROR_SELECTOR, READY_SELECTOR};
use crate::renderer::RenderFidelity;

#[derive(Debug, Default)]
struct MockState {
    launches: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    loaded: Mutex<Vec<PathBuf>>,
}

/// Mock backend for testing.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use dgm_pipeline::MockBackend;
///
/// let backend = Arc::new(MockBackend::new().reject_marker("BROKEN"));
/// ```
#[derive(Debug)]
pub struct MockBackend {
    state: Arc<MockState>,
    unavailable: bool,
    reject_marker: String,
    hang_marker: String,
    crash_marker: String,
    diagram_size: (f64, f64),
    load_delay: Duration,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            unavailable: false,
            reject_marker: "???".to_owned(),
            hang_marker: "%%hang%%".to_owned(),
            crash_marker: "%%crash%%".to_owned(),
            diagram_size: (320.0, 180.0),
            load_delay: Duration::ZERO,
        }
    }
}

impl MockBackend {
    /// Create a mock backend with default markers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every launch fail as if the browser were missing.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Set the source marker that makes the diagram library reject a diagram.
    #[must_use]
    pub fn reject_marker(mut self, marker: impl Into<String>) -> Self {
        self.reject_marker = marker.into();
        self
    }

    /// Set the natural size of every rendered diagram, in CSS pixels.
    #[must_use]
    pub fn diagram_size(mut self, width: f64, height: f64) -> Self {
        self.diagram_size = (width, height);
        self
    }

    /// Make every page load take `delay` before returning.
    #[must_use]
    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Number of surfaces launched so far.
    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    /// Number of surfaces launched and not yet closed.
    pub fn live_surfaces(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live surfaces.
    pub fn peak_live_surfaces(&self) -> usize {
        self.state.peak_live.load(Ordering::SeqCst)
    }

    /// Paths of every page loaded, in load order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn loaded_pages(&self) -> Vec<PathBuf> {
        self.state.loaded.lock().unwrap().clone()
    }
}

impl RenderBackend for MockBackend {
    fn launch(&self, fidelity: &RenderFidelity) -> Result<Box<dyn Surface>, BackendError> {
        if self.unavailable {
            return Err(BackendError::unavailable("mock browser is not installed"));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(MockSurface {
            state: Arc::clone(&self.state),
            reject_marker: self.reject_marker.clone(),
            hang_marker: self.hang_marker.clone(),
            crash_marker: self.crash_marker.clone(),
            diagram_size: self.diagram_size,
            load_delay: self.load_delay,
            scale_factor: fidelity.scale_factor(),
            viewport: (fidelity.width(), fidelity.height()),
            page: None,
            measurements: 0,
        }))
    }
}

struct MockSurface {
    state: Arc<MockState>,
    reject_marker: String,
    hang_marker: String,
    crash_marker: String,
    diagram_size: (f64, f64),
    load_delay: Duration,
    scale_factor: f64,
    viewport: (u32, u32),
    page: Option<String>,
    measurements: u32,
}

impl MockSurface {
    fn page(&self) -> Result<&str, BackendError> {
        self.page
            .as_deref()
            .ok_or_else(|| BackendError::protocol("no page loaded"))
    }

    fn drawn(&self) -> Result<bool, BackendError> {
        Ok(!self.page()?.contains(&self.hang_marker))
    }

    fn rejected(&self) -> Result<bool, BackendError> {
        Ok(self.page()?.contains(&self.reject_marker))
    }
}

impl Surface for MockSurface {
    fn load(&mut self, url: &str) -> Result<(), BackendError> {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        let page = std::fs::read_to_string(&path)
            .map_err(|e| BackendError::protocol(format!("cannot load {url}: {e}")))?;
        self.state.loaded.lock().unwrap().push(path);
        std::thread::sleep(self.load_delay);

        if page.contains(&self.crash_marker) {
            return Err(BackendError::crashed("mock browser crashed"));
        }
        self.page = Some(page);
        self.measurements = 0;
        Ok(())
    }

    fn is_visible(&mut self, selector: &str) -> Result<bool, BackendError> {
        match selector {
            READY_SELECTOR => self.drawn(),
            ERROR_SELECTOR => Ok(self.drawn()? && self.rejected()?),
            CONTAINER_SELECTOR => Ok(self.page.is_some()),
            _ => Ok(false),
        }
    }

    fn bounding_box(&mut self, selector: &str) -> Result<Option<BoundingBox>, BackendError> {
        if selector != READY_SELECTOR || !self.drawn()? {
            return Ok(None);
        }
        // The first measurements grow, as if the library were still laying out.
        self.measurements += 1;
        let growth = f64::from(3_u32.saturating_sub(self.measurements)) * 10.0;
        Ok(Some(BoundingBox {
            x: 20.0,
            y: 20.0,
            width: self.diagram_size.0 - growth,
            height: self.diagram_size.1 - growth,
        }))
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        self.viewport = (width, height);
        Ok(())
    }

    fn capture(&mut self, selector: &str) -> Result<Vec<u8>, BackendError> {
        if selector != CONTAINER_SELECTOR || !self.drawn()? {
            return Err(BackendError::protocol(format!("no such element: {selector}")));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scale = |v: u32| (f64::from(v) * self.scale_factor).round() as u32;
        Ok(fake_png(scale(self.viewport.0), scale(self.viewport.1)))
    }

    fn close(self: Box<Self>) -> Result<(), BackendError> {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Minimal PNG header with the given dimensions.
fn fake_png(width: u32, height: u32) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0]);
    data
}
