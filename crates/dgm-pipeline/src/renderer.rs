//! Single-diagram rendering.
//!
//! [`DiagramRenderer`] turns one [`ExtractionUnit`] into a PNG through a
//! [`RenderSession`]. It owns the scratch page for the duration of the call and
//! converts every unit-scoped failure into a failed [`RenderArtifact`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::backend::{BackendError, BackendErrorKind, BoundingBox, Surface};
use crate::consts::{
    CONTAINER_SELECTOR, DEFAULT_FIT_MARGIN, DEFAULT_LIBRARY_URL, DEFAULT_TIMEOUT, ERROR_SELECTOR,
    MAX_SETTLE_CHECKS, POLL_INTERVAL, READY_SELECTOR,
};
use crate::markup::wrap_diagram;
use crate::png::png_dimensions;
use crate::session::RenderSession;
use crate::unit::ExtractionUnit;

/// Invalid fidelity values.
#[derive(Debug, thiserror::Error)]
pub enum FidelityError {
    #[error("width and height must be greater than 0 (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    #[error("scale factor must be a finite number >= 1 (got {0})")]
    Scale(f64),
}

/// Target pixel dimensions and density for rendered images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderFidelity {
    width: u32,
    height: u32,
    scale_factor: f64,
}

impl Default for RenderFidelity {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            scale_factor: 1.0,
        }
    }
}

impl RenderFidelity {
    /// Validate and create a fidelity.
    pub fn new(width: u32, height: u32, scale_factor: f64) -> Result<Self, FidelityError> {
        if width == 0 || height == 0 {
            return Err(FidelityError::ZeroSize { width, height });
        }
        if !scale_factor.is_finite() || scale_factor < 1.0 {
            return Err(FidelityError::Scale(scale_factor));
        }
        Ok(Self {
            width,
            height,
            scale_factor,
        })
    }

    /// Viewport width in CSS pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Viewport height in CSS pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Device pixel ratio used for captures.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }
}

/// How the capture surface is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingPolicy {
    /// Viewport is the configured fidelity.
    #[default]
    Fixed,
    /// Viewport is resized to the measured diagram plus `margin` CSS pixels.
    AutoFit { margin: u32 },
}

impl SizingPolicy {
    /// Auto-fit with the default margin.
    #[must_use]
    pub fn auto_fit() -> Self {
        Self::AutoFit {
            margin: DEFAULT_FIT_MARGIN,
        }
    }
}

/// Per-run rendering options.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub fidelity: RenderFidelity,
    pub sizing: SizingPolicy,
    /// Bound on page load plus the wait for the diagram to be drawn and settle.
    pub timeout: Duration,
    /// Fixed delay before the stability check (zero disables it).
    pub fixed_settle_delay: Duration,
    /// Diagram library script URL, pinned to a version.
    pub library_url: String,
    /// Directory for scratch pages (system temp dir when `None`).
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            fidelity: RenderFidelity::default(),
            sizing: SizingPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            fixed_settle_delay: Duration::ZERO,
            library_url: DEFAULT_LIBRARY_URL.to_owned(),
            scratch_dir: None,
        }
    }
}

/// Outcome of rendering one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Success,
    Failed,
}

/// Record of one render, created once and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderArtifact {
    pub unit_id: String,
    pub ordinal: usize,
    pub output_path: PathBuf,
    pub status: ArtifactStatus,
    /// Human-readable failure message (failed renders only).
    pub error: Option<String>,
    /// Pixel size of the written PNG (successful renders only).
    pub dimensions: Option<(u32, u32)>,
}

impl RenderArtifact {
    fn succeeded(unit: &ExtractionUnit, output_path: &Path, dimensions: (u32, u32)) -> Self {
        Self {
            unit_id: unit.id().to_owned(),
            ordinal: unit.ordinal(),
            output_path: output_path.to_path_buf(),
            status: ArtifactStatus::Success,
            error: None,
            dimensions: Some(dimensions),
        }
    }

    pub(crate) fn failed(unit: &ExtractionUnit, output_path: &Path, error: String) -> Self {
        Self {
            unit_id: unit.id().to_owned(),
            ordinal: unit.ordinal(),
            output_path: output_path.to_path_buf(),
            status: ArtifactStatus::Failed,
            error: Some(error),
            dimensions: None,
        }
    }

    /// Whether the image was written.
    pub fn is_success(&self) -> bool {
        self.status == ArtifactStatus::Success
    }
}

/// Unit-scoped render failure. Never escapes [`DiagramRenderer::render`].
#[derive(Debug, thiserror::Error)]
enum RenderFailure {
    #[error("cannot write scratch page: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("diagram not ready after {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("diagram source rejected by the diagram library")]
    Rejected,
    #[error("diagram has no measurable size")]
    Unmeasurable,
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("capture is not a PNG image")]
    InvalidImage,
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rendering session lost")]
    SessionLost,
}

/// Renders single diagrams through a session.
#[derive(Debug, Clone, Default)]
pub struct DiagramRenderer {
    options: RenderOptions,
}

impl DiagramRenderer {
    /// Create a renderer with the given options.
    #[must_use]
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Rendering options in use.
    #[must_use]
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render `unit` to `output_path`.
    ///
    /// Never fails: any problem is reported in the returned artifact. A failed
    /// render leaves no file at `output_path`, not even one from an earlier run.
    /// If the backend lost the session, the session is marked inactive and must
    /// be recycled by the caller.
    pub fn render(
        &self,
        unit: &ExtractionUnit,
        session: &mut RenderSession,
        output_path: &Path,
    ) -> RenderArtifact {
        let result = match session.surface() {
            Some(surface) => self.try_render(unit, surface, output_path),
            None => Err(RenderFailure::SessionLost),
        };

        match result {
            Ok(dimensions) => {
                tracing::debug!(unit = unit.id(), ?dimensions, "Rendered diagram");
                RenderArtifact::succeeded(unit, output_path, dimensions)
            }
            Err(failure) => {
                if let RenderFailure::Backend(e) = &failure
                    && e.is_fatal_for_surface()
                {
                    session.mark_broken();
                }
                remove_stale(output_path);
                RenderArtifact::failed(unit, output_path, failure.to_string())
            }
        }
    }

    fn try_render(
        &self,
        unit: &ExtractionUnit,
        surface: &mut dyn Surface,
        output_path: &Path,
    ) -> Result<(u32, u32), RenderFailure> {
        let fidelity = self.options.fidelity;
        let container_width = match self.options.sizing {
            SizingPolicy::Fixed => Some(fidelity.width()),
            SizingPolicy::AutoFit { .. } => None,
        };
        let page = wrap_diagram(unit.source(), &self.options.library_url, container_width);

        // Deleted when dropped, on every return path below.
        let scratch = self.write_scratch(unit, &page)?;
        let url = file_url(scratch.path());

        surface.set_viewport(fidelity.width(), fidelity.height())?;
        let deadline = Instant::now() + self.options.timeout;
        surface.load(&url).map_err(|e| match e.kind {
            BackendErrorKind::Timeout => RenderFailure::Timeout(self.options.timeout),
            _ => RenderFailure::Backend(e),
        })?;
        self.wait_ready(surface, deadline)?;
        if surface.is_visible(ERROR_SELECTOR)? {
            return Err(RenderFailure::Rejected);
        }

        let settled = self.wait_settled(surface, deadline)?;
        if let SizingPolicy::AutoFit { margin } = self.options.sizing {
            let bbox = settled.ok_or(RenderFailure::Unmeasurable)?;
            let (width, height) = fit_viewport(&bbox, margin);
            surface.set_viewport(width, height)?;
        }

        let png = surface.capture(CONTAINER_SELECTOR)?;
        let dimensions = png_dimensions(&png).ok_or(RenderFailure::InvalidImage)?;
        write_image(output_path, &png).map_err(|source| RenderFailure::Write {
            path: output_path.to_path_buf(),
            source,
        })?;

        drop(scratch);
        Ok(dimensions)
    }

    fn write_scratch(
        &self,
        unit: &ExtractionUnit,
        page: &str,
    ) -> Result<tempfile::NamedTempFile, RenderFailure> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("{}-", unit.id());
        builder.prefix(&prefix).suffix(".html");
        let mut file = match &self.options.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(RenderFailure::Scratch)?;

        file.write_all(page.as_bytes())
            .and_then(|()| file.flush())
            .map_err(RenderFailure::Scratch)?;
        Ok(file)
    }

    /// Poll until the ready selector is visible or `deadline` passes.
    fn wait_ready(&self, surface: &mut dyn Surface, deadline: Instant) -> Result<(), RenderFailure> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RenderFailure::Timeout(self.options.timeout));
            }
            if surface.is_visible(READY_SELECTOR)? {
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL.min(remaining));
        }
    }

    /// Wait until two successive measurements of the diagram agree.
    ///
    /// Bounded by [`MAX_SETTLE_CHECKS`] and `deadline`; a diagram still moving
    /// when either runs out is captured as last measured.
    fn wait_settled(
        &self,
        surface: &mut dyn Surface,
        deadline: Instant,
    ) -> Result<Option<BoundingBox>, RenderFailure> {
        let delay = self.options.fixed_settle_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay.min(deadline.saturating_duration_since(Instant::now())));
        }

        let mut previous = surface.bounding_box(READY_SELECTOR)?;
        for _ in 1..MAX_SETTLE_CHECKS {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(POLL_INTERVAL.min(remaining));
            let current = surface.bounding_box(READY_SELECTOR)?;
            if current.is_some() && current == previous {
                return Ok(current);
            }
            previous = current;
        }
        tracing::debug!("Diagram layout did not settle, capturing last measurement");
        Ok(previous)
    }
}

/// Write `png` to `path` through a temporary sibling, so readers never see a
/// partial image.
fn write_image(path: &Path, png: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(png)?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove an image left at `path` by an earlier run.
fn remove_stale(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed stale image"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot remove stale image"),
    }
}

/// Viewport that fits the diagram's box plus a margin on each axis.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fit_viewport(bbox: &BoundingBox, margin: u32) -> (u32, u32) {
    let width = (bbox.width.max(1.0).ceil() as u32).saturating_add(margin);
    let height = (bbox.height.max(1.0).ceil() as u32).saturating_add(margin);
    (width, height)
}

fn file_url(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}
