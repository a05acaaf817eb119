//! Internal constants for diagram rendering.

use std::time::Duration;

/// Default wait for the diagram-ready signal (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default margin added around an auto-fitted diagram, in CSS pixels.
pub const DEFAULT_FIT_MARGIN: u32 = 40;

/// Interval between ready-signal and stability polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum number of bounding-box measurements while waiting for layout to settle.
pub const MAX_SETTLE_CHECKS: u32 = 20;

/// Upper bound on concurrent render sessions.
pub const MAX_JOBS: usize = 8;

/// Default fenced block language tag.
pub const DEFAULT_LANGUAGE: &str = "mermaid";

/// Extension used for persisted diagram sources.
pub const SOURCE_EXTENSION: &str = "mmd";

/// Default diagram library loaded by the wrapper page (pinned).
pub const DEFAULT_LIBRARY_URL: &str =
    "https://cdn.jsdelivr.net/npm/mermaid@10.9.1/dist/mermaid.min.js";

/// Selector that becomes visible once the library has drawn the diagram.
pub const READY_SELECTOR: &str = ".mermaid svg";

/// Selector matching the library's syntax-error graphic.
pub const ERROR_SELECTOR: &str = r#".mermaid svg[aria-roledescription="error"]"#;

/// Container element captured into the output image.
pub const CONTAINER_SELECTOR: &str = "#diagram";
