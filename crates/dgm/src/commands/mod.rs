//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod extract;
pub(crate) mod render;

pub(crate) use build::BuildArgs;
pub(crate) use extract::ExtractArgs;
pub(crate) use render::RenderArgs;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::Args;
use dgm_config::{CliSettings, Config};
use dgm_pipeline::{
    BatchOrchestrator, DEFAULT_LIBRARY_URL, DiagramRenderer, FailurePolicy, IdStrategy,
    RenderArtifact, RenderBackend, RenderFidelity, RenderObserver, RenderOptions, RunSummary,
    SizingPolicy, UnitExtractor,
};
use dgm_webdriver::{Browser, WebDriverBackend, WebDriverConfig};

use crate::error::CliError;
use crate::output::Output;

/// Rendering flags shared by `build` and `render`.
#[derive(Args, Debug, Default)]
pub(crate) struct RenderFlags {
    /// Path to configuration file (default: auto-discover dgm.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Viewport width in CSS pixels (overrides config).
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height in CSS pixels (overrides config).
    #[arg(long)]
    height: Option<u32>,

    /// Device pixel ratio of the images (overrides config).
    #[arg(long)]
    scale: Option<f64>,

    /// Per-diagram readiness timeout in milliseconds (overrides config).
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Fixed delay before the layout stability check (overrides config).
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Size images to the diagram plus a margin instead of the viewport.
    #[arg(long)]
    auto_fit: bool,

    /// Number of concurrent browser sessions, 1 to 8 (overrides config).
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Image output directory (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// WebDriver server URL (overrides config).
    #[arg(long, env = "DGM_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// What to write for failed diagrams: link, keep-source or placeholder.
    #[arg(long)]
    on_failure: Option<String>,
}

impl RenderFlags {
    /// CLI overrides for config loading.
    pub(crate) fn settings(&self, sources_dir: Option<PathBuf>) -> CliSettings {
        CliSettings {
            width: self.width,
            height: self.height,
            scale_factor: self.scale,
            timeout_ms: self.timeout_ms,
            settle_ms: self.settle_ms,
            auto_fit: self.auto_fit.then_some(true),
            jobs: self.jobs,
            output_dir: self.output_dir.clone(),
            sources_dir,
            webdriver_url: self.webdriver_url.clone(),
            on_failure: self.on_failure.clone(),
        }
    }

    /// Load configuration with these flags applied.
    pub(crate) fn load_config(&self, sources_dir: Option<PathBuf>) -> Result<Config, CliError> {
        let settings = self.settings(sources_dir);
        Ok(Config::load(self.config.as_deref(), Some(&settings))?)
    }
}

/// Extractor for the configured language and id strategy.
pub(crate) fn extractor(config: &Config) -> UnitExtractor {
    let ids = if config.extract.content_ids {
        IdStrategy::Content
    } else {
        IdStrategy::Ordinal
    };
    UnitExtractor::new(&config.extract.language).id_strategy(ids)
}

/// Renderer options from configuration.
pub(crate) fn render_options(config: &Config) -> Result<RenderOptions, CliError> {
    let render = &config.render;
    let fidelity = RenderFidelity::new(render.width, render.height, render.scale_factor)?;
    let sizing = if render.auto_fit {
        SizingPolicy::AutoFit {
            margin: render.fit_margin,
        }
    } else {
        SizingPolicy::Fixed
    };
    Ok(RenderOptions {
        fidelity,
        sizing,
        timeout: Duration::from_millis(render.timeout_ms),
        fixed_settle_delay: Duration::from_millis(render.fixed_settle_delay_ms),
        library_url: config
            .backend_resolved
            .library_url
            .clone()
            .unwrap_or_else(|| DEFAULT_LIBRARY_URL.to_owned()),
        scratch_dir: None,
    })
}

/// Rewrite policy for failed diagrams.
pub(crate) fn failure_policy(config: &Config) -> Result<FailurePolicy, CliError> {
    let name = &config.output_resolved.on_failure;
    FailurePolicy::parse(name)
        .ok_or_else(|| CliError::Validation(format!("unknown failure policy: {name}")))
}

/// WebDriver backend from configuration.
pub(crate) fn webdriver_backend(config: &Config) -> Result<Arc<dyn RenderBackend>, CliError> {
    let backend = &config.backend_resolved;
    let browser = Browser::parse(&backend.browser)
        .ok_or_else(|| CliError::Validation(format!("unsupported browser: {}", backend.browser)))?;
    let timeout = Duration::from_millis(config.render.timeout_ms);
    Ok(Arc::new(WebDriverBackend::new(WebDriverConfig {
        url: backend.webdriver_url.clone(),
        browser,
        driver_path: backend.driver_path.clone(),
        browser_args: backend.browser_args.clone(),
        // Session creation starts a browser, so requests keep the longer default.
        request_timeout: timeout.max(WebDriverConfig::default().request_timeout),
        page_load_timeout: timeout,
        ..WebDriverConfig::default()
    })))
}

/// Orchestrator wired to `backend` with console progress.
pub(crate) fn orchestrator(
    config: &Config,
    backend: Arc<dyn RenderBackend>,
) -> Result<BatchOrchestrator, CliError> {
    let renderer = DiagramRenderer::new(render_options(config)?);
    Ok(BatchOrchestrator::new(backend, renderer)
        .jobs(config.render.jobs)
        .with_observer(Arc::new(ConsoleProgress::new())))
}

/// Prints one line per rendered diagram.
struct ConsoleProgress {
    output: Output,
    done: AtomicUsize,
}

impl ConsoleProgress {
    fn new() -> Self {
        Self {
            output: Output::new(),
            done: AtomicUsize::new(0),
        }
    }
}

impl RenderObserver for ConsoleProgress {
    fn unit_rendered(&self, artifact: &RenderArtifact, total: usize) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let status = match &artifact.error {
            None => "ok".to_owned(),
            Some(error) => format!("failed: {error}"),
        };
        self.output
            .progress(done, total, &format!("{}: {status}", artifact.unit_id));
    }
}

/// Summary line and one line per failed diagram.
pub(crate) fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "{} succeeded, {} failed",
        summary.succeeded, summary.failed
    )];
    lines.extend(summary.failures().map(|artifact| {
        format!(
            "  {}: {}",
            artifact.unit_id,
            artifact.error.as_deref().unwrap_or("unknown error")
        )
    }));
    lines
}

/// Print the run summary, green when every diagram rendered.
pub(crate) fn report_summary(output: &Output, summary: &RunSummary) {
    let lines = summary_lines(summary);
    let Some((headline, failures)) = lines.split_first() else {
        return;
    };
    if summary.failed == 0 {
        output.success(headline);
    } else {
        output.warning(headline);
        for line in failures {
            output.error(line);
        }
    }
}
