//! `dgm render` command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use dgm_config::Config;
use dgm_pipeline::{RenderBackend, RunSummary, UnitStore};

use super::RenderFlags;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Directory of standalone diagram sources.
    source_dir: PathBuf,

    /// Extension of the source files to render.
    #[arg(long, default_value = "mmd")]
    extension: String,

    #[command(flatten)]
    flags: RenderFlags,
}

impl RenderArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.flags.load_config(None)?;
        let backend = super::webdriver_backend(&config)?;

        let summary = run_render(&config, &self.source_dir, &self.extension, backend)?;

        if summary.total == 0 {
            output.warning(&format!(
                "No diagram sources in {}",
                self.source_dir.display()
            ));
        }
        super::report_summary(&output, &summary);
        Ok(())
    }
}

/// Render every `*.<extension>` file of `source_dir`.
///
/// Images go to the configured output directory, or next to the sources.
pub(crate) fn run_render(
    config: &Config,
    source_dir: &Path,
    extension: &str,
    backend: Arc<dyn RenderBackend>,
) -> Result<RunSummary, CliError> {
    let units = UnitStore::new().extension(extension).load_dir(source_dir)?;
    let output_dir = config
        .output_resolved
        .dir
        .clone()
        .unwrap_or_else(|| source_dir.to_path_buf());

    tracing::info!(sources = units.len(), output = %output_dir.display(), "Rendering sources");
    Ok(super::orchestrator(config, backend)?.run(&units, &output_dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgm_pipeline::MockBackend;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_source_dir() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("flow.mmd"), "graph A-->B\n").unwrap();
        std::fs::write(temp.path().join("broken.mmd"), "???\n").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();
        let mut config = Config::default();
        config.output_resolved.dir = Some(temp.path().join("png"));

        let summary = run_render(&config, temp.path(), "mmd", Arc::new(MockBackend::new())).unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.artifacts[0].unit_id, "broken");
        assert_eq!(summary.artifacts[1].unit_id, "flow");
        assert!(temp.path().join("png/flow.png").exists());
        assert!(!temp.path().join("png/broken.png").exists());
    }

    #[test]
    fn test_render_defaults_output_to_source_dir() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("flow.mmd"), "graph A-->B\n").unwrap();

        let summary = run_render(
            &Config::default(),
            temp.path(),
            "mmd",
            Arc::new(MockBackend::new()),
        )
        .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(temp.path().join("flow.png").exists());
    }

    #[test]
    fn test_render_txt_sources() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("flow.txt"), "graph A-->B\n").unwrap();
        std::fs::write(temp.path().join("other.mmd"), "graph C\n").unwrap();

        let summary = run_render(
            &Config::default(),
            temp.path(),
            "txt",
            Arc::new(MockBackend::new()),
        )
        .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.artifacts[0].unit_id, "flow");
        assert!(temp.path().join("flow.png").exists());
    }

    #[test]
    fn test_render_empty_dir() {
        let temp = tempfile::tempdir().unwrap();

        let summary = run_render(
            &Config::default(),
            temp.path(),
            "mmd",
            Arc::new(MockBackend::new()),
        )
        .unwrap();

        assert_eq!(summary.total, 0);
    }
}
