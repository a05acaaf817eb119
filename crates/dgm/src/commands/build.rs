//! `dgm build` command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use dgm_config::Config;
use dgm_pipeline::{DocumentPipeline, PipelineReport, RenderBackend, UnitStore, link_base_for};

use super::RenderFlags;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Markdown document containing diagram blocks.
    document: PathBuf,

    /// Also write each diagram source to this directory (overrides config).
    #[arg(long)]
    sources_dir: Option<PathBuf>,

    #[command(flatten)]
    flags: RenderFlags,
}

impl BuildArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.flags.load_config(self.sources_dir.clone())?;
        let backend = super::webdriver_backend(&config)?;

        let report = run_build(&config, &self.document, backend)?;

        super::report_summary(&output, &report.summary);
        for source in &report.sources {
            tracing::debug!(path = %source.display(), "Persisted diagram source");
        }
        output.success(&format!(
            "Wrote {} ({} reference(s))",
            report.rewritten_path.display(),
            report.rewritten.replacements
        ));
        Ok(())
    }
}

/// Image directory and link prefix for `document`.
///
/// Images default to `images/` next to the document; the link prefix defaults
/// to the image directory relative to the document.
pub(crate) fn image_location(config: &Config, document: &Path) -> (PathBuf, String) {
    let document = std::path::absolute(document).unwrap_or_else(|_| document.to_path_buf());
    let document_dir = document.parent().unwrap_or(Path::new("."));
    let image_dir = match &config.output_resolved.dir {
        Some(dir) => std::path::absolute(dir).unwrap_or_else(|_| dir.clone()),
        None => document_dir.join("images"),
    };
    let link_base = config
        .output_resolved
        .link_base
        .clone()
        .unwrap_or_else(|| link_base_for(document_dir, &image_dir));
    (image_dir, link_base)
}

/// Extract, render and rewrite `document` on `backend`.
pub(crate) fn run_build(
    config: &Config,
    document: &Path,
    backend: Arc<dyn RenderBackend>,
) -> Result<PipelineReport, CliError> {
    let (image_dir, link_base) = image_location(config, document);
    let mut pipeline =
        DocumentPipeline::new(super::extractor(config), super::orchestrator(config, backend)?)
            .link_base(link_base)
            .on_failure(super::failure_policy(config)?);
    if let Some(dir) = &config.output_resolved.sources_dir {
        pipeline = pipeline.persist_sources(UnitStore::new(), dir.clone());
    }

    tracing::info!(document = %document.display(), images = %image_dir.display(), "Building");
    Ok(pipeline.run(document, &image_dir)?)
}
