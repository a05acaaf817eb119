//! `dgm extract` command implementation.

use std::path::{Path, PathBuf};

use clap::Args;
use dgm_config::{CliSettings, Config};
use dgm_pipeline::UnitStore;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the extract command.
#[derive(Args)]
pub(crate) struct ExtractArgs {
    /// Markdown document containing diagram blocks.
    document: PathBuf,

    /// Destination for the diagram sources (default: `<language>/` next to the document).
    #[arg(short, long)]
    sources_dir: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover dgm.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ExtractArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let settings = CliSettings {
            sources_dir: self.sources_dir,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&settings))?;

        let written = run_extract(&config, &self.document)?;

        if written.is_empty() {
            output.info(&format!("No diagrams found in {}", self.document.display()));
        } else {
            output.success(&format!("Extracted {} diagram(s)", written.len()));
            for path in &written {
                output.info(&format!("  {}", path.display()));
            }
        }
        Ok(())
    }
}

/// Extract every diagram of `document` into the sources directory.
pub(crate) fn run_extract(config: &Config, document: &Path) -> Result<Vec<PathBuf>, CliError> {
    let text = std::fs::read_to_string(document).map_err(|source| CliError::ReadInput {
        path: document.to_path_buf(),
        source,
    })?;
    let units = super::extractor(config).extract(&text);

    let destination = match &config.output_resolved.sources_dir {
        Some(dir) => dir.clone(),
        None => document
            .parent()
            .unwrap_or(Path::new("."))
            .join(&config.extract.language),
    };
    Ok(UnitStore::new().persist_all(&units, &destination)?)
}
