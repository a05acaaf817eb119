//! CLI error types.

use std::path::PathBuf;

use dgm_config::ConfigError;
use dgm_pipeline::{BatchError, FidelityError, PipelineError, StoreError};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Fidelity(#[from] FidelityError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Batch(#[from] BatchError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("cannot read input document {}: {source}", path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Validation(String),
}
