//! End-to-end document pipeline.
//!
//! Reads a host document, extracts its diagrams, optionally persists their
//! sources, renders them and writes the rewritten document next to the input.
//! The document is scanned once; rendering and rewriting both work from that
//! scan.

use std::path::{Path, PathBuf};

use crate::batch::{BatchError, BatchOrchestrator, RunSummary};
use crate::extract::UnitExtractor;
use crate::rewrite::{FailurePolicy, ReferenceRewriter, RewriteError, RewrittenDocument};
use crate::store::{StoreError, UnitStore};

/// Suffix appended to the input file name for the rewritten copy.
const REWRITTEN_SUFFIX: &str = ".updated";

/// Fatal pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot read input document {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot persist diagram sources: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("internal error while rewriting document: {0}")]
    Rewrite(#[from] RewriteError),
    #[error("cannot write rewritten document {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of processing one document.
#[derive(Debug)]
pub struct PipelineReport {
    pub summary: RunSummary,
    pub rewritten: RewrittenDocument,
    /// Where the rewritten document was written.
    pub rewritten_path: PathBuf,
    /// Persisted source files (empty when persistence is off).
    pub sources: Vec<PathBuf>,
}

/// Runs extraction, rendering and rewriting for a document.
pub struct DocumentPipeline {
    extractor: UnitExtractor,
    orchestrator: BatchOrchestrator,
    rewriter: ReferenceRewriter,
    store: Option<(UnitStore, PathBuf)>,
}

impl DocumentPipeline {
    /// Create a pipeline extracting with `extractor` and rendering with
    /// `orchestrator`. Links default to `images/`.
    #[must_use]
    pub fn new(extractor: UnitExtractor, orchestrator: BatchOrchestrator) -> Self {
        Self {
            rewriter: ReferenceRewriter::new(extractor.clone()),
            extractor,
            orchestrator,
            store: None,
        }
    }

    /// Set the prefix for image links in the rewritten document.
    #[must_use]
    pub fn link_base(mut self, base: impl Into<String>) -> Self {
        self.rewriter = self.rewriter.link_base(base);
        self
    }

    /// Set what replaces blocks whose render failed.
    #[must_use]
    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.rewriter = self.rewriter.on_failure(policy);
        self
    }

    /// Persist extracted sources into `dir` before rendering.
    #[must_use]
    pub fn persist_sources(mut self, store: UnitStore, dir: impl Into<PathBuf>) -> Self {
        self.store = Some((store, dir.into()));
        self
    }

    /// Path of the rewritten copy of `document`.
    #[must_use]
    pub fn rewritten_path(document: &Path) -> PathBuf {
        let mut name = document
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(REWRITTEN_SUFFIX);
        document.with_file_name(name)
    }

    /// Process `document`, writing images to `output_dir`.
    pub fn run(&self, document: &Path, output_dir: &Path) -> Result<PipelineReport, PipelineError> {
        let text = std::fs::read_to_string(document).map_err(|source| PipelineError::Read {
            path: document.to_path_buf(),
            source,
        })?;

        let blocks = self.extractor.scan_blocks(&text);
        let units = self.extractor.units_from(&blocks);
        tracing::info!(document = %document.display(), diagrams = units.len(), "Extracted diagrams");

        let sources = match &self.store {
            Some((store, dir)) => store.persist_all(&units, dir)?,
            None => Vec::new(),
        };

        let summary = self.orchestrator.run(&units, output_dir)?;
        let rewritten = self
            .rewriter
            .rewrite_blocks(&text, &blocks, &summary.artifacts)?;

        let rewritten_path = Self::rewritten_path(document);
        std::fs::write(&rewritten_path, &rewritten.text).map_err(|source| PipelineError::Write {
            path: rewritten_path.clone(),
            source,
        })?;

        Ok(PipelineReport {
            summary,
            rewritten,
            rewritten_path,
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::backend::RenderBackend;
    use crate::mock::MockBackend;
    use crate::renderer::{DiagramRenderer, RenderFidelity, RenderOptions};
    use pretty_assertions::assert_eq;

    fn pipeline(backend: &Arc<MockBackend>, link_base: &str) -> DocumentPipeline {
        let backend: Arc<dyn RenderBackend> = Arc::clone(backend) as Arc<dyn RenderBackend>;
        let options = RenderOptions {
            fidelity: RenderFidelity::new(800, 600, 1.0).unwrap(),
            timeout: Duration::from_millis(250),
            ..RenderOptions::default()
        };
        DocumentPipeline::new(
            UnitExtractor::default(),
            BatchOrchestrator::new(backend, DiagramRenderer::new(options)),
        )
        .link_base(link_base)
    }

    #[test]
    fn test_rewritten_path_is_sibling() {
        assert_eq!(
            DocumentPipeline::rewritten_path(Path::new("/docs/arch.md")),
            PathBuf::from("/docs/arch.md.updated")
        );
    }

    #[test]
    fn test_two_block_document() {
        let temp = tempfile::tempdir().unwrap();
        let doc_path = temp.path().join("arch.md");
        let original = "# Design\n\n```mermaid\ngraph A-->B\n```\n\nThen:\n\n```mermaid\n???broken???\n```\n";
        std::fs::write(&doc_path, original).unwrap();
        let images = temp.path().join("images");
        let backend = Arc::new(MockBackend::new());

        let report = pipeline(&backend, "./images")
            .persist_sources(UnitStore::new(), temp.path().join("mermaid"))
            .run(&doc_path, &images)
            .unwrap();

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.failed, 1);
        let pngs: Vec<_> = std::fs::read_dir(&images).unwrap().collect();
        assert_eq!(pngs.len(), 1);
        assert_eq!(
            report.rewritten.text,
            "# Design\n\n![Diagram 1](./images/diagram_1.png)\n\nThen:\n\n![Diagram 2](./images/diagram_2.png)\n"
        );
        assert!(!images.join("diagram_2.png").exists());
        assert_eq!(std::fs::read_to_string(&doc_path).unwrap(), original);
        assert_eq!(
            std::fs::read_to_string(&report.rewritten_path).unwrap(),
            report.rewritten.text
        );
        assert_eq!(report.sources.len(), 2);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("mermaid/diagram_2.mmd")).unwrap(),
            "???broken???\n"
        );
    }

    #[test]
    fn test_custom_language_renders_and_rewrites_same_blocks() {
        let temp = tempfile::tempdir().unwrap();
        let doc_path = temp.path().join("notes.md");
        std::fs::write(
            &doc_path,
            "```mermaid\nignored\n```\n```mmd\ngraph A-->B\n```\n",
        )
        .unwrap();
        let backend: Arc<dyn RenderBackend> = Arc::new(MockBackend::new());
        let options = RenderOptions {
            timeout: Duration::from_millis(250),
            ..RenderOptions::default()
        };

        let report = DocumentPipeline::new(
            UnitExtractor::new("mmd"),
            BatchOrchestrator::new(backend, DiagramRenderer::new(options)),
        )
        .link_base("img")
        .on_failure(FailurePolicy::KeepSource)
        .run(&doc_path, &temp.path().join("img"))
        .unwrap();

        assert_eq!(report.summary.total, 1);
        assert_eq!(report.rewritten.replacements, 1);
        assert_eq!(
            report.rewritten.text,
            "```mermaid\nignored\n```\n![Diagram 1](img/diagram_1.png)\n"
        );
    }

    #[test]
    fn test_empty_document() {
        let temp = tempfile::tempdir().unwrap();
        let doc_path = temp.path().join("plain.md");
        std::fs::write(&doc_path, "Nothing to draw.\n").unwrap();
        let backend = Arc::new(MockBackend::new());

        let report = pipeline(&backend, "./images")
            .run(&doc_path, &temp.path().join("images"))
            .unwrap();

        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.succeeded, 0);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(report.rewritten.text, "Nothing to draw.\n");
        assert_eq!(backend.launches(), 0);
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());

        let err = pipeline(&backend, "images")
            .run(&temp.path().join("missing.md"), temp.path())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Read { .. }));
    }
}
