//! Diagram asset pipeline for dgm.
//!
//! This crate turns fenced diagram blocks in a document into PNG images and
//! rewrites the document to reference them:
//! - [`UnitExtractor`] finds diagram blocks and assigns stable ids
//! - [`UnitStore`] persists sources to disk and loads standalone source files
//! - [`SessionPool`] manages rendering sessions on a [`RenderBackend`]
//! - [`DiagramRenderer`] renders one diagram with guaranteed scratch cleanup
//! - [`BatchOrchestrator`] renders all units, sequentially or with a bounded pool
//! - [`ReferenceRewriter`] replaces blocks with image references
//!
//! # Architecture
//!
//! The crate is organized into modules:
//! - [`extract`]: block scanning shared by extraction and rewriting
//! - [`backend`]: the narrow contract a rendering backend implements
//! - [`session`]: session acquisition, release and leak detection
//! - [`renderer`]: per-unit render algorithm and artifacts
//! - [`batch`]: orchestration and run summaries
//! - [`rewrite`]: reference substitution
//! - [`pipeline`]: document-level composition of the above
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dgm_pipeline::{BatchOrchestrator, DiagramRenderer, ReferenceRewriter, UnitExtractor};
//!
//! let extractor = UnitExtractor::new("mermaid");
//! let units = extractor.extract(&document);
//! let summary = BatchOrchestrator::new(backend, DiagramRenderer::default())
//!     .run(&units, "images".as_ref())?;
//! let rewritten = ReferenceRewriter::new(extractor).rewrite(&document, &summary.artifacts)?;
//! ```

pub mod backend;
pub mod batch;
mod consts;
pub mod extract;
mod markup;
#[cfg(any(test, feature = "mock"))]
mod mock;
pub mod pipeline;
mod png;
pub mod renderer;
pub mod rewrite;
pub mod session;
mod store;
mod unit;

pub use backend::{BackendError, BackendErrorKind, BoundingBox, RenderBackend, Surface};
pub use batch::{BatchError, BatchOrchestrator, NullObserver, RenderObserver, RunSummary};
pub use consts::{DEFAULT_FIT_MARGIN, DEFAULT_LANGUAGE, DEFAULT_LIBRARY_URL, DEFAULT_TIMEOUT, MAX_JOBS};
pub use extract::UnitExtractor;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockBackend;
pub use pipeline::{DocumentPipeline, PipelineError, PipelineReport};
pub use renderer::{
    ArtifactStatus, DiagramRenderer, FidelityError, RenderArtifact, RenderFidelity, RenderOptions,
    SizingPolicy,
};
pub use rewrite::{FailurePolicy, ReferenceRewriter, RewriteError, RewrittenDocument, link_base_for};
pub use session::{RenderSession, SessionError, SessionPool};
pub use store::{StoreError, UnitStore};
pub use unit::{ExtractionUnit, IdStrategy, content_hash};
