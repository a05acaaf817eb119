//! Batch orchestration.
//!
//! [`BatchOrchestrator`] renders every unit of a run, isolating per-unit
//! failures, and aggregates a [`RunSummary`] in ordinal order.
//!
//! # Concurrency
//!
//! With `jobs > 1`, units are dealt round-robin into lanes and each lane runs on
//! its own thread of a dedicated rayon pool with its own session. Artifacts are
//! re-sorted by ordinal afterwards, so the summary is identical to a sequential run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::backend::RenderBackend;
use crate::consts::MAX_JOBS;
use crate::renderer::{DiagramRenderer, RenderArtifact};
use crate::session::{SessionError, SessionPool};
use crate::unit::ExtractionUnit;

/// Receives one notification per rendered unit.
///
/// Called from render worker threads, possibly out of ordinal order.
pub trait RenderObserver: Send + Sync {
    /// A unit finished rendering, successfully or not.
    fn unit_rendered(&self, artifact: &RenderArtifact, total: usize);
}

/// Observer that ignores all notifications.
#[derive(Debug, Default)]
pub struct NullObserver;

impl RenderObserver for NullObserver {
    fn unit_rendered(&self, _artifact: &RenderArtifact, _total: usize) {}
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// One artifact per unit, in ordinal order.
    pub artifacts: Vec<RenderArtifact>,
}

impl RunSummary {
    fn from_artifacts(mut artifacts: Vec<RenderArtifact>) -> Self {
        artifacts.sort_by_key(|a| a.ordinal);
        let succeeded = artifacts.iter().filter(|a| a.is_success()).count();
        Self {
            total: artifacts.len(),
            succeeded,
            failed: artifacts.len() - succeeded,
            artifacts,
        }
    }

    /// Failed artifacts, in ordinal order.
    pub fn failures(&self) -> impl Iterator<Item = &RenderArtifact> {
        self.artifacts.iter().filter(|a| !a.is_success())
    }
}

/// Error that aborts a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("cannot create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot start render workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

/// Drives the renderer over all units of a run.
pub struct BatchOrchestrator {
    backend: Arc<dyn RenderBackend>,
    renderer: DiagramRenderer,
    jobs: usize,
    observer: Arc<dyn RenderObserver>,
}

impl BatchOrchestrator {
    /// Create a sequential orchestrator.
    pub fn new(backend: Arc<dyn RenderBackend>, renderer: DiagramRenderer) -> Self {
        Self {
            backend,
            renderer,
            jobs: 1,
            observer: Arc::new(NullObserver),
        }
    }

    /// Set the number of concurrent sessions (clamped to `1..=8`).
    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.clamp(1, MAX_JOBS);
        self
    }

    /// Set the progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RenderObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Image path for a unit: `output_dir/<id>.png`.
    #[must_use]
    pub fn output_path(unit: &ExtractionUnit, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.png", unit.id()))
    }

    /// Render all units into `output_dir`.
    ///
    /// Unit failures are recorded in the summary; only backend unavailability,
    /// an unusable output directory or leaked sessions abort the run.
    pub fn run(
        &self,
        units: &[ExtractionUnit],
        output_dir: &Path,
    ) -> Result<RunSummary, BatchError> {
        std::fs::create_dir_all(output_dir).map_err(|source| BatchError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;
        if units.is_empty() {
            return Ok(RunSummary::default());
        }

        let pool = SessionPool::new(
            Arc::clone(&self.backend),
            self.renderer.options().fidelity,
        );
        let slots = self.jobs.min(units.len());
        tracing::info!(units = units.len(), sessions = slots, "Rendering diagrams");

        let artifacts = if slots == 1 {
            self.run_lane(&pool, units.iter().collect(), units.len(), output_dir)?
        } else {
            let workers = rayon::ThreadPoolBuilder::new()
                .num_threads(slots)
                .thread_name(|i| format!("dgm-render-{i}"))
                .build()?;
            let mut lanes: Vec<Vec<&ExtractionUnit>> = vec![Vec::new(); slots];
            for (i, unit) in units.iter().enumerate() {
                lanes[i % slots].push(unit);
            }

            let results: Vec<Result<Vec<RenderArtifact>, SessionError>> = workers.install(|| {
                lanes
                    .into_par_iter()
                    .map(|lane| self.run_lane(&pool, lane, units.len(), output_dir))
                    .collect()
            });
            let mut artifacts = Vec::with_capacity(units.len());
            for result in results {
                artifacts.extend(result?);
            }
            artifacts
        };

        pool.finish()?;
        Ok(RunSummary::from_artifacts(artifacts))
    }

    /// Render one lane of units with a single session.
    fn run_lane(
        &self,
        pool: &SessionPool,
        lane: Vec<&ExtractionUnit>,
        total: usize,
        output_dir: &Path,
    ) -> Result<Vec<RenderArtifact>, SessionError> {
        let mut session = pool.acquire()?;
        let mut artifacts = Vec::with_capacity(lane.len());

        for unit in lane {
            if !session.is_active() {
                session = pool.recycle(session)?;
            }
            let output_path = Self::output_path(unit, output_dir);
            let artifact = self.renderer.render(unit, &mut session, &output_path);

            match &artifact.error {
                None => tracing::info!(unit = %artifact.unit_id, "Rendered"),
                Some(error) => tracing::warn!(unit = %artifact.unit_id, %error, "Render failed"),
            }
            self.observer.unit_rendered(&artifact, total);
            artifacts.push(artifact);
        }

        pool.release(session);
        Ok(artifacts)
    }
}
