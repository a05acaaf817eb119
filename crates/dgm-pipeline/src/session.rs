//! Rendering session lifecycle.
//!
//! A [`SessionPool`] launches backend surfaces and keeps a ledger of every
//! acquisition and release. A [`RenderSession`] wraps one surface and is owned
//! by exactly one render slot at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{BackendError, RenderBackend, Surface};
use crate::renderer::RenderFidelity;

/// Error returned by session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backend could not be started; no unit can be rendered.
    #[error("rendering backend unavailable: {0}")]
    BackendUnavailable(#[source] BackendError),
    /// Sessions were dropped without being released.
    #[error("{count} rendering session(s) were not released")]
    Leaked { count: usize },
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    leaked: AtomicUsize,
}

/// Launches and tracks rendering sessions for one batch.
pub struct SessionPool {
    backend: Arc<dyn RenderBackend>,
    fidelity: RenderFidelity,
    ledger: Arc<Ledger>,
}

impl SessionPool {
    /// Create a pool launching surfaces at `fidelity`.
    pub fn new(backend: Arc<dyn RenderBackend>, fidelity: RenderFidelity) -> Self {
        Self {
            backend,
            fidelity,
            ledger: Arc::new(Ledger::default()),
        }
    }

    /// Start a backend surface and wrap it in a session.
    ///
    /// Blocks while the backend initializes.
    pub fn acquire(&self) -> Result<RenderSession, SessionError> {
        let surface = self
            .backend
            .launch(&self.fidelity)
            .map_err(SessionError::BackendUnavailable)?;
        let id = self.ledger.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.ledger.acquired.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = id, "Acquired rendering session");

        Ok(RenderSession {
            id,
            surface: Some(surface),
            active: true,
            ledger: Arc::clone(&self.ledger),
        })
    }

    /// Tear a session down.
    ///
    /// Close failures are logged, not returned.
    pub fn release(&self, mut session: RenderSession) {
        if let Some(surface) = session.surface.take() {
            if let Err(e) = surface.close() {
                tracing::warn!(session = session.id, error = %e, "Failed to close rendering session");
            }
            self.ledger.released.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session = session.id, "Released rendering session");
        }
    }

    /// Replace a session that lost its backend with a fresh one.
    pub fn recycle(&self, session: RenderSession) -> Result<RenderSession, SessionError> {
        tracing::warn!(session = session.id, "Recreating rendering session");
        self.release(session);
        self.acquire()
    }

    /// Check that every acquired session was released.
    pub fn finish(&self) -> Result<(), SessionError> {
        let leaked = self.ledger.leaked.load(Ordering::Relaxed);
        let outstanding = self
            .ledger
            .acquired
            .load(Ordering::Relaxed)
            .saturating_sub(self.ledger.released.load(Ordering::Relaxed) + leaked);
        let count = leaked + outstanding;
        if count > 0 {
            return Err(SessionError::Leaked { count });
        }
        Ok(())
    }

    /// Number of sessions acquired so far.
    pub fn acquired(&self) -> usize {
        self.ledger.acquired.load(Ordering::Relaxed)
    }
}

/// One live backend surface, exclusively owned by one render at a time.
pub struct RenderSession {
    id: usize,
    surface: Option<Box<dyn Surface>>,
    active: bool,
    ledger: Arc<Ledger>,
}

impl RenderSession {
    /// Pool-unique session number.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the session can still render.
    pub fn is_active(&self) -> bool {
        self.active && self.surface.is_some()
    }

    /// Surface for the current render, if the session is still usable.
    pub(crate) fn surface(&mut self) -> Option<&mut (dyn Surface + 'static)> {
        if !self.active {
            return None;
        }
        self.surface.as_deref_mut()
    }

    /// Mark the backend as lost; the session must be recycled.
    pub(crate) fn mark_broken(&mut self) {
        self.active = false;
    }
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Some(surface) = self.surface.take() {
            self.ledger.leaked.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(session = self.id, "Rendering session dropped without release");
            let _ = surface.close();
        }
    }
}
