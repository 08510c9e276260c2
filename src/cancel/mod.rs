use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::producer::Stage;
use crate::ForgeError;

/// Cooperative stop flag shared between a production run and whoever may stop it.
///
/// The flag is only observed at stage boundaries; an external call that is already
/// in flight runs to completion and the next stage is skipped.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next checkpoint
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear a previous stop request
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with `ForgeError::Cancelled` if a stop was requested before `stage`
    pub fn checkpoint(&self, stage: Stage) -> Result<(), ForgeError> {
        if self.is_triggered() {
            tracing::warn!(%stage, "Cancellation observed");
            return Err(ForgeError::Cancelled(stage));
        }
        Ok(())
    }
}

/// Hands out one token per run and lets an external controller stop every active run.
#[derive(Debug, Default)]
pub struct CancellationController {
    active: Mutex<Vec<CancellationToken>>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, cleared token for a new run
    pub fn begin_run(&self) -> RunToken<'_> {
        let token = CancellationToken::new();
        self.lock().push(token.clone());
        RunToken {
            controller: self,
            token,
        }
    }

    /// Stop every run that is currently registered
    pub fn trigger(&self) {
        let active = self.lock();
        tracing::info!(runs = active.len(), "Stop requested");
        for token in active.iter() {
            token.trigger();
        }
    }

    /// Clear stop requests on every registered run
    pub fn reset(&self) {
        for token in self.lock().iter() {
            token.reset();
        }
    }

    pub fn active_runs(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CancellationToken>> {
        // A poisoned list is still a valid list of flags.
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, token: &CancellationToken) {
        self.lock().retain(|t| !Arc::ptr_eq(&t.flag, &token.flag));
    }
}

/// A run's token, deregistered from its controller when dropped
pub struct RunToken<'a> {
    controller: &'a CancellationController,
    token: CancellationToken,
}

impl RunToken<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunToken<'_> {
    fn drop(&mut self) {
        self.controller.release(&self.token);
    }
}
