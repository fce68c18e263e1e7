//! Response generation counter used to invalidate superseded work.
//!
//! Every new response (user message, idle prompt, interrupt) begins a new
//! epoch. Work stamped with an older epoch is silently discarded at the next
//! check point; nothing is aborted eagerly.
//!
//! Tasks run on a multi-threaded runtime, so a bare "is it still current?"
//! read followed by an action could race with [`EpochController::begin_epoch`].
//! [`EpochController::run_if_current`] closes that window by running the
//! action while holding the same gate that epoch increments take.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::pipeline::messages::Epoch;

/// Shared handle to the current epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochController {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    current: AtomicU64,
    gate: Mutex<()>,
}

impl EpochController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate all prior work and return the new epoch.
    pub fn begin_epoch(&self) -> Epoch {
        self.begin_epoch_with(|_| ()).0
    }

    /// Begin a new epoch and run `f` with it before any other task can
    /// observe the change.
    pub fn begin_epoch_with<R>(&self, f: impl FnOnce(Epoch) -> R) -> (Epoch, R) {
        let _gate = self.inner.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let epoch = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;
        (epoch, f(epoch))
    }

    pub fn current_epoch(&self) -> Epoch {
        self.inner.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current_epoch() == epoch
    }

    /// Run `f` only if `epoch` is current, with no epoch change possible
    /// until `f` returns. `f` must not block or call back into this controller.
    pub fn run_if_current<R>(&self, epoch: Epoch, f: impl FnOnce() -> R) -> Option<R> {
        let _gate = self.inner.gate.lock().unwrap_or_else(PoisonError::into_inner);
        (self.inner.current.load(Ordering::SeqCst) == epoch).then(f)
    }
}
