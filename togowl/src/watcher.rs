//! Attachment watcher.
//!
//! Waits for the timer container to appear in the page and builds the timer
//! bridge exactly once. After attaching it stops observing: later structural
//! changes are ignored, even if the page replaces the timer.

use crate::bridge::TimerBridge;
use crate::surface::Surface;
use std::sync::Arc;
use tracing::{info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Observing,
    Disconnected,
}

/// One-shot watcher for the timer surface
pub struct AttachmentWatcher {
    state: WatchState,
    checks: u64,
}

impl AttachmentWatcher {
    pub fn new() -> Self {
        Self {
            state: WatchState::Observing,
            checks: 0,
        }
    }

    /// Whether the watcher still reacts to structural changes
    pub fn is_observing(&self) -> bool {
        self.state == WatchState::Observing
    }

    /// Number of readiness checks performed so far
    pub fn checks(&self) -> u64 {
        self.checks
    }

    /// Handle a structural change of the page.
    ///
    /// Returns the new bridge when this change is the one that made the
    /// surface ready. Returns `None` while waiting and after attachment.
    pub fn on_structure_change(&mut self, surface: &Arc<dyn Surface>) -> Option<Arc<TimerBridge>> {
        if self.state == WatchState::Disconnected {
            return None;
        }

        self.checks += 1;
        if !surface.is_ready() {
            trace!("Timer surface not ready (check #{})", self.checks);
            return None;
        }

        self.state = WatchState::Disconnected;
        info!("Timer surface ready after {} check(s), attaching overlay", self.checks);
        Some(TimerBridge::create(Arc::clone(surface)))
    }
}

impl Default for AttachmentWatcher {
    fn default() -> Self {
        Self::new()
    }
}
