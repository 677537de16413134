//! Count of live session workers.
//!
//! The count rises when a worker task starts and falls when it finishes,
//! including after a panic, so it also reflects sessions whose caller has
//! already returned on cancellation.

use std::sync::atomic::{AtomicU64, Ordering};

static LIVE_WORKERS: AtomicU64 = AtomicU64::new(0);

/// Held by a worker task for its whole lifetime.
pub(super) struct ActiveSession;

impl ActiveSession {
    pub(super) fn new() -> Self {
        LIVE_WORKERS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_sessions();
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        LIVE_WORKERS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_sessions();
    }
}

/// Number of session workers still running, detached ones included.
#[must_use]
pub fn active_session_count() -> u64 { LIVE_WORKERS.load(Ordering::Relaxed) }
