//! Metric helpers for `replayframe`.
//!
//! This module defines metric names and thin wrappers around the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking running sessions.
pub const SESSIONS_ACTIVE: &str = "replayframe_sessions_active";
/// Name of the counter tracking handled bursts.
pub const BURSTS_TOTAL: &str = "replayframe_bursts_total";
/// Name of the counter tracking how sessions ended.
pub const SESSION_OUTCOMES_TOTAL: &str = "replayframe_session_outcomes_total";

/// How a burst was answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BurstOutcome {
    /// Recorded responses were written to the client.
    Replayed,
    /// The burst went to the real destination.
    Forwarded,
    /// The framer produced no bytes.
    Empty,
}

impl BurstOutcome {
    /// Label value used for this outcome.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replayed => "replayed",
            Self::Forwarded => "forwarded",
            Self::Empty => "empty",
        }
    }
}

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record one handled burst.
pub fn inc_bursts(outcome: BurstOutcome) {
    #[cfg(feature = "metrics")]
    counter!(BURSTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record how a session ended, labelled by the outcome's error type.
pub fn inc_session_outcomes(outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(SESSION_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}
