#![doc(html_root_url = "https://docs.rs/replayframe/latest")]
//! Public API for the `replayframe` library.
//!
//! This crate is the traffic-interception engine of a record/replay proxy for
//! PostgreSQL. For every client connection it frames requests into bursts by
//! idle time, looks each burst up in a mock store, and either replays the
//! recorded responses or forwards the burst to the real server.

pub mod codec;
pub mod config;
pub mod error;
pub mod framer;
pub mod matcher;
pub mod metrics;
pub mod mock;
pub mod passthrough;
pub mod session;

pub use codec::{CodecError, DecodeError, EncodeError, encode_packet};
pub use config::SessionConfig;
pub use error::SessionError;
pub use framer::{Framer, RequestBurst};
pub use matcher::{MatchOutcome, match_burst};
pub use metrics::{BURSTS_TOTAL, BurstOutcome, SESSION_OUTCOMES_TOTAL, SESSIONS_ACTIVE};
pub use mock::{MemoryMockStore, MockStore, RecordedExchange, RecordedRequest, ResponsePacket, StoreError};
pub use passthrough::{DestinationConfig, Passthrough};
pub use session::{Session, active_session_count, run_session};
