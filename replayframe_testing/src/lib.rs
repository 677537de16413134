//! Utilities for exercising `replayframe` sessions in tests.
//!
//! [`Destination`] stands in for the real database server behind the proxy,
//! the [`stores`] module provides mock stores with fixed behaviour, and the
//! [`pg`] module builds the PostgreSQL messages the scenarios exchange.
//!
//! ```rust,no_run
//! use replayframe_testing::{Destination, Turn};
//!
//! # async fn example() -> std::io::Result<()> {
//! let destination = Destination::spawn(vec![Turn::reply(5, b"pong".to_vec())]).await?;
//! assert_eq!(destination.accepted(), 0);
//! # Ok(())
//! # }
//! ```

pub mod destination;
pub mod logging;
pub mod pg;
pub mod stores;

pub use destination::{Destination, Turn};
pub use logging::{LoggerHandle, logger};
pub use stores::{CountingStore, FailingStore};
