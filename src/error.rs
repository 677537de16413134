//! Terminal outcomes of an interception session.
//!
//! Every session ends with exactly one [`SessionError`]. Two of the variants
//! are not faults: [`SessionError::Cancelled`] means the caller stopped the
//! session and [`SessionError::PeerClosed`] means the client hung up cleanly.
//! Use [`SessionError::is_graceful`] to keep those out of error logs.

use std::io;

use thiserror::Error;

use crate::{
    codec::{CodecError, DecodeError, EncodeError},
    mock::StoreError,
};

/// Reason an interception session stopped.
///
/// # Examples
///
/// ```
/// use replayframe::SessionError;
///
/// let err = SessionError::PeerClosed;
/// assert!(err.is_graceful());
/// assert_eq!(err.error_type(), "peer_closed");
///
/// let err = SessionError::Io(std::io::Error::other("connection reset"));
/// assert!(!err.is_graceful());
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The caller's cancellation token fired.
    #[error("session cancelled")]
    Cancelled,

    /// The client closed its side of the connection.
    #[error("client closed the connection")]
    PeerClosed,

    /// Reading from or writing to the client or the destination failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The mock store could not answer a lookup.
    #[error("mock store failure: {0}")]
    Store(#[from] StoreError),

    /// A recorded response could not be decoded into wire bytes.
    #[error("decode failure: {0}")]
    Decode(#[from] DecodeError),

    /// A structured response could not be encoded into wire bytes.
    #[error("encode failure: {0}")]
    Encode(#[from] EncodeError),

    /// The session worker panicked before reporting an outcome.
    #[error("session worker panicked: {0}")]
    WorkerPanicked(String),
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Decode(e) => Self::Decode(e),
            CodecError::Encode(e) => Self::Encode(e),
        }
    }
}

impl SessionError {
    /// Returns true if the session stopped because the caller cancelled it.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { matches!(self, Self::Cancelled) }

    /// Returns true if the client closed the connection.
    #[must_use]
    pub fn is_peer_closed(&self) -> bool { matches!(self, Self::PeerClosed) }

    /// Returns true for outcomes that are not faults.
    #[must_use]
    pub fn is_graceful(&self) -> bool { self.is_cancelled() || self.is_peer_closed() }

    /// Returns a stable label for logs and metrics.
    ///
    /// One of `"cancelled"`, `"peer_closed"`, `"io"`, `"store"`, `"decode"`,
    /// `"encode"` or `"panic"`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::PeerClosed => "peer_closed",
            Self::Io(_) => "io",
            Self::Store(_) => "store",
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::WorkerPanicked(_) => "panic",
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::cancelled(SessionError::Cancelled, true)]
    #[case::peer_closed(SessionError::PeerClosed, true)]
    #[case::io(SessionError::Io(io::Error::other("reset")), false)]
    #[case::store(SessionError::Store(StoreError::new("index corrupt")), false)]
    #[case::panic(SessionError::WorkerPanicked("boom".into()), false)]
    fn graceful_outcomes_are_not_faults(#[case] err: SessionError, #[case] graceful: bool) {
        assert_eq!(err.is_graceful(), graceful, "{err}");
    }

    #[test]
    fn codec_errors_keep_their_direction() {
        let decode: SessionError = CodecError::Decode(DecodeError::TruncatedHeader { have: 2 }).into();
        assert_eq!(decode.error_type(), "decode");

        let encode: SessionError = CodecError::Encode(EncodeError::EmptyPacketTypes).into();
        assert_eq!(encode.error_type(), "encode");
    }
}
