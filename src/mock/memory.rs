//! In-memory [`MockStore`] backed by a concurrent map.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use log::trace;

use super::{MockStore, RecordedExchange, StoreError};
use crate::{
    codec::{FrontendMessage, decode_frontend},
    framer::RequestBurst,
};

/// Identifier assigned to each inserted exchange, in insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MockId(u64);

impl MockId {
    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(self) -> u64 { self.0 }
}

struct StoredMock {
    exchange: RecordedExchange,
    wire: Bytes,
    messages: Option<Vec<FrontendMessage>>,
}

impl StoredMock {
    fn matches_exactly(&self, bytes: &[u8]) -> bool { self.wire[..] == *bytes }

    fn matches_messages(&self, messages: &[FrontendMessage]) -> bool {
        self.messages.as_deref() == Some(messages)
    }
}

/// Store of recorded exchanges held in memory.
///
/// A burst matches an exchange when its concatenated bytes equal the recorded
/// request bytes. Failing that, a burst that decodes as frontend messages
/// matches an exchange whose request decodes to the same messages once
/// prepared statement and portal names are blanked, since drivers generate
/// those names per connection. Exact matches win over name-insensitive ones,
/// and among several candidates of the same kind the earliest inserted wins.
///
/// Exchanges that are not [`reusable`](RecordedExchange::reusable) are removed
/// when they are returned, so identical requests replay consecutive
/// recordings in order. Removal goes through [`DashMap::remove`], so one
/// recording is never handed to two sessions.
#[derive(Default)]
pub struct MemoryMockStore {
    mocks: DashMap<MockId, StoredMock>,
    next_id: AtomicU64,
}

impl MemoryMockStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Add an exchange and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if a recorded request buffer is not valid
    /// base64.
    pub fn insert(&self, exchange: RecordedExchange) -> Result<MockId, StoreError> {
        let wire = exchange.request.wire_bytes().map_err(|err| {
            StoreError::with_source(format!("mock {} has an invalid request", exchange.name), err)
        })?;
        let messages = decode_frontend(&wire).ok().map(without_object_names);
        let id = MockId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.mocks.insert(
            id,
            StoredMock {
                exchange,
                wire,
                messages,
            },
        );
        Ok(id)
    }

    /// Remove an exchange, returning it if it was still present.
    pub fn remove(&self, id: MockId) -> Option<RecordedExchange> {
        self.mocks.remove(&id).map(|(_, mock)| mock.exchange)
    }

    /// Number of exchanges left in the store.
    #[must_use]
    pub fn len(&self) -> usize { self.mocks.len() }

    /// Whether the store holds no exchange.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.mocks.is_empty() }

    fn best_candidate(&self, bytes: &[u8], messages: Option<&[FrontendMessage]>) -> Option<(MockId, bool)> {
        let mut exact: Option<(MockId, bool)> = None;
        let mut decoded: Option<(MockId, bool)> = None;
        for entry in &self.mocks {
            let candidate = (*entry.key(), entry.value().exchange.reusable);
            let slot = if entry.value().matches_exactly(bytes) {
                &mut exact
            } else if messages.is_some_and(|m| entry.value().matches_messages(m)) {
                &mut decoded
            } else {
                continue;
            };
            if slot.is_none_or(|(best, _)| candidate.0 < best) {
                *slot = Some(candidate);
            }
        }
        exact.or(decoded)
    }
}

fn without_object_names(messages: Vec<FrontendMessage>) -> Vec<FrontendMessage> {
    messages
        .into_iter()
        .map(|mut message| {
            match &mut message {
                FrontendMessage::Parse { name, .. }
                | FrontendMessage::Describe { name, .. }
                | FrontendMessage::Close { name, .. }
                | FrontendMessage::Execute { portal: name, .. } => name.clear(),
                FrontendMessage::Bind {
                    portal, statement, ..
                } => {
                    portal.clear();
                    statement.clear();
                }
                _ => {}
            }
            message
        })
        .collect()
}

#[async_trait]
impl MockStore for MemoryMockStore {
    async fn find_match(&self, burst: &RequestBurst) -> Result<Option<RecordedExchange>, StoreError> {
        let bytes = burst.concatenated();
        let messages = decode_frontend(&bytes).ok().map(without_object_names);
        loop {
            let Some((id, reusable)) = self.best_candidate(&bytes, messages.as_deref()) else {
                return Ok(None);
            };
            if reusable {
                if let Some(mock) = self.mocks.get(&id) {
                    return Ok(Some(mock.exchange.clone()));
                }
            } else if let Some(exchange) = self.remove(id) {
                trace!("consumed mock: id={}, name={}", id.as_u64(), exchange.name);
                return Ok(Some(exchange));
            }
            // Another session took this candidate first; look again.
        }
    }
}
