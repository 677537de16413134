//! Lookup of recorded responses for a burst.

use log::{debug, trace};

use crate::{
    error::SessionError,
    framer::RequestBurst,
    mock::{MockStore, ResponsePacket},
};

/// Result of matching one burst against the mock store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Recorded responses to replay, never empty.
    Matched(Vec<ResponsePacket>),
    /// Nothing recorded answers the burst.
    Unmatched,
}

impl MatchOutcome {
    /// Returns true if responses were found.
    #[must_use]
    pub fn is_matched(&self) -> bool { matches!(self, Self::Matched(_)) }
}

/// Ask `store` for the responses recorded for `burst`.
///
/// An exchange recorded without any response is reported as
/// [`MatchOutcome::Unmatched`] so the real server answers instead.
///
/// # Errors
///
/// Returns [`SessionError::Store`] if the store fails.
pub async fn match_burst<M>(store: &M, burst: &RequestBurst) -> Result<MatchOutcome, SessionError>
where
    M: MockStore + ?Sized,
{
    match store.find_match(burst).await? {
        Some(exchange) if exchange.responses.is_empty() => {
            debug!("matched exchange has no responses: name={}", exchange.name);
            Ok(MatchOutcome::Unmatched)
        }
        Some(exchange) => {
            debug!(
                "matched exchange: name={}, responses={}",
                exchange.name,
                exchange.responses.len()
            );
            Ok(MatchOutcome::Matched(exchange.responses))
        }
        None => {
            trace!("no recorded exchange: buffers={}, bytes={}", burst.len(), burst.total_len());
            Ok(MatchOutcome::Unmatched)
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::mock::{RecordedExchange, RecordedRequest, StoreError};

    struct Fixed(Result<Option<RecordedExchange>, &'static str>);

    #[async_trait]
    impl MockStore for Fixed {
        async fn find_match(&self, _burst: &RequestBurst) -> Result<Option<RecordedExchange>, StoreError> {
            self.0.clone().map_err(StoreError::new)
        }
    }

    fn burst() -> RequestBurst { RequestBurst::from(vec![Bytes::from_static(b"Q")]) }

    fn exchange(responses: Vec<ResponsePacket>) -> RecordedExchange {
        RecordedExchange::new("fixed", RecordedRequest::default(), responses)
    }

    #[tokio::test]
    async fn found_exchange_is_matched() {
        let packet = ResponsePacket::raw("UkQ=").expect("non-empty");
        let store = Fixed(Ok(Some(exchange(vec![packet.clone()]))));
        let outcome = match_burst(&store, &burst()).await.expect("lookup");
        assert_eq!(outcome, MatchOutcome::Matched(vec![packet]));
    }

    #[tokio::test]
    async fn missing_exchange_is_unmatched() {
        let outcome = match_burst(&Fixed(Ok(None)), &burst()).await.expect("lookup");
        assert_eq!(outcome, MatchOutcome::Unmatched);
    }

    #[tokio::test]
    async fn exchange_without_responses_is_unmatched() {
        let store = Fixed(Ok(Some(exchange(Vec::new()))));
        let outcome = match_burst(&store, &burst()).await.expect("lookup");
        assert!(!outcome.is_matched());
    }

    #[tokio::test]
    async fn store_failure_is_a_session_error() {
        let err = match_burst(&Fixed(Err("disk gone")), &burst())
            .await
            .expect_err("store failure");
        assert!(matches!(err, SessionError::Store(ref e) if e.to_string() == "disk gone"));
    }
}
