//! Local fakes of the model provider and the retriever for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use keri_chat_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, RetrievalResult,
    Retriever,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl From<&PresetFailure> for Error {
    fn from(failure: &PresetFailure) -> Self {
        Self::new(failure.message.clone(), failure.kind)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            let event_idx = this.event_idx;
            this.event_idx += 1;
            if let Some(event) = this.events.get(event_idx) {
                return Poll::Ready(match event {
                    PresetEvent::MessageDelta(msg) => {
                        Ok(Some(ModelResponseEvent::MessageDelta(msg.clone())))
                    }
                    PresetEvent::Failure(failure) => Err(failure.into()),
                    PresetEvent::EndOfStream => {
                        this.event_idx = this.events.len() + 1;
                        Ok(None)
                    }
                });
            } else if event_idx == this.events.len() {
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            } else {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            }
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to queue the responses. Every request
/// consumes the response at the front of the queue. If there are no
/// responses left, an error will be returned.
///
/// Clones share the queue and the recorded requests, so a test can keep a
/// clone around to inspect what the code under test has sent.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    responses: Arc<Mutex<VecDeque<PresetResponse>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        lock(&self.responses).push_back(preset);
    }

    /// Sets the delay before every event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        lock(&self.requests).push(req.clone());
        let result = match lock(&self.responses).pop_front() {
            None => Err(Error::new("no enough responses", ErrorKind::Other)),
            Some(PresetResponse {
                failure: Some(failure),
                ..
            }) => Err((&failure).into()),
            Some(PresetResponse { events, .. }) => Ok(TestModelResponse {
                events,
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}

/// A local fake retriever for testing purpose.
///
/// Every call returns the same preset answer. Clones share the recorded
/// queries.
#[derive(Clone)]
pub struct TestRetriever {
    preset: PresetRetrieval,
    queries: Arc<Mutex<Vec<(String, usize)>>>,
}

impl TestRetriever {
    /// Creates a retriever that returns passages with the given contents
    /// and locations.
    pub fn with_passages<C, L>(passages: impl IntoIterator<Item = (C, L)>) -> Self
    where
        C: Into<String>,
        L: Into<String>,
    {
        let results = passages
            .into_iter()
            .map(|(content, location)| RetrievalResult {
                content: content.into(),
                location: Some(location.into()),
            })
            .collect();
        Self::with_preset(PresetRetrieval::Results(results))
    }

    #[inline]
    pub fn with_preset(preset: PresetRetrieval) -> Self {
        Self {
            preset,
            queries: Default::default(),
        }
    }

    /// Returns all `(query, limit)` pairs received so far.
    #[inline]
    pub fn queries(&self) -> Vec<(String, usize)> {
        lock(&self.queries).clone()
    }
}

impl Retriever for TestRetriever {
    type Error = crate::Error;

    fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RetrievalResult>, Self::Error>>
    + Send
    + 'static {
        lock(&self.queries).push((query.to_owned(), limit));
        let result = match &self.preset {
            PresetRetrieval::Results(results) => {
                Ok(results.iter().take(limit).cloned().collect())
            }
            PresetRetrieval::Failure(failure) => Err(failure.into()),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use keri_chat_model::ModelMessage;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> Result<String, Error> {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await?
                .unwrap();
            match event {
                ModelResponseEvent::Completed(_) => break,
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
            }
        }
        Ok(msg)
    }

    #[tokio::test]
    async fn test_send_request() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_deltas(["Hello, ", "world!"]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure".to_owned()),
            PresetEvent::Failure(PresetFailure::new(
                ErrorKind::RateLimitExceeded,
                "slow down",
            )),
        ]));

        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
        };
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await.unwrap(), "Hello, world!");

        let resp = provider.send_request(&req).await.unwrap();
        let err = collect_response(resp).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);

        // The script is exhausted.
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_retrieve() {
        let retriever = TestRetriever::with_passages([
            ("first", "s3://kb/a.md"),
            ("second", "s3://kb/b.md"),
        ]);
        let results = retriever.retrieve("query", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "first");
        assert_eq!(retriever.queries(), vec![("query".to_owned(), 1)]);

        let retriever = TestRetriever::with_preset(PresetRetrieval::Failure(
            PresetFailure::new(ErrorKind::AccessDenied, "denied"),
        ));
        let err = retriever.retrieve("query", 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }
}
