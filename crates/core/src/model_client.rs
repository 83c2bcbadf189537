use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use keri_chat_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Box<dyn FnMut(String) + Send + 'static>)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub(crate) struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_transcript| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_transcript).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the response.
    ///
    /// `on_transcript` is called with every message delta, in order.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_transcript: impl FnMut(String) + Send + 'static,
    ) -> SendRequestResult {
        (self.handler_fn)(req, Box::new(on_transcript)).await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub(crate) struct ModelClientResponse {
    pub transcript: String,
    /// The reason the model finished generating.
    pub finish_reason: ModelFinishReason,
}

/// The response stream ended before the model reported completion.
#[derive(Debug)]
pub(crate) struct IncompleteResponseError;

impl Display for IncompleteResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream ended before completion")
    }
}

impl StdError for IncompleteResponseError {}

impl ModelProviderError for IncompleteResponseError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    mut on_transcript: Box<dyn FnMut(String) + Send + 'static>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut transcript = String::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                transcript.push_str(&msg);
                on_transcript(msg);
            }
            ModelResponseEvent::Completed(reason) => {
                if reason == ModelFinishReason::Length {
                    warn!("the answer was cut off by the token limit");
                }
                finish_reason = Some(reason);
            }
        }
    }

    let Some(finish_reason) = finish_reason else {
        error!("the response ended before completion");
        return Err(Box::new(IncompleteResponseError));
    };

    trace!("finished a request");

    Ok(ModelClientResponse {
        transcript,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use keri_chat_model::ModelMessage;
    use keri_chat_test_model::{
        PresetEvent, PresetFailure, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let model_provider = TestModelProvider::default();
        for _ in 0..3 {
            model_provider.add_response(PresetResponse::with_deltas([
                "How ", "are ", "you?",
            ]));
        }

        let model_client = ModelClient::new(model_provider.clone());

        for _ in 0..3 {
            let deltas = Arc::new(Mutex::new(Vec::new()));
            let resp = model_client
                .send_request(request(), {
                    let deltas = Arc::clone(&deltas);
                    move |delta| deltas.lock().unwrap().push(delta)
                })
                .await
                .unwrap();
            assert_eq!(resp.transcript, "How are you?");
            assert_eq!(resp.finish_reason, ModelFinishReason::Stop);
            assert_eq!(*deltas.lock().unwrap(), vec!["How ", "are ", "you?"]);
        }
        assert_eq!(model_provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Partial".to_owned()),
            PresetEvent::Failure(PresetFailure::new(
                ErrorKind::RateLimitExceeded,
                "ThrottlingException: slow down",
            )),
        ]));
        let model_client = ModelClient::new(model_provider);

        let err = model_client
            .send_request(request(), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);

        // Nothing left in the script.
        let resp_or_err = model_client.send_request(request(), |_| {}).await;
        assert!(matches!(resp_or_err, Err(_)));
    }

    #[tokio::test]
    async fn test_response_ends_before_completion() {
        let model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Partial".to_owned()),
            PresetEvent::EndOfStream,
        ]));
        let model_client = ModelClient::new(model_provider);

        let err = model_client
            .send_request(request(), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "stream ended before completion");
    }
}
