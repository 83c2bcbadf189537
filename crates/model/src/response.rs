use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::provider::ModelProviderError;

/// A streaming response from the model provider.
///
/// Text arrives as [`ModelResponseEvent::MessageDelta`] events, in order,
/// and the stream ends with a [`ModelResponseEvent::Completed`] event.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Polls for the next event of the response.
    ///
    /// - `Poll::Pending`: no event yet, the task is woken up when there
    ///   may be one.
    /// - `Poll::Ready(Ok(Some(event)))`: an event, more may follow.
    /// - `Poll::Ready(Ok(None))`: the response is over. Any further poll
    ///   returns this too.
    /// - `Poll::Ready(Err(error))`: the response broke, for example the
    ///   connection was lost or the provider reported an error mid-stream.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// The reason why a model response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model has finished generating text.
    Stop,
    /// The output was cut off by the token limit.
    Length,
}

/// The event from a model response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The response has been completed.
    Completed(ModelFinishReason),
    /// Received a message delta.
    MessageDelta(String),
}
