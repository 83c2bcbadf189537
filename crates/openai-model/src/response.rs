use std::pin::Pin;
use std::task::{Context, Poll, ready};

use keri_chat_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::ChatCompletionChunk;

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // This field will be cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
    finished: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            pending_finish_reason: None,
            finished: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    loop {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(SseError::ChunksError(err)) => {
                let kind = if err.timed_out {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::Other
                };
                return Err(Error::new(err.message, kind));
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            break;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if let Some(error) = chunk.error {
            return Err(Error::new(error.message.clone(), error.kind()));
        }
        if let Some(id) = chunk.id {
            if partial_state.id.get_or_insert_with(|| id.clone()) != &id {
                return Err(Error::new("chunk id mismatch", ErrorKind::Other));
            }
        }

        // Usage reports come without choices.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        if let Some(finish_reason) = choice.finish_reason {
            let finish_reason = if finish_reason == "length" {
                ModelFinishReason::Length
            } else {
                ModelFinishReason::Stop
            };
            partial_state.pending_finish_reason = Some(finish_reason);
            partial_state.finished = true;
        }

        // The order of events is important. Always emit the message delta
        // first, the pending finish reason is emitted on the next poll.
        match choice.delta.content {
            Some(content) if !content.is_empty() => {
                return Ok((
                    Some(ModelResponseEvent::MessageDelta(content)),
                    partial_state,
                ));
            }
            _ => {}
        }

        if let Some(finish_reason) = partial_state.pending_finish_reason.take()
        {
            return Ok((
                Some(ModelResponseEvent::Completed(finish_reason)),
                partial_state,
            ));
        }
    }

    if !partial_state.finished {
        return Err(Error::new(
            "stream ended before completion",
            ErrorKind::Other,
        ));
    }
    Ok((None, partial_state))
}
