mod builder;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::Instrument;

pub use builder::*;

use crate::citation::extract_citations;
use crate::conversation::ChatRequest;
use crate::error::PipelineError;
use crate::event::{ChatEvent, Citation};
use crate::model_client::ModelClient;
use crate::prompt;
use crate::reformulate::Reformulator;
use crate::retrieval::RetrievalClient;

/// A complete answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Answer {
    /// The generated text, with `[n]` markers.
    pub text: String,
    /// The passages cited by the text.
    pub citations: Vec<Citation>,
}

/// The query pipeline: reformulate, retrieve, generate, cite.
///
/// A pipeline has no per-request state, a single instance can serve any
/// number of concurrent requests.
pub struct Pipeline {
    generator: ModelClient,
    retrieval: RetrievalClient,
    reformulator: Reformulator,
    system_prompt: String,
    retrieval_limit: usize,
    generation_timeout: Duration,
}

impl Pipeline {
    /// Answers a chat request.
    ///
    /// `on_chunk` receives the answer text as it is generated. If an error
    /// is returned after some chunks, those chunks are an incomplete answer.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future aborts the upstream requests.
    pub async fn answer(
        &self,
        request: ChatRequest,
        mut on_chunk: impl FnMut(String) + Send + 'static,
    ) -> Result<Answer, PipelineError> {
        let ChatRequest {
            message,
            history,
            attachments,
        } = request;
        if message.trim().is_empty() {
            return Err(PipelineError::BadRequest(
                "message is required".to_owned(),
            ));
        }

        let query = self.reformulator.reformulate(&message, &history).await;
        let chunks = self
            .retrieval
            .retrieve(&query, self.retrieval_limit)
            .await
            .map_err(PipelineError::Retrieval)?;
        debug!("retrieved {} excerpts for {query:?}", chunks.len());

        let req = prompt::build_request(
            &self.system_prompt,
            &chunks,
            &history,
            &message,
            &attachments,
        );
        let on_transcript = move |delta: String| {
            if !delta.is_empty() {
                on_chunk(delta);
            }
        };
        let resp = timeout(
            self.generation_timeout,
            self.generator.send_request(req, on_transcript),
        )
        .await
        .map_err(|_| PipelineError::Timeout(self.generation_timeout))?
        .map_err(PipelineError::Generation)?;

        let citations = extract_citations(&resp.transcript, &chunks);
        Ok(Answer {
            text: resp.transcript,
            citations,
        })
    }

    /// Answers a chat request, reporting progress as [`ChatEvent`]s.
    ///
    /// The events are chunks, then the citations if there are any, then
    /// `done`. On failure the last event is an `error` instead. Nothing
    /// is sent after the terminal event.
    pub async fn run(
        &self,
        request: ChatRequest,
        tx: &mpsc::UnboundedSender<ChatEvent>,
    ) {
        let chunk_tx = tx.clone();
        let on_chunk = move |text| {
            chunk_tx.send(ChatEvent::Chunk { text }).ok();
        };
        let result = self
            .answer(request, on_chunk)
            .instrument(debug_span!("chat request"))
            .await;

        match result {
            Ok(answer) => {
                if !answer.citations.is_empty() {
                    tx.send(ChatEvent::Citations {
                        data: answer.citations,
                    })
                    .ok();
                }
                tx.send(ChatEvent::Done).ok();
            }
            Err(err) => {
                error!("chat request failed: {err}");
                tx.send(err.to_event()).ok();
            }
        }
    }
}
