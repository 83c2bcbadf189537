use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};

use keri_chat_core::Answer;
use keri_chat_core::conversation::{ChatRequest, Turn};
use keri_chat_core::event::Citation;

use crate::client::{ChatClient, ClientError};
use crate::log::AskLog;

/// Number of characters of a cited passage shown in the sources list.
const EXCERPT_PREVIEW_CHARS: usize = 150;

/// A question to ask within a session.
#[derive(Clone, Debug, Default)]
pub struct Ask {
    /// The session the question belongs to.
    pub session_id: String,
    /// The question.
    pub question: String,
    /// Clears the session history before asking.
    pub reset_history: bool,
    /// History sent instead of the session's own for this question.
    pub history: Option<Vec<Turn>>,
}

impl Ask {
    /// Creates a question in the given session.
    #[inline]
    pub fn new<I, Q>(session_id: I, question: Q) -> Self
    where
        I: Into<String>,
        Q: Into<String>,
    {
        Self {
            session_id: session_id.into(),
            question: question.into(),
            ..Default::default()
        }
    }
}

/// A set of conversations with the chat API, keyed by session id.
///
/// Every session keeps its own history: after each answered question, the
/// question and the answer are appended to it, so that follow-ups can be
/// understood. Sessions don't affect each other.
pub struct SessionStore {
    client: ChatClient,
    log: Option<AskLog>,
    histories: Mutex<HashMap<String, Vec<Turn>>>,
}

impl SessionStore {
    /// Creates an empty store talking to the chat API through `client`.
    #[inline]
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            log: None,
            histories: Default::default(),
        }
    }

    /// Records every answered question in `log`.
    #[inline]
    pub fn with_log(mut self, log: AskLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Asks a question, streaming the answer to `on_chunk`.
    ///
    /// Failed questions leave the history untouched.
    pub async fn ask(
        &self,
        ask: Ask,
        on_chunk: impl FnMut(&str),
    ) -> Result<Answer, ClientError> {
        let Ask {
            session_id,
            question,
            reset_history,
            history,
        } = ask;

        if reset_history {
            self.reset(&session_id);
        }
        let history = history.unwrap_or_else(|| self.history(&session_id));

        let request = ChatRequest::new(question.clone(), history);
        let answer = self.client.chat(&request, on_chunk, |_| {}).await?;

        let turns = [
            Turn::user(question.as_str()),
            Turn::assistant(answer.text.as_str()),
        ];
        self.lock().entry(session_id).or_default().extend(turns);
        if let Some(log) = &self.log {
            log.record(&question, &answer.text, &answer.citations).await;
        }

        Ok(answer)
    }

    /// Returns the history of a session.
    pub fn history(&self, session_id: &str) -> Vec<Turn> {
        self.lock().get(session_id).cloned().unwrap_or_default()
    }

    /// Forgets the history of a session.
    pub fn reset(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Turn>>> {
        self.histories.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Formats an answer followed by its sources, one line per citation with
/// a preview of the cited passage.
pub fn format_answer(answer: &Answer) -> String {
    let mut text = answer.text.clone();
    if answer.citations.is_empty() {
        return text;
    }
    text.push_str("\n\n---\n**Sources:**\n");
    for citation in &answer.citations {
        writeln!(
            text,
            "- [{}] {}: {}",
            citation.number,
            citation.source,
            preview(citation)
        )
        .ok();
    }
    text
}

fn preview(citation: &Citation) -> String {
    let mut chars = citation.content.chars();
    let mut preview: String =
        chars.by_ref().take(EXCERPT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        preview.push_str("...");
    }
    preview
}
