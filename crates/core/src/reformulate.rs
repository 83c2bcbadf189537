use std::time::Duration;

use keri_chat_model::{ModelMessage, ModelRequest};
use tokio::time::timeout;

use crate::conversation::Turn;
use crate::model_client::ModelClient;

const REFORMULATION_PROMPT: &str = "You rewrite search queries. Given a \
conversation and a follow-up question, rewrite the follow-up as a standalone \
search query that carries all the context it needs from the conversation. \
Reply with the query only, without any other text.";

/// Turns follow-up questions into standalone search queries.
///
/// Reformulation never fails: whenever the model can't produce a query,
/// the question itself is used.
#[derive(Clone)]
pub(crate) struct Reformulator {
    client: ModelClient,
    timeout: Duration,
}

impl Reformulator {
    #[inline]
    pub fn new(client: ModelClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn reformulate(&self, question: &str, history: &[Turn]) -> String {
        if history.is_empty() {
            return question.to_owned();
        }

        let messages = history
            .iter()
            .map(ModelMessage::from)
            .chain([ModelMessage::User(question.to_owned())]);
        let req = ModelRequest::with_system_prompt(REFORMULATION_PROMPT, messages);

        match timeout(self.timeout, self.client.send_request(req, |_| {})).await {
            Ok(Ok(resp)) => {
                let query = resp.transcript.trim();
                if query.is_empty() {
                    warn!("reformulation returned nothing, using the question");
                    question.to_owned()
                } else {
                    debug!("reformulated query: {query}");
                    query.to_owned()
                }
            }
            Ok(Err(err)) => {
                warn!("reformulation failed, using the question: {err}");
                question.to_owned()
            }
            Err(_) => {
                warn!(
                    "reformulation timed out after {:?}, using the question",
                    self.timeout
                );
                question.to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use keri_chat_model::ErrorKind;
    use keri_chat_test_model::{
        PresetFailure, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn reformulator(provider: &TestModelProvider) -> Reformulator {
        Reformulator::new(
            ModelClient::new(provider.clone()),
            Duration::from_secs(15),
        )
    }

    fn history() -> Vec<Turn> {
        vec![
            Turn::user("What is KERI?"),
            Turn::assistant("KERI is a key event receipt infrastructure [1]."),
        ]
    }

    #[tokio::test]
    async fn test_empty_history_skips_model() {
        let provider = TestModelProvider::default();
        let query = reformulator(&provider)
            .reformulate("What is pre-rotation?", &[])
            .await;
        assert_eq!(query, "What is pre-rotation?");
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_reformulate() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_deltas([
            "  How do KERI ",
            "witnesses work?\n",
        ]));
        let query = reformulator(&provider)
            .reformulate("And witnesses?", &history())
            .await;
        assert_eq!(query, "How do KERI witnesses work?");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 4);
        assert!(matches!(&messages[0], ModelMessage::System(_)));
        assert_eq!(messages[1], ModelMessage::User("What is KERI?".to_owned()));
        assert_eq!(messages[3], ModelMessage::User("And witnesses?".to_owned()));
    }

    #[tokio::test]
    async fn test_fallbacks() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_failure(PresetFailure::new(
            ErrorKind::AccessDenied,
            "AccessDeniedException",
        )));
        provider.add_response(PresetResponse::with_deltas(["   "]));
        let reformulator = reformulator(&provider);

        for _ in 0..2 {
            let query = reformulator.reformulate("And witnesses?", &history()).await;
            assert_eq!(query, "And witnesses?");
        }
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let mut provider = TestModelProvider::default();
        provider.set_delay(Duration::from_secs(60));
        provider.add_response(PresetResponse::with_deltas(["too late"]));
        let query = reformulator(&provider)
            .reformulate("And witnesses?", &history())
            .await;
        assert_eq!(query, "And witnesses?");
    }
}
