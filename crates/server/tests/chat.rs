use std::future::pending;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use keri_chat_core::PipelineBuilder;
use keri_chat_core::event::{ChatEvent, Citation};
use keri_chat_core::wire::FrameDecoder;
use keri_chat_model::{
    ModelProvider, ModelRequest, ModelResponse, ModelResponseEvent,
};
use keri_chat_server::serve;
use keri_chat_test_model::{PresetResponse, TestModelProvider, TestRetriever};
use tokio::net::TcpListener;
use tokio::time::{Interval, interval, sleep};

/// A model that never stops talking and records when its response is
/// dropped.
struct EndlessProvider {
    dropped: Arc<AtomicBool>,
}

struct EndlessResponse {
    dropped: Arc<AtomicBool>,
    interval: Interval,
}

impl Drop for EndlessResponse {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl ModelResponse for EndlessResponse {
    type Error = keri_chat_test_model::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        ready!(this.interval.poll_tick(cx));
        Poll::Ready(Ok(Some(ModelResponseEvent::MessageDelta(
            "and more ".to_owned(),
        ))))
    }
}

impl ModelProvider for EndlessProvider {
    type Error = keri_chat_test_model::Error;
    type Response = EndlessResponse;

    fn send_request(
        &self,
        _req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let dropped = Arc::clone(&self.dropped);
        async move {
            Ok(EndlessResponse {
                dropped,
                interval: interval(Duration::from_millis(10)),
            })
        }
    }
}

async fn start<P: ModelProvider + 'static>(generator: P) -> SocketAddr {
    let retriever = TestRetriever::with_passages([
        (
            "Pre-rotation commits to the digest of the next key set.",
            "s3://keri-docs/spec/keri.md",
        ),
        ("Witnesses issue receipts.", "s3://keri-docs/spec/witness.md"),
    ]);
    let pipeline =
        Arc::new(PipelineBuilder::with_providers(generator, retriever).build());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, pipeline, pending()));
    addr
}

async fn post_chat(addr: SocketAddr, body: &'static str) -> Vec<ChatEvent> {
    let mut resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["cache-control"], "no-cache");
    // Hop-by-hop headers are left to the HTTP layer.
    assert!(resp.headers().get("connection").is_none());

    let mut decoder = FrameDecoder::new();
    let mut events = vec![];
    while let Some(chunk) = resp.chunk().await.unwrap() {
        events.extend(decoder.push(&chunk));
    }
    events
}

#[tokio::test]
async fn test_chat_stream() {
    let generator = TestModelProvider::default();
    generator.add_response(PresetResponse::with_deltas([
        "Pre-rotation ",
        "[1] is",
        "...",
    ]));
    let addr = start(generator).await;

    let events = post_chat(
        addr,
        r#"{"message": "What is pre-rotation?", "history": []}"#,
    )
    .await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Chunk {
                text: "Pre-rotation ".to_owned()
            },
            ChatEvent::Chunk {
                text: "[1] is".to_owned()
            },
            ChatEvent::Chunk {
                text: "...".to_owned()
            },
            ChatEvent::Citations {
                data: vec![Citation {
                    number: 1,
                    content:
                        "Pre-rotation commits to the digest of the next key set."
                            .to_owned(),
                    source: "keri.md".to_owned(),
                }],
            },
            ChatEvent::Done,
        ]
    );
}

#[tokio::test]
async fn test_bad_requests() {
    let generator = TestModelProvider::default();
    let addr = start(generator.clone()).await;

    for body in [r#"{"history": []}"#, "not json", r#"{"message": ""}"#] {
        let events = post_chat(addr, body).await;
        assert_eq!(events.len(), 1, "{body}");
        let ChatEvent::Error { code, .. } = &events[0] else {
            panic!("expected an error for {body}, got {events:?}");
        };
        assert_eq!(code.as_deref(), Some("BAD_REQUEST"));
    }
    assert!(generator.requests().is_empty());
}

#[tokio::test]
async fn test_disconnect_aborts_generation() {
    let dropped = Arc::new(AtomicBool::new(false));
    let addr = start(EndlessProvider {
        dropped: Arc::clone(&dropped),
    })
    .await;

    let mut resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat"))
        .header("content-type", "application/json")
        .body(r#"{"message": "What is KERI?"}"#)
        .send()
        .await
        .unwrap();

    let mut decoder = FrameDecoder::new();
    let mut events = vec![];
    while events.is_empty() {
        let chunk = resp.chunk().await.unwrap().unwrap();
        events.extend(decoder.push(&chunk));
    }
    assert!(matches!(events[0], ChatEvent::Chunk { .. }));
    assert!(!dropped.load(Ordering::SeqCst));

    drop(resp);
    for _ in 0..200 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_health() {
    let addr = start(TestModelProvider::default()).await;
    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["version"].is_string());
}
