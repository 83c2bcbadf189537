use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::time::Duration;

use keri_chat_core::Answer;
use keri_chat_core::conversation::ChatRequest;
use keri_chat_core::event::{ChatEvent, Citation, ErrorCode};
use keri_chat_core::wire::FrameDecoder;
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use tokio::time::timeout;

/// Default endpoint of the chat API.
pub const DEFAULT_URL: &str = "http://127.0.0.1:8787/api/chat";

/// Default deadline of a whole chat request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(55);

/// Why a chat request failed.
#[derive(Debug)]
pub enum ClientError {
    /// The connection failed or broke.
    Transport(reqwest::Error),
    /// The server rejected the request without starting a stream.
    Status {
        /// The HTTP status.
        status: StatusCode,
        /// The error message from the body, or the status itself.
        message: String,
    },
    /// The server answered with something other than an event stream.
    UnexpectedContentType(Option<String>),
    /// The server reported an error in the stream.
    Server {
        /// The error code, if the server sent a known one.
        code: Option<ErrorCode>,
        /// The error message.
        message: String,
        /// Guidance for the user.
        detail: Option<String>,
    },
    /// No complete answer arrived before the deadline.
    Timeout(Duration),
    /// The stream ended without `done` or `error`.
    ///
    /// Carries whatever arrived before the end, which may be a truncated
    /// answer.
    Incomplete(Answer),
}

impl ClientError {
    /// Returns the error code closest to this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Server {
                code: Some(code), ..
            } => *code,
            ClientError::Timeout(_) => ErrorCode::Timeout,
            ClientError::Status { status, .. }
                if *status == StatusCode::TOO_MANY_REQUESTS =>
            {
                ErrorCode::Throttled
            }
            ClientError::Status { status, .. }
                if *status == StatusCode::BAD_REQUEST =>
            {
                ErrorCode::BadRequest
            }
            _ => ErrorCode::InternalError,
        }
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(err) => write!(f, "request failed: {err}"),
            ClientError::Status { message, .. } => {
                write!(f, "chat API error: {message}")
            }
            ClientError::UnexpectedContentType(content_type) => write!(
                f,
                "unexpected content type {content_type:?}, expected \
                 text/event-stream, check the chat API URL"
            ),
            ClientError::Server {
                code,
                message,
                detail,
            } => {
                let code = code.map_or("UNKNOWN", ErrorCode::as_str);
                write!(f, "chat API error [{code}]: {message}")?;
                if let Some(detail) = detail {
                    write!(f, " ({detail})")?;
                }
                Ok(())
            }
            ClientError::Timeout(deadline) => {
                write!(f, "no answer within {deadline:?}")
            }
            ClientError::Incomplete(_) => {
                write!(f, "the answer stream ended unexpectedly")
            }
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err)
    }
}

/// A client of the streaming chat API.
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: Client,
    url: String,
    timeout: Duration,
}

impl ChatClient {
    /// Creates a client for the chat API at `url`.
    #[inline]
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self::with_client(Client::new(), url)
    }

    /// Creates a client sharing an existing HTTP client.
    #[inline]
    pub fn with_client<S: Into<String>>(http: Client, url: S) -> Self {
        Self {
            http,
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the deadline of a whole request, streaming included.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends a chat request and reads the answer stream to the end.
    ///
    /// `on_chunk` receives the answer text as it arrives, `on_citations`
    /// the cited sources once the text is complete.
    pub async fn chat(
        &self,
        request: &ChatRequest,
        on_chunk: impl FnMut(&str),
        on_citations: impl FnMut(&[Citation]),
    ) -> Result<Answer, ClientError> {
        timeout(
            self.timeout,
            self.chat_inner(request, on_chunk, on_citations),
        )
        .await
        .map_err(|_| ClientError::Timeout(self.timeout))?
    }

    async fn chat_inner(
        &self,
        request: &ChatRequest,
        mut on_chunk: impl FnMut(&str),
        mut on_citations: impl FnMut(&[Citation]),
    ) -> Result<Answer, ClientError> {
        let resp = self
            .http
            .post(&self.url)
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let mut resp = check_response(resp).await?;

        let mut decoder = FrameDecoder::new();
        let mut answer = Answer {
            text: String::new(),
            citations: vec![],
        };
        while let Some(bytes) = resp.chunk().await? {
            for event in decoder.push(&bytes) {
                match event {
                    ChatEvent::Chunk { text } => {
                        on_chunk(&text);
                        answer.text.push_str(&text);
                    }
                    ChatEvent::Citations { data } => {
                        on_citations(&data);
                        answer.citations = data;
                    }
                    ChatEvent::Error {
                        error,
                        code,
                        detail,
                    } => {
                        return Err(ClientError::Server {
                            code: code.and_then(|code| code.parse().ok()),
                            message: error,
                            detail,
                        });
                    }
                    ChatEvent::Done => return Ok(answer),
                }
            }
        }

        warn!("the answer stream ended without a terminal event");
        Err(ClientError::Incomplete(answer))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
}

fn is_event_stream(resp: &Response) -> bool {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Mime>().ok())
        .is_some_and(|m| m.subtype().as_str() == "event-stream")
}

async fn check_response(resp: Response) -> Result<Response, ClientError> {
    if is_event_stream(&resp) {
        // Errors are reported inside the stream, whatever the status.
        return Ok(resp);
    }

    let status = resp.status();
    if status.is_success() {
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        return Err(ClientError::UnexpectedContentType(content_type));
    }

    let body = resp.text().await.unwrap_or_default();
    debug!("chat request failed with {status}: {body}");
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| {
            let non_empty = |message: &String| !message.is_empty();
            body.error.filter(non_empty).or(body.detail.filter(non_empty))
        })
        .unwrap_or_else(|| format!("HTTP {status}"));
    Err(ClientError::Status { status, message })
}
