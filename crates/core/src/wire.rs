//! Server-sent events framing of [`ChatEvent`]s.
//!
//! Each event is one `data: <json>\n\n` frame. The decoder is incremental:
//! bytes can be fed in arbitrary pieces, as they come off the network.

use bytes::Bytes;

use crate::event::ChatEvent;

/// Content type of a chat response.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

const DATA_PREFIX: &str = "data: ";

const FALLBACK_FRAME: &[u8] = b"data: {\"type\":\"error\",\
\"error\":\"Internal server error\",\"code\":\"INTERNAL_ERROR\"}\n\n";

/// Encodes an event as one SSE frame.
pub fn encode_frame(event: &ChatEvent) -> Bytes {
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("{DATA_PREFIX}{json}\n\n")),
        Err(err) => {
            error!("failed to serialize {event:?}: {err}");
            Bytes::from_static(FALLBACK_FRAME)
        }
    }
}

/// Incremental decoder of SSE frames into [`ChatEvent`]s.
///
/// Lines other than `data: ` lines are ignored, and so are frames whose
/// payload is not a valid event. A line split across reads is held back
/// until its newline arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes to the decoder and returns the events completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ChatEvent> {
        self.buf.extend_from_slice(bytes);

        // A newline byte never occurs inside a multi-byte UTF-8 sequence,
        // so complete lines can be decoded on their own.
        let Some(last_newline) = self.buf.iter().rposition(|b| *b == b'\n')
        else {
            return vec![];
        };
        let rest = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, rest);

        complete
            .split(|b| *b == b'\n')
            .filter_map(|line| decode_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Returns whether a partial line is waiting for more bytes.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }
}

fn decode_line(line: &str) -> Option<ChatEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        return None;
    }
    match ChatEvent::from_json(payload) {
        Ok(event) => {
            trace!("decoded event: {event:?}");
            Some(event)
        }
        Err(err) => {
            debug!("skipping malformed frame {payload:?}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Citation, ErrorCode};

    #[test]
    fn test_encode_frame() {
        let frame = encode_frame(&ChatEvent::Chunk {
            text: "Hello".to_owned(),
        });
        assert_eq!(&frame[..], b"data: {\"type\":\"chunk\",\"text\":\"Hello\"}\n\n");
        assert_eq!(&encode_frame(&ChatEvent::Done)[..], b"data: {\"type\":\"done\"}\n\n");
    }

    #[test]
    fn test_fallback_frame_is_valid() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(FALLBACK_FRAME);
        assert_eq!(
            events,
            vec![ChatEvent::Error {
                error: "Internal server error".to_owned(),
                code: Some(ErrorCode::InternalError.to_string()),
                detail: None,
            }]
        );
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"chunk\",\"text\":\"He").is_empty());
        assert!(decoder.has_pending());
        let events = decoder.push(b"llo\"}\n\n");
        assert_eq!(
            events,
            vec![ChatEvent::Chunk {
                text: "Hello".to_owned()
            }]
        );
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_split_utf8() {
        let frame = encode_frame(&ChatEvent::Chunk {
            text: "clé".to_owned(),
        });
        // Split in the middle of the two-byte "é".
        let split = frame.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frame[..split]).is_empty());
        assert_eq!(
            decoder.push(&frame[split..]),
            vec![ChatEvent::Chunk {
                text: "clé".to_owned()
            }]
        );
    }

    #[test]
    fn test_malformed_frames_skipped() {
        let mut decoder = FrameDecoder::new();
        let mut stream = Vec::new();
        stream.extend_from_slice(b"data: not-json\n\n");
        stream.extend_from_slice(b": keep-alive\n\n");
        stream.extend_from_slice(b"event: message\r\n");
        stream.extend_from_slice(b"data: {\"type\":\"ping\"}\n\n");
        stream.extend_from_slice(&encode_frame(&ChatEvent::Citations {
            data: vec![Citation {
                number: 1,
                content: "excerpt".to_owned(),
                source: "kid0001.md".to_owned(),
            }],
        }));
        stream.extend_from_slice(b"data: {\"type\":\"done\"}\r\n\r\n");

        let events = decoder.push(&stream);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ChatEvent::Citations { data } if data.len() == 1));
        assert_eq!(events[1], ChatEvent::Done);
    }
}
