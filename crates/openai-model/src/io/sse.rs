use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    // Trailing bytes of a UTF-8 sequence that was split across chunks.
    partial_utf8: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            partial_utf8: Vec::new(),
            chunks,
        }
    }

    /// Reads the data of the next event.
    ///
    /// Returns `None` once the stream is exhausted. Data left in the buffer
    /// without a terminating blank line is discarded.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // There may be complete events left from the previous read.
            if let Some(event) = self.try_parse_event() {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.partial_utf8.extend_from_slice(bytes);
        let valid_len = match str::from_utf8(&self.partial_utf8) {
            Ok(_) => self.partial_utf8.len(),
            // `error_len` is `None` when the input ends in the middle of a
            // sequence, so more bytes may complete it.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.partial_utf8.split_off(valid_len);
        let valid = std::mem::replace(&mut self.partial_utf8, rest);
        let s = String::from_utf8(valid).map_err(|_| Error::InvalidPayload)?;
        if s.contains('\r') {
            self.buf.push_str(&s.replace("\r\n", "\n"));
        } else {
            self.buf.push_str(&s);
        }
        Ok(())
    }

    fn try_parse_event(&mut self) -> Option<String> {
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        //
        // Only `data` fields are kept. Blocks without any (keep-alive
        // comments, for example) are skipped.
        loop {
            let eol_idx = self.buf.find("\n\n")?;
            let block: String = self.buf.drain(0..eol_idx + 2).collect();

            let mut data: Option<String> = None;
            for line in block.lines() {
                if line.starts_with(':') {
                    continue;
                }
                let (name, value) = match line.split_once(':') {
                    Some((name, value)) => {
                        (name, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                if name != "data" {
                    continue;
                }
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }

            if data.is_some() {
                return data;
            }
        }
    }
}
