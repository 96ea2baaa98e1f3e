use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::errors::{NetworkErrorKind, StreamError, StreamResult};
use crate::models::payload::StreamPayload;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest partial line kept while waiting for its terminator
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Splits a byte stream into lines without assuming reads end on a line
/// boundary. Bytes are only decoded once a full line is buffered, so UTF-8
/// sequences split across reads come out intact.
///
/// A pending line that grows past the limit is dropped up to its next
/// newline.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to hold no newline
    scanned: usize,
    max_line: usize,
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
        }
    }

    /// Feed a chunk and return every line it completed, without terminators.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buf[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            if self.discarding {
                self.discarding = false;
            } else {
                lines.push(to_line(&self.buf[start..end]));
            }
            start = end + 1;
            from = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_line {
            warn!(
                "Dropping event-stream line longer than {} bytes",
                self.max_line
            );
            self.buf.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        lines
    }

    /// Whatever is left once the stream ends, as a final line.
    pub fn flush(&mut self) -> Option<String> {
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || self.buf.is_empty() {
            self.buf.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(to_line(&rest))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode one event-stream line.
///
/// `Ok(None)` for lines that carry nothing (non-`data:` lines, blank data,
/// the `[DONE]` sentinel); `Err(MalformedPayload)` when the data is not a
/// JSON object.
pub fn decode_line(line: &str) -> StreamResult<Option<StreamPayload>> {
    let Some(data) = line.trim().strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == DONE_SENTINEL {
        return Ok(None);
    }
    if !data.starts_with('{') {
        return Err(StreamError::MalformedPayload(format!(
            "expected a JSON object, got {:?}",
            truncate(data)
        )));
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| StreamError::MalformedPayload(e.to_string()))
}

fn truncate(data: &str) -> &str {
    match data.char_indices().nth(64) {
        Some((idx, _)) => &data[..idx],
        None => data,
    }
}

fn accept_line(line: &str) -> Option<StreamPayload> {
    match decode_line(line) {
        Ok(payload) => payload,
        Err(e) => {
            debug!("Skipping event-stream line: {}", e);
            None
        }
    }
}

/// Lazily turn a response body into decoded payloads, one per qualifying line.
///
/// The sequence ends with the body. A body error is yielded once and ends the
/// sequence; so does a gap longer than `idle_timeout` between reads.
pub fn read_payloads<S>(
    body: S,
    idle_timeout: Duration,
) -> impl Stream<Item = StreamResult<StreamPayload>>
where
    S: Stream<Item = StreamResult<Bytes>>,
{
    async_stream::try_stream! {
        let mut decoder = LineDecoder::new();
        futures::pin_mut!(body);

        loop {
            let next = tokio::time::timeout(idle_timeout, body.next())
                .await
                .map_err(|_| {
                    StreamError::network(
                        NetworkErrorKind::TimedOut,
                        format!("no data received for {:?}", idle_timeout),
                    )
                })?;
            let chunk = match next {
                Some(chunk) => chunk?,
                None => break,
            };
            for line in decoder.decode(&chunk) {
                if let Some(payload) = accept_line(&line) {
                    yield payload;
                }
            }
        }

        if let Some(line) = decoder.flush() {
            if let Some(payload) = accept_line(&line) {
                yield payload;
            }
        }
    }
}
