//! Server-sent event decoding for streaming chat responses.
//!
//! Both backends answer with `text/event-stream` bodies made of
//! `data: <payload>` lines, terminated by `data: [DONE]`. Byte chunks from
//! the transport do not align with lines, so input is buffered until a
//! newline arrives.

use futures::{Stream, StreamExt};

/// A decoded `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseData {
    /// Payload text, usually JSON.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk and collect every complete payload in it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseData> {
        self.line_buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(newline_index) = self.line_buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.line_buffer.drain(..=newline_index).collect::<Vec<_>>();
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            if let Some(data) = parse_line(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Option<SseData> {
        let line = std::mem::take(&mut self.line_buffer);
        parse_line(line.strip_suffix(b"\r").unwrap_or(&line))
    }
}

fn parse_line(line: &[u8]) -> Option<SseData> {
    let line = String::from_utf8_lossy(line);
    // `event:`, `id:`, `retry:` and `:` comments carry nothing we use.
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    if payload.trim_end() == "[DONE]" {
        return Some(SseData::Done);
    }
    Some(SseData::Data(payload.to_string()))
}

/// Decode a byte stream into payloads, stopping after `[DONE]`.
///
/// Transport errors are passed through; the stream ends after the first one.
pub fn decode<S, B, E>(bytes: S) -> impl Stream<Item = Result<SseData, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    futures::stream::unfold(
        (Box::pin(bytes), SseDecoder::new(), std::collections::VecDeque::new(), false),
        |(mut bytes, mut decoder, mut pending, mut ended)| async move {
            loop {
                if let Some(data) = pending.pop_front() {
                    if data == SseData::Done {
                        pending.clear();
                        ended = true;
                    }
                    return Some((Ok(data), (bytes, decoder, pending, ended)));
                }
                if ended {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(chunk.as_ref())),
                    Some(Err(e)) => {
                        ended = true;
                        return Some((Err(e), (bytes, decoder, pending, ended)));
                    }
                    None => {
                        ended = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        },
    )
}
