//! Incremental decoder for the `data: <json>` event stream returned by
//! `streamGenerateContent?alt=sse`.
//!
//! Network reads split the body at arbitrary byte offsets, so the decoder keeps
//! the unterminated tail of the previous read and only decodes complete lines.
//! Lines are split on raw bytes, which keeps multi-byte UTF-8 sequences intact
//! across reads.

use tracing::debug;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one read's bytes and returns the events completed by it.
    /// Nothing is produced once `Done` has been seen.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let event = decode_line(&self.buffer[start..end]);
            start = end + 1;

            match event {
                Some(SseEvent::Done) => {
                    self.done = true;
                    self.buffer.clear();
                    events.push(SseEvent::Done);
                    return events;
                }
                Some(event) => events.push(event),
                None => {}
            }
        }

        self.buffer.drain(..start);
        events
    }

    /// Decodes whatever is left once the byte stream has ended, treating an
    /// unterminated last line as complete.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.done {
            return None;
        }
        self.done = true;
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

fn decode_line(line: &[u8]) -> Option<SseEvent> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Ok(line) = std::str::from_utf8(line) else {
        debug!("Skipping non UTF-8 stream line ({} bytes)", line.len());
        return None;
    };

    let data = line.strip_prefix(DATA_PREFIX)?;
    if data.trim_end() == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(json) => json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|text| SseEvent::Delta(text.to_string())),
        Err(e) => {
            debug!("Skipping unparseable stream line: {}", e);
            None
        }
    }
}
