//! Decoder for the chat-completions event stream
//!
//! The body arrives as `data: {json}` lines that may be split at any byte
//! across network chunks. Bytes are buffered until a full line is available,
//! so multi-byte characters straddling a chunk boundary survive.

use super::LlmError;
use serde::Deserialize;

/// One decoded event
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// A non-empty text fragment
    Delta(String),
    /// `data: [DONE]`
    Done,
    /// An error object delivered inside the stream
    Error(LlmError),
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

    /// Feed a network chunk; returns every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamItem> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut items = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(item) = decode_line(&line) {
                let is_done = matches!(item, StreamItem::Done);
                items.push(item);
                if is_done {
                    self.done = true;
                    self.buffer.clear();
                    break;
                }
            }
        }
        items
    }

    /// Flush a trailing line that arrived without a newline
    pub fn finish(&mut self) -> Vec<StreamItem> {
        if self.done || self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.done = true;
        decode_line(&line).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<StreamItem> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    // Comments, `event:` and `id:` lines carry nothing for us
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(StreamItem::Done);
    }

    match serde_json::from_str::<ChunkPayload>(payload) {
        Ok(ChunkPayload {
            error: Some(error), ..
        }) => Some(StreamItem::Error(LlmError::server_error(format!(
            "Stream error: {}",
            error.message
        )))),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map(StreamItem::Delta),
        Err(e) => {
            tracing::debug!(error = %e, line = %payload, "Skipping malformed stream fragment");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}
