//! Line framing for the relay's response stream.
//!
//! Every chunk is written as `<code>:<json>\n`. Text is code `0`, errors are
//! code `3` and the terminal finish metadata is code `d`. Lines with any other
//! code are skipped by the decoder.

use crate::{FinishMetadata, StreamChunk};
use thiserror::Error;

const TEXT: &str = "0";
const ERROR: &str = "3";
const FINISH: &str = "d";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("stream line is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("stream line has no type prefix: {0:?}")]
    MissingPrefix(String),
    #[error("malformed payload for stream part '{code}': {source}")]
    Payload {
        code: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StreamChunk {
    /// Encode as a single newline-terminated frame.
    pub fn encode(&self) -> String {
        let (code, payload) = match self {
            StreamChunk::Text(delta) => (TEXT, serde_json::Value::from(delta.as_str())),
            StreamChunk::Error(message) => (ERROR, serde_json::Value::from(message.as_str())),
            StreamChunk::Finish(meta) => (
                FINISH,
                serde_json::to_value(meta).unwrap_or(serde_json::Value::Null),
            ),
        };
        format!("{code}:{payload}\n")
    }

    /// Decode a single line (without its trailing newline). Unknown part codes
    /// yield `Ok(None)`.
    pub fn decode(line: &str) -> Result<Option<Self>, FrameError> {
        let (code, payload) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MissingPrefix(line.to_string()))?;
        let payload_error = |source| FrameError::Payload {
            code: code.to_string(),
            source,
        };
        let chunk = match code {
            TEXT => StreamChunk::Text(serde_json::from_str(payload).map_err(payload_error)?),
            ERROR => StreamChunk::Error(serde_json::from_str(payload).map_err(payload_error)?),
            FINISH => StreamChunk::Finish(
                serde_json::from_str::<FinishMetadata>(payload).map_err(payload_error)?,
            ),
            _ => return Ok(None),
        };
        Ok(Some(chunk))
    }
}

/// Incremental decoder for a byte stream of frames.
///
/// Network reads can split a line, or a multi-byte character, anywhere; bytes
/// are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every chunk completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, FrameError>> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if let Some(chunk) = Self::decode_line(line).transpose() {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Result<StreamChunk, FrameError>> {
        let line = std::mem::take(&mut self.buffer);
        Self::decode_line(line).transpose()
    }

    fn decode_line(mut line: Vec<u8>) -> Result<Option<StreamChunk>, FrameError> {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let line = String::from_utf8(line)?;
        StreamChunk::decode(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Usage};

    #[test]
    fn text_frames_escape_newlines_and_quotes() {
        let chunk = StreamChunk::Text("line one\nsaid \"hi\"".to_string());
        assert_eq!(chunk.encode(), "0:\"line one\\nsaid \\\"hi\\\"\"\n");
    }

    #[test]
    fn finish_frame_uses_camel_case_fields() {
        let chunk = StreamChunk::Finish(FinishMetadata {
            finish_reason: FinishReason::ContentFilter,
            usage: Some(Usage {
                prompt_tokens: 12,
                completion_tokens: 30,
            }),
        });
        assert_eq!(
            chunk.encode(),
            "d:{\"finishReason\":\"content-filter\",\"usage\":{\"promptTokens\":12,\"completionTokens\":30}}\n"
        );
    }

    #[test]
    fn decoder_reassembles_lines_split_across_reads() {
        let mut stream = String::new();
        stream.push_str(&StreamChunk::Text("Hello, ".to_string()).encode());
        stream.push_str(&StreamChunk::Text("wörld 👋".to_string()).encode());
        stream.push_str(
            &StreamChunk::Finish(FinishMetadata {
                finish_reason: FinishReason::Stop,
                usage: None,
            })
            .encode(),
        );
        let bytes = stream.as_bytes();

        // Split every 3 bytes, which cuts through both the emoji and the umlaut.
        let mut decoder = FrameDecoder::new();
        let mut chunks = Vec::new();
        for piece in bytes.chunks(3) {
            for chunk in decoder.push(piece) {
                chunks.push(chunk.unwrap());
            }
        }
        assert!(decoder.finish().is_none());
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("Hello, ".to_string()),
                StreamChunk::Text("wörld 👋".to_string()),
                StreamChunk::Finish(FinishMetadata {
                    finish_reason: FinishReason::Stop,
                    usage: None,
                }),
            ]
        );
    }

    #[test]
    fn decoder_skips_unknown_parts_and_blank_lines() {
        let mut decoder = FrameDecoder::new();
        let chunks = decoder.push(b"f:{\"messageId\":\"m1\"}\n\n0:\"ok\"\r\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap(), &StreamChunk::Text("ok".to_string()));
    }

    #[test]
    fn decoder_flushes_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"3:\"provider went away\"").is_empty());
        let tail = decoder.finish().unwrap().unwrap();
        assert_eq!(tail, StreamChunk::Error("provider went away".to_string()));
    }

    #[test]
    fn malformed_lines_are_reported_not_dropped() {
        let mut decoder = FrameDecoder::new();
        let chunks = decoder.push(b"no prefix here\n0:not-json\n");
        assert!(matches!(chunks[0], Err(FrameError::MissingPrefix(_))));
        assert!(matches!(&chunks[1], Err(FrameError::Payload { code, .. }) if code == "0"));
    }

    #[test]
    fn unfamiliar_finish_reason_decodes_as_unknown() {
        let chunk = StreamChunk::decode(r#"d:{"finishReason":"brand-new"}"#).unwrap();
        assert_eq!(
            chunk,
            Some(StreamChunk::Finish(FinishMetadata {
                finish_reason: FinishReason::Unknown,
                usage: None,
            }))
        );
    }
}
