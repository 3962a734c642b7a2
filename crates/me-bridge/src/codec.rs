//! Newline-delimited JSON frame codec.
//!
//! Byte chunks arrive with arbitrary boundaries; the codec buffers the
//! unterminated suffix between pushes and emits one parsed value per
//! complete line. A malformed line is logged and dropped without affecting
//! subsequent lines.

use me_types::AppResult;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Push-based decoder for newline-delimited JSON frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buf: Vec<u8>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every complete frame it finished.
    ///
    /// The buffer holds at most one unterminated line fragment between
    /// calls.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];

            let text = String::from_utf8_lossy(line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => frames.push(value),
                Err(e) => {
                    warn!("Dropping malformed JSON line: {} (line: {})", e, trimmed);
                }
            }
        }
        frames
    }

    /// Serialize one object as a single line terminated by exactly one `\n`.
    pub fn encode<T: Serialize>(value: &T) -> AppResult<String> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');
        Ok(line)
    }

    /// Bytes of a pending unterminated fragment, if any.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_across_chunk_boundary() {
        let mut codec = FrameCodec::new();

        let first = codec.push(b"{\"a\":1}\n{\"b\":2");
        assert_eq!(first, vec![json!({"a": 1})]);
        assert!(codec.pending_len() > 0);

        let second = codec.push(b"}\n");
        assert_eq!(second, vec![json!({"b": 2})]);
        assert_eq!(codec.pending_len(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut codec = FrameCodec::new();
        let frames = codec.push(b"{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n");
        assert_eq!(frames, vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})]);
    }

    #[test]
    fn test_malformed_line_dropped_without_affecting_neighbors() {
        let mut codec = FrameCodec::new();
        let frames = codec.push(b"{\"ok\":1}\nnot json at all\n{\"ok\":2}\n");
        assert_eq!(frames, vec![json!({"ok": 1}), json!({"ok": 2})]);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut codec = FrameCodec::new();
        let frames = codec.push(b"\n  \n{\"x\":true}\n\n");
        assert_eq!(frames, vec![json!({"x": true})]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut codec = FrameCodec::new();
        let input = b"{\"n\":42}\n";
        let mut frames = Vec::new();
        for byte in input {
            frames.extend(codec.push(&[*byte]));
        }
        assert_eq!(frames, vec![json!({"n": 42})]);
    }

    #[test]
    fn test_encode_appends_single_newline() {
        let line = FrameCodec::encode(&json!({"a": 1})).unwrap();
        assert!(line.ends_with('\n'));
        assert!(!line.ends_with("\n\n"));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
