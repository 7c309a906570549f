// crates/core/src/channel/sse.rs
//! Incremental `text/event-stream` frame decoder.
//!
//! Bytes arrive in arbitrary chunks from the transport. Lines are buffered
//! as raw bytes and only decoded once complete, so a chunk boundary inside a
//! multi-byte character or between `\r` and `\n` is harmless. A line that
//! grows past the limit without a terminator poisons the decoder; the caller
//! drops the connection.

use std::time::Duration;

use crate::error::ProtocolError;

/// Longest line buffered while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Last event id seen on this stream.
    pub id: Option<String>,
}

/// Stateful decoder for one stream connection.
#[derive(Debug)]
pub struct SseDecoder {
    line: Vec<u8>,
    max_line: usize,
    overflow: Option<ProtocolError>,
    after_cr: bool,
    started: bool,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
    retry: Option<Duration>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_line_limit(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_limit(max_line: usize) -> Self {
        Self {
            line: Vec::new(),
            max_line,
            overflow: None,
            after_cr: false,
            started: false,
            event: None,
            data: Vec::new(),
            last_id: None,
            retry: None,
        }
    }

    /// Feed a chunk, returning every frame it completes, in order.
    ///
    /// Frames completed before a line overflow are still returned; after it
    /// the decoder ignores all input and [`Self::overflow`] reports why.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if self.overflow.is_some() {
            return frames;
        }
        for &byte in chunk {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut frames),
                b'\r' => {
                    self.after_cr = true;
                    self.end_line(&mut frames);
                }
                _ => {
                    if self.line.len() >= self.max_line {
                        self.line = Vec::new();
                        self.overflow = Some(ProtocolError::LineTooLong {
                            limit: self.max_line,
                        });
                        break;
                    }
                    self.line.push(byte);
                }
            }
        }
        frames
    }

    /// Set once a line outgrew the limit.
    pub fn overflow(&self) -> Option<&ProtocolError> {
        self.overflow.as_ref()
    }

    /// Reconnection delay requested by the server, if it sent one since the
    /// last call.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    fn end_line(&mut self, frames: &mut Vec<SseFrame>) {
        let raw = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&raw).into_owned();
        if !self.started {
            self.started = true;
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }

        if line.is_empty() {
            self.dispatch(frames);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, frames: &mut Vec<SseFrame>) {
        let event = self.event.take();
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        frames.push(SseFrame {
            event,
            data,
            id: self.last_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: Some(event.to_string()),
            data: data.to_string(),
            id: None,
        }
    }

    #[test]
    fn test_decodes_named_events() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(
            b"event: hello\ndata: {\"status\": \"queued\"}\n\nevent: log\ndata: \"line A\"\n\n",
        );
        assert_eq!(
            frames,
            vec![
                frame("hello", "{\"status\": \"queued\"}"),
                frame("log", "\"line A\""),
            ]
        );
    }

    #[test]
    fn test_frames_split_across_chunks() {
        let input = "event: status\r\ndata: {\"message\": \"Relatório pronto\"}\r\n\r\n";
        let bytes = input.as_bytes();
        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        // One byte at a time: splits the CRLF pairs and the multi-byte 'ó'.
        for b in bytes {
            frames.extend(decoder.feed(std::slice::from_ref(b)));
        }
        assert_eq!(
            frames,
            vec![frame("status", "{\"message\": \"Relatório pronto\"}")]
        );
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keepalive\ndata: first\ndata:second\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: None,
                data: "first\nsecond".to_string(),
                id: None,
            }]
        );
    }

    #[test]
    fn test_event_without_data_is_not_dispatched() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: done\n\n").is_empty());
        // The event name does not leak into the next frame.
        let frames = decoder.feed(b"data: x\n\n");
        assert_eq!(frames[0].event, None);
    }

    #[test]
    fn test_incomplete_frame_is_held_back() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: log\ndata: \"partial\"\n").is_empty());
        let frames = decoder.feed(b"\n");
        assert_eq!(frames, vec![frame("log", "\"partial\"")]);
    }

    #[test]
    fn test_retry_and_id_fields() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"retry: 1500\nid: 7\nevent: ping\ndata: {}\n\nretry: soon\n");
        assert_eq!(decoder.take_retry(), Some(Duration::from_millis(1500)));
        assert_eq!(decoder.take_retry(), None);
        assert_eq!(frames[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_leading_bom_is_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed("\u{feff}event: hello\ndata: {}\n\n".as_bytes());
        assert_eq!(frames, vec![frame("hello", "{}")]);
    }

    #[test]
    fn test_overlong_line_poisons_decoder() {
        let mut decoder = SseDecoder::with_line_limit(16);
        let frames = decoder.feed(b"event: log\ndata: \"ok\"\n\ndata: 0123456789abcdefXYZ");
        // The frame finished before the runaway line still comes out.
        assert_eq!(frames, vec![frame("log", "\"ok\"")]);
        assert_eq!(
            decoder.overflow(),
            Some(&ProtocolError::LineTooLong { limit: 16 })
        );
        assert!(decoder.feed(b"\n\nevent: log\ndata: \"late\"\n\n").is_empty());
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let mut decoder = SseDecoder::with_line_limit(16);
        // "data: 0123456789" is exactly 16 bytes.
        let frames = decoder.feed(b"data: 0123456789\n\n");
        assert_eq!(frames[0].data, "0123456789");
        assert!(decoder.overflow().is_none());
    }
}
