//! Server-Sent Events framing.
//!
//! Incoming chunks are appended to a buffer and complete frames (blocks
//! terminated by a blank line) are drained out. Trailing partial frames
//! stay buffered for the next chunk. A partial frame left when the body
//! ends is discarded, never dispatched.

/// One dispatched SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Server-requested reconnection delay, milliseconds.
    pub retry: Option<u64>,
}

impl SseFrame {
    fn is_empty(&self) -> bool {
        self.id.is_none() && self.event.is_none() && self.data.is_empty() && self.retry.is_none()
    }
}

/// Incremental decoder: bytes in, frames out.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    /// Bytes of a UTF-8 sequence split across chunks.
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                // Invalid bytes mid-stream; keep going with replacement chars.
                let lossy = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                self.buffer.push_str(&lossy);
                return drain_frames(&mut self.buffer);
            }
        };
        let rest = self.pending.split_off(valid);
        let complete = std::mem::replace(&mut self.pending, rest);
        match String::from_utf8(complete) {
            Ok(s) => self.buffer.push_str(&s),
            Err(e) => self.buffer.push_str(&String::from_utf8_lossy(e.as_bytes())),
        }
        drain_frames(&mut self.buffer)
    }

    /// Whether a partial frame is waiting for more bytes.
    pub fn has_partial(&self) -> bool {
        !self.buffer.trim().is_empty() || !self.pending.is_empty()
    }
}

/// Extract complete frames from an SSE buffer, in order.
///
/// Handles `\n` and `\r\n` line endings, multi-line `data:`, and `:`
/// comment lines (heartbeats), which produce no frame.
pub(crate) fn drain_frames(buffer: &mut String) -> Vec<SseFrame> {
    if buffer.contains('\r') {
        *buffer = buffer.replace("\r\n", "\n");
    }

    let mut frames = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2); // remove the \n\n delimiter

        if let Some(frame) = parse_block(&block) {
            frames.push(frame);
        }
    }
    frames
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => frame.event = Some(value.to_string()).filter(|v| !v.is_empty()),
            // Ids containing NUL are ignored.
            "id" if !value.contains('\0') => frame.id = Some(value.to_string()),
            "retry" => frame.retry = value.trim().parse().ok(),
            _ => {}
        }
    }

    frame.data = data_lines.join("\n");
    (!frame.is_empty()).then_some(frame)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_frame() {
        let mut buf = String::from("id: 7\nevent: CONVERSATION_MESSAGE\ndata: {\"hello\":\"world\"}\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(
            frames,
            vec![SseFrame {
                id: Some("7".into()),
                event: Some("CONVERSATION_MESSAGE".into()),
                data: "{\"hello\":\"world\"}".into(),
                retry: None,
            }]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_frames_in_order() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        let frames = drain_frames(&mut buf);
        let data: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["first", "second"]);
    }

    #[test]
    fn partial_frame_stays_in_buffer() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn multi_line_data_is_joined() {
        let mut buf = String::from("data: line one\ndata: line two\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn crlf_line_endings() {
        let mut buf = String::from("id: 1\r\ndata: x\r\n\r\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames[0].id.as_deref(), Some("1"));
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn comments_are_heartbeats_only() {
        let mut buf = String::from(": keep-alive\n\n:ping\n\n");
        assert!(drain_frames(&mut buf).is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn retry_and_id_only_frames_are_kept() {
        let mut buf = String::from("retry: 2500\n\nid: 42\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames[0].retry, Some(2500));
        assert_eq!(frames[1].id.as_deref(), Some("42"));
        assert!(frames[1].data.is_empty());
    }

    #[test]
    fn value_keeps_inner_whitespace() {
        let mut buf = String::from("data:  two spaces\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames[0].data, " two spaces");
    }

    #[test]
    fn decoder_handles_split_utf8_and_delimiters() {
        let mut dec = SseDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();
        // split inside the two-byte 'é'
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(dec.push(&bytes[..split]).is_empty());
        assert!(dec.has_partial());
        let frames = dec.push(&bytes[split..]);
        assert_eq!(frames[0].data, "héllo");
        assert!(!dec.has_partial());
    }

    #[test]
    fn decoder_joins_crlf_split_across_chunks() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: a\r").is_empty());
        assert!(dec.push(b"\n\r").is_empty());
        let frames = dec.push(b"\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "a");
    }
}
