//! Incremental server-sent-events framing.
//!
//! Bytes arrive in arbitrary pieces. The decoder keeps a text buffer, cuts
//! complete blocks on blank lines and keeps the tail for the next read.
//! A block without both an `event:` and a `data:` line is skipped.

/// One complete `event:`/`data:` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// Wire form of the frame, blank-line terminated.
    pub fn encode(&self) -> String {
        let mut out = format!("event: {}\n", self.event);
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }

    fn parse_block(block: &str) -> Option<Self> {
        let mut event = None;
        let mut data: Option<String> = None;

        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event.get_or_insert_with(|| value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                }
            }
        }

        Some(Self {
            event: event?,
            data: data?,
        })
    }
}

/// Stateful decoder fed with raw response bytes.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every block completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.decode_utf8(bytes);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(frame) = SseFrame::parse_block(&block) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing block that was never terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.buffer.push_str(&tail);
            self.pending.clear();
        }
        let block = std::mem::take(&mut self.buffer);
        if block.trim().is_empty() {
            return None;
        }
        SseFrame::parse_block(&block)
    }

    /// Bytes held back as an incomplete block.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }

    // Multi-byte characters may be split across reads; hold back the
    // incomplete tail until the rest arrives.
    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
        self.buffer.push_str(&text);
        self.pending.drain(..valid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_complete_blocks_and_keeps_tail() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: chunk\ndata: {\"text\":\"a\"}\n\nevent: chu");
        assert_eq!(frames, vec![SseFrame::new("chunk", "{\"text\":\"a\"}")]);
        assert!(decoder.buffered_len() > 0);

        let frames = decoder.push(b"nk\ndata: {\"text\":\"b\"}\n\n");
        assert_eq!(frames, vec![SseFrame::new("chunk", "{\"text\":\"b\"}")]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_skips_blocks_missing_event_or_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\n\ndata: orphan\n\nevent: lonely\n\nevent: done\ndata: {}\n\n");
        assert_eq!(frames, vec![SseFrame::new("done", "{}")]);
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let encoded = SseFrame::new("chunk", "{\"text\":\"né…\"}").encode();
        let bytes = encoded.as_bytes();
        let split = encoded.find('é').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let frames = decoder.push(&bytes[split..]);
        assert_eq!(frames, vec![SseFrame::new("chunk", "{\"text\":\"né…\"}")]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: done\r\ndata: [DONE]\r\n\r\n");
        assert_eq!(frames, vec![SseFrame::new("done", "[DONE]")]);
    }

    #[test]
    fn test_multiple_data_lines_are_joined() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: note\ndata: first\ndata: second\n\n");
        assert_eq!(frames, vec![SseFrame::new("note", "first\nsecond")]);
    }

    #[test]
    fn test_finish_flushes_unterminated_block() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: done\ndata: {}").is_empty());
        assert_eq!(decoder.finish(), Some(SseFrame::new("done", "{}")));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_encode_round_trips_through_decoder() {
        let frame = SseFrame::new("error", "{\"error\":\"Stream timeout\"}");
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(frame.encode().as_bytes()), vec![frame]);
    }
}
