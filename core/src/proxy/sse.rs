//! Incremental line parser for backend SSE streams
//!
//! Bytes arrive in arbitrary transport chunks. The parser decodes them as
//! UTF-8 (holding back a split multi-byte character), appends to a text
//! buffer, and emits frames only for newline-terminated lines. Between chunks
//! the buffer holds at most one incomplete line.

use crate::proxy::mappers::intermediate::INTERMEDIATE_DATA_PREFIX;

pub const DATA_PREFIX: &str = "data: ";
const DONE_SENTINELS: [&str; 2] = ["[DONE]", "DONE"];

/// One logical backend message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Trimmed payload of a `data: ` line
    Data(String),
    /// The full `intermediate_data: ` line
    IntermediateData(String),
    /// `[DONE]` / `DONE` sentinel
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingChunk,
    SplittingBuffer,
    DispatchingLine,
    Done,
}

#[derive(Debug)]
pub struct SseLineParser {
    state: ParserState,
    buffer: String,
    /// Undecoded tail of a multi-byte UTF-8 sequence
    pending: Vec<u8>,
}

impl Default for SseLineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseLineParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::AwaitingChunk,
            buffer: String::new(),
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ParserState::Done
    }

    /// Bytes of the incomplete trailing line currently held
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }

    /// Feed one transport chunk and collect the frames it completes.
    ///
    /// Stops at the first sentinel; everything after it is discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.is_done() {
            return Vec::new();
        }

        self.decode(chunk);
        self.state = ParserState::SplittingBuffer;

        let Some(last_newline) = self.buffer.rfind('\n') else {
            self.state = ParserState::AwaitingChunk;
            return Vec::new();
        };
        let complete: String = self.buffer.drain(..=last_newline).collect();

        let mut frames = Vec::new();
        self.state = ParserState::DispatchingLine;
        for line in complete[..complete.len() - 1].split('\n') {
            let Some(frame) = classify(line.trim_end_matches('\r')) else {
                continue;
            };
            let done = frame == SseFrame::Done;
            frames.push(frame);
            if done {
                self.finish();
                return frames;
            }
        }

        self.state = ParserState::AwaitingChunk;
        frames
    }

    /// Upstream exhausted. A trailing line without a newline is dropped.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!("Discarding {} bytes of unterminated stream data", self.buffer.len());
        }
        self.buffer.clear();
        self.pending.clear();
        self.state = ParserState::Done;
    }

    /// External transition, e.g. the client went away
    pub fn cancel(&mut self) {
        self.finish();
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_end = consumed + err.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[consumed..valid_end]));
                    match err.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + bad;
                        }
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }
}

fn classify(line: &str) -> Option<SseFrame> {
    if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
        let data = rest.trim();
        if DONE_SENTINELS.contains(&data) {
            return Some(SseFrame::Done);
        }
        return Some(SseFrame::Data(data.to_string()));
    }
    if line.starts_with(INTERMEDIATE_DATA_PREFIX) {
        return Some(SseFrame::IntermediateData(line.to_string()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut SseLineParser, chunks: &[&[u8]]) -> Vec<SseFrame> {
        chunks.iter().flat_map(|c| parser.feed(c)).collect()
    }

    #[test]
    fn test_complete_lines() {
        let mut parser = SseLineParser::new();
        let frames = parser.feed(b"data: {\"a\":1}\nintermediate_data: {\"id\":\"x\"}\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Data("{\"a\":1}".to_string()),
                SseFrame::IntermediateData("intermediate_data: {\"id\":\"x\"}".to_string()),
            ]
        );
        assert_eq!(parser.state(), ParserState::AwaitingChunk);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_line_split_at_every_offset() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo wörld\"}}]}\n".as_bytes();
        let mut whole = SseLineParser::new();
        let expected = whole.feed(line);
        assert_eq!(expected.len(), 1);

        for split in 0..=line.len() {
            let mut parser = SseLineParser::new();
            let frames = feed_all(&mut parser, &[&line[..split], &line[split..]]);
            assert_eq!(frames, expected, "split at byte {}", split);
        }
    }

    #[test]
    fn test_incomplete_line_is_held() {
        let mut parser = SseLineParser::new();
        assert!(parser.feed(b"data: {\"value\":").is_empty());
        assert_eq!(parser.state(), ParserState::AwaitingChunk);
        assert_eq!(parser.buffered_len(), 15);

        let frames = parser.feed(b"\"x\"}\ndata: tail");
        assert_eq!(frames, vec![SseFrame::Data("{\"value\":\"x\"}".to_string())]);
        assert_eq!(parser.buffered_len(), "data: tail".len());
    }

    #[test]
    fn test_sentinels_terminate() {
        for sentinel in ["[DONE]", "DONE", " [DONE] "] {
            let mut parser = SseLineParser::new();
            let input = format!("data: {{\"a\":1}}\ndata: {}\ndata: {{\"b\":2}}\n", sentinel);
            let frames = parser.feed(input.as_bytes());
            assert_eq!(frames, vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]);
            assert!(parser.is_done());
            assert!(parser.feed(b"data: {\"c\":3}\n").is_empty());
        }
    }

    #[test]
    fn test_other_lines_dropped() {
        let mut parser = SseLineParser::new();
        let frames = parser.feed(b"event: ping\n\n: comment\ndata:nospace\nretry: 10\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn test_crlf_lines() {
        let mut parser = SseLineParser::new();
        let frames = parser.feed(b"data: {\"a\":1}\r\nintermediate_data: {}\r\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Data("{\"a\":1}".to_string()),
                SseFrame::IntermediateData("intermediate_data: {}".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut parser = SseLineParser::new();
        let frames = parser.feed(b"data: a\xffb\n");
        assert_eq!(frames, vec![SseFrame::Data("a\u{FFFD}b".to_string())]);
    }

    #[test]
    fn test_cancel_discards_buffer() {
        let mut parser = SseLineParser::new();
        parser.feed(b"data: partial");
        parser.cancel();
        assert!(parser.is_done());
        assert_eq!(parser.buffered_len(), 0);
        assert!(parser.feed(b"\n").is_empty());
    }
}
