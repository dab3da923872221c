//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management and a small state machine
//! for fragmented frames:
//! - `Command`: skipping heart-beat newlines, waiting for the command line
//! - `Headers`: collecting header lines until the blank line
//! - `Body`: waiting for `content-length` bytes + NUL, or for the first NUL
//! - `Discarding`: dropping bytes of a rejected frame up to its NUL
//!
//! Faults are recorded on the emitted frame; `push` itself never fails.
//!
//! # Example
//!
//! ```
//! use c2sim_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! assert!(buffer.push(b"MESSAGE\nmessage-selector:C2SIM_Order\n").is_empty());
//!
//! let frames = buffer.push(b"\n<Order/>\0");
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].selector(), "C2SIM_Order");
//! assert_eq!(frames[0].body(), "<Order/>");
//! ```

use bytes::BytesMut;

use super::frame::{FrameError, StompFrame};
use super::headers::HeaderIndex;
use super::wire_format::{headers, CR, LF, NUL};
use crate::config::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_BUFFER_SIZE};

/// State machine for frame parsing.
#[derive(Debug)]
enum State {
    /// Waiting for the command line.
    Command,
    /// Command read, collecting header lines.
    Headers { command: String, lines: Vec<String> },
    /// Headers complete, waiting for the body.
    Body {
        command: String,
        lines: Vec<String>,
        content_length: Option<usize>,
    },
    /// Dropping bytes until the next NUL.
    Discarding,
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Bytes of the current frame already consumed from `buffer`.
    consumed: usize,
    /// Maximum allowed frame size.
    max_frame_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom frame size limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_READ_BUFFER_SIZE),
            state: State::Command,
            consumed: 0,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<StompFrame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    /// Turn a half-received frame into a frame describing the failure.
    ///
    /// Used when the transport faults mid-read. Returns `None` if nothing
    /// but heart-beats was pending. The buffer is reset either way.
    pub fn take_partial(&mut self, reason: &str) -> Option<StompFrame> {
        let state = std::mem::replace(&mut self.state, State::Command);
        let frame = match state {
            State::Headers { command, lines } => {
                Some(StompFrame::truncated(command, lines, &[], reason))
            }
            State::Body {
                command,
                lines,
                content_length,
            } => {
                let end = content_length.map_or(self.buffer.len(), |n| n.min(self.buffer.len()));
                let received = &self.buffer[..end];
                let received = match received.iter().position(|&b| b == NUL) {
                    Some(pos) => &received[..pos],
                    None => received,
                };
                Some(StompFrame::truncated(command, lines, received, reason))
            }
            State::Command if self.buffer.iter().any(|b| !b.is_ascii_whitespace()) => {
                Some(StompFrame::truncated(String::new(), Vec::new(), &[], reason))
            }
            State::Command | State::Discarding => None,
        };
        self.clear();
        frame
    }

    fn try_extract_one(&mut self) -> Option<StompFrame> {
        loop {
            match std::mem::replace(&mut self.state, State::Command) {
                State::Command => {
                    self.skip_heartbeats();
                    match self.take_line() {
                        Some(blank) if blank.trim().is_empty() => {
                            self.consumed = 0;
                        }
                        Some(command) => {
                            self.state = State::Headers {
                                command,
                                lines: Vec::new(),
                            }
                        }
                        None => return self.check_overflow(),
                    }
                }

                State::Headers { command, mut lines } => match self.take_line() {
                    Some(line) if line.is_empty() => {
                        let content_length = declared_length(&lines);
                        if content_length.is_some_and(|n| n > self.max_frame_size) {
                            self.state = State::Discarding;
                            return Some(self.too_large(command, lines));
                        }
                        self.state = State::Body {
                            command,
                            lines,
                            content_length,
                        };
                    }
                    Some(line) => {
                        lines.push(line);
                        self.state = State::Headers { command, lines };
                    }
                    None => {
                        self.state = State::Headers { command, lines };
                        return self.check_overflow();
                    }
                },

                State::Body {
                    command,
                    lines,
                    content_length: Some(len),
                } => {
                    if self.buffer.len() <= len {
                        self.state = State::Body {
                            command,
                            lines,
                            content_length: Some(len),
                        };
                        return self.check_overflow();
                    }

                    let body = self.buffer.split_to(len);
                    self.consumed = 0;
                    let mut frame = StompFrame::assemble(command, lines, &body);

                    if self.buffer[0] == NUL {
                        let _ = self.buffer.split_to(1);
                    } else {
                        frame.set_error(FrameError::MissingTerminator(len));
                        self.state = State::Discarding;
                    }
                    return Some(frame);
                }

                State::Body {
                    command,
                    lines,
                    content_length: None,
                } => match self.buffer.iter().position(|&b| b == NUL) {
                    Some(pos) if self.consumed + pos > self.max_frame_size => {
                        let _ = self.buffer.split_to(pos + 1);
                        return Some(self.too_large(command, lines));
                    }
                    Some(pos) => {
                        let body = self.buffer.split_to(pos);
                        let _ = self.buffer.split_to(1);
                        self.consumed = 0;
                        return Some(StompFrame::assemble(command, lines, &body));
                    }
                    None => {
                        self.state = State::Body {
                            command,
                            lines,
                            content_length: None,
                        };
                        return self.check_overflow();
                    }
                },

                State::Discarding => {
                    if !self.discard_through_nul() {
                        return None;
                    }
                }
            }
        }
    }

    /// Drop leading LF, CRLF and stray NUL bytes between frames.
    fn skip_heartbeats(&mut self) {
        let skip = self
            .buffer
            .iter()
            .take_while(|&&b| b == LF || b == CR || b == NUL)
            .count();
        if skip > 0 {
            let _ = self.buffer.split_to(skip);
        }
    }

    /// Take one LF-terminated line, without its line ending.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == LF)?;
        let raw = self.buffer.split_to(pos + 1);
        self.consumed += raw.len();

        let mut line = &raw[..pos];
        if line.last() == Some(&CR) {
            line = &line[..line.len() - 1];
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }

    /// Emit a `FrameTooLarge` frame if the pending frame outgrew the limit.
    ///
    /// Only called while waiting for more data, so every buffered byte
    /// belongs to the current frame.
    fn check_overflow(&mut self) -> Option<StompFrame> {
        if self.consumed + self.buffer.len() <= self.max_frame_size {
            return None;
        }

        let (command, lines) = match std::mem::replace(&mut self.state, State::Discarding) {
            State::Headers { command, lines } | State::Body { command, lines, .. } => {
                (command, lines)
            }
            State::Command | State::Discarding => (String::new(), Vec::new()),
        };
        Some(self.too_large(command, lines))
    }

    fn too_large(&mut self, command: String, lines: Vec<String>) -> StompFrame {
        tracing::warn!(
            "Discarding {} frame larger than {} bytes",
            command,
            self.max_frame_size
        );
        self.consumed = 0;
        let mut frame = StompFrame::assemble(command, lines, &[]);
        frame.set_error(FrameError::FrameTooLarge(self.max_frame_size));
        frame
    }

    /// Drop bytes through the next NUL. Returns true once it was found.
    fn discard_through_nul(&mut self) -> bool {
        match self.buffer.iter().position(|&b| b == NUL) {
            Some(pos) => {
                let _ = self.buffer.split_to(pos + 1);
                self.state = State::Command;
                true
            }
            None => {
                self.buffer.clear();
                self.state = State::Discarding;
                false
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Command;
        self.consumed = 0;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::Command => "Command",
            State::Headers { .. } => "Headers",
            State::Body { .. } => "Body",
            State::Discarding => "Discarding",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Valid `content-length` from header lines, using index semantics.
fn declared_length(lines: &[String]) -> Option<usize> {
    HeaderIndex::build(lines)
        .get_opt(headers::CONTENT_LENGTH)
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(selector: &str, body: &str) -> Vec<u8> {
        format!(
            "MESSAGE\nmessage-selector:{}\ncontent-length:{}\n\n{}\0",
            selector,
            body.len(),
            body
        )
        .into_bytes()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames =
            buffer.push(b"MESSAGE\nmessage-selector:ReportX\ncontent-length:5\n\nhello\x00");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), "MESSAGE");
        assert_eq!(frames[0].selector(), "ReportX");
        assert_eq!(frames[0].body(), "hello");
        assert_eq!(frames[0].declared_content_length(), Some(5));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut combined = message("C2SIM_Order", "first");
        combined.extend(message("C2SIM_Report", "second"));
        combined.extend(b"CONNECTED\nversion:1.2\n\n\0");

        let frames = buffer.push(&combined);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].body(), "first");
        assert_eq!(frames[1].body(), "second");
        assert!(frames[2].is_connected());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = message("C2SIM_Report", "<Report/>");

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]));
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].body(), "<Report/>");
    }

    #[test]
    fn test_fragmented_headers_and_body() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(b"MESS").is_empty());
        assert_eq!(buffer.state_name(), "Command");

        assert!(buffer.push(b"AGE\ndestination:/topic/C2SIM\n").is_empty());
        assert_eq!(buffer.state_name(), "Headers");

        assert!(buffer.push(b"\npart").is_empty());
        assert_eq!(buffer.state_name(), "Body");

        let frames = buffer.push(b"ial\0");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), "partial");
        assert_eq!(frames[0].declared_content_length(), None);
    }

    #[test]
    fn test_heartbeats_skipped() {
        let mut buffer = FrameBuffer::new();
        let mut data = b"\n\r\n\n".to_vec();
        data.extend(message("C2SIM_Order", "x"));
        data.extend(b"\n\n");

        let frames = buffer.push(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), "MESSAGE");
    }

    #[test]
    fn test_content_length_allows_embedded_nul() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"MESSAGE\ncontent-length:3\n\na\0b\0");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), "a\0b");
    }

    #[test]
    fn test_crlf_header_lines() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"MESSAGE\r\ndestination:A\r\n\r\nbody\0");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), "MESSAGE");
        assert_eq!(frames[0].get_header("destination"), "A");
    }

    #[test]
    fn test_header_line_without_colon_kept() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"MESSAGE\nMESSAGE\nmessage-selector:C2SIM_Order\n\n\0");

        assert_eq!(frames[0].header_lines().len(), 2);
        assert_eq!(frames[0].headers().len(), 1);
        assert_eq!(frames[0].selector(), "C2SIM_Order");
    }

    #[test]
    fn test_missing_terminator_resyncs() {
        let mut buffer = FrameBuffer::new();
        let mut data = b"MESSAGE\ncontent-length:2\n\nabcdef\0".to_vec();
        data.extend(message("C2SIM_Order", "next"));

        let frames = buffer.push(&data);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].body(), "ab");
        assert_eq!(frames[0].error(), Some(&FrameError::MissingTerminator(2)));
        assert_eq!(frames[1].body(), "next");
        assert!(frames[1].error().is_none());
    }

    #[test]
    fn test_malformed_content_length_reads_to_nul() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"MESSAGE\ncontent-length:five\n\nhello\0");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), "hello");
        assert_eq!(
            frames[0].error(),
            Some(&FrameError::MalformedContentLength("five".into()))
        );
    }

    #[test]
    fn test_declared_length_over_limit() {
        let mut buffer = FrameBuffer::with_max_frame_size(16);
        let mut data = b"MESSAGE\ncontent-length:1000\n\nxxxx\0".to_vec();
        data.extend(b"MESSAGE\n\nok\0");

        let frames = buffer.push(&data);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].error(), Some(&FrameError::FrameTooLarge(16)));
        assert_eq!(frames[1].body(), "ok");
    }

    #[test]
    fn test_unterminated_body_over_limit() {
        let mut buffer = FrameBuffer::with_max_frame_size(32);
        let frames = buffer.push(b"MESSAGE\n\n");
        assert!(frames.is_empty());

        let frames = buffer.push(&[b'x'; 64]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), "MESSAGE");
        assert_eq!(frames[0].error(), Some(&FrameError::FrameTooLarge(32)));
        assert_eq!(buffer.state_name(), "Discarding");

        let frames = buffer.push(b"yyy\0MESSAGE\n\nfine\0");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), "fine");
    }

    #[test]
    fn test_take_partial_mid_headers() {
        let mut buffer = FrameBuffer::new();
        buffer.push(b"MESSAGE\nmessage-selector:C2SIM_Report\ncontent-le");

        let frame = buffer.take_partial("connection reset").unwrap();
        assert_eq!(frame.command(), "MESSAGE");
        assert_eq!(frame.selector(), "C2SIM_Report");
        assert_eq!(
            frame.error(),
            Some(&FrameError::Truncated("connection reset".into()))
        );
        assert!(buffer.is_empty());
        assert_eq!(buffer.state_name(), "Command");
    }

    #[test]
    fn test_take_partial_keeps_received_body() {
        let mut buffer = FrameBuffer::new();
        buffer.push(b"MESSAGE\nmessage-selector:C2SIM_Order\n\n<Order><Unit>A</Unit>");

        let frame = buffer.take_partial("reset").unwrap();
        assert_eq!(frame.selector(), "C2SIM_Order");
        assert_eq!(frame.body(), "<Order><Unit>A</Unit>");
        assert_eq!(frame.error(), Some(&FrameError::Truncated("reset".into())));
    }

    #[test]
    fn test_take_partial_with_content_length() {
        let mut buffer = FrameBuffer::new();
        buffer.push(b"MESSAGE\ncontent-length:10\n\nabcd");

        let frame = buffer.take_partial("eof").unwrap();
        assert_eq!(frame.body(), "abcd");
        assert_eq!(frame.declared_content_length(), Some(10));
    }

    #[test]
    fn test_whitespace_lines_before_command_skipped() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"  \n\t\r\nMESSAGE\nmessage-selector:C2SIM_Order\n\nx\0");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), "MESSAGE");
        assert_eq!(frames[0].header_lines(), ["message-selector:C2SIM_Order"]);
        assert_eq!(frames[0].body(), "x");
    }

    #[test]
    fn test_complete_frame_over_limit_in_one_push() {
        let mut buffer = FrameBuffer::with_max_frame_size(16);
        let mut data = b"MESSAGE\n\n".to_vec();
        data.extend([b'x'; 1000]);
        data.push(NUL);
        data.extend(b"MESSAGE\n\nok\0");

        let frames = buffer.push(&data);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].error(), Some(&FrameError::FrameTooLarge(16)));
        assert_eq!(frames[0].body(), "");
        assert_eq!(frames[1].body(), "ok");
        assert!(frames[1].error().is_none());
    }

    #[test]
    fn test_take_partial_nothing_pending() {
        let mut buffer = FrameBuffer::new();
        buffer.push(b"\n\n");
        assert!(buffer.take_partial("eof").is_none());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        buffer.push(b"MESSAGE\nx:y\n");
        assert_eq!(buffer.state_name(), "Headers");

        buffer.clear();
        assert_eq!(buffer.state_name(), "Command");
        assert!(buffer.is_empty());
    }
}
