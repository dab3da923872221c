//! Parsed STOMP frame.
//!
//! A [`StompFrame`] carries the command, the raw header lines in arrival
//! order, the derived [`HeaderIndex`], the body and any fault hit while the
//! frame was being produced. Faults never abort parsing: they are recorded on
//! the frame so it can still be delivered.
//!
//! # Example
//!
//! ```
//! use c2sim_client::protocol::StompFrame;
//!
//! let frame = StompFrame::from_lines([
//!     "MESSAGE",
//!     "message-selector:C2SIM_Report",
//!     "content-length:5",
//!     "",
//!     "hello\0",
//! ]);
//!
//! assert_eq!(frame.command(), "MESSAGE");
//! assert_eq!(frame.selector(), "C2SIM_Report");
//! assert_eq!(frame.body(), "hello");
//! assert_eq!(frame.declared_content_length(), Some(5));
//! ```

use thiserror::Error;

use super::headers::HeaderIndex;
use super::wire_format::headers;

/// Opening tag of the envelope header some servers prepend to message bodies.
const ENVELOPE_OPEN: &str = "<C2SIMHeader";
/// Closing tag of the envelope header.
const ENVELOPE_CLOSE: &str = "</C2SIMHeader>";

/// Fault recorded on a frame while it was being produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// `content-length` present but not an unsigned integer.
    #[error("malformed content-length '{0}'")]
    MalformedContentLength(String),

    /// Body of the declared length was not followed by NUL.
    #[error("missing NUL terminator after {0}-byte body")]
    MissingTerminator(usize),

    /// Frame grew past the configured limit and was discarded.
    #[error("frame exceeds maximum size of {0} bytes")]
    FrameTooLarge(usize),

    /// Body was not valid UTF-8; invalid sequences were replaced.
    #[error("body is not valid UTF-8")]
    InvalidUtf8,

    /// Frame was cut short, typically by a transport fault mid-read.
    #[error("frame truncated: {0}")]
    Truncated(String),
}

/// One parsed protocol message unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StompFrame {
    command: String,
    header_lines: Vec<String>,
    index: HeaderIndex,
    body: String,
    declared_content_length: Option<usize>,
    effective_length: usize,
    envelope_header: Option<String>,
    error: Option<FrameError>,
}

impl StompFrame {
    /// Assemble a frame from its already-separated parts.
    ///
    /// Builds the header index, reads the declared `content-length`, decodes
    /// the body and strips an envelope header when one is present.
    pub fn assemble(command: impl Into<String>, header_lines: Vec<String>, body: &[u8]) -> Self {
        let index = HeaderIndex::build(&header_lines);
        let mut error = None;

        let declared_content_length = match index.get_opt(headers::CONTENT_LENGTH) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) => Some(n),
                Err(_) => {
                    error = Some(FrameError::MalformedContentLength(raw.to_string()));
                    None
                }
            },
            None => None,
        };

        let text = match std::str::from_utf8(body) {
            Ok(s) => s.to_string(),
            Err(_) => {
                error.get_or_insert(FrameError::InvalidUtf8);
                String::from_utf8_lossy(body).into_owned()
            }
        };

        let natural = declared_content_length.unwrap_or(body.len());
        let (body, envelope_header, effective_length) = match strip_envelope_header(&text) {
            Some((header, rest)) => {
                let stripped = text.len() - rest.len();
                (rest, Some(header), natural.saturating_sub(stripped))
            }
            None => (text, None, natural),
        };

        Self {
            command: command.into(),
            header_lines,
            index,
            body,
            declared_content_length,
            effective_length,
            envelope_header,
            error,
        }
    }

    /// Parse one frame from a sequence of lines.
    ///
    /// The first non-blank line is the command, header lines follow until a
    /// blank line, and body lines follow until a line containing NUL. Body
    /// lines are re-joined with `\n`. Running out of lines before the NUL
    /// yields a frame with a [`FrameError::Truncated`] error.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lines = lines.into_iter();
        let mut command = None;
        let mut header_lines = Vec::new();
        let mut body = String::new();
        let mut terminated = false;

        for line in lines.by_ref() {
            let line = trim_cr(line.as_ref());
            if !line.trim().is_empty() {
                command = Some(line.to_string());
                break;
            }
        }
        let Some(command) = command else {
            return Self::truncated(String::new(), Vec::new(), &[], "no command line");
        };

        let mut in_body = false;
        let mut first_body_line = true;
        for line in lines {
            let line = line.as_ref();
            if !in_body {
                let line = trim_cr(line);
                if line.is_empty() {
                    in_body = true;
                } else {
                    header_lines.push(line.to_string());
                }
                continue;
            }
            if !first_body_line {
                body.push('\n');
            }
            first_body_line = false;
            if let Some(nul) = line.find('\0') {
                body.push_str(&line[..nul]);
                terminated = true;
                break;
            }
            body.push_str(line);
        }

        if !terminated {
            return Self::truncated(command, header_lines, body.as_bytes(), "missing NUL terminator");
        }
        Self::assemble(command, header_lines, body.as_bytes())
    }

    /// Frame describing an incomplete read, keeping whatever body arrived.
    pub(crate) fn truncated(
        command: String,
        header_lines: Vec<String>,
        partial_body: &[u8],
        reason: &str,
    ) -> Self {
        let mut frame = Self::assemble(command, header_lines, partial_body);
        frame.error = Some(FrameError::Truncated(reason.to_string()));
        frame
    }

    /// Record a fault, replacing any earlier one.
    pub(crate) fn set_error(&mut self, error: FrameError) {
        self.error = Some(error);
    }

    /// STOMP command, e.g. `CONNECTED` or `MESSAGE`.
    #[inline]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Raw header lines in arrival order, including lines without a colon.
    pub fn header_lines(&self) -> &[String] {
        &self.header_lines
    }

    /// Header lookup table.
    pub fn headers(&self) -> &HeaderIndex {
        &self.index
    }

    /// Value of a header, or `""` when absent.
    pub fn get_header(&self, name: &str) -> &str {
        self.index.get(name)
    }

    /// Value of the `message-selector` header, or `""`.
    #[inline]
    pub fn selector(&self) -> &str {
        self.index.selector()
    }

    /// Body without the NUL terminator or envelope header.
    #[inline]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Length from the `content-length` header, if any.
    #[inline]
    pub fn declared_content_length(&self) -> Option<usize> {
        self.declared_content_length
    }

    /// Body length after envelope header stripping.
    #[inline]
    pub fn effective_length(&self) -> usize {
        self.effective_length
    }

    /// Envelope header removed from the body, if one was present.
    pub fn envelope_header(&self) -> Option<&str> {
        self.envelope_header.as_deref()
    }

    /// Fault recorded while producing this frame.
    pub fn error(&self) -> Option<&FrameError> {
        self.error.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.command == super::wire_format::commands::CONNECTED
    }

    pub fn is_error(&self) -> bool {
        self.command == super::wire_format::commands::ERROR
    }
}

#[inline]
fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Split an envelope header element out of a body.
///
/// Returns `(header_element, remaining_body)` when the body carries one.
pub fn strip_envelope_header(body: &str) -> Option<(String, String)> {
    let start = body.find(ENVELOPE_OPEN)?;
    let after_open = &body[start..];
    let tag_end = after_open.find('>')?;

    let end = if after_open[..tag_end].ends_with('/') {
        start + tag_end + 1
    } else {
        start + after_open.find(ENVELOPE_CLOSE)? + ENVELOPE_CLOSE.len()
    };

    let header = body[start..end].to_string();
    let mut rest = String::with_capacity(body.len() - header.len());
    rest.push_str(&body[..start]);
    rest.push_str(&body[end..]);
    Some((header, rest))
}
