//! STOMP wire format: commands, well-known headers and outbound encoding.
//!
//! A frame on the wire is:
//! ```text
//! COMMAND\n
//! name:value\n        (zero or more)
//! \n
//! body bytes
//! \0
//! ```
//!
//! Outbound header names and values are escaped per STOMP 1.2
//! (`\r`, `\n`, `:` and `\`), except in CONNECT frames.

use bytes::{BufMut, Bytes, BytesMut};

/// Frame terminator.
pub const NUL: u8 = 0;

/// Line terminator.
pub const LF: u8 = b'\n';

/// Carriage return, tolerated before LF.
pub const CR: u8 = b'\r';

/// STOMP commands used by the client.
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const STOMP: &str = "STOMP";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const SEND: &str = "SEND";
    pub const ERROR: &str = "ERROR";
}

/// Well-known header names.
pub mod headers {
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const MESSAGE_SELECTOR: &str = "message-selector";
    pub const DESTINATION: &str = "destination";
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const HOST: &str = "host";
    pub const LOGIN: &str = "login";
    pub const PASSCODE: &str = "passcode";
    pub const ID: &str = "id";
    pub const ACK: &str = "ack";
    pub const RECEIPT: &str = "receipt";
    pub const MESSAGE: &str = "message";
    pub const VERSION: &str = "version";
}

/// A frame ready to be written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    command: &'static str,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl OutboundFrame {
    /// Create a frame with no headers and no body.
    pub fn new(command: &'static str) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[inline]
    pub fn command(&self) -> &'static str {
        self.command
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Encode to wire bytes, including the NUL terminator.
    ///
    /// A `content-length` header is added for non-empty bodies unless the
    /// caller already supplied one.
    pub fn encode(&self) -> Bytes {
        let escape = self.command != commands::CONNECT && self.command != commands::STOMP;
        let needed = self.command.len()
            + self
                .headers
                .iter()
                .map(|(k, v)| k.len() + v.len() + 2)
                .sum::<usize>()
            + self.body.len()
            + 32;
        let mut buf = BytesMut::with_capacity(needed);

        buf.put_slice(self.command.as_bytes());
        buf.put_u8(LF);

        for (name, value) in &self.headers {
            put_header_part(&mut buf, name, escape);
            buf.put_u8(b':');
            put_header_part(&mut buf, value, escape);
            buf.put_u8(LF);
        }

        let has_length = self
            .headers
            .iter()
            .any(|(k, _)| k == headers::CONTENT_LENGTH);
        if !self.body.is_empty() && !has_length {
            buf.put_slice(headers::CONTENT_LENGTH.as_bytes());
            buf.put_u8(b':');
            buf.put_slice(self.body.len().to_string().as_bytes());
            buf.put_u8(LF);
        }

        buf.put_u8(LF);
        buf.put_slice(&self.body);
        buf.put_u8(NUL);
        buf.freeze()
    }
}

fn put_header_part(buf: &mut BytesMut, text: &str, escape: bool) {
    if !escape {
        buf.put_slice(text.as_bytes());
        return;
    }
    for b in text.bytes() {
        match b {
            b'\r' => buf.put_slice(b"\\r"),
            b'\n' => buf.put_slice(b"\\n"),
            b':' => buf.put_slice(b"\\c"),
            b'\\' => buf.put_slice(b"\\\\"),
            other => buf.put_u8(other),
        }
    }
}
