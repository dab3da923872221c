//! Payloads delivered to subscribers.
//!
//! Handlers receive these by reference and must not hold on to them past
//! the call; the dispatcher owns the frame.

use std::fmt;

use serde::Deserialize;

use crate::error::ClientError;
use crate::protocol::StompFrame;

/// Message category a selector maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Server state changed.
    Status,
    /// Initialization document received.
    Initialization,
    /// Order received.
    Order,
    /// Report received.
    Report,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 4] = [
        Category::Status,
        Category::Initialization,
        Category::Order,
        Category::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Status => "status",
            Category::Initialization => "initialization",
            Category::Order => "order",
            Category::Report => "report",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified message handed to category subscribers.
#[derive(Debug, Clone)]
pub struct Notification {
    category: Category,
    frame: StompFrame,
}

impl Notification {
    pub fn new(category: Category, frame: StompFrame) -> Self {
        Self { category, frame }
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Message body (opaque XML document).
    #[inline]
    pub fn body(&self) -> &str {
        self.frame.body()
    }

    #[inline]
    pub fn selector(&self) -> &str {
        self.frame.selector()
    }

    /// The full parsed frame.
    pub fn frame(&self) -> &StompFrame {
        &self.frame
    }
}

/// A fault delivered to error subscribers.
#[derive(Debug)]
pub struct ErrorEvent {
    error: ClientError,
    frame: Option<StompFrame>,
    terminal: bool,
}

impl ErrorEvent {
    /// Non-terminal error; the receive loop keeps running.
    pub fn new(error: ClientError, frame: Option<StompFrame>) -> Self {
        Self {
            error,
            frame,
            terminal: false,
        }
    }

    /// Terminal error; the receive loop has stopped.
    pub fn terminal(error: ClientError, frame: Option<StompFrame>) -> Self {
        Self {
            error,
            frame,
            terminal: true,
        }
    }

    pub fn error(&self) -> &ClientError {
        &self.error
    }

    /// Frame being processed (possibly partial) when the error happened.
    pub fn frame(&self) -> Option<&StompFrame> {
        self.frame.as_ref()
    }

    /// Whether the connection ended with this error.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}
