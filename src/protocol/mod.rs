//! Protocol module - STOMP framing, header indexing and frame types.
//!
//! This module implements the text protocol of the notification channel:
//! - Header index built from raw `name:value` lines
//! - Frame buffer for turning a byte stream into frames
//! - Frame struct with typed accessors and recorded faults
//! - Outbound frame encoding

mod frame;
mod frame_buffer;
mod headers;
mod wire_format;

pub use frame::{strip_envelope_header, FrameError, StompFrame};
pub use frame_buffer::FrameBuffer;
pub use headers::{split_header_line, HeaderIndex};
pub use wire_format::{commands, headers as header_names, OutboundFrame, CR, LF, NUL};
