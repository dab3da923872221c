//! Transport adapters.
//!
//! The client itself works over any `AsyncRead`/`AsyncWrite` pair; this
//! module provides the TCP connection used against a real broker.

mod tcp;

pub use tcp::connect_tcp;
