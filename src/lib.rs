//! # c2sim-client
//!
//! Rust client SDK for the C2SIM notification channel.
//!
//! The server publishes status changes, initialization documents, orders
//! and reports as STOMP `MESSAGE` frames. This crate parses that stream,
//! classifies each frame by its `message-selector` header and delivers it
//! to the callbacks registered for that category.
//!
//! ## Architecture
//!
//! - **Frame parser** (`protocol`): incremental STOMP framing, header index
//! - **Dispatcher** (`client`): connection state machine and receive loop
//! - **Session driver** (`session`): interactive console over a remote
//!   session-control collaborator
//!
//! ## Example
//!
//! ```ignore
//! use c2sim_client::NotificationClient;
//!
//! #[tokio::main]
//! async fn main() -> c2sim_client::Result<()> {
//!     let client = NotificationClient::builder()
//!         .on_order(|n| {
//!             println!("order: {}", n.body());
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     client.connect_tcp("localhost:61613").await?;
//!     client.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod session;
pub mod transport;

mod client;
mod writer;

pub use client::{ConnectionState, NotificationClient, NotificationClientBuilder};
pub use config::ClientConfig;
pub use error::{root_cause, ClientError, Result};
pub use handler::{Category, ErrorEvent, Notification};
pub use protocol::{OutboundFrame, StompFrame};
