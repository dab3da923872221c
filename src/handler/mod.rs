//! Handler module - subscription table and notification payloads.
//!
//! Subscribers register per-category callbacks before the receive loop
//! starts. The dispatcher classifies every frame and hands it to the
//! matching callbacks synchronously.
//!
//! # Example
//!
//! ```ignore
//! use c2sim_client::handler::{Category, Notification, SubscriptionTable};
//!
//! let mut table = SubscriptionTable::new();
//! table.on(Category::Report, |n: &Notification| {
//!     println!("report: {}", n.body());
//!     Ok(())
//! });
//! ```

mod notification;
mod registry;

pub use notification::{Category, ErrorEvent, Notification};
pub use registry::{
    ErrorHandler, FrameHandler, HandlerResult, NotificationHandler, Route, SubscriptionTable,
    DEFAULT_SELECTORS,
};
