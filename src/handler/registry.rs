//! Subscription table for dispatching classified frames.
//!
//! The table maps each [`Category`] to its handlers, and also holds the
//! catch-all sink for unrecognized frames, the error subscribers and the
//! selector classification table. It is filled in before the receive loop
//! starts and only read afterwards.
//!
//! Every handler call is isolated: an `Err` or a panic is turned into one
//! error notification and the remaining handlers still run.
//!
//! # Example
//!
//! ```
//! use c2sim_client::handler::{Category, Route, SubscriptionTable};
//! use c2sim_client::protocol::StompFrame;
//!
//! let mut table = SubscriptionTable::new();
//! table.on(Category::Order, |n| {
//!     println!("order: {}", n.body());
//!     Ok(())
//! });
//!
//! let frame = StompFrame::assemble("MESSAGE", vec!["message-selector:C2SIM_Order".into()], b"<Order/>");
//! assert_eq!(table.classify(&frame), Route::Category(Category::Order));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::{Category, ErrorEvent, Notification};
use crate::error::{ClientError, Result};
use crate::protocol::StompFrame;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Built-in selector keywords.
pub const DEFAULT_SELECTORS: [(&str, Category); 4] = [
    ("C2SIM_Command", Category::Status),
    ("C2SIM_Initialization", Category::Initialization),
    ("C2SIM_Order", Category::Order),
    ("C2SIM_Report", Category::Report),
];

/// Trait for category subscribers.
pub trait NotificationHandler: Send + Sync + 'static {
    fn call(&self, notification: &Notification) -> HandlerResult;
}

impl<F> NotificationHandler for F
where
    F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, notification: &Notification) -> HandlerResult {
        self(notification)
    }
}

/// Trait for the catch-all sink receiving unrecognized frames.
pub trait FrameHandler: Send + Sync + 'static {
    fn call(&self, frame: &StompFrame) -> HandlerResult;
}

impl<F> FrameHandler for F
where
    F: Fn(&StompFrame) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, frame: &StompFrame) -> HandlerResult {
        self(frame)
    }
}

/// Trait for error subscribers.
pub trait ErrorHandler: Send + Sync + 'static {
    fn call(&self, event: &ErrorEvent);
}

impl<F> ErrorHandler for F
where
    F: Fn(&ErrorEvent) + Send + Sync + 'static,
{
    fn call(&self, event: &ErrorEvent) {
        self(event)
    }
}

/// Where a frame goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// CONNECTED: handshake completion, never user-visible.
    Connected,
    /// ERROR frame from the broker.
    ServerError,
    /// Known selector.
    Category(Category),
    /// Anything else: catch-all sink or dropped.
    Unrecognized,
}

/// Registry mapping categories to handlers.
pub struct SubscriptionTable {
    /// Handlers by category.
    categories: HashMap<Category, Vec<Arc<dyn NotificationHandler>>>,
    /// Catch-all sink for unrecognized frames.
    unrecognized: Vec<Arc<dyn FrameHandler>>,
    /// Error subscribers.
    errors: Vec<Arc<dyn ErrorHandler>>,
    /// Lowercased selector keyword to category.
    selectors: HashMap<String, Category>,
}

impl SubscriptionTable {
    /// Create a table with the built-in selector keywords and no handlers.
    pub fn new() -> Self {
        let selectors = DEFAULT_SELECTORS
            .iter()
            .map(|(k, c)| (k.to_ascii_lowercase(), *c))
            .collect();

        Self {
            categories: HashMap::new(),
            unrecognized: Vec::new(),
            errors: Vec::new(),
            selectors,
        }
    }

    /// Register a handler for a category.
    pub fn on<F>(&mut self, category: Category, handler: F)
    where
        F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
    {
        self.categories
            .entry(category)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register a catch-all handler for unrecognized frames.
    pub fn on_unrecognized<F>(&mut self, handler: F)
    where
        F: Fn(&StompFrame) -> HandlerResult + Send + Sync + 'static,
    {
        self.unrecognized.push(Arc::new(handler));
    }

    /// Register an error subscriber.
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.errors.push(Arc::new(handler));
    }

    /// Map a selector keyword (case-insensitive) to a category.
    pub fn selector(&mut self, keyword: &str, category: Category) {
        self.selectors.insert(keyword.to_ascii_lowercase(), category);
    }

    /// Number of handlers registered for a category.
    pub fn handler_count(&self, category: Category) -> usize {
        self.categories.get(&category).map_or(0, Vec::len)
    }

    pub fn has_catch_all(&self) -> bool {
        !self.unrecognized.is_empty()
    }

    /// Category for a selector keyword, if known.
    pub fn category_for(&self, selector: &str) -> Option<Category> {
        self.selectors.get(&selector.to_ascii_lowercase()).copied()
    }

    /// Classify a frame.
    ///
    /// CONNECTED first, then ERROR, then the selector table; anything else
    /// is unrecognized.
    pub fn classify(&self, frame: &StompFrame) -> Route {
        if frame.is_connected() {
            return Route::Connected;
        }
        if frame.is_error() {
            return Route::ServerError;
        }
        match self.category_for(frame.selector()) {
            Some(category) => Route::Category(category),
            None => Route::Unrecognized,
        }
    }

    /// Deliver a notification to every handler of its category.
    ///
    /// Returns the number of handlers that completed successfully.
    pub fn deliver(&self, notification: &Notification) -> usize {
        let category = notification.category();
        let Some(handlers) = self.categories.get(&category) else {
            tracing::debug!("No {} subscribers, dropping message", category);
            return 0;
        };

        let mut ok = 0;
        for handler in handlers {
            match isolate(|| handler.call(notification)) {
                Ok(()) => ok += 1,
                Err(message) => {
                    tracing::error!("{} handler failed: {}", category, message);
                    self.report(&ErrorEvent::new(
                        ClientError::Callback { category, message },
                        Some(notification.frame().clone()),
                    ));
                }
            }
        }
        ok
    }

    /// Deliver an unrecognized frame to the catch-all sink.
    ///
    /// Returns false if no sink is registered and the frame was dropped.
    pub fn deliver_unrecognized(&self, frame: &StompFrame) -> bool {
        if self.unrecognized.is_empty() {
            tracing::warn!(
                "Dropping {} frame with unrecognized selector '{}'",
                frame.command(),
                frame.selector()
            );
            return false;
        }

        for handler in &self.unrecognized {
            if let Err(message) = isolate(|| handler.call(frame)) {
                tracing::error!("Catch-all handler failed: {}", message);
                self.report(&ErrorEvent::new(
                    ClientError::Protocol(format!("catch-all handler failed: {}", message)),
                    Some(frame.clone()),
                ));
            }
        }
        true
    }

    /// Deliver an error event to every error subscriber.
    ///
    /// A failing error handler is only logged.
    pub fn report(&self, event: &ErrorEvent) {
        if self.errors.is_empty() {
            tracing::error!("Unhandled client error: {}", event.error());
            return;
        }
        for handler in &self.errors {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.call(event)));
            if let Err(panic) = outcome {
                tracing::error!("Error handler panicked: {}", panic_message(&*panic));
            }
        }
    }
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a handler, turning both `Err` and panics into a message.
fn isolate(f: impl FnOnce() -> HandlerResult) -> std::result::Result<(), String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(crate::error::root_cause(&e).to_string()),
        Err(panic) => Err(panic_message(&*panic)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn frame(command: &str, selector: &str, body: &str) -> StompFrame {
        StompFrame::assemble(
            command,
            vec![format!("message-selector:{}", selector)],
            body.as_bytes(),
        )
    }

    #[test]
    fn test_classify_connected_first() {
        let table = SubscriptionTable::new();
        let f = frame("CONNECTED", "C2SIM_Report", "");
        assert_eq!(table.classify(&f), Route::Connected);
    }

    #[test]
    fn test_classify_default_selectors() {
        let table = SubscriptionTable::new();
        assert_eq!(
            table.classify(&frame("MESSAGE", "C2SIM_Command", "")),
            Route::Category(Category::Status)
        );
        assert_eq!(
            table.classify(&frame("MESSAGE", "c2sim_initialization", "")),
            Route::Category(Category::Initialization)
        );
        assert_eq!(
            table.classify(&frame("MESSAGE", "C2SIM_Report", "")),
            Route::Category(Category::Report)
        );
    }

    #[test]
    fn test_classify_unknown_selector() {
        let table = SubscriptionTable::new();
        assert_eq!(
            table.classify(&frame("MESSAGE", "ReportX", "")),
            Route::Unrecognized
        );
        let no_selector = StompFrame::assemble("MESSAGE", Vec::new(), b"");
        assert_eq!(table.classify(&no_selector), Route::Unrecognized);
    }

    #[test]
    fn test_classify_error_frame() {
        let table = SubscriptionTable::new();
        assert_eq!(table.classify(&frame("ERROR", "", "")), Route::ServerError);
    }

    #[test]
    fn test_custom_selector() {
        let mut table = SubscriptionTable::new();
        table.selector("IBML09_Report", Category::Report);
        assert_eq!(
            table.classify(&frame("MESSAGE", "IBML09_Report", "")),
            Route::Category(Category::Report)
        );
    }

    #[test]
    fn test_deliver_to_all_handlers() {
        let mut table = SubscriptionTable::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            table.on(Category::Order, move |_: &Notification| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let n = Notification::new(Category::Order, frame("MESSAGE", "C2SIM_Order", "x"));
        assert_eq!(table.deliver(&n), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(table.handler_count(Category::Order), 3);
        assert_eq!(table.handler_count(Category::Report), 0);
    }

    #[test]
    fn test_failing_handler_isolated() {
        let mut table = SubscriptionTable::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let after = Arc::new(AtomicUsize::new(0));

        table.on(Category::Report, |_: &Notification| {
            Err(ClientError::Usage("bad report".into()))
        });
        table.on(Category::Report, |_: &Notification| -> HandlerResult {
            panic!("exploded")
        });
        {
            let after = after.clone();
            table.on(Category::Report, move |_: &Notification| {
                after.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        {
            let errors = errors.clone();
            table.on_error(move |e: &ErrorEvent| {
                errors.lock().unwrap().push(e.error().to_string());
            });
        }

        let n = Notification::new(Category::Report, frame("MESSAGE", "C2SIM_Report", "r"));
        assert_eq!(table.deliver(&n), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "report handler failed: bad report");
        assert_eq!(errors[1], "report handler failed: exploded");
    }

    #[test]
    fn test_unrecognized_without_sink_dropped() {
        let table = SubscriptionTable::new();
        assert!(!table.has_catch_all());
        assert!(!table.deliver_unrecognized(&frame("MESSAGE", "ReportX", "")));
    }

    #[test]
    fn test_unrecognized_with_sink() {
        let mut table = SubscriptionTable::new();
        let seen = Arc::new(Mutex::new(String::new()));
        {
            let seen = seen.clone();
            table.on_unrecognized(move |f: &StompFrame| {
                *seen.lock().unwrap() = f.selector().to_string();
                Ok(())
            });
        }
        assert!(table.deliver_unrecognized(&frame("MESSAGE", "ReportX", "")));
        assert_eq!(*seen.lock().unwrap(), "ReportX");
    }

    #[test]
    fn test_panicking_error_handler_contained() {
        let mut table = SubscriptionTable::new();
        table.on_error(|_: &ErrorEvent| panic!("error handler broke"));
        table.report(&ErrorEvent::new(ClientError::ConnectionClosed, None));
    }
}
