//! Notification dispatcher: builder, connection state and receive loop.
//!
//! The [`NotificationClientBuilder`] collects subscriptions and settings.
//! The [`NotificationClient`] manages one connection at a time:
//! 1. Spawn the writer task and the receive loop over the transport
//! 2. Send CONNECT and wait (bounded) for CONNECTED
//! 3. SUBSCRIBE to the configured destination
//! 4. Classify every inbound frame and invoke the matching subscribers
//!
//! State machine: `Disconnected → Connecting → Connected → Disconnected`.
//! A transport fault ends the loop with exactly one terminal error
//! notification. There is no automatic reconnect; call `connect()` again.
//!
//! # Example
//!
//! ```ignore
//! use c2sim_client::NotificationClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = NotificationClient::builder()
//!         .on_report(|n| {
//!             println!("report: {}", n.body());
//!             Ok(())
//!         })
//!         .on_error(|e| eprintln!("notification error: {}", e.error()))
//!         .build()?;
//!
//!     client.connect_tcp("127.0.0.1:61613").await?;
//!     client.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::ToSocketAddrs;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::handler::{
    Category, ErrorEvent, HandlerResult, Notification, Route, SubscriptionTable,
};
use crate::protocol::{commands, header_names, FrameBuffer, FrameError, OutboundFrame, StompFrame};
use crate::transport;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// CONNECT sent, waiting for CONNECTED.
    Connecting,
    /// CONNECTED received and subscription sent.
    Connected,
}

/// Builder for configuring and creating a notification client.
///
/// Register subscribers with the fluent API, then call `build()`.
pub struct NotificationClientBuilder {
    table: SubscriptionTable,
    config: ClientConfig,
}

impl NotificationClientBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            table: SubscriptionTable::new(),
            config: ClientConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a handler for a category.
    pub fn on<F>(mut self, category: Category, handler: F) -> Self
    where
        F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
    {
        self.table.on(category, handler);
        self
    }

    /// Server status changed.
    pub fn on_status<F>(self, handler: F) -> Self
    where
        F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Category::Status, handler)
    }

    /// Initialization document received.
    pub fn on_initialization<F>(self, handler: F) -> Self
    where
        F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Category::Initialization, handler)
    }

    /// Order received.
    pub fn on_order<F>(self, handler: F) -> Self
    where
        F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Category::Order, handler)
    }

    /// Report received.
    pub fn on_report<F>(self, handler: F) -> Self
    where
        F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Category::Report, handler)
    }

    /// Catch-all for frames whose selector is not in the table.
    pub fn on_unrecognized<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StompFrame) -> HandlerResult + Send + Sync + 'static,
    {
        self.table.on_unrecognized(handler);
        self
    }

    /// Error subscriber.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.table.on_error(handler);
        self
    }

    /// Map an extra selector keyword to a category.
    pub fn selector(mut self, keyword: &str, category: Category) -> Self {
        self.table.selector(keyword, category);
        self
    }

    /// Set the subscription destination.
    pub fn destination(mut self, destination: &str) -> Self {
        self.config.destination = destination.to_string();
        self
    }

    /// Set the virtual host sent in CONNECT.
    pub fn host(mut self, host: &str) -> Self {
        self.config.host = host.to_string();
        self
    }

    /// Set broker credentials.
    pub fn credentials(mut self, login: &str, passcode: &str) -> Self {
        self.config.login = Some(login.to_string());
        self.config.passcode = Some(passcode.to_string());
        self
    }

    /// Set the bound on waiting for CONNECTED.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the largest inbound frame accepted.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(mut self) -> Result<NotificationClient> {
        self.config.validate()?;
        for (keyword, category) in &self.config.selectors {
            self.table.selector(keyword, *category);
        }

        Ok(NotificationClient {
            shared: Arc::new(Shared {
                table: self.table,
                config: self.config,
                session: Mutex::new(Session {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    link: None,
                    done: None,
                }),
            }),
        })
    }
}

impl Default for NotificationClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles for one live connection.
struct Link {
    generation: u64,
    writer: WriterHandle,
    /// Set before a deliberate close so EOF is not reported as a fault.
    closing: Arc<AtomicBool>,
    stop: watch::Sender<bool>,
    done: watch::Receiver<bool>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Link {
    /// Stop the receive loop and wait for it to finish.
    async fn shutdown(self) {
        self.closing.store(true, Ordering::Release);
        drop(self.writer);
        let _ = self.stop.send(true);
        let mut done = self.done;
        let _ = done.wait_for(|finished| *finished).await;
    }
}

struct Session {
    state: ConnectionState,
    generation: u64,
    link: Option<Link>,
    /// Completion signal of the most recent receive loop.
    done: Option<watch::Receiver<bool>>,
}

struct Shared {
    /// Read-only once the client is built.
    table: SubscriptionTable,
    config: ClientConfig,
    session: Mutex<Session>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Called by the receive loop task when it ends.
    fn finish(&self, generation: u64, terminal: Option<ErrorEvent>) {
        {
            let mut session = self.session();
            if session.generation == generation {
                session.state = ConnectionState::Disconnected;
                session.link = None;
            }
        }
        tracing::info!("Receive loop ended, disconnected");

        if let Some(event) = terminal {
            self.table.report(&event);
        }
    }

    /// Route a single frame.
    fn dispatch(&self, frame: StompFrame, pending: &mut Option<oneshot::Sender<Result<StompFrame>>>) {
        if let Some(fault) = frame.error() {
            if matches!(fault, FrameError::FrameTooLarge(_) | FrameError::Truncated(_)) {
                let error = ClientError::Protocol(fault.to_string());
                self.table.report(&ErrorEvent::new(error, Some(frame)));
                return;
            }
            tracing::warn!("Delivering {} frame with fault: {}", frame.command(), fault);
        }

        match self.table.classify(&frame) {
            Route::Connected => match pending.take() {
                Some(tx) => {
                    let _ = tx.send(Ok(frame));
                }
                None => tracing::warn!("Ignoring unexpected CONNECTED frame"),
            },
            Route::ServerError => {
                let message = match frame.get_header(header_names::MESSAGE) {
                    "" => frame.body().trim().to_string(),
                    m => m.to_string(),
                };
                tracing::error!("Server error: {}", message);
                match pending.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(ClientError::Server(message)));
                    }
                    None => self
                        .table
                        .report(&ErrorEvent::new(ClientError::Server(message), Some(frame))),
                }
            }
            Route::Category(category) => {
                tracing::debug!("Dispatching {} message", category);
                self.table.deliver(&Notification::new(category, frame));
            }
            Route::Unrecognized => {
                self.table.deliver_unrecognized(&frame);
            }
        }
    }
}

/// A notification client. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct NotificationClient {
    shared: Arc<Shared>,
}

impl NotificationClient {
    /// Create a new client builder.
    pub fn builder() -> NotificationClientBuilder {
        NotificationClientBuilder::new()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.session().state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// The subscription table.
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.shared.table
    }

    /// Connect over TCP using the transport adapter.
    pub async fn connect_tcp<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        let (reader, writer) = transport::connect_tcp(addr).await?;
        self.connect(reader, writer).await
    }

    /// Start a session over an already-open transport.
    ///
    /// Returns once CONNECTED has been received and SUBSCRIBE sent.
    /// Calling this while connecting or connected is an error.
    pub async fn connect<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let generation = {
            let mut session = self.shared.session();
            if session.state != ConnectionState::Disconnected {
                return Err(ClientError::AlreadyConnected);
            }
            session.state = ConnectionState::Connecting;
            session.generation += 1;
            session.generation
        };

        let config = &self.shared.config;
        let (writer, writer_task) = spawn_writer_task(
            writer,
            WriterConfig {
                channel_capacity: config.channel_capacity,
                write_timeout: config.write_timeout(),
            },
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let (connected_tx, connected_rx) = oneshot::channel();
        let closing = Arc::new(AtomicBool::new(false));

        {
            let mut session = self.shared.session();
            session.link = Some(Link {
                generation,
                writer: writer.clone(),
                closing: closing.clone(),
                stop: stop_tx,
                done: done_rx.clone(),
                _writer_task: writer_task,
            });
            session.done = Some(done_rx);
        }
        tracing::info!("Connecting to {} (session {})", config.host, generation);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let terminal = read_loop(reader, &shared, connected_tx, stop_rx, closing).await;
            shared.finish(generation, terminal);
            let _ = done_tx.send(true);
        });

        let handshake = async {
            writer.send(connect_frame(config)).await?;
            match tokio::time::timeout(config.connect_timeout(), connected_rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(ClientError::ConnectionClosed),
                Err(_) => Err(ClientError::Timeout("CONNECTED frame")),
            }
        };

        let subscribed = async {
            let connected = handshake.await?;
            tracing::info!(
                "Connected, protocol version {}",
                connected.get_header(header_names::VERSION)
            );
            writer.send(subscribe_frame(config)).await
        };

        if let Err(e) = subscribed.await {
            tracing::error!("Connection failed: {}", e);
            self.abort(generation).await;
            return Err(e);
        }

        let mut session = self.shared.session();
        if session.generation != generation || session.link.is_none() {
            return Err(ClientError::ConnectionClosed);
        }
        session.state = ConnectionState::Connected;
        tracing::info!("Subscribed to {}", config.destination);
        Ok(())
    }

    /// Queue a raw frame on the active connection.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let writer = {
            let session = self.shared.session();
            match (&session.state, &session.link) {
                (ConnectionState::Connected, Some(link)) => link.writer.clone(),
                _ => return Err(ClientError::NotConnected),
            }
        };
        if writer.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        writer.send(frame).await
    }

    /// Send DISCONNECT and stop the receive loop without an error notification.
    pub async fn disconnect(&self) -> Result<()> {
        let link = self
            .shared
            .session()
            .link
            .take()
            .ok_or(ClientError::NotConnected)?;

        link.closing.store(true, Ordering::Release);
        let frame = OutboundFrame::new(commands::DISCONNECT).header(
            header_names::RECEIPT,
            format!("disconnect-{}", link.generation),
        );
        if let Err(e) = link.writer.send(frame).await {
            tracing::debug!("DISCONNECT not sent: {}", e);
        }
        link.shutdown().await;
        Ok(())
    }

    /// Wait until the most recent receive loop has ended and any terminal
    /// error has been delivered.
    ///
    /// Returns immediately if `connect()` was never called.
    pub async fn wait_for_shutdown(&self) {
        let done = self.shared.session().done.clone();
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Tear down a connection attempt that failed.
    async fn abort(&self, generation: u64) {
        let link = {
            let mut session = self.shared.session();
            if session.generation != generation {
                return;
            }
            session.link.take()
        };
        if let Some(link) = link {
            link.shutdown().await;
        }
    }
}

/// Main receive loop - reads frames and dispatches them.
///
/// Returns the terminal error event, if the loop ended on a fault.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    shared: &Shared,
    connected: oneshot::Sender<Result<StompFrame>>,
    mut stop: watch::Receiver<bool>,
    closing: Arc<AtomicBool>,
) -> Option<ErrorEvent> {
    let mut pending = Some(connected);
    let mut frame_buffer = FrameBuffer::with_max_frame_size(shared.config.max_frame_size);
    let mut buf = vec![0u8; shared.config.read_buffer_size];

    loop {
        let read = tokio::select! {
            r = reader.read(&mut buf) => r,
            _ = stop.changed() => {
                tracing::debug!("Receive loop stopped");
                return None;
            }
        };

        match read {
            Ok(0) => {
                if closing.load(Ordering::Acquire) {
                    return None;
                }
                let partial = frame_buffer.take_partial("connection closed by peer");
                return Some(ErrorEvent::terminal(ClientError::ConnectionClosed, partial));
            }
            Ok(n) => {
                for frame in frame_buffer.push(&buf[..n]) {
                    shared.dispatch(frame, &mut pending);
                }
            }
            Err(e) => {
                if closing.load(Ordering::Acquire) {
                    return None;
                }
                tracing::error!("Transport read failed: {}", e);
                let partial = frame_buffer.take_partial(&e.to_string());
                return Some(ErrorEvent::terminal(ClientError::Io(e), partial));
            }
        }
    }
}

fn connect_frame(config: &ClientConfig) -> OutboundFrame {
    let mut frame = OutboundFrame::new(commands::CONNECT)
        .header(header_names::ACCEPT_VERSION, &config.accept_version)
        .header(header_names::HOST, &config.host);
    if let Some(login) = &config.login {
        frame = frame.header(header_names::LOGIN, login);
    }
    if let Some(passcode) = &config.passcode {
        frame = frame.header(header_names::PASSCODE, passcode);
    }
    frame
}

fn subscribe_frame(config: &ClientConfig) -> OutboundFrame {
    OutboundFrame::new(commands::SUBSCRIBE)
        .header(header_names::DESTINATION, &config.destination)
        .header(header_names::ID, &config.subscription_id)
        .header(header_names::ACK, "auto")
}
