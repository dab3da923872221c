//! Interactive session driver.
//!
//! Reads console lines, runs them against a [`SessionControl`] and prints
//! responses through the [`DisplayGate`]. Notifications from the receive
//! loop print through the same gate (see [`display_handlers`]).
//!
//! Push preconditions:
//! - Initialization: the server is reset to initializing first
//! - Order and Report: the server is switched to running first
//!
//! Every collaborator call is bounded by the request timeout. The loop
//! ends on `QUIT`, end of input, or the cancellation signal.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

use super::command::{command_list, parse_input, ConsoleInput, PushKind, ServerCommand};
use super::display::DisplayGate;
use crate::client::NotificationClientBuilder;
use crate::error::{root_cause, ClientError, Result};

/// Boxed future returned by [`SessionControl`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote session control (the REST side of the server).
pub trait SessionControl: Send + Sync {
    /// Start receiving notifications.
    fn connect(&self) -> BoxFuture<'_, Result<()>>;
    fn reset_to_initializing(&self) -> BoxFuture<'_, Result<()>>;
    fn switch_to_running(&self) -> BoxFuture<'_, Result<()>>;
    fn push_initialization_message(&self, xml: String) -> BoxFuture<'_, Result<String>>;
    fn push_order_message(&self, xml: String) -> BoxFuture<'_, Result<String>>;
    fn push_report_message(&self, xml: String) -> BoxFuture<'_, Result<String>>;
    fn push_command(&self, command: ServerCommand) -> BoxFuture<'_, Result<String>>;

    fn rest_endpoint(&self) -> String;
    fn stomp_endpoint(&self) -> String;
    fn protocol(&self) -> String;
    fn protocol_version(&self) -> String;
}

enum Step {
    Continue,
    Quit,
}

/// Console command loop.
pub struct SessionDriver<C> {
    control: C,
    gate: DisplayGate,
    request_timeout: Duration,
}

impl<C: SessionControl> SessionDriver<C> {
    pub fn new(control: C, gate: DisplayGate, request_timeout: Duration) -> Self {
        Self {
            control,
            gate,
            request_timeout,
        }
    }

    pub fn gate(&self) -> &DisplayGate {
        &self.gate
    }

    /// Connect, print the banner, then process input until done.
    pub async fn run<I>(&self, mut input: I, mut cancel: watch::Receiver<bool>) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
    {
        self.start().await?;

        let mut raw = Vec::new();
        loop {
            if *cancel.borrow() {
                break;
            }
            self.gate.prompt()?;

            raw.clear();
            let read = tokio::select! {
                read = input.read_until(b'\n', &mut raw) => read?,
                _ = cancelled(&mut cancel) => break,
            };
            if read == 0 {
                tracing::debug!("Console input closed");
                break;
            }
            // Undecodable bytes become U+FFFD and fall through as unrecognized input.
            let line = String::from_utf8_lossy(&raw);

            match self.execute(&line).await {
                Ok(Step::Quit) => break,
                Ok(Step::Continue) => {}
                Err(e) => self.display_error(&e)?,
            }
        }

        tracing::info!("Session ended");
        Ok(())
    }

    async fn start(&self) -> io::Result<()> {
        self.gate.write_line("Connecting to C2SIM services...")?;
        if let Err(e) = self.bounded("notification connect", self.control.connect()).await {
            let cause = root_cause(&e);
            tracing::error!(
                "Error connecting to notification server: {}. Services may not be available",
                cause
            );
        }

        let rest = format!("REST endpoint: {}", self.control.rest_endpoint());
        let stomp = format!("Notifications endpoint: {}", self.control.stomp_endpoint());
        let protocol = format!(
            "{} v{}",
            self.control.protocol(),
            self.control.protocol_version()
        );
        let commands = command_list();
        self.gate
            .write_block(&[rest.as_str(), stomp.as_str(), protocol.as_str(), commands.as_str()])
    }

    async fn execute(&self, line: &str) -> Result<Step> {
        match parse_input(line)? {
            ConsoleInput::Quit => return Ok(Step::Quit),
            ConsoleInput::Empty => {}
            ConsoleInput::Unrecognized(input) => {
                tracing::debug!("Unrecognized input: {}", input);
                self.gate.write_line(&command_list())?;
            }
            ConsoleInput::Server(command) => {
                tracing::info!("Sending {} command", command);
                let response = self
                    .bounded("server command", self.control.push_command(command))
                    .await?;
                self.show_response(&response)?;
            }
            ConsoleInput::Push { kind, path } => {
                let xml = load_message(&path).await?;
                let response = self.push(kind, xml).await?;
                self.show_response(&response)?;
            }
        }
        Ok(Step::Continue)
    }

    async fn push(&self, kind: PushKind, xml: String) -> Result<String> {
        match kind {
            PushKind::Initialization => {
                self.bounded("reset to initializing", self.control.reset_to_initializing())
                    .await?;
                self.bounded(
                    "initialization push",
                    self.control.push_initialization_message(xml),
                )
                .await
            }
            PushKind::Order => {
                self.bounded("switch to running", self.control.switch_to_running())
                    .await?;
                self.bounded("order push", self.control.push_order_message(xml))
                    .await
            }
            PushKind::Report => {
                self.bounded("switch to running", self.control.switch_to_running())
                    .await?;
                self.bounded("report push", self.control.push_report_message(xml))
                    .await
            }
        }
    }

    async fn bounded<T, F>(&self, what: &'static str, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| ClientError::Timeout(what))?
    }

    fn show_response(&self, response: &str) -> io::Result<()> {
        let response = response.trim();
        if response.is_empty() {
            return Ok(());
        }
        self.gate.write_line(response)
    }

    fn display_error(&self, error: &ClientError) -> io::Result<()> {
        let cause = root_cause(error);
        tracing::warn!("Command failed: {}", cause);
        self.gate.write_line(&format!("Error: {}", cause))
    }
}

/// Resolve once cancellation is requested. Never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn load_message(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ClientError::Usage(format!("Could not find xml file at {}", path.display()))
        } else {
            ClientError::Usage(format!(
                "Could not load xml file from {}: {}",
                path.display(),
                e
            ))
        }
    })
}

/// Register subscribers that print notifications through `gate`.
pub fn display_handlers(
    builder: NotificationClientBuilder,
    gate: &DisplayGate,
) -> NotificationClientBuilder {
    let print = |gate: DisplayGate| {
        move |n: &crate::handler::Notification| -> crate::handler::HandlerResult {
            let line = format!("Server Notification: {}", n.body());
            gate.write_block(&["", line.as_str()])?;
            gate.prompt()?;
            Ok(())
        }
    };

    let error_gate = gate.clone();
    builder
        .on_status(print(gate.clone()))
        .on_initialization(print(gate.clone()))
        .on_order(print(gate.clone()))
        .on_report(print(gate.clone()))
        .on_error(move |event| {
            let line = format!(
                "Error processing C2SIM messages: {}. Application restart is recommended",
                root_cause(event.error())
            );
            if let Err(e) = error_gate.write_line(&line) {
                tracing::error!("Failed to display error: {}", e);
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Category, Notification};
    use crate::protocol::StompFrame;
    use crate::session::display::SharedBuffer;
    use crate::NotificationClient;
    use std::io::Write as _;
    use std::sync::{Arc, Mutex};
    use tokio::io::BufReader;

    #[derive(Clone, Default)]
    struct MockControl {
        calls: Arc<Mutex<Vec<String>>>,
        fail_connect: bool,
        slow_commands: bool,
    }

    impl MockControl {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SessionControl for MockControl {
        fn connect(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.record("connect".into());
                if self.fail_connect {
                    return Err(ClientError::ConnectionClosed);
                }
                Ok(())
            })
        }

        fn reset_to_initializing(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.record("reset_to_initializing".into());
                Ok(())
            })
        }

        fn switch_to_running(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.record("switch_to_running".into());
                Ok(())
            })
        }

        fn push_initialization_message(&self, xml: String) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                self.record(format!("push_initialization:{}", xml));
                Ok("<Ack>init</Ack>".into())
            })
        }

        fn push_order_message(&self, xml: String) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                self.record(format!("push_order:{}", xml));
                Ok("<Ack>order</Ack>".into())
            })
        }

        fn push_report_message(&self, xml: String) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                self.record(format!("push_report:{}", xml));
                Ok("<Ack>report</Ack>".into())
            })
        }

        fn push_command(&self, command: ServerCommand) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                self.record(format!("command:{}", command));
                if self.slow_commands {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(format!("<State>{}</State>", command))
            })
        }

        fn rest_endpoint(&self) -> String {
            "http://localhost:8080/C2SIMServer".into()
        }

        fn stomp_endpoint(&self) -> String {
            "localhost:61613".into()
        }

        fn protocol(&self) -> String {
            "SISO-STD-C2SIM".into()
        }

        fn protocol_version(&self) -> String {
            "1.0.2".into()
        }
    }

    fn driver(control: MockControl) -> (SessionDriver<MockControl>, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let gate = DisplayGate::new(Box::new(buffer.clone()));
        (
            SessionDriver::new(control, gate, Duration::from_millis(200)),
            buffer,
        )
    }

    async fn run_script(driver: &SessionDriver<MockControl>, script: &str) {
        let (_tx, rx) = watch::channel(false);
        let input = BufReader::new(script.as_bytes());
        driver.run(input, rx).await.unwrap();
    }

    #[tokio::test]
    async fn test_banner_and_server_command() {
        let control = MockControl::default();
        let (driver, output) = driver(control.clone());

        run_script(&driver, "status\nquit\n").await;

        let output = output.contents();
        assert!(output.starts_with("Connecting to C2SIM services...\n"));
        assert!(output.contains("REST endpoint: http://localhost:8080/C2SIMServer\n"));
        assert!(output.contains("SISO-STD-C2SIM v1.0.2\n"));
        assert!(output.contains("<State>STATUS</State>\n"));
        assert_eq!(control.calls(), vec!["connect", "command:STATUS"]);
    }

    #[tokio::test]
    async fn test_push_order_switches_to_running_first() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<Order/>").unwrap();
        let control = MockControl::default();
        let (driver, output) = driver(control.clone());

        run_script(&driver, &format!("PUSH order {}\n", file.path().display())).await;

        assert_eq!(
            control.calls(),
            vec!["connect", "switch_to_running", "push_order:<Order/>"]
        );
        assert!(output.contents().contains("<Ack>order</Ack>"));
    }

    #[tokio::test]
    async fn test_push_init_resets_first() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<Init/>").unwrap();
        let control = MockControl::default();
        let (driver, _output) = driver(control.clone());

        run_script(&driver, &format!("push init {}\n", file.path().display())).await;

        assert_eq!(
            control.calls(),
            vec!["connect", "reset_to_initializing", "push_initialization:<Init/>"]
        );
    }

    #[tokio::test]
    async fn test_push_report() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<Report/>").unwrap();
        let control = MockControl::default();
        let (driver, _output) = driver(control.clone());

        run_script(&driver, &format!("push report {}\n", file.path().display())).await;

        assert_eq!(
            control.calls(),
            vec!["connect", "switch_to_running", "push_report:<Report/>"]
        );
    }

    #[tokio::test]
    async fn test_push_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.xml");
        let control = MockControl::default();
        let (driver, output) = driver(control.clone());

        run_script(&driver, &format!("push order {}\n", missing.display())).await;

        assert!(output
            .contents()
            .contains(&format!("Error: Could not find xml file at {}", missing.display())));
        assert_eq!(control.calls(), vec!["connect"]);
    }

    #[tokio::test]
    async fn test_push_usage_error_and_loop_continues() {
        let control = MockControl::default();
        let (driver, output) = driver(control.clone());

        run_script(&driver, "push order\nstop\n").await;

        let output = output.contents();
        assert!(output.contains("Error: Expected PUSH init|order|report <path to xml>"));
        assert!(output.contains("<State>STOP</State>"));
    }

    #[tokio::test]
    async fn test_unrecognized_reprints_commands() {
        let (driver, output) = driver(MockControl::default());

        run_script(&driver, "launch missiles\n").await;

        assert_eq!(output.contents().matches("Commands: STOP").count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_unrecognized() {
        let control = MockControl::default();
        let (driver, output) = driver(control.clone());
        let (_tx, rx) = watch::channel(false);

        let input = BufReader::new(&b"\xff\xfe\nstatus\nquit\n"[..]);
        driver.run(input, rx).await.unwrap();

        assert_eq!(control.calls(), vec!["connect", "command:STATUS"]);
        assert_eq!(output.contents().matches("Commands: STOP").count(), 2);
    }

    #[tokio::test]
    async fn test_quit_stops_processing() {
        let control = MockControl::default();
        let (driver, _output) = driver(control.clone());

        run_script(&driver, "QUIT\nstart\n").await;

        assert_eq!(control.calls(), vec!["connect"]);
    }

    #[tokio::test]
    async fn test_connect_failure_still_runs() {
        let control = MockControl {
            fail_connect: true,
            ..Default::default()
        };
        let (driver, output) = driver(control.clone());

        run_script(&driver, "pause\n").await;

        assert!(output.contents().contains("<State>PAUSE</State>"));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let control = MockControl {
            slow_commands: true,
            ..Default::default()
        };
        let (driver, output) = driver(control);

        run_script(&driver, "share\n").await;

        assert!(output
            .contents()
            .contains("Error: Timed out waiting for server command"));
    }

    #[tokio::test]
    async fn test_cancellation_ends_loop() {
        let (driver, _output) = driver(MockControl::default());
        let (tx, rx) = watch::channel(false);
        // Input that never produces a line.
        let (_keep_open, pending) = tokio::io::duplex(64);

        let run = driver.run(BufReader::new(pending), rx);
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => panic!("session ended before cancellation"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("session did not stop")
            .unwrap();
    }

    #[test]
    fn test_display_handlers_print_notifications() {
        let buffer = SharedBuffer::default();
        let gate = DisplayGate::new(Box::new(buffer.clone()));
        let client = display_handlers(NotificationClient::builder(), &gate)
            .build()
            .unwrap();

        let frame = StompFrame::assemble(
            "MESSAGE",
            vec!["message-selector:C2SIM_Report".into()],
            b"<Report/>",
        );
        client
            .subscriptions()
            .deliver(&Notification::new(Category::Report, frame));

        assert_eq!(
            buffer.contents(),
            "\nServer Notification: <Report/>\nCommand>"
        );
    }
}
