//! Dedicated writer task for outbound frames.
//!
//! The dispatcher and its callers never touch the transport's write half
//! directly. They queue [`OutboundFrame`]s on an mpsc channel and a single
//! task writes them in order.
//!
//! ```text
//! connect()    ─┐
//! disconnect() ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Transport
//! send()       ─┘
//! ```

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::error::{ClientError, Result};
use crate::protocol::OutboundFrame;

/// Maximum frames to drain from the channel before flushing.
const MAX_BATCH_SIZE: usize = 32;

/// Default bound on queueing a frame.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Bound on waiting for queue space.
    pub write_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    timeout: Duration,
}

impl WriterHandle {
    /// Queue a frame for writing.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => Err(ClientError::Timeout("outbound queue")),
        }
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends when every handle is dropped or a write fails.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let handle = WriterHandle {
        tx,
        timeout: config.write_timeout,
    };
    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer).await;
        if let Err(e) = &result {
            tracing::error!("Writer task failed, outbound frames are lost: {}", e);
        }
        result
    });
    (handle, task)
}

/// Main writer loop - receives frames and writes them in order.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        write_frame(&mut writer, &first).await?;

        let mut batched = 1;
        while batched < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => {
                    write_frame(&mut writer, &frame).await?;
                    batched += 1;
                }
                Err(_) => break,
            }
        }

        writer.flush().await?;
    }

    tracing::debug!("Writer channel closed, shutting down transport write half");
    let _ = writer.shutdown().await;
    Ok(())
}

async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tracing::trace!("Writing {} frame", frame.command());
    writer.write_all(&frame.encode()).await?;
    Ok(())
}
