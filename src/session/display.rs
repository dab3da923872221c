//! Serialized console output.
//!
//! The command loop and the receive loop both print. A [`DisplayGate`]
//! is held for the duration of one logical message so lines from the two
//! never interleave. Create one per session and pass clones to whoever
//! writes.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

const PROMPT: &str = "Command>";

type Sink = Box<dyn Write + Send>;

/// Mutual-exclusion gate over an output sink.
#[derive(Clone)]
pub struct DisplayGate {
    sink: Arc<Mutex<Sink>>,
}

impl DisplayGate {
    /// Wrap an arbitrary sink.
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Gate over process stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    fn lock(&self) -> MutexGuard<'_, Sink> {
        // A panic while printing leaves the sink usable.
        self.sink.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write one line.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        self.write_block(&[line])
    }

    /// Write several lines while holding the gate once.
    pub fn write_block(&self, lines: &[&str]) -> io::Result<()> {
        let mut sink = self.lock();
        for line in lines {
            sink.write_all(line.as_bytes())?;
            sink.write_all(b"\n")?;
        }
        sink.flush()
    }

    /// Print the input prompt without a newline.
    pub fn prompt(&self) -> io::Result<()> {
        let mut sink = self.lock();
        sink.write_all(PROMPT.as_bytes())?;
        sink.flush()
    }
}

impl std::fmt::Debug for DisplayGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayGate").finish_non_exhaustive()
    }
}

/// In-memory sink shared between a gate and a test.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Byte at a time so an unguarded writer would interleave.
        match buf.first() {
            Some(byte) => {
                self.0.lock().unwrap().push(*byte);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
