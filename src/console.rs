//! Line-oriented user output shared by the REPL, the commands and the
//! channel listener.
//!
//! Output goes through one lock so lines printed from the listener task
//! never interleave with a command's output mid-line. Tests swap stdout
//! for an in-memory [`ConsoleBuffer`].

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Cloneable handle to the user-facing output stream.
#[derive(Clone)]
pub struct Console {
    sink: Sink,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

impl Console {
    /// Console writing to the process's stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    /// Console writing into a shared buffer, for tests and scripted runs.
    #[must_use]
    pub fn buffer() -> (Self, ConsoleBuffer) {
        let buffer = ConsoleBuffer::default();
        let console = Self::from_writer(Box::new(buffer.clone()));
        (console, buffer)
    }

    fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(writer)),
        }
    }

    /// Writes one line.
    pub fn line(&self, text: impl AsRef<str>) {
        self.write(text.as_ref(), true);
    }

    /// Writes a prompt without a trailing newline.
    pub fn prompt(&self, text: &str) {
        self.write(text, false);
    }

    fn write(&self, text: &str, newline: bool) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let result = if newline {
            writeln!(sink, "{text}")
        } else {
            write!(sink, "{text}")
        }
        .and_then(|()| sink.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "console write failed");
        }
    }
}

/// In-memory capture of a [`Console`].
#[derive(Debug, Clone, Default)]
pub struct ConsoleBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ConsoleBuffer {
    /// Everything written so far, lossily decoded as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Discards the captured output.
    pub fn clear(&self) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Write for ConsoleBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
