//! Shared output sink
//!
//! Worker output is written to stdout and optionally teed into a log file.
//! Every flush takes the sink lock once, so concurrent workers never split
//! each other's chunks.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task;
use tracing::warn;

/// Destination for flushed worker output
pub trait OutputSink: Send {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Standard output, plus an optional log file receiving identical content
pub struct ConsoleSink {
    console: Box<dyn Write + Send>,
    log_file: Option<File>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::with_console(io::stdout())
    }

    fn with_console(console: impl Write + Send + 'static) -> Self {
        Self {
            console: Box::new(console),
            log_file: None,
        }
    }

    /// Also write everything to `path`, truncating it first
    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        self.log_file = Some(file);
        Ok(self)
    }
}

impl OutputSink for ConsoleSink {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        let console = write_flushed(&mut self.console, bytes);

        // the log file gets the chunk even when stdout is gone
        let log = match self.log_file.as_mut() {
            Some(file) => write_flushed(file, bytes),
            None => Ok(()),
        };

        console.and(log)
    }
}

fn write_flushed(writer: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes)?;
    writer.flush()
}

/// Cloneable handle to one sink shared by all workers
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<Box<dyn OutputSink>>>,
}

impl SharedSink {
    pub fn new(sink: impl OutputSink + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Write one chunk; failures are logged, never propagated to workers
    pub fn write(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let write = || {
            let mut sink = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = sink.write_chunk(bytes) {
                warn!("Failed to write worker output: {}", e);
            }
        };

        // a full stdout pipe must not pin a runtime worker thread
        if on_multi_thread_runtime() {
            task::block_in_place(write);
        } else {
            write();
        }
    }
}

fn on_multi_thread_runtime() -> bool {
    Handle::try_current()
        .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
        .unwrap_or(false)
}

/// In-memory sink recording each chunk separately
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingSink {
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.chunks().concat()).to_string()
    }
}

#[cfg(test)]
impl OutputSink for RecordingSink {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.chunks.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}
