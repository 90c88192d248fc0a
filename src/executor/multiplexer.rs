//! Worker output multiplexing
//!
//! Each worker gets its own multiplexer holding a capture buffer, a pending
//! buffer and a flush clock. Pending bytes reach the shared sink once the
//! chunk timeout has passed since the last flush, so output written in quick
//! bursts stays together on the console.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::output::SharedSink;

/// Default time between flushes
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_millis(200);

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// When pending output is written to the sink
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Flush whenever this much time has passed since the last flush
    Interval(Duration),
    /// Flush once when the stream ends
    AtEnd,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::Interval(DEFAULT_CHUNK_TIMEOUT)
    }
}

/// Streams one worker's output to the shared sink
pub struct OutputMultiplexer {
    sink: SharedSink,
    policy: FlushPolicy,
    captured: Vec<u8>,
    pending: Vec<u8>,
    last_flush: Instant,
}

impl OutputMultiplexer {
    pub fn new(sink: SharedSink, policy: FlushPolicy) -> Self {
        Self {
            sink,
            policy,
            captured: Vec::new(),
            pending: Vec::new(),
            last_flush: Instant::now(),
        }
    }

    /// Consume chunks until every sender is gone, returning the full capture
    pub async fn run(mut self, mut chunks: mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
        loop {
            let deadline = self.deadline();

            tokio::select! {
                chunk = chunks.recv() => match chunk {
                    Some(bytes) => self.push(&bytes),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush();
                }
            }
        }

        self.flush();
        self.captured
    }

    /// Next forced flush, only while output is pending
    fn deadline(&self) -> Option<Instant> {
        match self.policy {
            FlushPolicy::Interval(timeout) if !self.pending.is_empty() => {
                Some(self.last_flush + timeout)
            }
            _ => None,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.captured.extend_from_slice(bytes);
        self.pending.extend_from_slice(bytes);

        if let FlushPolicy::Interval(timeout) = self.policy {
            if self.last_flush.elapsed() >= timeout {
                self.flush();
            }
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.sink.write(&self.pending);
        self.pending.clear();
        self.last_flush = Instant::now();
    }
}

/// Forward everything read from `reader` into `chunks` until EOF
pub fn spawn_reader<R>(mut reader: R, chunks: mpsc::Sender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    if chunks.send(buffer[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Worker output read failed: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingSink;
    use tokio::time::sleep;

    fn chunk_strings(sink: &RecordingSink) -> Vec<String> {
        sink.chunks()
            .into_iter()
            .map(|c| String::from_utf8(c).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_burst_flushes_once_at_end() {
        let recorder = RecordingSink::default();
        let mux = OutputMultiplexer::new(
            SharedSink::new(recorder.clone()),
            FlushPolicy::Interval(Duration::from_secs(10)),
        );
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(mux.run(rx));
        for part in ["a", "b", "c"] {
            tx.send(part.as_bytes().to_vec()).await.unwrap();
        }
        drop(tx);

        let captured = handle.await.unwrap();
        assert_eq!(captured, b"abc");
        assert_eq!(chunk_strings(&recorder), vec!["abc"]);
    }

    #[tokio::test]
    async fn test_flushes_each_window_and_residual() {
        let recorder = RecordingSink::default();
        let mux = OutputMultiplexer::new(
            SharedSink::new(recorder.clone()),
            FlushPolicy::Interval(Duration::from_millis(50)),
        );
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(mux.run(rx));

        tx.send(b"a".to_vec()).await.unwrap();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(chunk_strings(&recorder), vec!["a"]);

        tx.send(b"b".to_vec()).await.unwrap();
        tx.send(b"c".to_vec()).await.unwrap();
        drop(tx);

        let captured = handle.await.unwrap();
        assert_eq!(captured, b"abc");

        let chunks = chunk_strings(&recorder);
        assert_eq!(chunks.concat(), "abc");
        assert_eq!(chunks.first().map(String::as_str), Some("a"));
        assert!(chunks.len() == 2 || chunks.len() == 3);
        assert!(chunks.last().unwrap().ends_with('c'));
    }

    #[tokio::test]
    async fn test_at_end_policy_flushes_once() {
        let recorder = RecordingSink::default();
        let mux = OutputMultiplexer::new(SharedSink::new(recorder.clone()), FlushPolicy::AtEnd);
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(mux.run(rx));

        tx.send(b"first\n".to_vec()).await.unwrap();
        sleep(Duration::from_millis(30)).await;
        tx.send(b"second\n".to_vec()).await.unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(chunk_strings(&recorder), vec!["first\nsecond\n"]);
    }

    #[test]
    fn test_empty_stream_writes_nothing() {
        let recorder = RecordingSink::default();
        let mux = OutputMultiplexer::new(SharedSink::new(recorder.clone()), FlushPolicy::default());
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1);
        drop(tx);

        let captured = tokio_test::block_on(mux.run(rx));
        assert!(captured.is_empty());
        assert!(recorder.chunks().is_empty());
    }

    #[tokio::test]
    async fn test_reader_forwards_everything() {
        let (tx, mut rx) = mpsc::channel(16);
        let data: &'static [u8] = b"hello from a worker";

        spawn_reader(data, tx).await.unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.extend(chunk);
        }
        assert_eq!(received, data);
    }
}
