//! Background readers for child process output
//!
//! One [`OutputDrain`] per pipe keeps reading lines into an unbounded FIFO so
//! the child never blocks on a full pipe buffer. Consumers take whatever has
//! arrived so far through [`LineQueue::take_available`], which never blocks.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Consumer side of a drain
///
/// Lines keep their trailing newline, so concatenating them in take order
/// reproduces the stream.
#[derive(Debug)]
pub struct LineQueue {
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl LineQueue {
    /// Take every line currently queued, without waiting for more
    pub fn take_available(&self) -> Vec<String> {
        let Ok(mut rx) = self.rx.lock() else {
            warn!("LineQueue::take_available: lock poisoned");
            return Vec::new();
        };
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }
}

/// Background task moving one stream into a [`LineQueue`]
#[derive(Debug)]
pub struct OutputDrain {
    label: &'static str,
    queue: Arc<LineQueue>,
    handle: JoinHandle<std::io::Result<u64>>,
}

impl OutputDrain {
    /// Start draining `stream` on the current tokio runtime
    pub fn spawn<R>(stream: R, label: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        debug!(label, "OutputDrain::spawn: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            let mut total = 0u64;
            loop {
                buf.clear();
                let n = reader.read_until(b'\n', &mut buf).await?;
                if n == 0 {
                    debug!(label, total, "OutputDrain: end of stream");
                    break;
                }
                total += n as u64;
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).is_err() {
                    debug!(label, "OutputDrain: queue dropped, stopping");
                    break;
                }
            }
            Ok(total)
        });
        Self {
            label,
            queue: Arc::new(LineQueue { rx: Mutex::new(rx) }),
            handle,
        }
    }

    /// Shared handle to the queue this drain fills
    pub fn queue(&self) -> Arc<LineQueue> {
        Arc::clone(&self.queue)
    }

    /// Wait for end of stream; returns the number of bytes read
    ///
    /// Must be awaited to completion at most once.
    pub async fn wait(&mut self) -> std::io::Result<u64> {
        debug!(label = self.label, "OutputDrain::wait: called");
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(format!("{} drain task failed: {}", self.label, e))),
        }
    }

    /// Consume the drain, waiting for end of stream
    pub async fn join(mut self) -> std::io::Result<u64> {
        self.wait().await
    }

    /// Stop reading immediately; lines already queued stay available
    pub fn abort(&self) {
        debug!(label = self.label, "OutputDrain::abort: called");
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_drain_keeps_newlines() {
        let data = b"first\nsecond\nno newline".to_vec();
        let drain = OutputDrain::spawn(std::io::Cursor::new(data), "stdout");
        let queue = drain.queue();
        let bytes = drain.join().await.unwrap();

        assert_eq!(bytes, 23);
        assert_eq!(queue.take_available(), vec!["first\n", "second\n", "no newline"]);
        assert!(queue.take_available().is_empty());
    }

    #[tokio::test]
    async fn test_take_available_does_not_block() {
        let (_writer, reader) = tokio::io::duplex(64);
        let drain = OutputDrain::spawn(reader, "stderr");
        assert!(drain.queue().take_available().is_empty());
        drain.abort();
    }

    #[tokio::test]
    async fn test_incremental_takes() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let drain = OutputDrain::spawn(reader, "stdout");
        let queue = drain.queue();

        writer.write_all(b"one\n").await.unwrap();
        let mut seen = Vec::new();
        while seen.is_empty() {
            tokio::task::yield_now().await;
            seen.extend(queue.take_available());
        }
        writer.write_all(b"two\n").await.unwrap();
        drop(writer);
        drain.join().await.unwrap();
        seen.extend(queue.take_available());

        assert_eq!(seen, vec!["one\n", "two\n"]);
    }

    proptest! {
        #[test]
        fn prop_drain_is_lossless_and_ordered(
            chunks in proptest::collection::vec("[a-z \n]{0,40}", 0..20),
            take_every in 1usize..4,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let expected: String = chunks.concat();
            let collected = rt.block_on(async move {
                let (mut writer, reader) = tokio::io::duplex(16);
                let drain = OutputDrain::spawn(reader, "stdout");
                let queue = drain.queue();
                let mut taken = Vec::new();
                for (i, chunk) in chunks.iter().enumerate() {
                    writer.write_all(chunk.as_bytes()).await.unwrap();
                    if i % take_every == 0 {
                        tokio::task::yield_now().await;
                        taken.extend(queue.take_available());
                    }
                }
                drop(writer);
                drain.join().await.unwrap();
                taken.extend(queue.take_available());
                taken
            });
            prop_assert_eq!(collected.concat(), expected);
            for line in &collected[..collected.len().saturating_sub(1)] {
                prop_assert!(line.ends_with('\n'));
            }
        }
    }
}
