//! Line Protocol Bus Adapters
//!
//! Carries bus messages as `key:value` text lines over any async byte stream.
//! Selected with `RELAY_BUS_TRANSPORT=lines`: the producer writes to stdout
//! and the consumer reads stdin, so the processes pipe into the bus's console
//! tools:
//!
//! ```text
//! quote-producer | kafka-console-producer --topic imat3a_ADA \
//!     --property parse.key=true --property key.separator=:
//! kafka-console-consumer --topic imat3a_ADA --from-beginning \
//!     --property print.key=true --property key.separator=: | quote-consumer
//! ```
//!
//! This transport ignores the topic and brokers. The tool on the other end of
//! the pipe chooses them; the topic is only recorded in logs here.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

use crate::application::ports::{BusError, BusMessage, BusPublisher, BusSubscriber, PublishError};

/// Publishes `key:value` lines to a writer.
pub struct LineBusPublisher<W> {
    writer: Mutex<W>,
}

impl<W> LineBusPublisher<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Publish to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the publisher, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl LineBusPublisher<tokio::io::Stdout> {
    /// Publish to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> BusPublisher for LineBusPublisher<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn publish(&self, topic: &str, message: &BusMessage) -> Result<(), PublishError> {
        let mut line = message.to_line();
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        result.map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                PublishError::Closed
            } else {
                PublishError::Transport {
                    message: e.to_string(),
                }
            }
        })?;

        tracing::trace!(topic, key = %message.key, "Line published");
        Ok(())
    }
}

/// Reads bus lines from a buffered reader.
pub struct LineBusSubscriber<R> {
    lines: Lines<R>,
}

impl<R> LineBusSubscriber<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Read lines from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl LineBusSubscriber<BufReader<tokio::io::Stdin>> {
    /// Read lines from standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> BusSubscriber for LineBusSubscriber<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> Result<Option<String>, BusError> {
        self.lines.next_line().await.map_err(|e| BusError::Read {
            message: e.to_string(),
        })
    }
}
