//! Newline-delimited JSON transport over any byte stream.

use async_trait::async_trait;
use remote_shell_core::Message;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{mpsc, oneshot},
};

use crate::channel::{MessageSink, MessageSource, TransportError};

/// Default cap on a single frame, newline included.
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

/// Longest slice of an undecodable line kept in the error.
const MAX_ERROR_LINE: usize = 256;

/// Frames queued for the writer task before `send` waits.
const WRITE_QUEUE: usize = 64;

/// Wrap a reader and writer as a message channel.
///
/// Must be called from within a Tokio runtime: the sink spawns its writer task.
#[must_use]
pub fn json_lines<R, W>(reader: R, writer: W) -> (JsonLinesSource<R>, JsonLinesSink)
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    (JsonLinesSource::new(reader), JsonLinesSink::new(writer))
}

/// Receiving half: one JSON message per line.
///
/// Lines longer than the frame limit are skipped and reported as
/// [`TransportError::FrameTooLarge`]. A partially read line survives a
/// cancelled `receive`.
pub struct JsonLinesSource<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    max_frame: usize,
    oversized: bool,
}

impl<R: AsyncRead + Unpin + Send> JsonLinesSource<R> {
    /// Create a source reading from `reader` with [`DEFAULT_MAX_FRAME`].
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_max_frame(reader, DEFAULT_MAX_FRAME)
    }

    /// Create a source that rejects frames longer than `max_frame` bytes.
    #[must_use]
    pub fn with_max_frame(reader: R, max_frame: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::new(),
            max_frame,
            oversized: false,
        }
    }

    /// Fill `buffer` with the next line. `Ok(false)` at end of stream.
    async fn fill_line(&mut self) -> Result<bool, TransportError> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if std::mem::take(&mut self.oversized) {
                    return Err(TransportError::FrameTooLarge {
                        limit: self.max_frame,
                    });
                }
                return Ok(!self.buffer.is_empty());
            }

            let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            let used = chunk.len();
            if !self.oversized {
                if self.buffer.len() + used > self.max_frame {
                    self.oversized = true;
                    self.buffer.clear();
                } else {
                    self.buffer.extend_from_slice(chunk);
                }
            }
            self.reader.consume(used);

            if complete {
                if std::mem::take(&mut self.oversized) {
                    tracing::warn!(limit = self.max_frame, "Skipped oversized frame");
                    return Err(TransportError::FrameTooLarge {
                        limit: self.max_frame,
                    });
                }
                return Ok(true);
            }
        }
    }
}

fn decode(line: &[u8]) -> Result<Message, TransportError> {
    serde_json::from_slice(line).map_err(|source| TransportError::Decode {
        line: String::from_utf8_lossy(line)
            .chars()
            .take(MAX_ERROR_LINE)
            .collect(),
        source,
    })
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MessageSource for JsonLinesSource<R> {
    async fn receive(&mut self) -> Result<Message, TransportError> {
        loop {
            if !self.fill_line().await? {
                return Err(TransportError::Closed);
            }

            let line = self.buffer.trim_ascii();
            let result = (!line.is_empty()).then(|| decode(line));
            self.buffer.clear();
            if let Some(result) = result {
                return result;
            }
        }
    }
}

struct Frame {
    bytes: Vec<u8>,
    written: oneshot::Sender<std::io::Result<()>>,
}

/// Sending half: one JSON message per line, flushed after each.
///
/// Frames go through a single writer task, so a `send` dropped part way
/// never leaves half a line on the stream: a frame is either queued whole
/// or not at all.
pub struct JsonLinesSink {
    frames: mpsc::Sender<Frame>,
}

impl JsonLinesSink {
    /// Create a sink writing to `writer`.
    ///
    /// Spawns the writer task, so this must run inside a Tokio runtime. The
    /// task ends when the sink is dropped or a write fails.
    #[must_use]
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (frames, rx) = mpsc::channel(WRITE_QUEUE);
        tokio::spawn(write_frames(writer, rx));
        Self { frames }
    }
}

async fn write_frames<W: AsyncWrite + Unpin>(mut writer: W, mut frames: mpsc::Receiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        let result = write_frame(&mut writer, &frame.bytes).await;
        let failed = result.is_err();
        if let Err(e) = &result {
            tracing::debug!("Failed to write frame: {e}");
        }
        let _ = frame.written.send(result);
        if failed {
            break;
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[async_trait]
impl MessageSink for JsonLinesSink {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        let mut bytes = serde_json::to_vec(&message).map_err(TransportError::Encode)?;
        bytes.push(b'\n');

        let (written, done) = oneshot::channel();
        self.frames
            .send(Frame { bytes, written })
            .await
            .map_err(|_| TransportError::Closed)?;
        done.await.map_err(|_| TransportError::Closed)??;
        tracing::trace!(kind = message.kind(), "Sent message");
        Ok(())
    }
}

#[cfg(feature = "tcp")]
pub mod tcp {
    //! TCP helpers.

    use tokio::net::{TcpStream, ToSocketAddrs, tcp::OwnedReadHalf};

    use super::{JsonLinesSink, JsonLinesSource, json_lines};
    use crate::channel::TransportError;

    /// Source half of a TCP channel.
    pub type TcpSource = JsonLinesSource<OwnedReadHalf>;
    /// Sink half of a TCP channel.
    pub type TcpSink = JsonLinesSink;

    /// Split an accepted or connected stream into a channel.
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> (TcpSource, TcpSink) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {e}");
        }
        let (reader, writer) = stream.into_split();
        json_lines(reader, writer)
    }

    /// Connect to a shell server.
    ///
    /// # Errors
    /// Returns error if the connection cannot be established.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<(TcpSource, TcpSink), TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(from_stream(stream))
    }
}

#[cfg(test)]
mod tests {
    use remote_shell_core::ChannelState;
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_receive_skips_blank_lines() {
        let reader = Builder::new()
            .read(b"\n{\"type\":\"bof_stdout\"}\n")
            .read(b"{\"type\":\"stdout\",\"content\":\"a.txt\",\"state\":\"new\"}\n")
            .build();
        let mut source = JsonLinesSource::new(reader);

        assert_eq!(source.receive().await.unwrap(), Message::BofStdout);
        assert_eq!(
            source.receive().await.unwrap(),
            Message::stdout("a.txt", ChannelState::New)
        );
        assert!(matches!(
            source.receive().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unknown_message_is_not_fatal() {
        let reader = Builder::new()
            .read(b"{\"type\":\"telemetry\",\"cpu\":3}\n")
            .read(b"{\"type\":\"eof_stdout\"}\n")
            .build();
        let mut source = JsonLinesSource::new(reader);

        let err = source.receive().await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("telemetry"));

        assert_eq!(source.receive().await.unwrap(), Message::EofStdout);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_not_fatal() {
        let reader = Builder::new()
            .read(b"{\"type\":\"stdout\",\"content\":\"\xff\",\"state\":\"new\"}\n")
            .read(b"{\"type\":\"eof_stdout\"}\n")
            .build();
        let mut source = JsonLinesSource::new(reader);

        let err = source.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::Decode { .. }));
        assert!(!err.is_fatal());

        assert_eq!(source.receive().await.unwrap(), Message::EofStdout);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_skipped() {
        let long = vec![b'x'; 48];
        let reader = Builder::new()
            .read(&long)
            .read(&long)
            .read(b"\n{\"type\":\"eof_stdout\"}\n")
            .build();
        let mut source = JsonLinesSource::with_max_frame(reader, 64);

        let err = source.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { limit: 64 }));
        assert!(!err.is_fatal());

        assert_eq!(source.receive().await.unwrap(), Message::EofStdout);
    }

    #[tokio::test]
    async fn test_unterminated_oversized_frame_then_closed() {
        let reader = Builder::new().read(&[b'x'; 100]).build();
        let mut source = JsonLinesSource::with_max_frame(reader, 64);

        assert!(matches!(
            source.receive().await,
            Err(TransportError::FrameTooLarge { .. })
        ));
        assert!(matches!(
            source.receive().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_send_writes_one_line() {
        let writer = Builder::new()
            .write(b"{\"type\":\"command\",\"line\":\"ls -l\"}\n")
            .build();
        let sink = JsonLinesSink::new(writer);

        sink.send(Message::command("ls -l")).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_send_never_splits_a_frame() {
        let (client, server) = tokio::io::duplex(64);
        let (_unused, sink) = json_lines(tokio::io::empty(), client);
        let mut source = JsonLinesSource::new(server);

        let big = "x".repeat(1024);
        let pending = sink.send(Message::stdout(big.clone(), ChannelState::Running));
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), pending)
                .await
                .is_err()
        );
        let next = tokio::spawn(async move { sink.send(Message::EofStdout).await });

        assert_eq!(
            source.receive().await.unwrap(),
            Message::stdout(big, ChannelState::Running)
        );
        assert_eq!(source.receive().await.unwrap(), Message::EofStdout);
        next.await.unwrap().unwrap();
    }
}
