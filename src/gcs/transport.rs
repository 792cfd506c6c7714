// src/gcs/transport.rs - Byte stream transports for GCS2 sessions
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serial2_tokio::SerialPort;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::errors::{GcsError, GcsResult};
use super::protocol;

/// Default TCP port of PI GCS2 controllers.
pub const DEFAULT_PORT: u16 = 50000;

/// Default RS-232 baud rate of PI GCS2 controllers.
pub const DEFAULT_BAUD: u32 = 115_200;

/// A bidirectional channel to one controller.
///
/// Implementations only move bytes; the meaning of commands lives in
/// [`GcsDevice`](super::device::GcsDevice).
#[async_trait]
pub trait GcsTransport: Send {
    /// Send one command line; the LF terminator is appended.
    async fn write_line(&mut self, line: &str) -> GcsResult<()>;

    /// Send a single-character command without terminator.
    async fn write_byte(&mut self, byte: u8) -> GcsResult<()>;

    /// Read one complete (possibly multi-line) reply.
    async fn read_reply(&mut self) -> GcsResult<String>;

    fn describe(&self) -> String;
}

/// How to reach a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Tcp { host: String, port: u16 },
    Serial { path: String, baud: u32 },
}

impl Connection {
    /// Open a fresh transport for this connection.
    pub async fn open(&self, timeout: Duration) -> GcsResult<Box<dyn GcsTransport>> {
        match self {
            Connection::Tcp { host, port } => {
                Ok(Box::new(StreamTransport::connect_tcp(host, *port, timeout).await?))
            }
            Connection::Serial { path, baud } => {
                Ok(Box::new(StreamTransport::open_serial(path, *baud, timeout)?))
            }
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Tcp { host, port } => write!(f, "{host}:{port}"),
            Connection::Serial { path, baud } => write!(f, "{path} @ {baud} baud"),
        }
    }
}

/// Transport over any tokio byte stream (TCP socket or serial port).
pub struct StreamTransport<S> {
    stream: BufReader<S>,
    timeout: Duration,
    label: String,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, timeout: Duration, label: impl Into<String>) -> Self {
        Self {
            stream: BufReader::new(stream),
            timeout,
            label: label.into(),
        }
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> GcsResult<()> {
        let writer = self.stream.get_mut();
        timeout(self.timeout, async {
            writer.write_all(bytes).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| GcsError::Timeout)??;
        Ok(())
    }
}

impl StreamTransport<TcpStream> {
    pub async fn connect_tcp(host: &str, port: u16, connect_timeout: Duration) -> GcsResult<Self> {
        tracing::debug!("Opening TCP session to {}:{}", host, port);
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| GcsError::Timeout)??;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, connect_timeout, format!("tcp://{host}:{port}")))
    }
}

impl StreamTransport<SerialPort> {
    pub fn open_serial(path: &str, baud: u32, read_timeout: Duration) -> GcsResult<Self> {
        tracing::debug!("Opening serial session on {} at {} baud", path, baud);
        let port = SerialPort::open(path, baud)?;
        Ok(Self::new(port, read_timeout, format!("serial://{path}@{baud}")))
    }
}

#[async_trait]
impl<S> GcsTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_line(&mut self, line: &str) -> GcsResult<()> {
        tracing::debug!("GCS <- {}", line);
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.write_bytes(&bytes).await
    }

    async fn write_byte(&mut self, byte: u8) -> GcsResult<()> {
        tracing::debug!("GCS <- #{}", byte);
        self.write_bytes(&[byte]).await
    }

    async fn read_reply(&mut self) -> GcsResult<String> {
        let mut reply = String::new();
        loop {
            let mut buf = Vec::new();
            let n = timeout(self.timeout, self.stream.read_until(b'\n', &mut buf))
                .await
                .map_err(|_| GcsError::Timeout)??;
            if n == 0 {
                return Err(GcsError::Disconnected);
            }
            // Unit strings may carry non-UTF-8 bytes (e.g. a Latin-1 micro sign).
            let line = String::from_utf8_lossy(&buf);
            let more = protocol::is_continuation(&line);
            reply.push_str(line.trim_end());
            if !more {
                break;
            }
            reply.push('\n');
        }
        tracing::debug!("GCS -> {}", reply);
        Ok(reply)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_multi_line_reply_is_joined() {
        let (client, mut controller) = duplex(256);
        let mut transport = StreamTransport::new(client, Duration::from_millis(200), "duplex");
        controller.write_all(b"X=1.0 \nY=2.0 \nZ=3.0\n").await.unwrap();
        let reply = transport.read_reply().await.unwrap();
        assert_eq!(reply, "X=1.0\nY=2.0\nZ=3.0");
    }

    #[tokio::test]
    async fn test_line_and_byte_commands_on_the_wire() {
        let (client, mut controller) = duplex(256);
        let mut transport = StreamTransport::new(client, Duration::from_millis(200), "duplex");
        transport.write_line("MOV X 1").await.unwrap();
        transport.write_byte(protocol::MOTION_STATUS).await.unwrap();
        let mut buf = [0u8; 9];
        controller.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"MOV X 1\n\x05");
    }

    #[tokio::test]
    async fn test_read_times_out_without_reply() {
        let (client, _controller) = duplex(64);
        let mut transport = StreamTransport::new(client, Duration::from_millis(20), "duplex");
        assert!(matches!(transport.read_reply().await, Err(GcsError::Timeout)));
    }

    #[tokio::test]
    async fn test_closed_stream_reports_disconnect() {
        let (client, controller) = duplex(64);
        drop(controller);
        let mut transport = StreamTransport::new(client, Duration::from_millis(50), "duplex");
        assert!(matches!(transport.read_reply().await, Err(GcsError::Disconnected)));
    }

    #[test]
    fn test_connection_display() {
        let tcp = Connection::Tcp { host: "192.168.0.100".into(), port: DEFAULT_PORT };
        assert_eq!(tcp.to_string(), "192.168.0.100:50000");
        let serial = Connection::Serial { path: "/dev/ttyUSB0".into(), baud: DEFAULT_BAUD };
        assert_eq!(serial.to_string(), "/dev/ttyUSB0 @ 115200 baud");
    }
}
