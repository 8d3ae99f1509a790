use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::engine::protocol::{expect_ok, Request};
use crate::error::BridgeError;
use crate::retry::RetryPolicy;
use crate::Result;

const ENGINE_HOST: &str = "127.0.0.1";
/// Longest reply line accepted from the engine, newline included
pub const MAX_REPLY_BYTES: u64 = 4096;

/// The bridge's single connection to the local decision engine
///
/// Strict request/response: every `send_message` writes one line and waits
/// for exactly one line back before returning. Dropping the connector closes
/// the socket.
pub struct EngineConnector {
    stream: BufReader<TcpStream>,
    port: u16,
}

impl EngineConnector {
    /// Connect to the engine listening on `127.0.0.1:port`.
    ///
    /// Fails with [`BridgeError::Connection`] once `policy` runs out of
    /// attempts.
    pub async fn connect(port: u16, policy: RetryPolicy) -> Result<Self> {
        let what = format!("Connecting to decision engine on port {}", port);
        let stream = policy
            .run(&what, |_| TcpStream::connect((ENGINE_HOST, port)))
            .await
            .map_err(|exhausted| {
                BridgeError::Connection(format!(
                    "{}:{} refused after {} attempts: {}",
                    ENGINE_HOST, port, exhausted.attempts, exhausted.last_error
                ))
            })?;

        stream.set_nodelay(true)?;
        tracing::info!("Connected to decision engine on port {}", port);

        Ok(Self {
            stream: BufReader::new(stream),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send one line and return the engine's reply, trimmed.
    ///
    /// A newline is appended if `message` lacks one. The reply is read up to
    /// its newline, however many TCP segments it arrives in, and may not be
    /// longer than [`MAX_REPLY_BYTES`].
    pub async fn send_message(&mut self, message: &str) -> Result<String> {
        let mut payload = message.to_string();
        if !payload.ends_with('\n') {
            payload.push('\n');
        }

        self.stream.get_mut().write_all(payload.as_bytes()).await?;
        self.stream.get_mut().flush().await?;

        let mut reply = String::new();
        let n = (&mut self.stream)
            .take(MAX_REPLY_BYTES)
            .read_line(&mut reply)
            .await?;
        if n == 0 {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "decision engine closed the connection",
            )));
        }
        if n as u64 == MAX_REPLY_BYTES && !reply.ends_with('\n') {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("decision engine reply exceeds {} bytes", MAX_REPLY_BYTES),
            )));
        }

        Ok(reply.trim().to_string())
    }

    pub async fn request(&mut self, request: &Request) -> Result<String> {
        self.send_message(&request.encode()).await
    }

    /// Send `request` and insist on an `OK` reply.
    pub async fn request_ok(&mut self, request: &Request) -> Result<()> {
        let reply = self.request(request).await?;
        expect_ok(&reply)
    }
}
