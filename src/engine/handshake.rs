use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::BridgeError;
use crate::Result;

#[derive(Debug, Deserialize)]
struct PortAnnouncement {
    connection_port: Option<Value>,
}

/// Parse the parent process's `{"connection_port": N}` announcement.
///
/// `N` may be a JSON number or a numeric string; either way it must be a
/// whole number in `1..=65535`.
pub fn parse_connection_port(line: &str) -> Result<u16> {
    let line = line.trim();
    let announcement: PortAnnouncement = serde_json::from_str(line).map_err(|_| {
        BridgeError::Handshake(format!("Json data: [{}] cannot be decoded", line))
    })?;

    let value = announcement.connection_port.unwrap_or(Value::Null);
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.fract() == 0.0 && (1.0..=65535.0).contains(&n) => Ok(n as u16),
        _ => Err(BridgeError::Handshake(format!(
            "Bad connection port value [{}]",
            value
        ))),
    }
}

/// Read one line from `input` (stdin in production) and parse the port.
pub async fn read_connection_port<R>(input: &mut R) -> Result<u16>
where
    R: AsyncBufRead + Unpin,
{
    tracing::info!("Waiting for connection port information from parent process");

    let mut line = String::new();
    let n = input
        .read_line(&mut line)
        .await
        .map_err(|e| BridgeError::Handshake(format!("Cannot read standard input: {}", e)))?;
    if n == 0 {
        return Err(BridgeError::Handshake(
            "Standard input closed before a connection port was announced".to_string(),
        ));
    }

    parse_connection_port(&line)
}
