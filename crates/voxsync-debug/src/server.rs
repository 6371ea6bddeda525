//! TCP debug server

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::protocol::{DebugCommand, DebugResponse};

/// Errors on the debug wire
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    #[error("Invalid command JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait that the application implements to handle debug commands
pub trait DebugHandler: Send + Sync + 'static {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse;
}

/// Debug server handle - keep this alive to keep the server running
pub struct DebugServer {
    handle: tokio::task::JoinHandle<()>,
}

impl DebugServer {
    /// Start the debug server on the given port.
    /// Must be called from within a tokio runtime; returns immediately.
    pub fn start(handler: Arc<Mutex<dyn DebugHandler>>, port: u16) -> Self {
        let handle = tokio::spawn(async move {
            let addr = format!("127.0.0.1:{}", port);
            let listener = match TcpListener::bind(&addr).await {
                Ok(l) => {
                    log::info!("Debug server listening on {}", addr);
                    l
                }
                Err(e) => {
                    log::error!("Failed to bind debug server on {}: {}", addr, e);
                    return;
                }
            };
            accept_loop(listener, handler).await;
        });

        Self { handle }
    }
}

impl Drop for DebugServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn accept_loop(listener: TcpListener, handler: Arc<Mutex<dyn DebugHandler>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::info!("Debug client connected from {}", peer);
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, handler).await {
                        log::error!("Debug connection {} failed: {}", peer, e);
                    }
                    log::info!("Debug client disconnected: {}", peer);
                });
            }
            Err(e) => {
                log::error!("Debug server accept error: {}", e);
            }
        }
    }
}

/// Parse one request line
pub fn parse_command(line: &str) -> Result<DebugCommand, DebugError> {
    Ok(serde_json::from_str(line)?)
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    handler: Arc<Mutex<dyn DebugHandler>>,
) -> Result<(), DebugError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            // Connection closed
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match parse_command(trimmed) {
            Ok(cmd) => {
                log::debug!("Debug command: {:?}", cmd);
                let mut h = handler.lock().await;
                h.handle_command(cmd)
            }
            Err(e) => DebugResponse::error(e.to_string()),
        };

        let mut resp_json = serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(
                "{{\"status\":\"error\",\"message\":\"Serialize error: {}\"}}",
                e
            )
        });
        resp_json.push('\n');

        writer.write_all(resp_json.as_bytes()).await?;
        writer.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseData;

    struct CountingHandler {
        calls: usize,
    }

    impl DebugHandler for CountingHandler {
        fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse {
            self.calls += 1;
            match cmd {
                DebugCommand::Ping => DebugResponse::pong(),
                _ => DebugResponse::queued(format!("call {}", self.calls)),
            }
        }
    }

    #[tokio::test]
    async fn test_round_trip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<Mutex<dyn DebugHandler>> =
            Arc::new(Mutex::new(CountingHandler { calls: 0 }));
        let server = tokio::spawn(accept_loop(listener, handler));

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        writer.write_all(b"{\"cmd\":\"Ping\"}\n").await.unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let response: DebugResponse = serde_json::from_str(line.trim()).unwrap();
        match response {
            DebugResponse::Ok { data: ResponseData::Pong { message } } => assert_eq!(message, "pong"),
            other => panic!("unexpected response {:?}", other),
        }

        writer.write_all(b"not json\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.contains("\"status\":\"error\""));

        server.abort();
    }
}
