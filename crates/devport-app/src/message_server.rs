//! Built-in bundler shell serving the message socket
//!
//! [`MessageServerBundler`] binds a TCP listener and upgrades every connection
//! to a WebSocket. Broadcasts go out to all connected clients as
//! `{"version": 2, "method": ..., "params": ...}` text frames.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use devport_core::prelude::*;
use devport_core::Location;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::server::{Bundler, MessageSocket, MiddlewareSet, ServerHandle, ServerInstance, StartOptions};

/// Protocol version stamped on every broadcast frame
const MESSAGE_PROTOCOL_VERSION: u8 = 2;

/// Frames buffered per client before slow clients start skipping
const BROADCAST_CAPACITY: usize = 64;

pub const MESSAGE_SOCKET_ROUTE: &str = "/message";

#[derive(Serialize)]
struct BroadcastFrame<'a> {
    version: u8,
    method: &'a str,
    params: serde_json::Value,
}

/// Bundler that only serves the message socket
#[derive(Debug, Clone)]
pub struct MessageServerBundler {
    bind_host: String,
}

impl MessageServerBundler {
    pub fn new() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
        }
    }

    /// Listen on a specific interface instead of all of them
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }
}

impl Default for MessageServerBundler {
    fn default() -> Self {
        Self::new()
    }
}

impl Bundler for MessageServerBundler {
    fn name(&self) -> &str {
        "message-socket"
    }

    async fn start_server(&self, options: &StartOptions) -> Result<ServerInstance> {
        if options.https {
            warn!("The built-in message server does not terminate TLS; serving plain HTTP");
        }

        let port = options.port.unwrap_or(0);
        let listener = TcpListener::bind((self.bind_host.as_str(), port)).await?;
        let bound = listener.local_addr()?;
        info!("Message server listening on {}", bound);

        let (frames_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(listener, frames_tx.clone(), shutdown_rx));

        let mut middleware = MiddlewareSet::default();
        middleware.register(MESSAGE_SOCKET_ROUTE, "message-socket");

        Ok(ServerInstance {
            server: Box::new(MessageServerHandle {
                shutdown_tx,
                accept_task: Mutex::new(Some(accept_task)),
            }),
            location: Location::new("http", "localhost", bound.port()),
            middleware,
            message_socket: Arc::new(BroadcastSocket { frames_tx }),
        })
    }
}

/// Sends serialized frames to every client task
struct BroadcastSocket {
    frames_tx: broadcast::Sender<String>,
}

impl MessageSocket for BroadcastSocket {
    fn broadcast(&self, method: &str, params: serde_json::Value) {
        let frame = BroadcastFrame {
            version: MESSAGE_PROTOCOL_VERSION,
            method,
            params,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize '{}' broadcast: {}", method, e);
                return;
            }
        };

        match self.frames_tx.send(text) {
            Ok(clients) => debug!("Broadcast '{}' to {} client(s)", method, clients),
            Err(_) => debug!("Broadcast '{}' with no clients connected", method),
        }
    }
}

struct MessageServerHandle {
    shutdown_tx: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl ServerHandle for MessageServerHandle {
    async fn close(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);

        let task = self
            .accept_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.await
                .map_err(|e| Error::process(format!("Message server task failed: {}", e)))?;
        }
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    frames_tx: broadcast::Sender<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("Message server: shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        // Subscribe before the handshake so no frame sent after
                        // the client connects is missed
                        let frames_rx = frames_tx.subscribe();
                        tokio::spawn(serve_client(stream, addr, frames_rx, shutdown_rx.clone()));
                    }
                    Err(e) => warn!("Message server: accept failed: {}", e),
                }
            }
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    addr: SocketAddr,
    mut frames_rx: broadcast::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Message server: handshake with {} failed: {}", addr, e);
            return;
        }
    };
    debug!("Message server: client {} connected", addr);
    let (mut ws_sink, mut ws_stream) = ws.split();

    loop {
        tokio::select! {
            frame = frames_rx.recv() => {
                match frame {
                    Ok(text) => {
                        if let Err(e) = ws_sink.send(WsMessage::Text(text.into())).await {
                            debug!("Message server: send to {} failed: {}", addr, e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Message server: client {} skipped {} frame(s)", addr, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Message server: read from {} failed: {}", addr, e);
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                let _ = ws_sink.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
    debug!("Message server: client {} disconnected", addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn local_options() -> StartOptions {
        StartOptions {
            port: Some(0),
            ..StartOptions::default()
        }
    }

    #[tokio::test]
    async fn test_binds_ephemeral_port() {
        let bundler = MessageServerBundler::new().with_bind_host("127.0.0.1");
        let instance = bundler.start_server(&local_options()).await.unwrap();

        assert_ne!(instance.location.port, 0);
        assert_eq!(
            instance.location.url,
            format!("http://localhost:{}", instance.location.port)
        );
        assert_eq!(
            instance.middleware.handler(MESSAGE_SOCKET_ROUTE),
            Some("message-socket")
        );
        instance.server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_reaches_client() {
        let bundler = MessageServerBundler::new().with_bind_host("127.0.0.1");
        let instance = bundler.start_server(&local_options()).await.unwrap();

        let url = format!("ws://127.0.0.1:{}{}", instance.location.port, MESSAGE_SOCKET_ROUTE);
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        instance
            .message_socket
            .broadcast("reload", json!({"reason": "test"}));

        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = frame.into_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["version"], 2);
        assert_eq!(value["method"], "reload");
        assert_eq!(value["params"]["reason"], "test");

        instance.server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_without_clients() {
        let bundler = MessageServerBundler::new().with_bind_host("127.0.0.1");
        let instance = bundler.start_server(&local_options()).await.unwrap();
        instance.message_socket.broadcast("devMenu", serde_json::Value::Null);
        instance.server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_port() {
        let bundler = MessageServerBundler::new().with_bind_host("127.0.0.1");
        let instance = bundler.start_server(&local_options()).await.unwrap();
        let port = instance.location.port;

        instance.server.close().await.unwrap();
        // A second close is harmless
        instance.server.close().await.unwrap();

        let rebound = TcpListener::bind(("127.0.0.1", port)).await;
        assert!(rebound.is_ok());
    }
}
