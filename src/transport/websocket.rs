//! # WebSocket Connector
//!
//! `tokio-tungstenite` implementation of the [`Connector`]/[`Channel`] seam.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::channel::{Channel, Connector};
use crate::error::{PulseError, Result};

/// Opens WebSocket connections to a fixed URL
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// # Arguments
    ///
    /// * `url` - Full `ws://` endpoint
    /// * `connect_timeout` - Upper bound for TCP connect plus upgrade handshake
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&mut self) -> Result<Box<dyn Channel>> {
        debug!("Connecting to {}", self.url);

        let (stream, response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                PulseError::Transport(format!(
                    "Connect to {} timed out after {} ms",
                    self.url,
                    self.connect_timeout.as_millis()
                ))
            })??;

        info!("WebSocket connected to {} (HTTP {})", self.url, response.status());
        Ok(Box::new(WsChannel { stream }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// An open WebSocket
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for WsChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsChannel").finish_non_exhaustive()
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn recv(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(frame) => {
                    debug!("WebSocket close frame: {:?}", frame);
                    return Ok(None);
                }
                Message::Binary(data) => {
                    debug!("Ignoring {} byte binary frame", data.len());
                }
                // Pongs are queued by tungstenite and flushed on the next read
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("WebSocket close: {}", e);
        }
    }
}
