//! WebSocket transport for the local-network link
//!
//! Connects as a client to the device's WebSocket endpoint and relays binary
//! messages bidirectionally. One WebSocket message is one protocol frame.
//!
//! ```text
//! robolink ──ws://<device>/ws──► device
//! ```

use super::{Transport, TransportChannels};
use crate::constants::{CHANNEL_CAPACITY, NETWORK_CONNECT_TIMEOUT_SECS, NETWORK_WS_PATH};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

/// WebSocket client transport
///
/// # Example
///
/// ```ignore
/// let transport = WebSocketTransport::new("192.168.1.40");
/// let channels = transport.open(shutdown).await?;
/// ```
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Create a transport for `target`
    ///
    /// A bare host or IP address is expanded to `ws://<target>/ws`; full
    /// `ws://` or `wss://` URLs are used as given.
    pub fn new(target: &str) -> Self {
        Self {
            url: device_url(target),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn device_url(target: &str) -> String {
    let target = target.trim();
    if target.starts_with("ws://") || target.starts_with("wss://") {
        target.to_string()
    } else {
        format!("ws://{}{}", target.trim_end_matches('/'), NETWORK_WS_PATH)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
        let connect = connect_async(self.url.as_str());
        let (ws_stream, _response) =
            tokio::time::timeout(Duration::from_secs(NETWORK_CONNECT_TIMEOUT_SECS), connect)
                .await
                .map_err(|_| Error::transport(format!("{}: connect timed out", self.url)))?
                .map_err(|e| Error::transport(format!("{}: {}", self.url, e)))?;

        info!("WebSocket connected: {}", self.url);

        let (in_tx, in_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        // RX task: WebSocket → Channel
        let shutdown_rx = shutdown.clone();
        let mut rx_handle = tokio::spawn(async move {
            while !shutdown_rx.load(Ordering::Relaxed) {
                match tokio::time::timeout(Duration::from_millis(100), ws_stream.next()).await {
                    Ok(Some(Ok(Message::Binary(data)))) => {
                        if in_tx.send(data).await.is_err() {
                            break; // Channel closed
                        }
                    }
                    Ok(Some(Ok(Message::Close(frame)))) => {
                        debug!("WebSocket closed by device: {:?}", frame);
                        break;
                    }
                    Ok(Some(Ok(_))) => {} // Ignore text, ping, pong
                    Ok(Some(Err(e))) => {
                        debug!("WebSocket read error: {}", e);
                        break;
                    }
                    Ok(None) => break, // Connection closed
                    Err(_) => {}       // Timeout
                }
            }
        });

        // TX task: Channel → WebSocket
        let shutdown_tx = shutdown.clone();
        let mut tx_handle = tokio::spawn(async move {
            while !shutdown_tx.load(Ordering::Relaxed) {
                match tokio::time::timeout(Duration::from_millis(100), out_rx.recv()).await {
                    Ok(Some(data)) => {
                        if let Err(e) = ws_sink.send(Message::Binary(data)).await {
                            debug!("WebSocket write error: {}", e);
                            break;
                        }
                    }
                    Ok(None) => break, // Channel closed
                    Err(_) => {}       // Timeout
                }
            }
            let _ = ws_sink.close().await;
        });

        // Either side stopping ends the link; dropping the RX task closes
        // the inbound channel, which is how the owner learns of the loss.
        let url = self.url;
        tokio::spawn(async move {
            tokio::select! {
                _ = &mut rx_handle => {}
                _ = &mut tx_handle => {}
            }
            rx_handle.abort();
            tx_handle.abort();
            info!("WebSocket disconnected: {}", url);
        });

        Ok(TransportChannels {
            rx: in_rx,
            tx: out_tx,
        })
    }
}
