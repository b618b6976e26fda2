//! Signaling channel - the client end of the duplex WebSocket.
//!
//! Two pump tasks own the socket halves: outbound `ClientMessage`s are
//! serialized onto the sink, inbound text frames are parsed into
//! `ServerMessage`s and handed to the session through a channel. In-order
//! delivery per pair is inherited from the socket; unparseable frames are
//! logged and skipped.

use crate::errors::LinkError;
use common::protocol::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Client end of the signaling channel.
pub struct SignalingChannel {
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl SignalingChannel {
    /// Connect to the signaling server.
    ///
    /// Returns the channel plus the stream of server envelopes to feed into
    /// the call session. The stream ends when the socket closes.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerMessage>), LinkError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| LinkError::Signaling(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<ServerMessage>();

        // Outbound pump: session -> socket.
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(target: "call.signaling", error = %e, "Failed to encode envelope");
                        continue;
                    }
                };
                if write.send(Message::Text(json)).await.is_err() {
                    debug!(target: "call.signaling", "Socket sink closed");
                    break;
                }
            }
        });

        // Inbound pump: socket -> session.
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(target: "call.signaling", error = %e, "Unparseable server envelope");
                        }
                    },
                    // The websocket layer answers pings; nothing to do.
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Ok(Message::Close(_)) | Err(_) => {
                        debug!(target: "call.signaling", "Signaling channel closed");
                        break;
                    }
                    Ok(_) => {}
                }
            }
        });

        Ok((Self { outbound }, inbound))
    }

    /// A sender handle for the call session's outbound envelopes.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientMessage> {
        self.outbound.clone()
    }

    /// Send one envelope. Dropped silently if the channel has closed.
    pub fn send(&self, message: ClientMessage) {
        if self.outbound.send(message).is_err() {
            debug!(target: "call.signaling", "Signaling channel gone, message dropped");
        }
    }
}
