//! ZMQ subscriber for the detector's frame stream.
//!
//! The device publishes each frame as a three-part message: a topic stub,
//! an 8-byte header and the payload. [`FrameReceiver`] only moves raw
//! parts; interpretation lives in the engine so receive failures and
//! malformed frames stay distinguishable.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use zeromq::{Socket, SocketRecv, SubSocket};

use xspd_core::XspdError;

/// Outcome of one receive attempt.
#[derive(Debug)]
pub enum Received {
    /// A complete multipart message.
    Parts(Vec<Bytes>),
    /// Cancelled or the socket is already closed.
    Closed,
    /// The socket reported an error; the stream may still recover.
    Failed(String),
}

/// SUB socket connected to one data port, subscribed to everything.
pub struct FrameReceiver {
    socket: Option<SubSocket>,
    uri: String,
}

impl FrameReceiver {
    /// Connect to a data port URI (`tcp://ip:port`) and subscribe to all
    /// topics.
    pub async fn connect(uri: &str) -> Result<Self, XspdError> {
        let mut socket = SubSocket::new();
        socket.connect(uri).await.map_err(|e| XspdError::Transport {
            uri: uri.to_string(),
            message: format!("Failed to connect frame subscriber: {e}"),
        })?;
        socket.subscribe("").await.map_err(|e| XspdError::Transport {
            uri: uri.to_string(),
            message: format!("Failed to subscribe: {e}"),
        })?;
        tracing::debug!(uri, "frame subscriber connected");
        Ok(Self {
            socket: Some(socket),
            uri: uri.to_string(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Wait for the next multipart message, or until `cancel` fires.
    pub async fn recv_parts(&mut self, cancel: &CancellationToken) -> Received {
        let Some(socket) = self.socket.as_mut() else {
            return Received::Closed;
        };
        tokio::select! {
            _ = cancel.cancelled() => Received::Closed,
            message = socket.recv() => match message {
                Ok(message) => Received::Parts(message.into_vec()),
                Err(e) => Received::Failed(e.to_string()),
            },
        }
    }

    /// Close the socket. Further receives return [`Received::Closed`].
    pub async fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close().await;
            tracing::debug!(uri = %self.uri, "frame subscriber closed");
        }
    }
}
