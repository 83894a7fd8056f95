//! Bidirectional message streams.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, RpcError};
use crate::protocol::Message;

/// One end of a bidirectional `InvokeAction` stream.
#[async_trait]
pub trait ActionStream: Send {
    /// Send a message to the peer.
    async fn send(&mut self, message: Message) -> Result<()>;

    /// Receive the next message; `None` once the peer has closed its side.
    async fn recv(&mut self) -> Result<Option<Message>>;

    /// Signal that no further messages will be sent.
    async fn close_send(&mut self) -> Result<()>;

    /// Tear the stream down in both directions.
    async fn close(&mut self);
}

/// In-memory stream end backed by tokio channels.
#[derive(Debug)]
pub struct ChannelStream {
    tx: Option<mpsc::UnboundedSender<Message>>,
    rx: mpsc::UnboundedReceiver<Message>,
}

/// Create two connected in-memory stream ends.
pub fn channel_pair() -> (ChannelStream, ChannelStream) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        ChannelStream {
            tx: Some(a_tx),
            rx: a_rx,
        },
        ChannelStream {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

#[async_trait]
impl ActionStream for ChannelStream {
    async fn send(&mut self, message: Message) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(RpcError::StreamClosed)?;
        tx.send(message).map_err(|_| RpcError::StreamClosed)
    }

    async fn recv(&mut self) -> Result<Option<Message>> {
        Ok(self.rx.recv().await)
    }

    async fn close_send(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }

    async fn close(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}
