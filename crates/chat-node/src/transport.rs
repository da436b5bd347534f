//! The client-facing WebSocket transport. Reads and writes are split so a
//! session's write half can be shared across the task that owns the read
//! loop and any other task fanning a message out to it (broadcast,
//! cross-site delivery, presence push).

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::ChatError;

pub type ClientSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// A single client's write half, plus a latched "closed" flag so repeated
/// send failures (or a failure racing with the read loop's own shutdown)
/// don't attempt to write to an already-dead socket.
pub struct ClientTransport {
    sink: Mutex<ClientSink>,
    closed: AtomicBool,
}

impl ClientTransport {
    pub fn new(sink: ClientSink) -> Self {
        Self { sink: Mutex::new(sink), closed: AtomicBool::new(false) }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send one text frame. A failure closes the transport and latches
    /// `is_closed()`, so the caller's fan-out loop can isolate the failure
    /// to this one recipient and move on to the next.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ChatError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChatError::SendFailed);
        }
        let mut sink = self.sink.lock().await;
        match sink.send(Message::Text(text.into())).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, "client send failed, closing transport");
                self.closed.store(true, Ordering::Release);
                let _ = sink.close().await;
                Err(ChatError::SendFailed)
            }
        }
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
    }
}
