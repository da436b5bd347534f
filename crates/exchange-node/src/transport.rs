//! The peer-link WebSocket transport. Both inbound (accepted) and outbound
//! (dialed) links are normalized to the same stream type so a [`PeerLink`]
//! can hold either in the same slot.

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ExchangeError;

pub type PeerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type PeerSink = SplitSink<PeerStream, Message>;

/// One direction of a peer link. Sends are isolated to this transport: a
/// failure latches `is_closed()` and does not affect the other slot
/// (`inbound`/`outbound`) or any other peer.
pub struct PeerTransport {
    sink: Mutex<PeerSink>,
    closed: AtomicBool,
}

impl PeerTransport {
    pub fn new(sink: PeerSink) -> Self {
        Self { sink: Mutex::new(sink), closed: AtomicBool::new(false) }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<(), ExchangeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExchangeError::SendFailed);
        }
        let mut sink = self.sink.lock().await;
        match sink.send(Message::Text(text.into())).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, "peer send failed, closing transport slot");
                self.closed.store(true, Ordering::Release);
                let _ = sink.close().await;
                Err(ExchangeError::SendFailed)
            }
        }
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
    }
}
