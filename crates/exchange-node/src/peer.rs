//! A [`PeerLink`] models one configured remote site. Each site may have up
//! to two live transports at once: one we accepted (`inbound`) and one we
//! dialed (`outbound`). Both are kept because either side of a federation
//! pair may initiate the connection; [`PeerLink::preferred`] implements the
//! outbound-first policy so routing does not care which one is live.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::transport::PeerTransport;

pub struct PeerLink {
    pub name: String,
    pub host: String,
    pub port: u16,
    inbound: RwLock<Option<Arc<PeerTransport>>>,
    outbound: RwLock<Option<Arc<PeerTransport>>>,
}

impl PeerLink {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            inbound: RwLock::new(None),
            outbound: RwLock::new(None),
        }
    }

    pub async fn set_inbound(&self, transport: Arc<PeerTransport>) {
        *self.inbound.write().await = Some(transport);
    }

    pub async fn set_outbound(&self, transport: Arc<PeerTransport>) {
        *self.outbound.write().await = Some(transport);
    }

    pub async fn clear_inbound(&self) {
        *self.inbound.write().await = None;
    }

    pub async fn clear_outbound(&self) {
        *self.outbound.write().await = None;
    }

    /// The transport to send on: outbound if live, else inbound, else none.
    pub async fn preferred(&self) -> Option<Arc<PeerTransport>> {
        if let Some(transport) = self.outbound.read().await.as_ref() {
            if !transport.is_closed() {
                return Some(transport.clone());
            }
        }
        if let Some(transport) = self.inbound.read().await.as_ref() {
            if !transport.is_closed() {
                return Some(transport.clone());
            }
        }
        None
    }

    pub async fn is_reachable(&self) -> bool {
        self.preferred().await.is_some()
    }
}
