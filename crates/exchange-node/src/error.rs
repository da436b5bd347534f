use std::net::IpAddr;
use thiserror::Error;

/// Errors internal to the Exchange Node.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("peer transport send failed")]
    SendFailed,

    #[error("unknown peer source host: {0}")]
    UnknownPeer(IpAddr),

    #[error("envelope routing failed: {0}")]
    Routing(String),

    #[error("dial failed: {0}")]
    DialFailed(#[from] tokio_tungstenite::tungstenite::Error),
}
