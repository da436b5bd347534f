//! Exchange Node - peer lifecycle, presence directory mutation, envelope
//! routing and the outbound reconnect loop (spec §4.2).

pub mod error;
pub mod node;
pub mod peer;
pub mod transport;

pub use error::ExchangeError;
pub use node::ExchangeNode;
pub use peer::PeerLink;
pub use transport::PeerTransport;
