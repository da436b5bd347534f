use std::sync::Arc;

use crate::transport::ClientTransport;

/// `{username, transport, publicKey}`, created on successful authentication
/// and destroyed on disconnect.
pub struct ClientSession {
    pub username: String,
    pub public_key: String,
    pub transport: Arc<ClientTransport>,
}
