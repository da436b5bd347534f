//! Chat Node - client transport gateway, authentication state machine,
//! Active-mode command grammar, and local fan-out (spec §4.1).

pub mod auth;
pub mod command;
pub mod error;
pub mod node;
pub mod session;
pub mod transport;

pub use auth::{Authenticator, FileAuthenticator};
pub use command::Command;
pub use error::ChatError;
pub use node::ChatNode;
pub use session::ClientSession;
pub use transport::ClientTransport;
