use thiserror::Error;

/// Errors internal to the Chat Node. Any send failure on a per-client
/// transport is a hard disconnect (see `ClientTransport`); this enum covers
/// everything upstream of that - credential store I/O in particular.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("client transport send failed")]
    SendFailed,
}
