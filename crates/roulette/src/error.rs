//! Unified error type for the server.

use roulette_engine::EngineError;
use roulette_protocol::ProtocolError;

use crate::{AuthError, TransportError};

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attributes let `?` convert sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum RouletteError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A game rule was violated.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}
