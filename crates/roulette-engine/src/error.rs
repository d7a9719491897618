//! Error types for the engine.
//!
//! None of these mean the session is corrupted. Every error is raised
//! before any mutation happens, and the session stays usable afterwards.

use roulette_protocol::PlayerId;

/// The broad category of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The id doesn't name a registered player.
    NotFound,
    /// The request itself is malformed (e.g. an empty name).
    InvalidInput,
    /// The request is well-formed but the game is in the wrong state.
    PreconditionFailed,
    /// The session is shutting down.
    AlreadyTerminal,
}

/// Errors returned by [`RoundEngine`](crate::RoundEngine) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("player {0} not found")]
    NotFound(PlayerId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("game is already running")]
    AlreadyRunning,

    #[error("not enough players: {alive} alive, {required} required")]
    NotEnoughPlayers { alive: usize, required: usize },

    /// A finished game must be reset before a new one can start.
    #[error("game is over, reset before starting again")]
    GameOver,

    #[error("player {0} is already dead")]
    AlreadyDead(PlayerId),

    /// The player has no role that submits this round, or no game is
    /// running.
    #[error("player {0} has nothing to submit right now")]
    NotParticipating(PlayerId),

    #[error("player {0} already submitted this round")]
    AlreadySubmitted(PlayerId),

    #[error("server is shutting down")]
    ShuttingDown,
}

impl EngineError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::AlreadyRunning
            | Self::NotEnoughPlayers { .. }
            | Self::GameOver
            | Self::AlreadyDead(_)
            | Self::NotParticipating(_)
            | Self::AlreadySubmitted(_) => ErrorKind::PreconditionFailed,
            Self::ShuttingDown => ErrorKind::AlreadyTerminal,
        }
    }

    /// HTTP-style status code used on the wire.
    pub fn code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::PreconditionFailed => 409,
            ErrorKind::AlreadyTerminal => 410,
        }
    }
}
