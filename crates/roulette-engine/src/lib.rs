//! The Guess Roulette game engine.
//!
//! Players join a shared session, get a role each round, submit a number,
//! and lose health depending on how far they were from the Picker's
//! number. The last one standing (or the healthiest when the round cap is
//! hit) wins.
//!
//! # Key types
//!
//! - [`PlayerRegistry`]: the identity-keyed player collection
//! - [`Session`]: registry plus session-wide counters and flags
//! - [`RoundEngine`]: the state machine: role assignment, the
//!   submission barrier, health resolution, and termination
//! - [`EngineConfig`]: starting health, default round cap, timeouts
//!
//! # Concurrency
//!
//! Nothing in this crate locks. Every mutating method takes `&mut self`,
//! so the caller owns exactly one mutual-exclusion domain (the server
//! wraps the engine in a single `tokio::sync::Mutex`) and every
//! transition runs to completion before the next one starts.

mod config;
mod engine;
mod error;
mod player;
mod registry;
mod session;

pub use config::EngineConfig;
pub use engine::{KickOutcome, RoundEngine, RoundOutcome};
pub use error::{EngineError, ErrorKind};
pub use player::{Pick, Player};
pub use registry::PlayerRegistry;
pub use session::Session;

pub use roulette_protocol::{GamePhase, PlayerId, PlayerView, Role, RosterEntry};
