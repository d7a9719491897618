//! # Guess Roulette server
//!
//! A party game for phones on the same network. The host runs this
//! server; players open the page, register, and get a role each round.
//! The Picker chooses a number, Guessers and Betters try to land near it,
//! and the distance comes off their health.
//!
//! The game rules live in [`roulette_engine`]. This crate puts them on
//! the network: a WebSocket transport, one handler task per connection,
//! token-checked admin commands, an idle sweep, and graceful shutdown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roulette::prelude::*;
//!
//! # async fn start() -> Result<(), RouletteError> {
//! let server = RouletteServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(StaticTokenAuth::new("let-me-in"))
//!     .await?;
//! server.run().await
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod config;
mod error;
mod handler;
mod server;
mod transport;

pub use auth::{AdminAuthenticator, AuthError, StaticTokenAuth};
pub use config::ServerConfig;
pub use error::RouletteError;
pub use server::{RouletteServer, RouletteServerBuilder};
pub use transport::{
    Connection, ConnectionId, Transport, TransportError, WebSocketConnection,
    WebSocketTransport,
};

/// Everything needed to run a server or write a client in one import.
pub mod prelude {
    pub use roulette_engine::{EngineConfig, EngineError};
    pub use roulette_protocol::{
        AdminCommand, ClientRequest, Codec, Envelope, GamePhase, JsonCodec,
        Payload, PlayerId, PlayerView, Role, RosterEntry, ServerMessage,
    };

    pub use crate::{
        AdminAuthenticator, AuthError, RouletteError, RouletteServer,
        RouletteServerBuilder, ServerConfig, StaticTokenAuth,
    };
}
