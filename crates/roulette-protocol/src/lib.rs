//! Wire protocol for Guess Roulette.
//!
//! This crate defines what travels between a player's client and the
//! game server:
//!
//! - **Types** ([`Envelope`], [`ClientRequest`], [`ServerMessage`],
//!   [`PlayerView`], etc.): the message structures on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! The protocol layer knows nothing about rounds or health resolution.
//! The engine produces [`PlayerView`]s, the server wraps them in
//! envelopes, and this crate turns them into bytes.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AdminCommand, ClientRequest, Envelope, GamePhase, Payload, PlayerId,
    PlayerView, Role, RosterEntry, ServerMessage,
};
