//! Core protocol types for Guess Roulette's wire format.
//!
//! Every type in this module is serialized to JSON and sent to (or
//! received from) a player's browser. The shapes here are the contract
//! with the client page: renaming a field is a breaking change.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for a registered player.
///
/// Newtype over `u64` so a player id can't be confused with a round
/// number or a health value. `#[serde(transparent)]` keeps it a plain
/// number in JSON: `PlayerId(42)` is just `42`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The part a player plays in the current round.
///
/// Roles are reassigned at the start of every round. `Dead` and `Winner`
/// are terminal for the rest of the game.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum Role {
    /// Registered but not assigned a role this round.
    #[default]
    Default,
    /// Chooses the reference number everyone else is scored against.
    Picker,
    /// Loses the full distance from the Picker's number.
    Guesser,
    /// Loses half the distance from the Picker's number, rounded down.
    Better,
    /// Eliminated.
    Dead,
    /// Won the game.
    Winner,
}

impl Role {
    /// Returns `true` for the roles that must submit a number this round.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Picker | Self::Guesser | Self::Better)
    }

    /// Returns `true` unless the player has been eliminated.
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::Dead)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Picker => write!(f, "Picker"),
            Self::Guesser => write!(f, "Guesser"),
            Self::Better => write!(f, "Better"),
            Self::Dead => write!(f, "Dead"),
            Self::Winner => write!(f, "Winner"),
        }
    }
}

// ---------------------------------------------------------------------------
// GamePhase
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
/// NotStarted → InProgress → Ended
///      ↑                      │
///      └──────(reset)─────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum GamePhase {
    /// Players are registering; the admin hasn't started yet.
    #[default]
    NotStarted,
    /// Rounds are being played.
    InProgress,
    /// A winner was declared (or nobody survived). Waiting for a reset.
    Ended,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Everything a player's page needs to render itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    pub health: u32,
    /// Whether this player already submitted a number this round.
    /// The page shows "waiting for others" instead of the number form.
    pub has_submitted: bool,
    pub round: u32,
    pub max_rounds: u32,
    pub phase: GamePhase,
    /// Set once the host is tearing the server down.
    pub shutting_down: bool,
}

/// One row of the administrator's player table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    pub health: u32,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Commands only the host may issue. Carried inside
/// [`ClientRequest::Admin`] together with the admin token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum AdminCommand {
    StartGame,
    ResetGame,
    IncMaxRounds,
    DecMaxRounds,
    KickPlayer { player_id: PlayerId },
    /// List every registered player.
    Roster,
}

/// Messages a player's client sends to the server.
///
/// Internally tagged (`#[serde(tag = "type")]`), so a registration looks
/// like `{ "type": "Register", "name": "ada" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// Join the session under a display name. Binds this connection to
    /// the new player.
    Register { name: String },

    /// Bind this connection to an already registered player, e.g. after
    /// the phone's browser reloaded the page.
    Attach { player_id: PlayerId },

    /// Ask for the bound player's current view.
    GetPlayer,

    /// Submit this round's number.
    ///
    /// Sent as the raw text of the form field. Anything that isn't an
    /// integer between 0 and 100 counts as "no pick" rather than an
    /// error.
    Submit { number: String },

    /// "I'm still here." Keeps an idle registrant from being swept
    /// before the game starts.
    Heartbeat,

    /// A host command. `token` is checked by the server before the
    /// command reaches the game.
    Admin { token: String, command: AdminCommand },
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Registration succeeded; the connection is now bound to `player`.
    Registered { player: PlayerView },

    /// The bound player's current view. Sent in reply to `GetPlayer`,
    /// `Attach`, `Submit`, and pushed whenever the game state changes.
    PlayerState { player: PlayerView },

    HeartbeatAck,

    GameStarted,

    GameReset,

    /// The round cap after an increment/decrement.
    MaxRounds { max_rounds: u32 },

    /// Admin reply to `KickPlayer`. `removed` is `true` when the player
    /// was deleted (before the game) and `false` when they were marked
    /// dead (during the game).
    PlayerKicked { player_id: PlayerId, removed: bool },

    Roster {
        max_rounds: u32,
        players: Vec<RosterEntry>,
    },

    /// Sent to a player who has been removed. The server closes the
    /// connection right after.
    Kicked,

    /// The host is shutting the server down.
    ShuttingDown,

    /// Something went wrong. `code` follows HTTP conventions
    /// (400 bad input, 401 unauthorized, 404 unknown player,
    /// 409 wrong game state, 410 shutting down).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// The content of an envelope: a request from a client or a message from
/// the server.
///
/// Adjacently tagged:
///   `{ "type": "Request", "data": { "type": "Heartbeat" } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Request(ClientRequest),
    Response(ServerMessage),
}

/// The top-level message wrapper. Every message on the wire is an Envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number.
    pub seq: u64,

    /// Milliseconds since the sender started. Only used for debugging.
    pub timestamp: u64,

    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
