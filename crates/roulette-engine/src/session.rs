//! The session aggregate: the registry plus session-wide counters.

use roulette_protocol::{GamePhase, PlayerId, PlayerView};

use crate::{EngineError, PlayerRegistry};

/// All state of the one game this process hosts.
///
/// Created once at startup and owned by the
/// [`RoundEngine`](crate::RoundEngine). `ResetGame` puts it back to its
/// initial values; nothing survives a process restart.
pub struct Session {
    pub(crate) registry: PlayerRegistry,
    pub(crate) phase: GamePhase,
    /// Starts at 1, bumped once per resolved round.
    pub(crate) round: u32,
    /// Always at least 1.
    pub(crate) max_rounds: u32,
    /// Set while `advance_round` runs; a nested call is a no-op.
    pub(crate) round_transition_in_flight: bool,
    /// Set once at teardown, never cleared.
    pub(crate) shutting_down: bool,
}

impl Session {
    pub(crate) fn new(starting_health: u32, max_rounds: u32) -> Self {
        Self {
            registry: PlayerRegistry::new(starting_health),
            phase: GamePhase::NotStarted,
            round: 1,
            max_rounds,
            round_transition_in_flight: false,
            shutting_down: false,
        }
    }

    /// Whether a game is currently in progress.
    pub fn started(&self) -> bool {
        self.phase == GamePhase::InProgress
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    /// Builds the page model for one player.
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub fn view(&self, id: PlayerId) -> Result<PlayerView, EngineError> {
        let player = self.registry.lookup(id)?;
        Ok(PlayerView {
            id: player.id,
            name: player.name.clone(),
            role: player.role,
            health: player.health,
            has_submitted: player.has_submitted(),
            round: self.round,
            max_rounds: self.max_rounds,
            phase: self.phase,
            shutting_down: self.shutting_down,
        })
    }
}
