//! Engine configuration.

use std::time::Duration;

/// Tunables for a game session.
///
/// The host can change the round cap while the server runs
/// (`IncMaxRounds`/`DecMaxRounds`); `default_max_rounds` is what a fresh
/// or reset session starts with.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Round cap a new session starts with. Clamped to at least 1.
    pub default_max_rounds: u32,

    /// Health every player registers with.
    pub starting_health: u32,

    /// Living players needed to start a game.
    pub min_players: usize,

    /// How long a registrant may go without a heartbeat before the idle
    /// sweep removes them. Only applies while no game is running.
    pub heartbeat_timeout: Duration,

    /// Seed for the role shuffle. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_rounds: 5,
            starting_health: 100,
            min_players: 3,
            heartbeat_timeout: Duration::from_secs(60),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Returns a copy with a fixed shuffle seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns a copy with a different starting round cap.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.default_max_rounds = max_rounds;
        self
    }

    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// Called by [`RoundEngine::new`](crate::RoundEngine::new).
    pub fn validated(mut self) -> Self {
        if self.default_max_rounds == 0 {
            tracing::warn!("default_max_rounds must be at least 1, clamping");
            self.default_max_rounds = 1;
        }
        self
    }
}
