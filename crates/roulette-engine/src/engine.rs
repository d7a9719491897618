//! The round engine: the state machine that drives a game.
//!
//! ```text
//! NotStarted ──start_game()──→ InProgress ──(winner / no one left)──→ Ended
//!                                  │  ↑
//!                 advance_round()  │  │  evaluate_submissions()
//!                                  ↓  │
//!        RoleAssignment → AwaitingPicker → AwaitingGuessersAndBetters
//!                                              → Resolving
//! ```
//!
//! There is no round thread. A round advances because the last required
//! submission closes the barrier, and `evaluate_submissions` then calls
//! the same `advance_round` that `start_game` uses.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use roulette_protocol::{GamePhase, PlayerId, PlayerView, Role, RosterEntry};
use tracing::{debug, info};

use crate::{EngineConfig, EngineError, Pick, Session};

/// Longest display name accepted at registration, in characters.
const MAX_NAME_LEN: usize = 32;

/// What a call to [`RoundEngine::advance_round`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Roles were handed out for `round`.
    RoundStarted { round: u32 },
    /// The game is over. `winner` is `None` if nobody could be declared.
    GameEnded { winner: Option<PlayerId> },
    /// No game is running, or a transition was already in flight.
    Skipped,
}

/// What [`RoundEngine::kick_player`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickOutcome {
    /// No game was running; the player is gone from the registry.
    /// Whoever holds a connection for this id should drop it.
    Removed(PlayerId),
    /// A game is running; the player is now dead. `resolved` is set if
    /// their death closed the round's barrier.
    MarkedDead { resolved: Option<RoundOutcome> },
}

/// Owns the [`Session`] and performs every state transition on it.
///
/// All mutating methods take `&mut self`. Put the engine behind one lock
/// and every operation becomes one atomic transition: it either
/// completes or is rejected before anything changes.
pub struct RoundEngine {
    session: Session,
    config: EngineConfig,
    rng: StdRng,
}

impl RoundEngine {
    /// Creates an engine with an empty session.
    pub fn new(config: EngineConfig) -> Self {
        let config = config.validated();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            session: Session::new(config.starting_health, config.default_max_rounds),
            config,
            rng,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Player operations
    // -----------------------------------------------------------------

    /// Registers a new player and returns their view.
    ///
    /// Late registrants (game already running) start with the default
    /// role and get a role from the next round on.
    ///
    /// # Errors
    /// - [`EngineError::InvalidInput`]: blank or overlong name
    /// - [`EngineError::ShuttingDown`]
    pub fn register(&mut self, name: &str) -> Result<PlayerView, EngineError> {
        self.ensure_open()?;

        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("name must not be empty".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }

        let id = self
            .session
            .registry
            .register(name.to_string(), Instant::now())
            .id;
        self.session.view(id)
    }

    /// Returns a player's current view. Still works while shutting down;
    /// the view then has `shutting_down` set.
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub fn get_player(&self, id: PlayerId) -> Result<PlayerView, EngineError> {
        self.session.view(id)
    }

    /// Every registered player, in registration order.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.session.registry.iter().map(|p| p.roster_entry()).collect()
    }

    /// Records this round's number for a player, then checks the barrier.
    ///
    /// `raw` is whatever the client typed; see [`Pick::parse`]. Returns
    /// `Some` if this submission completed the round.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`]: unknown id
    /// - [`EngineError::NotParticipating`]: no game running, or the
    ///   player has no submitting role this round
    /// - [`EngineError::AlreadySubmitted`]
    /// - [`EngineError::ShuttingDown`]
    pub fn submit(
        &mut self,
        id: PlayerId,
        raw: &str,
    ) -> Result<Option<RoundOutcome>, EngineError> {
        self.ensure_open()?;

        let started = self.session.started();
        let round = self.session.round;
        let player = self.session.registry.lookup_mut(id)?;
        if !started || !player.is_alive() || !player.role.is_active() {
            return Err(EngineError::NotParticipating(id));
        }
        if player.has_submitted() {
            return Err(EngineError::AlreadySubmitted(id));
        }

        let pick = Pick::parse(raw);
        player.submission = Some(pick);
        info!(player_id = %id, role = %player.role, ?pick, round, "number submitted");

        Ok(self.evaluate_submissions())
    }

    /// Refreshes a player's liveness timestamp. Doesn't touch game state.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`]: unknown id
    /// - [`EngineError::ShuttingDown`]
    pub fn heartbeat(&mut self, id: PlayerId) -> Result<(), EngineError> {
        self.heartbeat_at(id, Instant::now())
    }

    /// [`heartbeat`](Self::heartbeat) with an explicit clock reading.
    pub fn heartbeat_at(
        &mut self,
        id: PlayerId,
        now: Instant,
    ) -> Result<(), EngineError> {
        self.ensure_open()?;
        let player = self.session.registry.lookup_mut(id)?;
        player.last_heartbeat = now;
        debug!(player_id = %id, "heartbeat");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Admin operations
    // -----------------------------------------------------------------

    /// Starts the game and assigns the first round's roles.
    ///
    /// # Errors
    /// - [`EngineError::AlreadyRunning`]
    /// - [`EngineError::GameOver`]: the previous game ended; reset first
    /// - [`EngineError::NotEnoughPlayers`]: fewer than `min_players` alive
    /// - [`EngineError::ShuttingDown`]
    pub fn start_game(&mut self) -> Result<RoundOutcome, EngineError> {
        self.ensure_open()?;

        match self.session.phase {
            GamePhase::InProgress => return Err(EngineError::AlreadyRunning),
            GamePhase::Ended => return Err(EngineError::GameOver),
            GamePhase::NotStarted => {}
        }

        let alive = self.session.registry.alive_count();
        let required = self.config.min_players;
        if alive < required {
            return Err(EngineError::NotEnoughPlayers { alive, required });
        }

        self.session.phase = GamePhase::InProgress;
        info!(players = alive, max_rounds = self.session.max_rounds, "game started");

        Ok(self.advance_round())
    }

    /// Clears every player and puts all counters back to their initial
    /// values.
    ///
    /// # Errors
    /// Returns [`EngineError::ShuttingDown`].
    pub fn reset_game(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;

        let session = &mut self.session;
        session.registry.clear();
        session.phase = GamePhase::NotStarted;
        session.round = 1;
        session.max_rounds = self.config.default_max_rounds;
        session.round_transition_in_flight = false;

        info!("game reset");
        Ok(())
    }

    /// Raises the round cap by one and returns the new cap.
    ///
    /// # Errors
    /// Returns [`EngineError::ShuttingDown`].
    pub fn inc_max_rounds(&mut self) -> Result<u32, EngineError> {
        self.ensure_open()?;
        self.session.max_rounds = self.session.max_rounds.saturating_add(1);
        info!(max_rounds = self.session.max_rounds, "round cap raised");
        Ok(self.session.max_rounds)
    }

    /// Lowers the round cap by one, never below 1, and returns the new
    /// cap.
    ///
    /// # Errors
    /// Returns [`EngineError::ShuttingDown`].
    pub fn dec_max_rounds(&mut self) -> Result<u32, EngineError> {
        self.ensure_open()?;
        if self.session.max_rounds > 1 {
            self.session.max_rounds -= 1;
            info!(max_rounds = self.session.max_rounds, "round cap lowered");
        }
        Ok(self.session.max_rounds)
    }

    /// Removes a player (no game running) or kills them (game running).
    ///
    /// Players are never removed mid-game: the alive count and the
    /// barrier are computed from dead/alive status.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`]: unknown id, including a second kick
    ///   of an already removed player
    /// - [`EngineError::AlreadyDead`]: mid-game kick of a dead player
    /// - [`EngineError::ShuttingDown`]
    pub fn kick_player(
        &mut self,
        id: PlayerId,
    ) -> Result<KickOutcome, EngineError> {
        self.ensure_open()?;

        let alive = self.session.registry.lookup(id)?.is_alive();

        if !self.session.started() {
            self.session.registry.remove(id);
            return Ok(KickOutcome::Removed(id));
        }

        if !alive {
            return Err(EngineError::AlreadyDead(id));
        }

        self.session.registry.mark_dead(id);
        // The kicked player may have been the last one the barrier was
        // waiting on.
        let resolved = self.evaluate_submissions();
        Ok(KickOutcome::MarkedDead { resolved })
    }

    /// Removes every registrant whose heartbeat is older than the
    /// configured timeout. Only runs while no game is in progress.
    ///
    /// Returns the removed ids so the caller can notify their
    /// connections.
    pub fn sweep_idle(&mut self, now: Instant) -> Vec<PlayerId> {
        if self.session.shutting_down || self.session.started() {
            return Vec::new();
        }

        let idle = self
            .session
            .registry
            .idle_since(now, self.config.heartbeat_timeout);

        let mut removed = Vec::with_capacity(idle.len());
        for id in idle {
            if let Ok(KickOutcome::Removed(id)) = self.kick_player(id) {
                info!(player_id = %id, "idle player swept");
                removed.push(id);
            }
        }
        removed
    }

    /// Flags the session as shutting down. Irreversible.
    pub fn begin_shutdown(&mut self) {
        if !self.session.shutting_down {
            self.session.shutting_down = true;
            info!("session shutting down");
        }
    }

    // -----------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------

    /// Runs the termination checks and, if the game goes on, assigns the
    /// next round's roles.
    ///
    /// Guarded against re-entry: a call made while another transition is
    /// in flight returns [`RoundOutcome::Skipped`].
    pub fn advance_round(&mut self) -> RoundOutcome {
        if !self.session.started() {
            return RoundOutcome::Skipped;
        }
        if self.session.round_transition_in_flight {
            debug!("round transition already in flight");
            return RoundOutcome::Skipped;
        }

        self.session.round_transition_in_flight = true;
        let outcome = self.transition();
        self.session.round_transition_in_flight = false;
        outcome
    }

    /// Checks the barrier and, once it holds, resolves health and moves
    /// on to the next round.
    ///
    /// The barrier holds when the living Picker (if any) has submitted
    /// and every living Guesser and Better has submitted. Returns `None`
    /// while it doesn't.
    pub fn evaluate_submissions(&mut self) -> Option<RoundOutcome> {
        if !self.session.started() {
            return None;
        }

        let registry = &self.session.registry;
        if let Some(picker) = registry.living_with_role(Role::Picker).next() {
            if !picker.has_submitted() {
                debug!(round = self.session.round, "waiting for picker");
                return None;
            }
        }

        let pending = registry
            .living_with_role(Role::Guesser)
            .chain(registry.living_with_role(Role::Better))
            .filter(|p| !p.has_submitted())
            .count();
        if pending > 0 {
            debug!(round = self.session.round, pending, "waiting for guessers and betters");
            return None;
        }

        self.resolve_health();
        self.session.round += 1;
        Some(self.advance_round())
    }

    fn transition(&mut self) -> RoundOutcome {
        let alive = self.session.registry.alive_ids();

        // Nothing has been played yet: a game needs a full table to open.
        if self.session.round == 1 && alive.len() < self.config.min_players {
            info!(alive = alive.len(), "not enough players to open the game");
            return self.end_game(None);
        }

        match alive.as_slice() {
            [] => return self.end_game(None),
            [last] => {
                let last = *last;
                info!(player_id = %last, "last player standing");
                return self.declare_winner(last);
            }
            [a, b] => {
                let (a, b) = (*a, *b);
                let health_a = self.health_of(a);
                let health_b = self.health_of(b);
                if health_a != health_b {
                    let leader = if health_a > health_b { a } else { b };
                    info!(player_id = %leader, "two left, healthier player wins");
                    return self.declare_winner(leader);
                }
                debug!(health = health_a, "two left with equal health, playing on");
            }
            _ => {}
        }

        if self.session.round > self.session.max_rounds {
            // Highest health wins; on a tie the earliest registrant.
            let best = self
                .session
                .registry
                .iter()
                .filter(|p| p.is_alive())
                .max_by(|x, y| x.health.cmp(&y.health).then(y.id.cmp(&x.id)))
                .map(|p| p.id);
            return match best {
                Some(id) => {
                    info!(player_id = %id, "round cap reached");
                    self.declare_winner(id)
                }
                None => self.end_game(None),
            };
        }

        self.begin_round(alive)
    }

    fn begin_round(&mut self, mut alive: Vec<PlayerId>) -> RoundOutcome {
        for player in self.session.registry.iter_mut() {
            player.reset_for_round();
        }

        alive.shuffle(&mut self.rng);
        for (seat, id) in alive.iter().enumerate() {
            let role = match seat {
                0 => Role::Picker,
                1 | 2 => Role::Guesser,
                _ => Role::Better,
            };
            if let Ok(player) = self.session.registry.lookup_mut(*id) {
                player.role = role;
            }
        }

        let round = self.session.round;
        info!(round, players = alive.len(), "roles assigned");
        RoundOutcome::RoundStarted { round }
    }

    /// Applies the round's penalties. Anyone who hits zero dies here, in
    /// the same pass, so the next alive count already sees them dead.
    fn resolve_health(&mut self) {
        let round = self.session.round;
        let selected = self
            .session
            .registry
            .living_with_role(Role::Picker)
            .next()
            .and_then(|p| p.submission)
            .map_or(0, Pick::value);

        for player in self.session.registry.iter_mut() {
            if !player.is_alive() {
                continue;
            }
            let halve = match player.role {
                Role::Guesser => false,
                Role::Better => true,
                _ => continue,
            };
            let Some(pick) = player.submission else {
                continue;
            };

            let distance = pick.value().abs_diff(selected);
            let penalty = if halve { distance / 2 } else { distance };
            let died = player.take_damage(penalty);

            debug!(
                player_id = %player.id,
                role = %player.role,
                penalty,
                health = player.health,
                "penalty applied"
            );
            if died {
                info!(player_id = %player.id, name = %player.name, round, "player eliminated");
            }
        }

        info!(round, selected, "round resolved");
    }

    fn declare_winner(&mut self, id: PlayerId) -> RoundOutcome {
        if let Ok(player) = self.session.registry.lookup_mut(id) {
            player.role = Role::Winner;
            info!(player_id = %id, name = %player.name, health = player.health, "winner declared");
        }
        self.end_game(Some(id))
    }

    fn end_game(&mut self, winner: Option<PlayerId>) -> RoundOutcome {
        self.session.phase = GamePhase::Ended;
        info!(round = self.session.round, ?winner, "game ended");
        RoundOutcome::GameEnded { winner }
    }

    fn health_of(&self, id: PlayerId) -> u32 {
        self.session
            .registry
            .lookup(id)
            .map_or(0, |p| p.health)
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.session.shutting_down {
            return Err(EngineError::ShuttingDown);
        }
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for transitions that need to reach into the session.
    //! Whole-game scenarios live in `tests/round_engine.rs`.

    use super::*;

    fn engine_with(players: usize) -> (RoundEngine, Vec<PlayerId>) {
        let mut engine = RoundEngine::new(EngineConfig::default().with_seed(11));
        let ids = (0..players)
            .map(|i| engine.register(&format!("p{i}")).unwrap().id)
            .collect();
        (engine, ids)
    }

    fn role_of(engine: &RoundEngine, id: PlayerId) -> Role {
        engine.session().registry().lookup(id).unwrap().role
    }

    #[test]
    fn test_advance_round_in_flight_is_skipped() {
        let (mut engine, ids) = engine_with(3);
        engine.start_game().unwrap();
        let before: Vec<_> = ids.iter().map(|id| role_of(&engine, *id)).collect();

        engine.session.round_transition_in_flight = true;
        assert_eq!(engine.advance_round(), RoundOutcome::Skipped);

        let after: Vec<_> = ids.iter().map(|id| role_of(&engine, *id)).collect();
        assert_eq!(before, after, "a skipped transition must not reassign roles");
    }

    #[test]
    fn test_advance_round_clears_in_flight_on_terminal_return() {
        let (mut engine, ids) = engine_with(3);
        engine.start_game().unwrap();
        engine.session.round = 2;
        engine.session.registry.mark_dead(ids[0]);
        engine.session.registry.mark_dead(ids[1]);

        let outcome = engine.advance_round();
        assert_eq!(outcome, RoundOutcome::GameEnded { winner: Some(ids[2]) });
        assert!(!engine.session.round_transition_in_flight);
    }

    #[test]
    fn test_advance_round_not_started_is_skipped() {
        let (mut engine, _) = engine_with(3);
        assert_eq!(engine.advance_round(), RoundOutcome::Skipped);
        assert_eq!(engine.session().phase(), GamePhase::NotStarted);
    }

    #[test]
    fn test_opening_transition_with_too_few_alive_ends_without_winner() {
        let (mut engine, ids) = engine_with(3);
        engine.session.phase = GamePhase::InProgress;
        engine.session.registry.mark_dead(ids[0]);

        let outcome = engine.advance_round();
        assert_eq!(outcome, RoundOutcome::GameEnded { winner: None });
        assert!(ids.iter().all(|id| role_of(&engine, *id) != Role::Winner));
    }

    #[test]
    fn test_round_cap_tie_goes_to_lowest_id() {
        let (mut engine, ids) = engine_with(4);
        engine.start_game().unwrap();
        engine.session.round = engine.session.max_rounds + 1;
        for id in &ids {
            engine.session.registry.lookup_mut(*id).unwrap().health = 70;
        }

        let outcome = engine.advance_round();
        assert_eq!(outcome, RoundOutcome::GameEnded { winner: Some(ids[0]) });
        assert_eq!(role_of(&engine, ids[0]), Role::Winner);
    }

    #[test]
    fn test_round_cap_picks_highest_health() {
        let (mut engine, ids) = engine_with(4);
        engine.start_game().unwrap();
        engine.session.round = engine.session.max_rounds + 1;
        engine.session.registry.lookup_mut(ids[2]).unwrap().health = 100;
        for id in [ids[0], ids[1], ids[3]] {
            engine.session.registry.lookup_mut(id).unwrap().health = 50;
        }

        let outcome = engine.advance_round();
        assert_eq!(outcome, RoundOutcome::GameEnded { winner: Some(ids[2]) });
    }

    #[test]
    fn test_resolve_health_without_picker_scores_against_zero() {
        let (mut engine, ids) = engine_with(3);
        engine.start_game().unwrap();
        let picker = ids
            .iter()
            .copied()
            .find(|id| role_of(&engine, *id) == Role::Picker)
            .unwrap();
        let guessers: Vec<_> = ids.iter().copied().filter(|id| *id != picker).collect();

        engine.session.registry.mark_dead(picker);
        engine.submit(guessers[0], "30").unwrap();
        engine.submit(guessers[1], "5").unwrap();

        let health = |id| engine.session().registry().lookup(id).unwrap().health;
        assert_eq!(health(guessers[0]), 70);
        assert_eq!(health(guessers[1]), 95);
    }

    #[test]
    fn test_begin_round_assigns_one_picker_two_guessers_rest_betters() {
        let (mut engine, ids) = engine_with(6);
        engine.start_game().unwrap();

        let count = |role| ids.iter().filter(|id| role_of(&engine, **id) == role).count();
        assert_eq!(count(Role::Picker), 1);
        assert_eq!(count(Role::Guesser), 2);
        assert_eq!(count(Role::Better), 3);
    }

    #[test]
    fn test_same_seed_same_roles() {
        let (mut a, ids_a) = engine_with(5);
        let (mut b, ids_b) = engine_with(5);
        a.start_game().unwrap();
        b.start_game().unwrap();

        let roles_a: Vec<_> = ids_a.iter().map(|id| role_of(&a, *id)).collect();
        let roles_b: Vec<_> = ids_b.iter().map(|id| role_of(&b, *id)).collect();
        assert_eq!(roles_a, roles_b);
    }
}
