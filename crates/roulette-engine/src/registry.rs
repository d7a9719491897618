//! The player registry: every player known to the session.
//!
//! # Concurrency note
//!
//! `PlayerRegistry` is NOT thread-safe by itself. It lives inside the
//! [`Session`](crate::Session), which lives inside the
//! [`RoundEngine`](crate::RoundEngine), which the server guards with one
//! mutex. Registration, removal, and round transitions therefore share a
//! single mutual-exclusion domain and can never interleave.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use roulette_protocol::{PlayerId, Role};

use crate::{EngineError, Player};

/// Identity-keyed collection of players.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ [in registry] ──(before the game)──→ remove()
///                      │
///                      └──(during the game)──→ mark_dead()  (stays put)
/// ```
///
/// Once a game has started players are never removed, because the alive
/// count and the barrier look at who is dead, not at who is present.
pub struct PlayerRegistry {
    /// Keyed by id. A `BTreeMap` so iteration order is the registration
    /// order, which keeps the role shuffle reproducible under a fixed
    /// seed and gives the round-cap tie-break a stable order.
    players: BTreeMap<PlayerId, Player>,

    /// Next id to hand out. Survives [`clear`](Self::clear) so an old
    /// id never addresses a newer player.
    next_id: u64,

    starting_health: u32,
}

impl PlayerRegistry {
    /// Creates an empty registry whose players start at
    /// `starting_health`.
    pub fn new(starting_health: u32) -> Self {
        Self {
            players: BTreeMap::new(),
            next_id: 1,
            starting_health,
        }
    }

    /// Creates a player with a fresh id and default role/health.
    ///
    /// Names don't have to be unique.
    pub fn register(&mut self, name: String, now: Instant) -> &Player {
        let id = PlayerId(self.next_id);
        self.next_id += 1;

        tracing::info!(player_id = %id, %name, "player registered");
        let health = self.starting_health;
        self.players
            .entry(id)
            .or_insert_with(|| Player::new(id, name, health, now))
    }

    /// Looks up a player by id.
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub fn lookup(&self, id: PlayerId) -> Result<&Player, EngineError> {
        self.players.get(&id).ok_or(EngineError::NotFound(id))
    }

    /// Mutable lookup.
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub fn lookup_mut(
        &mut self,
        id: PlayerId,
    ) -> Result<&mut Player, EngineError> {
        self.players.get_mut(&id).ok_or(EngineError::NotFound(id))
    }

    /// Deletes the player if present. Returns the removed record.
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if let Some(player) = &removed {
            tracing::info!(player_id = %id, name = %player.name, "player removed");
        }
        removed
    }

    /// Marks the player dead in place. Returns `false` if the id is
    /// unknown.
    pub fn mark_dead(&mut self, id: PlayerId) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.role = Role::Dead;
                tracing::info!(player_id = %id, name = %player.name, "player marked dead");
                true
            }
            None => false,
        }
    }

    /// Ids of every living player, in id order.
    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| p.id)
            .collect()
    }

    /// Number of living players.
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive()).count()
    }

    /// Living players holding `role`, in id order.
    pub fn living_with_role(
        &self,
        role: Role,
    ) -> impl Iterator<Item = &Player> {
        self.players
            .values()
            .filter(move |p| p.role == role && p.is_alive())
    }

    /// Ids of players whose last heartbeat is more than `timeout` before
    /// `now`.
    pub fn idle_since(&self, now: Instant, timeout: Duration) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| now.saturating_duration_since(p.last_heartbeat) > timeout)
            .map(|p| p.id)
            .collect()
    }

    /// All players, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Drops every player. The id counter keeps counting.
    pub fn clear(&mut self) {
        self.players.clear();
    }

    /// Returns the number of registered players (alive or not).
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Returns `true` if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
