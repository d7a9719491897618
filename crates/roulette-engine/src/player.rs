//! Player records and submitted picks.

use std::time::Instant;

use roulette_protocol::{PlayerId, Role, RosterEntry};

/// A number submitted for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    /// A valid number in `0..=100`.
    Number(u8),
    /// The client sent something that isn't a number in range.
    NoPick,
}

impl Pick {
    /// Largest number a player may pick.
    pub const MAX: u8 = 100;

    /// Parses the raw form text. Never fails: anything unusable becomes
    /// [`Pick::NoPick`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) if (0..=i64::from(Self::MAX)).contains(&n) => {
                Self::Number(n as u8)
            }
            _ => Self::NoPick,
        }
    }

    /// The value this pick is scored as. A missing pick scores as -1, one
    /// below the smallest valid number.
    pub fn value(self) -> i32 {
        match self {
            Self::Number(n) => i32::from(n),
            Self::NoPick => -1,
        }
    }
}

/// A registered player.
///
/// `submission` doubles as the "has submitted" flag, so the flag and the
/// number can never disagree.
#[derive(Debug, Clone)]
pub struct Player {
    /// Assigned at registration, never changes.
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    /// Never increases during a game; 0 means dead.
    pub health: u32,
    /// This round's pick, `None` until the player submits.
    pub submission: Option<Pick>,
    /// Last liveness signal from the player's client.
    pub last_heartbeat: Instant,
}

impl Player {
    pub(crate) fn new(
        id: PlayerId,
        name: String,
        health: u32,
        now: Instant,
    ) -> Self {
        Self {
            id,
            name,
            role: Role::Default,
            health,
            submission: None,
            last_heartbeat: now,
        }
    }

    /// Returns `true` if the player already submitted this round.
    pub fn has_submitted(&self) -> bool {
        self.submission.is_some()
    }

    /// Alive means not marked dead and still holding some health.
    pub fn is_alive(&self) -> bool {
        self.role.is_alive() && self.health > 0
    }

    /// Subtracts `penalty`, killing the player if health reaches zero.
    ///
    /// Returns `true` if this hit killed them.
    pub(crate) fn take_damage(&mut self, penalty: u32) -> bool {
        self.health = self.health.saturating_sub(penalty);
        if self.health == 0 {
            self.role = Role::Dead;
            return true;
        }
        false
    }

    /// Clears the role and submission for a new round.
    pub(crate) fn reset_for_round(&mut self) {
        if !matches!(self.role, Role::Winner | Role::Dead) {
            self.role = Role::Default;
        }
        self.submission = None;
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            health: self.health,
        }
    }
}
