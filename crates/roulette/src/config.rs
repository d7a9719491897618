//! Server configuration.

use std::time::Duration;

use roulette_engine::EngineConfig;

use crate::RouletteError;

/// Everything the binary needs to start a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds. Defaults to all interfaces
    /// so phones on the same network can reach it.
    pub bind_addr: String,

    /// Token admin commands must carry. `None` makes the binary generate
    /// one at startup and log it.
    pub admin_token: Option<String>,

    /// How often idle registrants are swept.
    pub sweep_interval: Duration,

    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            admin_token: None,
            sweep_interval: Duration::from_secs(3),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the process environment:
    ///
    /// | variable | field |
    /// |---|---|
    /// | `ROULETTE_BIND` | `bind_addr` |
    /// | `ROULETTE_ADMIN_TOKEN` | `admin_token` |
    /// | `ROULETTE_MAX_ROUNDS` | `engine.default_max_rounds` |
    /// | `ROULETTE_SEED` | `engine.seed` |
    ///
    /// # Errors
    /// Returns [`RouletteError::Config`] if a numeric variable doesn't
    /// parse.
    pub fn from_env() -> Result<Self, RouletteError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RouletteError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("ROULETTE_BIND") {
            config.bind_addr = addr;
        }
        if let Some(token) = lookup("ROULETTE_ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }
        if let Some(raw) = lookup("ROULETTE_MAX_ROUNDS") {
            config.engine.default_max_rounds =
                parse_var("ROULETTE_MAX_ROUNDS", &raw)?;
        }
        if let Some(raw) = lookup("ROULETTE_SEED") {
            config.engine.seed = Some(parse_var("ROULETTE_SEED", &raw)?);
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &str,
    raw: &str,
) -> Result<T, RouletteError> {
    raw.trim()
        .parse()
        .map_err(|_| RouletteError::Config(format!("{key}={raw:?} is not a valid number")))
}
