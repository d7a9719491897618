//! `RouletteServer` builder and server loop.
//!
//! This is the entry point for running a Guess Roulette server. It ties
//! together transport → protocol → engine, and owns the two background
//! concerns: the idle sweep and graceful shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use roulette_engine::{EngineConfig, RoundEngine};
use roulette_protocol::{Codec, JsonCodec, PlayerId};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::transport::{Transport, WebSocketTransport};
use crate::{AdminAuthenticator, RouletteError};

/// How long connection tasks get to flush their `ShuttingDown` message.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Capacity of the notice channel. A connection that falls this far
/// behind just re-reads its state.
const NOTICE_CAPACITY: usize = 256;

/// Something every connection may need to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notice {
    /// Game state changed; bound connections push a fresh `PlayerState`.
    Updated,
    /// The player was removed from the registry.
    Kicked(PlayerId),
    /// The session was reset; every binding is stale.
    Reset,
    ShuttingDown,
}

/// Shared server state passed to each connection handler task.
///
/// The engine sits behind a single mutex: every game operation is one
/// critical section, and no lock is held across network I/O.
pub(crate) struct ServerState<A: AdminAuthenticator, C: Codec> {
    pub(crate) engine: Mutex<RoundEngine>,
    pub(crate) events: broadcast::Sender<Notice>,
    pub(crate) auth: A,
    pub(crate) codec: C,
}

impl<A: AdminAuthenticator, C: Codec> ServerState<A, C> {
    /// Publishes a notice. Nobody listening is fine.
    pub(crate) fn notify(&self, notice: Notice) {
        let _ = self.events.send(notice);
    }
}

/// Builder for configuring and starting a Guess Roulette server.
///
/// # Example
///
/// ```rust,no_run
/// use roulette::prelude::*;
///
/// # async fn start() -> Result<(), RouletteError> {
/// let server = RouletteServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(StaticTokenAuth::new("let-me-in"))
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RouletteServerBuilder {
    config: ServerConfig,
}

impl RouletteServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces every setting with `config`.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the game tunables.
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.config.engine = config;
        self
    }

    /// Sets how often idle registrants are swept.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Binds the listener and builds the server with the given admin
    /// authenticator.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A: AdminAuthenticator>(
        self,
        auth: A,
    ) -> Result<RouletteServer<A, JsonCodec>, RouletteError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let (events, _) = broadcast::channel(NOTICE_CAPACITY);

        let state = Arc::new(ServerState {
            engine: Mutex::new(RoundEngine::new(self.config.engine)),
            events,
            auth,
            codec: JsonCodec,
        });

        Ok(RouletteServer {
            transport,
            state,
            sweep_interval: self.config.sweep_interval,
        })
    }
}

impl Default for RouletteServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Guess Roulette server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RouletteServer<A: AdminAuthenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
    sweep_interval: Duration,
}

impl<A, C> RouletteServer<A, C>
where
    A: AdminAuthenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server until Ctrl-C.
    pub async fn run(self) -> Result<(), RouletteError> {
        self.run_until(ctrl_c()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// On shutdown the session is flagged, every connection is sent
    /// `ShuttingDown` and closed, and this returns once they are gone
    /// (or after a short grace period).
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), RouletteError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Guess Roulette server running");

        let sweeper = tokio::spawn(sweep_idle_players(
            Arc::clone(&self.state),
            self.sweep_interval,
        ));
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }

            // Reap finished handlers so the set doesn't grow forever.
            while connections.try_join_next().is_some() {}
        }

        tracing::info!(connections = connections.len(), "shutting down");
        sweeper.abort();
        self.state.engine.lock().await.begin_shutdown();
        self.state.notify(Notice::ShuttingDown);

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("connections still open after grace period, aborting");
            connections.abort_all();
        }
        Ok(())
    }
}

/// Resolves on Ctrl-C. If the signal can't be installed, never
/// resolves.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Periodically removes registrants that stopped sending heartbeats.
async fn sweep_idle_players<A, C>(state: Arc<ServerState<A, C>>, period: Duration)
where
    A: AdminAuthenticator,
    C: Codec,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let removed = state.engine.lock().await.sweep_idle(Instant::now());
        for player_id in removed {
            state.notify(Notice::Kicked(player_id));
        }
    }
}
