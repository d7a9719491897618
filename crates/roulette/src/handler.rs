//! Per-connection handler: binding, request dispatch, and push updates.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Wait for either a client frame or a server-wide notice
//!   2. Frames: decode → refresh heartbeat → dispatch the request
//!   3. Notices: push fresh state, or send `Kicked`/`ShuttingDown` and
//!      close
//!
//! A connection starts unbound. `Register` or `Attach` binds it to a
//! player; `GetPlayer`, `Submit` and the heartbeat then act on that
//! player. Admin commands don't need a binding, only a token.

use std::sync::Arc;
use std::time::Instant;

use roulette_engine::{EngineError, KickOutcome, RoundOutcome};
use roulette_protocol::{
    AdminCommand, ClientRequest, Codec, Envelope, Payload, PlayerId,
    ProtocolError, ServerMessage,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::server::{Notice, ServerState};
use crate::transport::{Connection, ConnectionId, WebSocketConnection};
use crate::{AdminAuthenticator, RouletteError};

const NOT_BOUND: &str = "register or attach to a player first";

/// What the loop should do after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), RouletteError>
where
    A: AdminAuthenticator,
    C: Codec,
{
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    // Subscribe before reading anything so no notice is missed.
    let mut events = state.events.subscribe();
    let mut client = Client {
        conn: &conn,
        state: &state,
        conn_id,
        player: None,
        seq: 1,
        start: Instant::now(),
    };

    loop {
        let flow = tokio::select! {
            incoming = conn.recv() => match incoming {
                Ok(Some(data)) => client.handle_frame(&data).await?,
                Ok(None) => {
                    info!(%conn_id, player_id = ?client.player, "connection closed cleanly");
                    return Ok(());
                }
                Err(e) => {
                    debug!(%conn_id, error = %e, "recv error");
                    return Ok(());
                }
            },
            notice = events.recv() => match notice {
                Ok(notice) => client.handle_notice(notice).await?,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(%conn_id, skipped, "notice receiver lagged");
                    client.push_state().await?;
                    Flow::Continue
                }
                Err(RecvError::Closed) => Flow::Close,
            },
        };

        if flow == Flow::Close {
            if let Err(e) = conn.close().await {
                debug!(%conn_id, error = %e, "close failed");
            }
            return Ok(());
        }
    }
}

/// Per-connection state.
struct Client<'a, A: AdminAuthenticator, C: Codec> {
    conn: &'a WebSocketConnection,
    state: &'a ServerState<A, C>,
    conn_id: ConnectionId,
    /// The player this connection acts for, once bound.
    player: Option<PlayerId>,
    seq: u64,
    start: Instant,
}

impl<A, C> Client<'_, A, C>
where
    A: AdminAuthenticator,
    C: Codec,
{
    // -----------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------

    async fn handle_frame(&mut self, data: &[u8]) -> Result<Flow, RouletteError> {
        let envelope: Envelope = match self.state.codec.decode(data) {
            Ok(env) => env,
            Err(e) => {
                debug!(conn_id = %self.conn_id, error = %e, "failed to decode envelope");
                self.send_error(400, &format!("malformed message: {e}")).await?;
                return Ok(Flow::Continue);
            }
        };

        let request = match envelope.payload {
            Payload::Request(request) => request,
            Payload::Response(_) => {
                let err = ProtocolError::InvalidMessage("expected a request envelope".into());
                self.send_error(400, &err.to_string()).await?;
                return Ok(Flow::Continue);
            }
        };

        // Any message from a bound player counts as a sign of life.
        if let Some(player_id) = self.player {
            if let Err(e) = self.state.engine.lock().await.heartbeat(player_id) {
                debug!(%player_id, error = %e, "heartbeat refresh failed");
            }
        }

        match request {
            ClientRequest::Register { name } => self.register(&name).await?,
            ClientRequest::Attach { player_id } => self.attach(player_id).await?,
            ClientRequest::GetPlayer => self.get_player().await?,
            ClientRequest::Submit { number } => self.submit(&number).await?,
            ClientRequest::Heartbeat => self.reply(ServerMessage::HeartbeatAck).await?,
            ClientRequest::Admin { token, command } => {
                self.admin(&token, command).await?
            }
        }
        Ok(Flow::Continue)
    }

    async fn register(&mut self, name: &str) -> Result<(), RouletteError> {
        if let Some(player_id) = self.player {
            return self
                .send_error(409, &format!("connection already registered as {player_id}"))
                .await;
        }

        let result = self.state.engine.lock().await.register(name);
        match result {
            Ok(player) => {
                self.player = Some(player.id);
                info!(conn_id = %self.conn_id, player_id = %player.id, "connection bound");
                self.reply(ServerMessage::Registered { player }).await
            }
            Err(e) => self.send_engine_error(e).await,
        }
    }

    async fn attach(&mut self, player_id: PlayerId) -> Result<(), RouletteError> {
        let result = {
            let mut engine = self.state.engine.lock().await;
            engine
                .heartbeat(player_id)
                .or_else(|e| match e {
                    // Attaching after shutdown still shows the page.
                    EngineError::ShuttingDown => Ok(()),
                    other => Err(other),
                })
                .and_then(|()| engine.get_player(player_id))
        };

        match result {
            Ok(player) => {
                self.player = Some(player.id);
                info!(conn_id = %self.conn_id, %player_id, "connection attached");
                self.reply(ServerMessage::PlayerState { player }).await
            }
            Err(e) => self.send_engine_error(e).await,
        }
    }

    async fn get_player(&mut self) -> Result<(), RouletteError> {
        let Some(player_id) = self.player else {
            return self.send_error(400, NOT_BOUND).await;
        };

        let result = self.state.engine.lock().await.get_player(player_id);
        match result {
            Ok(player) => self.reply(ServerMessage::PlayerState { player }).await,
            Err(e) => {
                self.player = None;
                self.send_engine_error(e).await
            }
        }
    }

    async fn submit(&mut self, number: &str) -> Result<(), RouletteError> {
        let Some(player_id) = self.player else {
            return self.send_error(400, NOT_BOUND).await;
        };

        let result = {
            let mut engine = self.state.engine.lock().await;
            engine
                .submit(player_id, number)
                .and_then(|outcome| Ok((outcome, engine.get_player(player_id)?)))
        };

        match result {
            Ok((outcome, player)) => {
                match outcome {
                    Some(RoundOutcome::RoundStarted { round }) => {
                        info!(round, "round complete, next round started");
                    }
                    Some(RoundOutcome::GameEnded { winner }) => {
                        info!(?winner, "round complete, game over");
                    }
                    Some(RoundOutcome::Skipped) | None => {}
                }
                self.reply(ServerMessage::PlayerState { player }).await?;
                self.state.notify(Notice::Updated);
                Ok(())
            }
            Err(e) => self.send_engine_error(e).await,
        }
    }

    async fn admin(
        &mut self,
        token: &str,
        command: AdminCommand,
    ) -> Result<(), RouletteError> {
        if let Err(e) = self.state.auth.authorize(token).await {
            warn!(conn_id = %self.conn_id, ?command, "admin command rejected");
            return self.send_error(401, &e.to_string()).await;
        }
        debug!(conn_id = %self.conn_id, ?command, "admin command");

        let result = {
            let mut engine = self.state.engine.lock().await;
            match command {
                AdminCommand::StartGame => engine
                    .start_game()
                    .map(|_| (ServerMessage::GameStarted, Some(Notice::Updated))),
                AdminCommand::ResetGame => engine
                    .reset_game()
                    .map(|()| (ServerMessage::GameReset, Some(Notice::Reset))),
                AdminCommand::IncMaxRounds => engine.inc_max_rounds().map(|max_rounds| {
                    (ServerMessage::MaxRounds { max_rounds }, Some(Notice::Updated))
                }),
                AdminCommand::DecMaxRounds => engine.dec_max_rounds().map(|max_rounds| {
                    (ServerMessage::MaxRounds { max_rounds }, Some(Notice::Updated))
                }),
                AdminCommand::KickPlayer { player_id } => {
                    engine.kick_player(player_id).map(|outcome| match outcome {
                        KickOutcome::Removed(id) => (
                            ServerMessage::PlayerKicked { player_id: id, removed: true },
                            Some(Notice::Kicked(id)),
                        ),
                        KickOutcome::MarkedDead { .. } => (
                            ServerMessage::PlayerKicked { player_id, removed: false },
                            Some(Notice::Updated),
                        ),
                    })
                }
                AdminCommand::Roster => Ok((
                    ServerMessage::Roster {
                        max_rounds: engine.session().max_rounds(),
                        players: engine.roster(),
                    },
                    None,
                )),
            }
        };

        match result {
            Ok((reply, notice)) => {
                self.reply(reply).await?;
                if let Some(notice) = notice {
                    self.state.notify(notice);
                }
                Ok(())
            }
            Err(e) => {
                warn!(conn_id = %self.conn_id, error = %e, "admin command failed");
                self.send_engine_error(e).await
            }
        }
    }

    // -----------------------------------------------------------------
    // Notices
    // -----------------------------------------------------------------

    async fn handle_notice(&mut self, notice: Notice) -> Result<Flow, RouletteError> {
        match notice {
            Notice::Updated => {
                self.push_state().await?;
                Ok(Flow::Continue)
            }
            Notice::Kicked(player_id) if self.player == Some(player_id) => {
                info!(conn_id = %self.conn_id, %player_id, "bound player kicked, closing");
                self.player = None;
                self.reply(ServerMessage::Kicked).await?;
                Ok(Flow::Close)
            }
            Notice::Kicked(_) => Ok(Flow::Continue),
            Notice::Reset => {
                if self.player.take().is_some() {
                    self.reply(ServerMessage::GameReset).await?;
                }
                Ok(Flow::Continue)
            }
            Notice::ShuttingDown => {
                self.reply(ServerMessage::ShuttingDown).await?;
                Ok(Flow::Close)
            }
        }
    }

    /// Sends the bound player's current view. A binding whose player no
    /// longer exists is dropped silently.
    async fn push_state(&mut self) -> Result<(), RouletteError> {
        let Some(player_id) = self.player else {
            return Ok(());
        };
        let result = self.state.engine.lock().await.get_player(player_id);
        match result {
            Ok(player) => self.reply(ServerMessage::PlayerState { player }).await,
            Err(_) => {
                self.player = None;
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------

    async fn reply(&mut self, message: ServerMessage) -> Result<(), RouletteError> {
        let envelope = Envelope {
            seq: self.next_seq(),
            timestamp: self.start.elapsed().as_millis() as u64,
            payload: Payload::Response(message),
        };
        let bytes = self.state.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn send_error(&mut self, code: u16, message: &str) -> Result<(), RouletteError> {
        self.reply(ServerMessage::Error {
            code,
            message: message.to_string(),
        })
        .await
    }

    async fn send_engine_error(&mut self, err: EngineError) -> Result<(), RouletteError> {
        debug!(conn_id = %self.conn_id, error = %err, "request rejected");
        self.send_error(err.code(), &err.to_string()).await
    }

    fn next_seq(&mut self) -> u64 {
        let current = self.seq;
        self.seq += 1;
        current
    }
}
