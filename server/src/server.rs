use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{channel, Sender};

use system::{
    unix_millis, uuid::Uuid, ChatMessage, CommandResult, ConnectionId, EmojiReaction, FatalError,
    IdentifiableCommand, IdentifiableEvent, Identity, ParticipantInfo, SessionCommand,
    SessionEvent, SessionId, SystemCommand, SystemError, SystemEvent, UserId, VideoInfo,
    COUNTDOWN_FROM,
};

use crate::connection::{ConnectionCommand, ConnectionEvent};
use crate::connection_tx_storage::ConnectionTxStorage;
use crate::countdown::spawn_countdown;
use crate::server_state::ServerState;
use crate::session::Session;
use crate::store::{SessionRecord, SessionStore};

pub type ServerTx = Sender<ServerCommand>;

#[derive(Debug)]
pub enum ServerCommand {
    Connection(ConnectionCommand),
    CountdownElapsed {
        session_id: SessionId,
        generation: u64,
        remaining: u8,
    },
}

#[derive(Clone)]
pub struct ServerOptions {
    pub countdown_tick: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            countdown_tick: Duration::from_secs(1),
        }
    }
}

struct Server {
    server_state: ServerState,
    connections: ConnectionTxStorage,
    store: Arc<dyn SessionStore>,
    options: ServerOptions,
    srv_tx: ServerTx,
    countdown_generation: u64,
}

impl Server {
    fn new(store: Arc<dyn SessionStore>, options: ServerOptions, srv_tx: ServerTx) -> Self {
        Self {
            server_state: ServerState::new(),
            connections: ConnectionTxStorage::new(),
            store,
            options,
            srv_tx,
            countdown_generation: 0,
        }
    }

    async fn handle_server_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connection(command) => self.handle_connection_command(command).await,
            ServerCommand::CountdownElapsed {
                session_id,
                generation,
                remaining,
            } => {
                self.handle_countdown_elapsed(&session_id, generation, remaining)
                    .await
            }
        }
    }

    async fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { identity, tx } => {
                let connection_id = self.server_state.create_connection(identity);
                self.connections.insert(connection_id, tx);
                self.connections
                    .send(&connection_id, ConnectionEvent::Connected { connection_id })
                    .await;
            }
            ConnectionCommand::Disconnect { from } => {
                self.disconnect(&from).await;
            }
            ConnectionCommand::IdentifiableCommand {
                from,
                command:
                    IdentifiableCommand {
                        command_id,
                        system_command,
                    },
            } => match self.handle_system_command(&from, system_command).await {
                Ok(Some(system_event)) => {
                    self.connections
                        .send(
                            &from,
                            ConnectionEvent::IdentifiableEvent(IdentifiableEvent::ByMyself {
                                command_id,
                                result: CommandResult::SystemEvent(system_event),
                            }),
                        )
                        .await
                }
                Ok(None) => {}
                Err(system_error) => match system_error {
                    SystemError::FatalError(ref fatal_error) => {
                        log::warn!(
                            "Disconnecting a connection due to fatal error: {}",
                            fatal_error.reason
                        );
                        self.disconnect(&from).await;
                    }
                    system_error => {
                        self.connections
                            .send(
                                &from,
                                ConnectionEvent::IdentifiableEvent(IdentifiableEvent::ByMyself {
                                    command_id,
                                    result: CommandResult::Error(system_error),
                                }),
                            )
                            .await;
                    }
                },
            },
        }
    }

    async fn handle_system_command(
        &mut self,
        from: &ConnectionId,
        command: SystemCommand,
    ) -> Result<Option<SystemEvent>, SystemError> {
        let identity = self.server_state.identity(from).cloned().ok_or_else(|| {
            SystemError::FatalError(FatalError {
                reason: "command from an unregistered connection".into(),
            })
        })?;

        match command {
            SystemCommand::JoinSession { session_id } => self
                .join_session(from, &identity, &session_id)
                .await
                .map(Some),
            SystemCommand::LeaveSession { session_id } => {
                self.leave_session(&session_id, &identity.user_id, None)
                    .await;
                Ok(Some(SystemEvent::LeftSession { session_id }))
            }
            SystemCommand::InSession {
                session_id,
                command,
            } => {
                self.handle_session_command(&identity, &session_id, command)
                    .await
            }
            SystemCommand::SendInvite {
                target_user_id,
                video,
            } => self
                .send_invite(&identity, &target_user_id, video)
                .await
                .map(Some),
        }
    }

    /// Lazily loads the session from the store on first join, then registers
    /// the membership, notifies the others, and hands the joiner the full
    /// current state so a late joiner lands in sync immediately.
    async fn join_session(
        &mut self,
        from: &ConnectionId,
        identity: &Identity,
        session_id: &SessionId,
    ) -> Result<SystemEvent, SystemError> {
        if !self.server_state.has_session(session_id) {
            let record = self.store.load(session_id).await.map_err(|e| {
                log::error!("session store lookup of {} failed: {}", session_id, e);
                SystemError::Persistence
            })?;
            match record {
                Some(record) => {
                    self.server_state
                        .insert_session(Session::new(record.id, record.video, unix_millis()));
                }
                None => return Err(SystemError::SessionNotFound),
            }
        }

        let session = self
            .server_state
            .sessions
            .get_mut(session_id)
            .expect("session was just ensured");
        session.join(identity, *from);
        let video = session.video.clone();
        let participants = session.roster();
        let sync = session.sync.clone();
        log::info!("user {} joined session {}", identity.username, session_id);

        self.broadcast_session_event(
            session_id,
            SessionEvent::UserJoined(ParticipantInfo {
                user_id: identity.user_id,
                username: identity.username.clone(),
            }),
            Some(&identity.user_id),
        )
        .await;

        Ok(SystemEvent::JoinedSession {
            session_id: *session_id,
            video,
            participants,
            sync,
        })
    }

    async fn handle_session_command(
        &mut self,
        identity: &Identity,
        session_id: &SessionId,
        command: SessionCommand,
    ) -> Result<Option<SystemEvent>, SystemError> {
        // A report for an unknown session or from a non-member is dropped
        // without a reply, so session existence never leaks to outsiders.
        let session = match self.server_state.sessions.get_mut(session_id) {
            Some(session) if session.is_participant(&identity.user_id) => session,
            _ => {
                log::debug!(
                    "dropping session command from non-participant {}",
                    identity.user_id
                );
                return Ok(None);
            }
        };

        match command {
            SessionCommand::PlaybackReport {
                current_time,
                is_playing,
            } => {
                session.sync.observe(current_time, is_playing, unix_millis());
                let sync = session.sync.clone();
                self.broadcast_session_event(
                    session_id,
                    SessionEvent::Sync(sync),
                    Some(&identity.user_id),
                )
                .await;
                Ok(None)
            }
            SessionCommand::RequestSync => Ok(Some(SystemEvent::InSession {
                session_id: *session_id,
                event: SessionEvent::Sync(session.sync.clone()),
            })),
            SessionCommand::Chat { text } => {
                let message = ChatMessage {
                    id: Uuid::new_v4(),
                    user_id: identity.user_id,
                    username: identity.username.clone(),
                    text,
                    timestamp: unix_millis(),
                };
                self.broadcast_session_event(session_id, SessionEvent::Chat(message), None)
                    .await;
                Ok(None)
            }
            SessionCommand::Reaction { emoji, x, y } => {
                let reaction = EmojiReaction {
                    id: Uuid::new_v4(),
                    user_id: identity.user_id,
                    emoji,
                    x,
                    y,
                    timestamp: unix_millis(),
                };
                self.broadcast_session_event(
                    session_id,
                    SessionEvent::Reaction(reaction),
                    Some(&identity.user_id),
                )
                .await;
                Ok(None)
            }
            SessionCommand::StartCountdown => {
                self.start_countdown(session_id).await;
                Ok(None)
            }
        }
    }

    /// Last trigger wins: a running countdown is cancelled and the sequence
    /// restarts from `COUNTDOWN_FROM`, broadcast to everyone including the
    /// triggering participant.
    async fn start_countdown(&mut self, session_id: &SessionId) {
        self.countdown_generation += 1;
        let generation = self.countdown_generation;

        let session = match self.server_state.sessions.get_mut(session_id) {
            Some(session) => session,
            None => return,
        };
        if let Some(previous) = session.countdown.take() {
            previous.cancel();
        }
        session.countdown = Some(spawn_countdown(
            self.srv_tx.clone(),
            *session_id,
            generation,
            self.options.countdown_tick,
        ));

        self.broadcast_session_event(
            session_id,
            SessionEvent::CountdownTick {
                remaining: COUNTDOWN_FROM,
            },
            None,
        )
        .await;
    }

    async fn handle_countdown_elapsed(
        &mut self,
        session_id: &SessionId,
        generation: u64,
        remaining: u8,
    ) {
        let session = match self.server_state.sessions.get_mut(session_id) {
            // The session was destroyed while a tick was in flight.
            None => return,
            Some(session) => session,
        };
        match &session.countdown {
            Some(countdown) if countdown.generation == generation => {}
            // A later start superseded this countdown.
            _ => return,
        }

        if remaining > 0 {
            self.broadcast_session_event(
                session_id,
                SessionEvent::CountdownTick { remaining },
                None,
            )
            .await;
        } else {
            session.countdown = None;
            session.sync.reset_for_start(unix_millis());
            let sync = session.sync.clone();
            self.broadcast_session_event(session_id, SessionEvent::CountdownFinished, None)
                .await;
            self.broadcast_session_event(session_id, SessionEvent::Sync(sync), None)
                .await;
        }
    }

    /// Allocates the session id, persists the creation record, then pushes an
    /// invite to every connection of the target user. Nothing is sent and no
    /// session is registered if the store write fails.
    async fn send_invite(
        &mut self,
        identity: &Identity,
        target_user_id: &UserId,
        video: VideoInfo,
    ) -> Result<SystemEvent, SystemError> {
        let session_id = Uuid::new_v4();
        let record = SessionRecord {
            id: session_id,
            video: video.clone(),
            created_by: identity.user_id,
        };
        self.store.create(record).await.map_err(|e| {
            log::error!("failed to persist session {}: {}", session_id, e);
            SystemError::Persistence
        })?;

        for connection_id in self.server_state.connections_of_user(target_user_id) {
            let event = IdentifiableEvent::BySystem {
                system_event: SystemEvent::Invite {
                    session_id,
                    video: video.clone(),
                    from_username: identity.username.clone(),
                },
            };
            self.connections
                .send(&connection_id, ConnectionEvent::IdentifiableEvent(event))
                .await;
        }
        log::info!(
            "user {} invited user {} to session {}",
            identity.username,
            target_user_id,
            session_id
        );

        Ok(SystemEvent::InviteSent { session_id })
    }

    async fn broadcast_session_event(
        &mut self,
        session_id: &SessionId,
        session_event: SessionEvent,
        without: Option<&UserId>,
    ) {
        let recipients: Vec<ConnectionId> = match self.server_state.sessions.get(session_id) {
            Some(session) => session
                .participants
                .values()
                .filter(|p| without.map_or(true, |user_id| *user_id != p.user_id))
                .map(|p| p.connection_id)
                .collect(),
            None => return,
        };
        for connection_id in recipients {
            let event = ConnectionEvent::IdentifiableEvent(IdentifiableEvent::BySystem {
                system_event: SystemEvent::InSession {
                    session_id: *session_id,
                    event: session_event.clone(),
                },
            });
            self.connections.send(&connection_id, event).await;
        }
    }

    async fn leave_session(
        &mut self,
        session_id: &SessionId,
        user_id: &UserId,
        only_connection: Option<ConnectionId>,
    ) {
        let outcome = self
            .server_state
            .leave_session(session_id, user_id, only_connection);
        if outcome.removed && !outcome.destroyed {
            self.broadcast_session_event(
                session_id,
                SessionEvent::UserLeft { user_id: *user_id },
                None,
            )
            .await;
        }
    }

    async fn leave_all_sessions(&mut self, from: &ConnectionId) {
        if let Some(identity) = self.server_state.identity(from).cloned() {
            for session_id in self.server_state.sessions_with_connection(from) {
                self.leave_session(&session_id, &identity.user_id, Some(*from))
                    .await;
            }
        }
    }

    async fn disconnect(&mut self, from: &ConnectionId) {
        self.leave_all_sessions(from).await;
        self.server_state.disconnect(from);
        self.connections
            .send(
                from,
                ConnectionEvent::Disconnected {
                    connection_id: *from,
                },
            )
            .await;
        self.connections.remove(from);
    }
}

pub fn spawn_server(store: Arc<dyn SessionStore>, options: ServerOptions) -> ServerTx {
    let (srv_tx, mut srv_rx) = channel::<ServerCommand>(64);

    let task_tx = srv_tx.clone();
    tokio::spawn(async move {
        let mut server = Box::new(Server::new(store, options, task_tx));

        while let Some(command) = srv_rx.recv().await {
            server.handle_server_command(command).await;
        }
    });

    srv_tx
}
