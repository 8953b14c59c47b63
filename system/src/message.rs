use serde::{Deserialize, Serialize};

use crate::sync::SyncSnapshot;
use crate::time::Timestamp;
use crate::types::{CommandId, MessageId, ParticipantInfo, SessionId, UserId, VideoInfo};

/// Ticks broadcast before a synchronized start: 3, 2, 1, finished.
pub const COUNTDOWN_FROM: u8 = 3;

/// FatalError makes connection be closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatalError {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiableCommand {
    pub command_id: CommandId,
    pub system_command: SystemCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemCommand {
    JoinSession {
        session_id: SessionId,
    },
    LeaveSession {
        session_id: SessionId,
    },
    InSession {
        session_id: SessionId,
        command: SessionCommand,
    },
    SendInvite {
        target_user_id: UserId,
        video: VideoInfo,
    },
}

/// Commands scoped to a session the sender must already be a participant of.
/// All of them are dropped silently for non-participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionCommand {
    PlaybackReport { current_time: f64, is_playing: bool },
    RequestSync,
    Chat { text: String },
    Reaction { emoji: String, x: f32, y: f32 },
    StartCountdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IdentifiableEvent {
    ByMyself {
        command_id: CommandId,
        result: CommandResult,
    },
    BySystem {
        system_event: SystemEvent,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandResult {
    SystemEvent(SystemEvent),
    Error(SystemError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemEvent {
    JoinedSession {
        session_id: SessionId,
        video: VideoInfo,
        participants: Vec<ParticipantInfo>,
        sync: SyncSnapshot,
    },
    LeftSession {
        session_id: SessionId,
    },
    InviteSent {
        session_id: SessionId,
    },
    Invite {
        session_id: SessionId,
        video: VideoInfo,
        from_username: String,
    },
    InSession {
        session_id: SessionId,
        event: SessionEvent,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    UserJoined(ParticipantInfo),
    UserLeft { user_id: UserId },
    Sync(SyncSnapshot),
    Chat(ChatMessage),
    Reaction(EmojiReaction),
    CountdownTick { remaining: u8 },
    CountdownFinished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemError {
    SessionNotFound,
    Persistence,
    FatalError(FatalError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub user_id: UserId,
    pub username: String,
    pub text: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmojiReaction {
    pub id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub x: f32,
    pub y: f32,
    pub timestamp: Timestamp,
}
