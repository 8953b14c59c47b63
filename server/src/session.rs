use std::collections::HashMap;

use system::{
    ConnectionId, Identity, ParticipantInfo, SessionId, SyncSnapshot, Timestamp, UserId, VideoInfo,
};

use crate::countdown::Countdown;

/// One user's membership in a session, bound to the connection that most
/// recently joined.
pub struct Participant {
    pub user_id: UserId,
    pub username: String,
    pub connection_id: ConnectionId,
}

/// Authoritative in-memory state of one watch party. Lives in the registry
/// only while it has at least one participant.
pub struct Session {
    pub id: SessionId,
    pub video: VideoInfo,
    pub participants: HashMap<UserId, Participant>,
    pub sync: SyncSnapshot,
    pub countdown: Option<Countdown>,
}

impl Session {
    pub fn new(id: SessionId, video: VideoInfo, now: Timestamp) -> Self {
        Self {
            id,
            video,
            participants: HashMap::new(),
            sync: SyncSnapshot::initial(now),
            countdown: None,
        }
    }

    /// Idempotent per user: a rejoin replaces the stored connection handle
    /// without duplicating membership. Returns true for a first-time join.
    pub fn join(&mut self, identity: &Identity, connection_id: ConnectionId) -> bool {
        self.participants
            .insert(
                identity.user_id,
                Participant {
                    user_id: identity.user_id,
                    username: identity.username.clone(),
                    connection_id,
                },
            )
            .is_none()
    }

    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.participants.contains_key(user_id)
    }

    pub fn roster(&self) -> Vec<ParticipantInfo> {
        self.participants
            .values()
            .map(|p| ParticipantInfo {
                user_id: p.user_id,
                username: p.username.clone(),
            })
            .collect()
    }
}
