use serde::{Deserialize, Serialize};

pub type ConnectionId = u16;
pub type CommandId = u16;
pub type SessionId = uuid::Uuid;
pub type UserId = uuid::Uuid;
pub type MessageId = uuid::Uuid;

/// Verified identity attached to a connection. The coordination core trusts
/// it unconditionally; verification happens at the transport boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Roster entry as seen by clients. The connection handle stays server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub user_id: UserId,
    pub username: String,
}

/// Set once when a session is created from an invite, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration: f64,
    pub url: String,
}
