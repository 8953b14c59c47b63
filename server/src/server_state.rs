use std::collections::{HashMap, HashSet};
use std::num::Wrapping;

use system::{ConnectionId, Identity, SessionId, UserId};

use crate::session::Session;

/// The single process-wide mutable structure: session registry plus the
/// connection and identity indexes. Owned exclusively by the server task,
/// which serializes every read and mutation.
pub struct ServerState {
    connection_id_source: Wrapping<ConnectionId>,
    pub identities: HashMap<ConnectionId, Identity>,
    pub user_connections: HashMap<UserId, HashSet<ConnectionId>>,
    pub sessions: HashMap<SessionId, Session>,
}

#[derive(Debug, Default, PartialEq)]
pub struct LeaveOutcome {
    pub removed: bool,
    pub destroyed: bool,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            connection_id_source: Wrapping(0),
            identities: HashMap::new(),
            user_connections: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn create_connection(&mut self, identity: Identity) -> ConnectionId {
        let connection_id = self.new_connection_id();
        self.user_connections
            .entry(identity.user_id)
            .or_insert_with(HashSet::new)
            .insert(connection_id);
        self.identities.insert(connection_id, identity);
        connection_id
    }

    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Option<Identity> {
        let identity = self.identities.remove(connection_id)?;
        if let Some(connections) = self.user_connections.get_mut(&identity.user_id) {
            connections.remove(connection_id);
            if connections.is_empty() {
                self.user_connections.remove(&identity.user_id);
            }
        }
        Some(identity)
    }

    pub fn identity(&self, connection_id: &ConnectionId) -> Option<&Identity> {
        self.identities.get(connection_id)
    }

    /// Every live connection currently authenticated as this user. A user may
    /// hold several at once; invites fan out to all of them.
    pub fn connections_of_user(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.user_connections
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_session(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn insert_session(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    /// Sessions in which this connection is the registered handle of some
    /// participant. Used to turn a disconnect into per-session leaves.
    pub fn sessions_with_connection(&self, connection_id: &ConnectionId) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| {
                s.participants
                    .values()
                    .any(|p| p.connection_id == *connection_id)
            })
            .map(|s| s.id)
            .collect()
    }

    /// Removes the user's membership. With `only_connection` set, the removal
    /// only happens while that connection is still the registered handle, so
    /// a disconnect racing a rejoin from elsewhere leaves the rejoin intact.
    /// Destroys the session (cancelling any countdown) when it empties.
    pub fn leave_session(
        &mut self,
        session_id: &SessionId,
        user_id: &UserId,
        only_connection: Option<ConnectionId>,
    ) -> LeaveOutcome {
        let session = match self.sessions.get_mut(session_id) {
            Some(session) => session,
            None => return LeaveOutcome::default(),
        };
        match session.participants.get(user_id) {
            Some(p) if only_connection.map_or(true, |c| c == p.connection_id) => {}
            _ => return LeaveOutcome::default(),
        }

        session.participants.remove(user_id);
        let destroyed = session.participants.is_empty();
        if destroyed {
            if let Some(mut session) = self.sessions.remove(session_id) {
                if let Some(countdown) = session.countdown.take() {
                    countdown.cancel();
                }
            }
            log::info!("session {} emptied and was destroyed", session_id);
        }
        LeaveOutcome {
            removed: true,
            destroyed,
        }
    }

    // The counter wraps, so a candidate id may still belong to a long-lived
    // connection. Skip occupied ids; far fewer than u16::MAX connections are
    // ever live at once.
    fn new_connection_id(&mut self) -> ConnectionId {
        loop {
            self.connection_id_source += Wrapping(1);
            let candidate = self.connection_id_source.0;
            if !self.identities.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use system::{unix_millis, uuid::Uuid, VideoInfo};

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: name.into(),
        }
    }

    fn video() -> VideoInfo {
        VideoInfo {
            id: "dQw4w9WgXcQ".into(),
            title: "test video".into(),
            thumbnail: "thumb.jpg".into(),
            duration: 212.0,
            url: "https://example.com/v/dQw4w9WgXcQ".into(),
        }
    }

    fn state_with_session() -> (ServerState, SessionId) {
        let mut state = ServerState::new();
        let session_id = Uuid::new_v4();
        state.insert_session(Session::new(session_id, video(), unix_millis()));
        (state, session_id)
    }

    #[test]
    fn it_removes_session_when_last_participant_leaves() {
        let (mut state, session_id) = state_with_session();
        let user = identity("alice");
        let conn = state.create_connection(user.clone());
        state
            .sessions
            .get_mut(&session_id)
            .unwrap()
            .join(&user, conn);

        let outcome = state.leave_session(&session_id, &user.user_id, None);
        assert_eq!(
            outcome,
            LeaveOutcome {
                removed: true,
                destroyed: true
            }
        );
        assert!(!state.has_session(&session_id));
    }

    #[test]
    fn it_joins_idempotently_and_keeps_latest_connection() {
        let (mut state, session_id) = state_with_session();
        let user = identity("alice");
        let first = state.create_connection(user.clone());
        let second = state.create_connection(user.clone());

        let session = state.sessions.get_mut(&session_id).unwrap();
        assert!(session.join(&user, first));
        assert!(!session.join(&user, second));
        assert_eq!(session.participants.len(), 1);
        assert_eq!(
            session.participants[&user.user_id].connection_id,
            second
        );
    }

    #[test]
    fn it_ignores_leave_from_a_superseded_connection() {
        let (mut state, session_id) = state_with_session();
        let user = identity("alice");
        let stale = state.create_connection(user.clone());
        let fresh = state.create_connection(user.clone());

        let session = state.sessions.get_mut(&session_id).unwrap();
        session.join(&user, stale);
        session.join(&user, fresh);

        let outcome = state.leave_session(&session_id, &user.user_id, Some(stale));
        assert_eq!(outcome, LeaveOutcome::default());
        assert!(state
            .sessions
            .get(&session_id)
            .unwrap()
            .is_participant(&user.user_id));
    }

    #[test]
    fn it_never_reassigns_a_connection_id_still_in_use() {
        let mut state = ServerState::new();
        state.identities.insert(1, identity("alice"));
        state.identities.insert(2, identity("bob"));

        let assigned = state.create_connection(identity("carol"));
        assert_eq!(assigned, 3);
        assert_eq!(state.identities.len(), 3);
    }

    #[test]
    fn it_tracks_all_connections_of_a_user() {
        let mut state = ServerState::new();
        let user = identity("bob");
        let a = state.create_connection(user.clone());
        let b = state.create_connection(user.clone());

        let mut connections = state.connections_of_user(&user.user_id);
        connections.sort();
        assert_eq!(connections, vec![a, b]);

        state.disconnect(&a);
        assert_eq!(state.connections_of_user(&user.user_id), vec![b]);
        state.disconnect(&b);
        assert!(state.connections_of_user(&user.user_id).is_empty());
    }
}
