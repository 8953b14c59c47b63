use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;

use system::{SessionId, UserId, VideoInfo};

/// Persisted record of a session's creation. Written once when an invite
/// allocates the session, read once when the first participant joins.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    pub video: VideoInfo,
    pub created_by: UserId,
}

#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(reason) => write!(f, "session store unavailable: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

/// External persistence collaborator. The core consults it once per lazy
/// session load and once per invite; it never writes anything else.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError>;
}

/// Keeps records in process memory. Stands in for a real database.
pub struct InMemorySessionStore {
    records: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, record: SessionRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.lock().unwrap().get(session_id).cloned())
    }

    async fn create(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.insert(record);
        Ok(())
    }
}
