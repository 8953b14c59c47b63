use std::collections::HashMap;
use std::sync::Mutex;

use system::Identity;

/// Maps an opaque connection token to a verified identity. Everything past
/// this seam trusts the identity unconditionally; actual verification
/// (signatures, user lookups) is an external concern.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Identity>;
}

/// In-memory token table, optionally seeded from a JSON object of
/// `token -> { user_id, username }`.
pub struct TokenTable {
    tokens: Mutex<HashMap<String, Identity>>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, system::serde_json::Error> {
        let tokens: HashMap<String, Identity> = system::serde_json::from_str(raw)?;
        Ok(Self {
            tokens: Mutex::new(tokens),
        })
    }

    pub fn insert<T: Into<String>>(&self, token: T, identity: Identity) {
        self.tokens.lock().unwrap().insert(token.into(), identity);
    }
}

impl Authenticator for TokenTable {
    fn authenticate(&self, token: &str) -> Option<Identity> {
        self.tokens.lock().unwrap().get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use system::uuid::Uuid;

    #[test]
    fn it_rejects_unknown_tokens() {
        let table = TokenTable::new();
        assert!(table.authenticate("nope").is_none());
    }

    #[test]
    fn it_resolves_seeded_tokens() {
        let user_id = Uuid::new_v4();
        let raw = format!(
            r#"{{ "tok-1": {{ "user_id": "{}", "username": "alice" }} }}"#,
            user_id
        );
        let table = TokenTable::from_json(&raw).expect("valid seed");
        let identity = table.authenticate("tok-1").expect("known token");
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.username, "alice");
    }
}
