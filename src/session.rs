//! Tab-scoped persistence of the session triple.
//!
//! A [`Session`] is the local proof that this client belongs to a game. It is
//! written once after create/join and read back on every cold start. Storage
//! is abstracted by [`SessionStorage`]; [`MemoryStorage`] lives exactly as long
//! as the process (the equivalent of a browser tab).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::PlayerId;

/// Storage key the session record lives under.
pub const SESSION_KEY: &str = "retro_game_session";

/// The session triple, serialized with the client's historical camelCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub game_code: String,
    pub session_token: String,
    pub player_id: PlayerId,
}

impl Session {
    pub fn new(
        game_code: impl Into<String>,
        session_token: impl Into<String>,
        player_id: PlayerId,
    ) -> Self {
        Self {
            game_code: game_code.into(),
            session_token: session_token.into(),
            player_id,
        }
    }

    /// Case-insensitive comparison against a game code taken from a URL.
    pub fn matches_code(&self, code: &str) -> bool {
        self.game_code.eq_ignore_ascii_case(code)
    }
}

/// String key/value storage scoped to one tab.
pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: String);
    fn remove_item(&self, key: &str);
}

/// In-process [`SessionStorage`]. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_item(&self, key: &str, value: String) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove_item(&self, key: &str) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Save/get/clear of the [`Session`] over a [`SessionStorage`].
pub struct SessionStore {
    storage: Box<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    pub fn save(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(json) => self.storage.set_item(SESSION_KEY, json),
            Err(e) => debug!("failed to encode session: {e}"),
        }
    }

    /// The stored session, or `None` if absent or unreadable.
    ///
    /// Corrupted data is treated exactly like a missing session.
    pub fn get(&self) -> Option<Session> {
        let raw = self.storage.get_item(SESSION_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!("ignoring malformed session record: {e}");
                None
            }
        }
    }

    pub fn clear(&self) {
        self.storage.remove_item(SESSION_KEY);
    }

    pub fn has_session(&self) -> bool {
        self.get().is_some()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("has_session", &self.has_session())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn save_then_get_returns_the_session() {
        let store = SessionStore::new(MemoryStorage::new());
        let session = Session::new("AB12CD", "t1", 1);
        store.save(&session);
        assert_eq!(store.get(), Some(session));
        assert!(store.has_session());
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone());
        store.save(&Session::new("AB12CD", "t1", 1));
        let raw = storage.get_item(SESSION_KEY).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "gameCode": "AB12CD", "sessionToken": "t1", "playerId": 1 })
        );
    }

    #[test]
    fn malformed_record_reads_as_no_session() {
        let storage = MemoryStorage::new();
        storage.set_item(SESSION_KEY, "{not json".into());
        let store = SessionStore::new(storage.clone());
        assert_eq!(store.get(), None);

        storage.set_item(SESSION_KEY, r#"{"gameCode":"AB12CD"}"#.into());
        assert_eq!(store.get(), None);
    }

    #[test]
    fn clear_removes_the_record() {
        let store = SessionStore::new(MemoryStorage::new());
        store.save(&Session::new("AB12CD", "t1", 1));
        store.clear();
        assert!(!store.has_session());
    }

    #[test]
    fn separate_storages_do_not_share_sessions() {
        let tab_a = SessionStore::new(MemoryStorage::new());
        let tab_b = SessionStore::new(MemoryStorage::new());
        tab_a.save(&Session::new("AB12CD", "t1", 1));
        assert_eq!(tab_b.get(), None);
    }

    #[test]
    fn code_match_ignores_case() {
        let session = Session::new("AB12CD", "t1", 1);
        assert!(session.matches_code("ab12cd"));
        assert!(!session.matches_code("ZZ99ZZ"));
    }
}
