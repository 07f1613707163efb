//! Ephemeral per-user session state
//!
//! The session store is a flat key/value map. Keys are built from a logical
//! prefix and the user handle, see [`SessionKey`]. There is no multi-key
//! transaction, so callers that write related keys (chat pairing) issue the
//! writes one after another.

use crate::{Result, UserHandle};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Key/value store for conversation state and scratch values.
///
/// All operations are idempotent: deleting a missing key is not an error and
/// setting a key overwrites any previous value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync + fmt::Debug {
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Logical keys stored per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    State(UserHandle),
    Visibility(UserHandle),
    Chat(UserHandle),
    SearchGender(UserHandle),
    SearchAge(UserHandle),
    /// Where the user last searched from, as `lat,lon`.
    SearchLocation(UserHandle),
}

impl SessionKey {
    pub fn prefix(&self) -> &'static str {
        match self {
            SessionKey::State(_) => "state",
            SessionKey::Visibility(_) => "visibility",
            SessionKey::Chat(_) => "chat",
            SessionKey::SearchGender(_) => "search_gender",
            SessionKey::SearchAge(_) => "search_age",
            SessionKey::SearchLocation(_) => "search_location",
        }
    }

    pub fn user(&self) -> UserHandle {
        match *self {
            SessionKey::State(user)
            | SessionKey::Visibility(user)
            | SessionKey::Chat(user)
            | SessionKey::SearchGender(user)
            | SessionKey::SearchAge(user)
            | SessionKey::SearchLocation(user) => user,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix(), self.user())
    }
}

/// In-process session store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Symmetric chat pairing stored as `chat:{a}=b` and `chat:{b}=a`.
#[derive(Debug, Clone)]
pub struct ChatPairing {
    store: Arc<dyn SessionStore>,
}

impl ChatPairing {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Current partner of `user`, if any.
    ///
    /// A stored value that is not a user handle is treated as no partner.
    pub async fn partner(&self, user: UserHandle) -> Result<Option<UserHandle>> {
        let key = SessionKey::Chat(user).to_string();
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match raw.parse::<UserHandle>() {
            Ok(partner) => Ok(Some(partner)),
            Err(_) => {
                tracing::warn!("Ignoring unparseable chat partner '{}' under {}", raw, key);
                Ok(None)
            }
        }
    }

    pub async fn start(&self, a: UserHandle, b: UserHandle) -> Result<()> {
        self.store
            .set(&SessionKey::Chat(a).to_string(), &b.to_string())
            .await?;
        self.store
            .set(&SessionKey::Chat(b).to_string(), &a.to_string())
            .await?;
        tracing::debug!("Chat started between {} and {}", a, b);
        Ok(())
    }

    /// Ends the chat `user` is in, removing both halves.
    ///
    /// Returns the former partner, or `None` when `user` was not chatting.
    pub async fn end(&self, user: UserHandle) -> Result<Option<UserHandle>> {
        let partner = self.partner(user).await?;
        self.store.delete(&SessionKey::Chat(user).to_string()).await?;
        if let Some(partner) = partner {
            self.store
                .delete(&SessionKey::Chat(partner).to_string())
                .await?;
            tracing::debug!("Chat ended between {} and {}", user, partner);
        }
        Ok(partner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_render_prefix_and_handle() {
        let user = UserHandle(42);
        assert_eq!(SessionKey::State(user).to_string(), "state:42");
        assert_eq!(SessionKey::Visibility(user).to_string(), "visibility:42");
        assert_eq!(SessionKey::Chat(user).to_string(), "chat:42");
        assert_eq!(SessionKey::SearchGender(user).to_string(), "search_gender:42");
        assert_eq!(SessionKey::SearchAge(user).to_string(), "search_age:42");
        assert_eq!(
            SessionKey::SearchLocation(user).to_string(),
            "search_location:42"
        );
    }

    #[tokio::test]
    async fn memory_store_is_idempotent() {
        let store = MemorySessionStore::new();
        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn chat_pairing_removes_both_halves() {
        let store = Arc::new(MemorySessionStore::new());
        let chat = ChatPairing::new(store.clone());
        let (a, b) = (UserHandle(1), UserHandle(2));

        chat.start(a, b).await.unwrap();
        assert_eq!(chat.partner(a).await.unwrap(), Some(b));
        assert_eq!(chat.partner(b).await.unwrap(), Some(a));

        assert_eq!(chat.end(b).await.unwrap(), Some(a));
        assert_eq!(chat.partner(a).await.unwrap(), None);
        assert_eq!(chat.partner(b).await.unwrap(), None);
        assert!(store.is_empty());

        assert_eq!(chat.end(a).await.unwrap(), None);
    }

    #[tokio::test]
    async fn chat_partner_surfaces_store_errors() {
        let mut mock = MockSessionStore::new();
        mock.expect_get().returning(|key| {
            Err(crate::CoreError::session_store(
                "get",
                key,
                crate::error::StringError("connection reset".to_string()),
            ))
        });
        let chat = ChatPairing::new(Arc::new(mock));
        assert!(matches!(
            chat.partner(UserHandle(5)).await,
            Err(crate::CoreError::SessionStoreFailed { .. })
        ));
    }
}
