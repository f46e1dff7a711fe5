//! Identity store: user records looked up by username or email.
//!
//! The gateway only needs three operations, expressed by [`IdentityStore`].
//! [`MemoryStore`] keeps records in a map keyed by username and can be
//! seeded from a JSON array of records.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A stored user document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id", default = "Uuid::new_v4")]
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    /// bcrypt hash; empty for accounts that cannot log in
    #[serde(default)]
    pub password_hash: String,
    /// Usernames of this user's friends
    #[serde(default)]
    pub friends: Vec<String>,
    /// File name of the profile picture under `/assets`
    #[serde(default)]
    pub picture_path: Option<String>,
}

/// Public view of a user, safe to return over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub friends: Vec<String>,
    pub picture_path: Option<String>,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            friends: user.friends.clone(),
            picture_path: user.picture_path.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("Email '{0}' is already registered")]
    EmailTaken(String),

    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Seed(#[from] serde_json::Error),
}

/// Lookup and insertion of user records.
pub trait IdentityStore: Send + Sync + 'static {
    fn find_by_username(&self, username: &str) -> impl Future<Output = Option<UserRecord>> + Send;

    fn find_by_email(&self, email: &str) -> impl Future<Output = Option<UserRecord>> + Send;

    /// Insert a new record. Username and email must both be unused.
    fn insert(
        &self,
        user: UserRecord,
    ) -> impl Future<Output = Result<UserRecord, StoreError>> + Send;
}

/// In-memory identity store.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing records, rejecting duplicates.
    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Result<Self, StoreError> {
        let mut by_username: HashMap<String, UserRecord> = HashMap::new();
        for user in users {
            if by_username.contains_key(&user.username) {
                return Err(StoreError::UsernameTaken(user.username));
            }
            if by_username.values().any(|u| u.email == user.email) {
                return Err(StoreError::EmailTaken(user.email));
            }
            by_username.insert(user.username.clone(), user);
        }
        Ok(Self {
            users: RwLock::new(by_username),
        })
    }

    /// Load records from a JSON array file.
    pub async fn load_seed(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let users: Vec<UserRecord> = serde_json::from_slice(&bytes)?;
        let store = Self::with_users(users)?;
        log::info!(
            "Loaded {} user(s) from {}",
            store.len().await,
            path.as_ref().display()
        );
        Ok(store)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

impl IdentityStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Option<UserRecord> {
        self.users.read().await.get(username).cloned()
    }

    async fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        self.users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned()
    }

    async fn insert(&self, user: UserRecord) -> Result<UserRecord, StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.username) {
            return Err(StoreError::UsernameTaken(user.username));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::EmailTaken(user.email));
        }
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            full_name: format!("{username} Example"),
            password_hash: String::new(),
            friends: Vec::new(),
            picture_path: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryStore::new();
        let alice = store.insert(user("alice", "alice@example.com")).await.unwrap();

        assert_eq!(store.find_by_username("alice").await, Some(alice.clone()));
        assert_eq!(store.find_by_email("alice@example.com").await, Some(alice));
        assert!(store.find_by_username("bob").await.is_none());
        assert!(store.find_by_email("bob@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        let store = MemoryStore::new();
        store.insert(user("alice", "alice@example.com")).await.unwrap();

        let err = store.insert(user("alice", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken(name) if name == "alice"));

        let err = store.insert(user("alicia", "alice@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::EmailTaken(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_with_users_rejects_duplicates() {
        let result = MemoryStore::with_users(vec![
            user("alice", "a@example.com"),
            user("alice", "b@example.com"),
        ]);
        assert!(matches!(result, Err(StoreError::UsernameTaken(_))));
    }

    #[test]
    fn test_record_json_field_names() {
        let json = r#"{
            "_id": "550e8400-e29b-41d4-a716-446655440000",
            "username": "alice",
            "email": "alice@example.com",
            "fullName": "Alice Example",
            "friends": ["bob", "carol"],
            "picturePath": "alice.png"
        }"#;
        let record: UserRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.full_name, "Alice Example");
        assert_eq!(record.friends, vec!["bob", "carol"]);
        assert_eq!(record.picture_path.as_deref(), Some("alice.png"));
        assert!(record.password_hash.is_empty());

        let profile = serde_json::to_value(UserProfile::from(&record)).unwrap();
        assert_eq!(profile["_id"], "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(profile["fullName"], "Alice Example");
        assert!(profile.get("passwordHash").is_none());
    }

    #[test]
    fn test_missing_id_is_generated() {
        let record: UserRecord =
            serde_json::from_str(r#"{"username": "bob", "email": "bob@example.com"}"#).unwrap();
        assert!(!record.id.is_nil());
        assert!(record.friends.is_empty());
    }

    #[tokio::test]
    async fn test_load_seed_missing_file() {
        let result = MemoryStore::load_seed("/nonexistent/courier/users.json").await;
        assert!(matches!(result, Err(StoreError::Io(_))));
    }
}
