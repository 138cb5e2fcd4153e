//! Durable session → container mapping with sliding TTL.
//!
//! Two keys per session:
//!
//! - `session:<id>`: hash with `user_id`, `container_id`, `created_at`,
//!   `command_count`
//! - `container:<id>`: plain string holding the container id
//!
//! Both carry the session TTL and are refreshed together on activity.
//! Whenever they diverge (the narrow reconciliation window updates
//! `container:` first), the `container:` value is authoritative.

use crate::error::Result;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use tracing::debug;

/// One session's stored attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Owning principal; immutable for the session's life
    pub user_id: String,
    /// Runtime handle of the backing sandbox
    pub container_id: String,
    /// ISO-8601 UTC creation time
    pub created_at: String,
    /// Commands executed against this session
    pub command_count: u64,
}

impl SessionRecord {
    /// Decode a record from its Redis hash representation.
    fn from_hash(mut hash: HashMap<String, String>) -> Self {
        Self {
            user_id: hash.remove("user_id").unwrap_or_default(),
            container_id: hash.remove("container_id").unwrap_or_default(),
            created_at: hash.remove("created_at").unwrap_or_default(),
            command_count: hash
                .remove("command_count")
                .and_then(|count| count.parse().ok())
                .unwrap_or(0),
        }
    }
}

/// Authoritative session store.
#[derive(Clone)]
pub struct SessionStore {
    conn: MultiplexedConnection,
    ttl_seconds: u64,
}

impl SessionStore {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn, ttl_seconds })
    }

    /// Build a store over an existing connection.
    pub fn new(conn: MultiplexedConnection, ttl_seconds: u64) -> Self {
        Self { conn, ttl_seconds }
    }

    /// Clone of the underlying connection, for sharing with the rate limiter.
    pub fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    fn session_key(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    fn container_key(session_id: &str) -> String {
        format!("container:{session_id}")
    }

    /// Create (or overwrite) a session record with a fresh TTL.
    ///
    /// Both keys are written in one atomic pipeline so readers never observe
    /// a half-created session.
    pub async fn create(
        &self,
        session_id: &str,
        user_id: &str,
        container_id: &str,
    ) -> Result<()> {
        let session_key = Self::session_key(session_id);
        let container_key = Self::container_key(session_id);
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                &session_key,
                &[
                    ("user_id", user_id),
                    ("container_id", container_id),
                    ("created_at", now.as_str()),
                    ("command_count", "0"),
                ],
            )
            .expire(&session_key, self.ttl_seconds as i64)
            .set_ex(&container_key, container_id, self.ttl_seconds)
            .query_async(&mut conn)
            .await?;

        debug!("Stored session {} -> {}", session_id, container_id);
        Ok(())
    }

    /// Fetch a session record; `None` when absent or expired.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> = conn.hgetall(Self::session_key(session_id)).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(SessionRecord::from_hash(hash)))
    }

    /// Fetch just the container id; `None` when absent or expired.
    pub async fn get_container_id(&self, session_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let container_id: Option<String> = conn.get(Self::container_key(session_id)).await?;
        Ok(container_id)
    }

    /// Slide the TTL window on activity and count the command.
    ///
    /// Returns `false` when the session does not exist. Concurrent refreshes
    /// converge on the same final window.
    pub async fn refresh(&self, session_id: &str) -> Result<bool> {
        let session_key = Self::session_key(session_id);
        let container_key = Self::container_key(session_id);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&session_key).await?;
        if !exists {
            return Ok(false);
        }

        let _: () = redis::pipe()
            .expire(&session_key, self.ttl_seconds as i64)
            .expire(&container_key, self.ttl_seconds as i64)
            .hincr(&session_key, "command_count", 1)
            .query_async(&mut conn)
            .await?;
        Ok(true)
    }

    /// Remove both keys for a session.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let keys = [
            Self::session_key(session_id),
            Self::container_key(session_id),
        ];
        let _: () = conn.del(&keys[..]).await?;
        Ok(())
    }

    /// Point an existing session at a replacement container.
    ///
    /// The `container:` key is written first; readers that observe a
    /// mismatch during this window treat it as authoritative.
    pub async fn set_container_for_session(
        &self,
        session_id: &str,
        container_id: &str,
    ) -> Result<()> {
        let session_key = Self::session_key(session_id);
        let container_key = Self::container_key(session_id);
        let mut conn = self.conn.clone();

        let _: () = conn
            .set_ex(&container_key, container_id, self.ttl_seconds)
            .await?;

        let exists: bool = conn.exists(&session_key).await?;
        if exists {
            let _: () = redis::pipe()
                .hset(&session_key, "container_id", container_id)
                .expire(&session_key, self.ttl_seconds as i64)
                .query_async(&mut conn)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(SessionStore::session_key("s1"), "session:s1");
        assert_eq!(SessionStore::container_key("s1"), "container:s1");
    }

    #[test]
    fn test_record_from_hash() {
        let mut hash = HashMap::new();
        hash.insert("user_id".to_string(), "alice".to_string());
        hash.insert("container_id".to_string(), "abc123".to_string());
        hash.insert(
            "created_at".to_string(),
            "2026-01-01T00:00:00+00:00".to_string(),
        );
        hash.insert("command_count".to_string(), "7".to_string());

        let record = SessionRecord::from_hash(hash);
        assert_eq!(record.user_id, "alice");
        assert_eq!(record.container_id, "abc123");
        assert_eq!(record.command_count, 7);
    }

    #[test]
    fn test_record_from_partial_hash() {
        let mut hash = HashMap::new();
        hash.insert("user_id".to_string(), "alice".to_string());
        hash.insert("command_count".to_string(), "not-a-number".to_string());

        let record = SessionRecord::from_hash(hash);
        assert_eq!(record.user_id, "alice");
        assert_eq!(record.container_id, "");
        assert_eq!(record.command_count, 0);
    }

    async fn test_store() -> Option<SessionStore> {
        SessionStore::connect("redis://localhost:6379/15", 60)
            .await
            .ok()
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis
    async fn test_create_get_refresh_delete() {
        let Some(store) = test_store().await else {
            eprintln!("Skipping store tests (Redis not available)");
            return;
        };

        store.create("it-s1", "alice", "cid-1").await.unwrap();

        let record = store.get("it-s1").await.unwrap().unwrap();
        assert_eq!(record.user_id, "alice");
        assert_eq!(record.container_id, "cid-1");
        assert_eq!(record.command_count, 0);
        assert_eq!(
            store.get_container_id("it-s1").await.unwrap().as_deref(),
            Some("cid-1")
        );

        assert!(store.refresh("it-s1").await.unwrap());
        let record = store.get("it-s1").await.unwrap().unwrap();
        assert_eq!(record.command_count, 1);

        store.delete("it-s1").await.unwrap();
        assert!(store.get("it-s1").await.unwrap().is_none());
        assert!(!store.refresh("it-s1").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis
    async fn test_set_container_for_session() {
        let Some(store) = test_store().await else {
            return;
        };

        store.create("it-s2", "alice", "cid-old").await.unwrap();
        store
            .set_container_for_session("it-s2", "cid-new")
            .await
            .unwrap();

        let record = store.get("it-s2").await.unwrap().unwrap();
        assert_eq!(record.container_id, "cid-new");
        assert_eq!(
            store.get_container_id("it-s2").await.unwrap().as_deref(),
            Some("cid-new")
        );

        store.delete("it-s2").await.unwrap();
    }
}
