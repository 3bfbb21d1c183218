//! Session registry implementation
//!
//! All operations take the one registry lock, mutate, and release before
//! any await point — attach-and-decide-creator is a single atomic step, so
//! two near-simultaneous first attachers can never both see an empty slot.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use super::entry::{ContentKey, SessionEntry, SessionHandoff};
use crate::engine::EngineSession;

/// What an attacher is expected to do next
pub enum AttachRole {
    /// This attacher owns session creation for the key
    Creator,
    /// Someone else is (or was) the creator; await the handoff
    Joiner(watch::Receiver<SessionHandoff>),
}

/// Result of [`SessionRegistry::attach`]
pub struct Attachment {
    /// Attachment count for the key after this attach
    pub count: usize,
    /// Creator/joiner decision, made under the registry lock
    pub role: AttachRole,
}

/// Thread-safe map from content key to active session + attached clients
#[derive(Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<ContentKey, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a client to a key, creating the entry if needed
    ///
    /// Exactly one attacher per key observes [`AttachRole::Creator`] until
    /// the published session is cleared or the creator fails. Never fails.
    pub async fn attach(&self, key: &ContentKey, client: IpAddr) -> Attachment {
        let mut entries = self.entries.lock().await;

        let entry = entries.entry(key.clone()).or_insert_with(SessionEntry::new);
        let count = entry.attach_client(client);

        let role = match entry.handoff() {
            SessionHandoff::Ready(_) => AttachRole::Joiner(entry.subscribe()),
            // Pending with other attachments means a creator is in flight;
            // pending at count one means the slot was abandoned (or this
            // attach inserted the entry) and this attacher owns creation.
            SessionHandoff::Pending if count > 1 => AttachRole::Joiner(entry.subscribe()),
            SessionHandoff::Pending => AttachRole::Creator,
            SessionHandoff::Failed => {
                entry.publish(SessionHandoff::Pending);
                AttachRole::Creator
            }
        };

        tracing::debug!(
            key = %key,
            client = %client,
            count,
            creator = matches!(role, AttachRole::Creator),
            "client attached"
        );

        Attachment { count, role }
    }

    /// Publish the session created for a key
    pub async fn set_session(&self, key: &ContentKey, session: Arc<dyn EngineSession>) {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) => {
                entry.publish(SessionHandoff::Ready(session));
                tracing::debug!(key = %key, "session published");
            }
            None => tracing::warn!(key = %key, "set_session on missing entry"),
        }
    }

    /// Record that the creator failed before publishing
    ///
    /// Pending joiners observe the failure; the next attacher becomes the
    /// new creator.
    pub async fn fail_pending(&self, key: &ContentKey) {
        let entries = self.entries.lock().await;
        if let Some(entry) = entries.get(key) {
            entry.publish(SessionHandoff::Failed);
            tracing::debug!(key = %key, "pending session marked failed");
        }
    }

    /// Detach one client occurrence, returning the remaining count
    ///
    /// The entry is retained even at zero so a grace-period check (and a
    /// racing reconnect) can still find the session.
    pub async fn detach(&self, key: &ContentKey, client: IpAddr) -> usize {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) => {
                let remaining = entry.detach_client(client);
                tracing::debug!(key = %key, client = %client, remaining, "client detached");
                remaining
            }
            None => 0,
        }
    }

    /// Non-owning attachment count read
    pub async fn peek_count(&self, key: &ContentKey) -> usize {
        let entries = self.entries.lock().await;
        entries.get(key).map(SessionEntry::client_count).unwrap_or(0)
    }

    /// Published session for a key, if any
    pub async fn session(&self, key: &ContentKey) -> Option<Arc<dyn EngineSession>> {
        let entries = self.entries.lock().await;
        entries.get(key).and_then(SessionEntry::session)
    }

    /// Drop the entry entirely
    ///
    /// Only valid once the key has no attachments; a non-zero count is a
    /// bookkeeping bug upstream and leaves the entry in place.
    pub async fn clear_session(&self, key: &ContentKey) {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.client_count() == 0 => {
                entries.remove(key);
                tracing::debug!(key = %key, "entry cleared");
            }
            Some(entry) => {
                tracing::warn!(
                    key = %key,
                    count = entry.client_count(),
                    "clear_session with live attachments ignored"
                );
            }
            None => {}
        }
    }

    /// Number of keys currently tracked
    pub async fn entry_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::engine::{EngineError, StartRequest};

    #[derive(Debug)]
    struct NullSession;

    #[async_trait]
    impl EngineSession for NullSession {
        async fn start(&self, _request: &StartRequest) -> Result<(), EngineError> {
            Ok(())
        }
        async fn stream_url(&self, _timeout: Duration) -> Result<String, EngineError> {
            Ok("http://127.0.0.1/void.ts".into())
        }
        async fn wait_play_event(&self, _timeout: Option<Duration>) -> Result<(), EngineError> {
            Ok(())
        }
        async fn destroy(&self) {}
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn test_first_attacher_is_creator() {
        let registry = SessionRegistry::new();
        let key = ContentKey::from("abc");

        let first = registry.attach(&key, ip(1)).await;
        assert_eq!(first.count, 1);
        assert!(matches!(first.role, AttachRole::Creator));

        let second = registry.attach(&key, ip(2)).await;
        assert_eq!(second.count, 2);
        assert!(matches!(second.role, AttachRole::Joiner(_)));
    }

    #[tokio::test]
    async fn test_joiner_receives_published_session() {
        let registry = SessionRegistry::new();
        let key = ContentKey::from("abc");

        let _creator = registry.attach(&key, ip(1)).await;
        let joiner = registry.attach(&key, ip(2)).await;

        registry.set_session(&key, Arc::new(NullSession)).await;

        match joiner.role {
            AttachRole::Joiner(mut rx) => {
                let session = rx
                    .wait_for(|h| !matches!(h, SessionHandoff::Pending))
                    .await
                    .unwrap()
                    .session();
                assert!(session.is_some());
            }
            AttachRole::Creator => panic!("second attacher must join"),
        }
    }

    #[tokio::test]
    async fn test_creator_failure_promotes_next_attacher() {
        let registry = SessionRegistry::new();
        let key = ContentKey::from("abc");

        let _creator = registry.attach(&key, ip(1)).await;
        let joiner = registry.attach(&key, ip(2)).await;

        registry.fail_pending(&key).await;
        registry.detach(&key, ip(1)).await;

        // The waiting joiner observes the failure...
        match joiner.role {
            AttachRole::Joiner(mut rx) => {
                let failed = rx
                    .wait_for(|h| matches!(h, SessionHandoff::Failed))
                    .await
                    .is_ok();
                assert!(failed);
            }
            AttachRole::Creator => panic!("second attacher must join"),
        }

        // ...and the next attacher takes over creation.
        let next = registry.attach(&key, ip(3)).await;
        assert!(matches!(next.role, AttachRole::Creator));
    }

    #[tokio::test]
    async fn test_detach_retains_entry_for_grace_check() {
        let registry = SessionRegistry::new();
        let key = ContentKey::from("abc");

        let _a = registry.attach(&key, ip(1)).await;
        registry.set_session(&key, Arc::new(NullSession)).await;

        let remaining = registry.detach(&key, ip(1)).await;
        assert_eq!(remaining, 0);

        // Entry survives at zero; a fast reconnect still finds the session.
        assert!(registry.session(&key).await.is_some());
        let reconnect = registry.attach(&key, ip(1)).await;
        assert!(matches!(reconnect.role, AttachRole::Joiner(_)));
        assert_eq!(reconnect.count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_address_counts_twice() {
        let registry = SessionRegistry::new();
        let key = ContentKey::from("abc");

        let first = registry.attach(&key, ip(1)).await;
        let second = registry.attach(&key, ip(1)).await;
        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);

        assert_eq!(registry.detach(&key, ip(1)).await, 1);
        assert_eq!(registry.detach(&key, ip(1)).await, 0);
    }

    #[tokio::test]
    async fn test_clear_session_requires_zero_count() {
        let registry = SessionRegistry::new();
        let key = ContentKey::from("abc");

        let _a = registry.attach(&key, ip(1)).await;
        registry.set_session(&key, Arc::new(NullSession)).await;

        registry.clear_session(&key).await;
        assert_eq!(registry.entry_count().await, 1);

        registry.detach(&key, ip(1)).await;
        registry.clear_session(&key).await;
        assert_eq!(registry.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_attach_storm_elects_one_creator() {
        let registry = Arc::new(SessionRegistry::new());
        let key = ContentKey::from("stormy");
        let creators = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..64u8 {
            let registry = Arc::clone(&registry);
            let creators = Arc::clone(&creators);
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                let attachment = registry.attach(&key, ip(i)).await;
                if matches!(attachment.role, AttachRole::Creator) {
                    creators.fetch_add(1, Ordering::SeqCst);
                    registry.set_session(&key, Arc::new(NullSession)).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(creators.load(Ordering::SeqCst), 1);
        assert_eq!(registry.peek_count(&key).await, 64);
        assert!(registry.session(&key).await.is_some());
    }
}
