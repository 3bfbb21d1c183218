//! Registry entry and key types

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::watch;

use crate::engine::EngineSession;

/// Key naming one logical stream
///
/// This is the decoded payload segment of the request path — all clients
/// asking for the same payload share one entry regardless of request kind
/// or source address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session slot state handed to joiners
///
/// `Pending` while the creator is still initializing; `Ready` once the
/// session is published; `Failed` when the creator gave up, which makes the
/// next attacher the new creator.
#[derive(Clone)]
pub enum SessionHandoff {
    Pending,
    Ready(Arc<dyn EngineSession>),
    Failed,
}

impl SessionHandoff {
    pub fn session(&self) -> Option<Arc<dyn EngineSession>> {
        match self {
            SessionHandoff::Ready(session) => Some(Arc::clone(session)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for SessionHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionHandoff::Pending => f.write_str("Pending"),
            SessionHandoff::Ready(_) => f.write_str("Ready"),
            SessionHandoff::Failed => f.write_str("Failed"),
        }
    }
}

/// One content key's entry
///
/// `clients` is a multiset: the same address attached twice counts twice,
/// and detach removes one occurrence. The watch sender doubles as the slot
/// state — `borrow()` is the current handoff, subscribers await changes.
pub struct SessionEntry {
    handoff: watch::Sender<SessionHandoff>,
    clients: Vec<IpAddr>,
}

impl SessionEntry {
    /// New entry in the pending state (the creating attacher is in flight)
    pub(super) fn new() -> Self {
        let (handoff, _) = watch::channel(SessionHandoff::Pending);
        Self {
            handoff,
            clients: Vec::new(),
        }
    }

    /// Current slot state
    pub fn handoff(&self) -> SessionHandoff {
        self.handoff.borrow().clone()
    }

    /// Published session, if any
    pub fn session(&self) -> Option<Arc<dyn EngineSession>> {
        self.handoff.borrow().session()
    }

    /// Subscribe to slot changes
    pub(super) fn subscribe(&self) -> watch::Receiver<SessionHandoff> {
        self.handoff.subscribe()
    }

    /// Publish a new slot state
    ///
    /// `send_replace` so the value is stored even with no live subscriber.
    pub(super) fn publish(&self, state: SessionHandoff) {
        self.handoff.send_replace(state);
    }

    /// Add one client occurrence, returning the new count
    pub(super) fn attach_client(&mut self, client: IpAddr) -> usize {
        self.clients.push(client);
        self.clients.len()
    }

    /// Remove one occurrence of `client`, returning the remaining count
    pub(super) fn detach_client(&mut self, client: IpAddr) -> usize {
        if let Some(pos) = self.clients.iter().rposition(|c| *c == client) {
            self.clients.remove(pos);
        }
        self.clients.len()
    }

    /// Number of attached client occurrences
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
