//! Add-on request handlers
//!
//! A plugin claims one or more path-prefix tokens. When the first path
//! segment of a request matches a claimed token, the whole request is
//! delegated to the plugin — kind, extension and capacity validation are
//! bypassed, and the registry is never touched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::{ClientConnection, RequestHead};

/// Error type plugins are free to fill with anything
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// A handler claiming one or more path prefixes
#[async_trait]
pub trait PluginHandler: Send + Sync {
    /// Serve the request: the plugin owns the client connection for the
    /// duration of the call and writes its own response.
    async fn handle(
        &self,
        request: &RequestHead,
        client: &mut ClientConnection,
    ) -> Result<(), PluginError>;
}

/// Token → handler table
#[derive(Default)]
pub struct PluginTable {
    handlers: HashMap<String, Arc<dyn PluginHandler>>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one handler under each of its prefix tokens
    ///
    /// Tokens are matched lowercased; a later registration for the same
    /// token replaces the earlier one.
    pub fn register(&mut self, prefixes: &[&str], handler: Arc<dyn PluginHandler>) {
        for prefix in prefixes {
            let token = prefix.to_ascii_lowercase();
            if self.handlers.insert(token.clone(), Arc::clone(&handler)).is_some() {
                tracing::warn!(token = %token, "plugin prefix re-registered");
            } else {
                tracing::debug!(token = %token, "plugin prefix registered");
            }
        }
    }

    /// Handler for a path token, if claimed
    pub fn get(&self, token: &str) -> Option<Arc<dyn PluginHandler>> {
        self.handlers.get(token).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    #[async_trait]
    impl PluginHandler for Nop {
        async fn handle(
            &self,
            _request: &RequestHead,
            _client: &mut ClientConnection,
        ) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut table = PluginTable::new();
        assert!(table.is_empty());

        table.register(&["stat", "Channels"], Arc::new(Nop));
        assert!(table.get("stat").is_some());
        assert!(table.get("channels").is_some());
        assert!(table.get("pid").is_none());
    }
}
