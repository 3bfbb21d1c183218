//! Client hang detection
//!
//! During streaming nothing else reads the client socket, so a blocking
//! read is the disconnect probe: it returns 0 (or an error) the moment the
//! client half-closes. Any data that does arrive is drained and ignored.
//! This is the only mechanism that discovers a client-initiated disconnect
//! while the pump is blocked writing.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;

use crate::session::state::ClientFlags;

/// Watch the client read half until it closes
pub async fn run(mut reader: BufReader<OwnedReadHalf>, flags: Arc<ClientFlags>) {
    tracing::debug!("hang watcher started");
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
    flags.mark_disconnected();
    tracing::debug!("client disconnected");
}
