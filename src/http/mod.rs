//! Minimal HTTP/1.x surface over raw sockets
//!
//! The gateway owns the client socket directly: hang detection reads the
//! request stream while the pump writes the response stream, so no HTTP
//! framework sits between the accept loop and the bytes. This module is the
//! small amount of wire handling that requires — request-head parsing and
//! response-head writing.

pub mod request;
pub mod response;

pub use request::RequestHead;

use std::net::SocketAddr;

use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{GatewayError, Result};

/// One accepted client socket, split for independent read/write
///
/// The halves are taken out by the coordinator once streaming starts: the
/// read half feeds the hang watcher, the write half feeds the pump. Writes
/// after the split become no-ops, which is exactly the behavior wanted for
/// error reporting mid-stream (HTTP has no error signal once headers are
/// out — the connection just closes).
pub struct ClientConnection {
    peer: SocketAddr,
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
}

impl ClientConnection {
    /// Wrap an accepted socket
    pub fn new(socket: TcpStream, peer: SocketAddr) -> Self {
        let (read_half, write_half) = socket.into_split();
        Self {
            peer,
            reader: Some(BufReader::new(read_half)),
            writer: Some(write_half),
        }
    }

    /// Remote peer address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Parse the request head off the socket
    pub async fn read_head(&mut self) -> Result<RequestHead> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| GatewayError::Internal("client reader already taken".into()))?;
        request::read_head(reader).await
    }

    /// Write a response status line plus headers
    pub async fn write_head(&mut self, status: u16, headers: &[(String, String)]) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            response::write_head(writer, status, headers).await?;
        }
        Ok(())
    }

    /// Write a complete error response, if the head is still writable
    pub async fn write_error(&mut self, status: u16) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = response::write_error(writer, status).await {
                tracing::debug!(error = %e, "error response not delivered");
            }
        }
    }

    /// Write body bytes directly
    pub async fn write_body(&mut self, data: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(data).await?;
        }
        Ok(())
    }

    /// Take both halves for the streaming phase
    ///
    /// Returns `None` if either half was already taken.
    pub fn split_for_stream(&mut self) -> Option<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
        match (self.reader.take(), self.writer.take()) {
            (Some(r), Some(w)) => Some((r, w)),
            (r, w) => {
                self.reader = r;
                self.writer = w;
                None
            }
        }
    }
}
