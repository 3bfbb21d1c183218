//! Gateway listener
//!
//! Handles the TCP accept loop and spawns one coordinator task per
//! connection. A failing connection never takes the accept loop down.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::server::context::GatewayContext;
use crate::session::coordinator;

/// The HTTP streaming gateway
pub struct Gateway {
    context: Arc<GatewayContext>,
    listener: TcpListener,
    next_session_id: AtomicU64,
}

impl Gateway {
    /// Bind the configured listen address
    pub async fn bind(context: Arc<GatewayContext>) -> Result<Self> {
        let listener = TcpListener::bind(context.config.listen).await?;
        Ok(Self {
            context,
            listener,
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared context, for introspection and tests
    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.context
    }

    /// Run the accept loop until the process dies
    pub async fn run(&self) -> Result<()> {
        tracing::info!(addr = %self.listener.local_addr()?, "gateway listening");
        self.accept_loop().await
    }

    /// Run the accept loop until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %self.listener.local_addr()?, "gateway listening");
        tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown signal received");
                Ok(())
            }
            result = self.accept_loop() => result,
        }
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => self.handle_accept(socket, peer),
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    fn handle_accept(&self, socket: TcpStream, peer: SocketAddr) {
        let _ = socket.set_nodelay(true);

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let context = Arc::clone(&self.context);
        let guard = context.connections.acquire();

        tracing::debug!(session_id, peer = %peer, "new connection");

        tokio::spawn(async move {
            let _guard = guard;
            coordinator::handle_connection(context, socket, peer, session_id).await;
            tracing::debug!(session_id, "connection closed");
        });
    }
}
