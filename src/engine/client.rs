//! TCP engine control client
//!
//! One TCP connection per session. The handshake runs inline during
//! `open_session`; after that a background reader task owns the read half
//! and publishes what arrives — the resolved URL and playback events — into
//! watch channels the session methods await on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;
use tokio::time::timeout;

use super::error::EngineError;
use super::protocol::{self, EngineReply, PlaybackEvent};
use super::{EngineBackend, EngineSession, StartRequest};
use crate::server::config::EngineConfig;

/// Grace given to the SHUTDOWN write before the socket is dropped anyway
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// URL-resolution state published by the reader task
#[derive(Debug, Clone)]
enum Resolve {
    Waiting,
    Url(String),
    Fault(String),
}

/// Engine backend speaking the control protocol over TCP
pub struct TcpEngineBackend {
    config: EngineConfig,
}

impl TcpEngineBackend {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineBackend for TcpEngineBackend {
    async fn open_session(&self) -> Result<Arc<dyn EngineSession>, EngineError> {
        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        .map_err(|_| EngineError::Timeout)?
        .map_err(EngineError::Connect)?;
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = write_half;

        send_line(&mut writer, &protocol::hello_command()).await?;
        let challenge = loop {
            match read_reply(&mut reader, self.config.result_timeout).await? {
                EngineReply::Hello { key } => break key,
                other => {
                    return Err(EngineError::Protocol(format!(
                        "expected greeting, got {other:?}"
                    )))
                }
            }
        };
        tracing::trace!(challenge = %challenge, "engine greeting received");

        send_line(&mut writer, &protocol::ready_command(&self.config.product_key)).await?;
        match read_reply(&mut reader, self.config.result_timeout).await? {
            EngineReply::Auth { granted: true } => {}
            EngineReply::Auth { granted: false } => return Err(EngineError::AuthRejected),
            other => {
                return Err(EngineError::Protocol(format!(
                    "expected auth verdict, got {other:?}"
                )))
            }
        }

        let (url_tx, url_rx) = watch::channel(Resolve::Waiting);
        let (play_tx, play_rx) = watch::channel(false);
        let reader_task = tokio::spawn(read_loop(reader, url_tx, play_tx));

        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            "engine session opened"
        );

        Ok(Arc::new(TcpEngineSession {
            writer: Mutex::new(writer),
            url_rx,
            play_rx,
            reader_abort: reader_task.abort_handle(),
            destroyed: AtomicBool::new(false),
        }))
    }
}

/// One live control connection
#[derive(Debug)]
pub struct TcpEngineSession {
    writer: Mutex<OwnedWriteHalf>,
    url_rx: watch::Receiver<Resolve>,
    play_rx: watch::Receiver<bool>,
    reader_abort: AbortHandle,
    destroyed: AtomicBool,
}

#[async_trait]
impl EngineSession for TcpEngineSession {
    async fn start(&self, request: &StartRequest) -> Result<(), EngineError> {
        let mut writer = self.writer.lock().await;
        send_line(&mut *writer, &protocol::start_command(request)).await
    }

    async fn stream_url(&self, wait: Duration) -> Result<String, EngineError> {
        let mut rx = self.url_rx.clone();
        timeout(wait, async move {
            loop {
                let current = rx.borrow_and_update().clone();
                match current {
                    Resolve::Url(url) => return Ok(url),
                    Resolve::Fault(reason) => return Err(EngineError::Remote(reason)),
                    Resolve::Waiting => {}
                }
                rx.changed().await.map_err(|_| EngineError::Closed)?;
            }
        })
        .await
        .map_err(|_| EngineError::Timeout)?
    }

    async fn wait_play_event(&self, wait: Option<Duration>) -> Result<(), EngineError> {
        let mut rx = self.play_rx.clone();
        match wait {
            Some(wait) => match timeout(wait, rx.wait_for(|playing| *playing)).await {
                Err(_) => Err(EngineError::Timeout),
                Ok(Err(_)) => Err(EngineError::Closed),
                Ok(Ok(_)) => Ok(()),
            },
            None => rx
                .wait_for(|playing| *playing)
                .await
                .map(|_| ())
                .map_err(|_| EngineError::Closed),
        }
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().await;
        match timeout(SHUTDOWN_TIMEOUT, send_line(&mut *writer, protocol::shutdown_command())).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "shutdown command not delivered"),
            Err(_) => tracing::debug!("shutdown command timed out"),
        }
        self.reader_abort.abort();
        tracing::debug!("engine session destroyed");
    }
}

impl Drop for TcpEngineSession {
    fn drop(&mut self) {
        self.reader_abort.abort();
    }
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), EngineError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn read_reply(
    reader: &mut BufReader<OwnedReadHalf>,
    wait: Duration,
) -> Result<EngineReply, EngineError> {
    loop {
        let mut line = String::new();
        let n = timeout(wait, reader.read_line(&mut line))
            .await
            .map_err(|_| EngineError::Timeout)??;
        if n == 0 {
            return Err(EngineError::Closed);
        }
        if let Some(reply) = protocol::parse_reply(&line) {
            return Ok(reply);
        }
    }
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    url_tx: watch::Sender<Resolve>,
    play_tx: watch::Sender<bool>,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match protocol::parse_reply(&line) {
            Some(EngineReply::StartUrl(url)) => {
                tracing::debug!(url = %url, "engine resolved stream url");
                let _ = url_tx.send(Resolve::Url(url));
            }
            Some(EngineReply::Event(event)) => {
                let _ = play_tx.send(matches!(event, PlaybackEvent::Play));
            }
            Some(EngineReply::Error(reason)) => {
                tracing::warn!(reason = %reason, "engine reported failure");
                let _ = url_tx.send(Resolve::Fault(reason));
                let _ = play_tx.send(false);
            }
            Some(EngineReply::Status(status)) => {
                tracing::trace!(status = %status, "engine status");
            }
            _ => {}
        }
    }
    tracing::debug!("engine control connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Minimal scripted engine: handshake, then answer START with a URL and
    /// a play event.
    async fn spawn_fake_engine(grant: bool) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.starts_with("HELLO") {
                    write_half.write_all(b"HELLO key=ch4ll3nge version=1\r\n").await.unwrap();
                } else if line.starts_with("READY") {
                    let verdict: &[u8] = if grant { b"AUTH granted\r\n" } else { b"AUTH denied\r\n" };
                    write_half.write_all(verdict).await.unwrap();
                } else if line.starts_with("START") {
                    write_half
                        .write_all(b"STATUS loading\r\nSTART http://127.0.0.1:6878/c/x.ts\r\nEVENT play\r\n")
                        .await
                        .unwrap();
                } else if line.starts_with("SHUTDOWN") {
                    break;
                }
            }
        });
        addr
    }

    fn config_for(addr: std::net::SocketAddr) -> EngineConfig {
        EngineConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_start_resolve() {
        let addr = spawn_fake_engine(true).await;
        let backend = TcpEngineBackend::new(config_for(addr));

        let session = backend.open_session().await.unwrap();
        session
            .start(&StartRequest::Pid {
                content_id: "abc".into(),
                file_indexes: 0,
            })
            .await
            .unwrap();

        let url = session.stream_url(Duration::from_secs(2)).await.unwrap();
        assert_eq!(url, "http://127.0.0.1:6878/c/x.ts");

        session
            .wait_play_event(Some(Duration::from_secs(2)))
            .await
            .unwrap();

        session.destroy().await;
        // A second destroy is a no-op.
        session.destroy().await;
    }

    #[tokio::test]
    async fn test_auth_denied() {
        let addr = spawn_fake_engine(false).await;
        let backend = TcpEngineBackend::new(config_for(addr));

        let err = backend.open_session().await.unwrap_err();
        assert!(matches!(err, EngineError::AuthRejected));
    }

    #[tokio::test]
    async fn test_stream_url_times_out_without_start() {
        let addr = spawn_fake_engine(true).await;
        let backend = TcpEngineBackend::new(config_for(addr));

        let session = backend.open_session().await.unwrap();
        let err = session.stream_url(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout));
    }
}
