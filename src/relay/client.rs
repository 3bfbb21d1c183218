//! VLM telnet relay client
//!
//! Drives a VLM-style broadcast controller over its telnet control port:
//! password greeting, then `new` / `setup` / `control` / `del` commands.
//! One control connection is opened at startup and every command is
//! serialized on it; prompts (`> `) delimit command output.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::error::RelayError;
use super::RelayController;
use crate::server::config::RelayConfig;

/// Telnet prompt that terminates command output
const PROMPT: &str = "> ";

/// Password prompt in the connection greeting
const PASSWORD_PROMPT: &str = "Password:";

/// VLM-speaking broadcast relay
#[derive(Debug)]
pub struct VlmRelay {
    config: RelayConfig,
    conn: Mutex<Conn>,
}

#[derive(Debug)]
struct Conn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl VlmRelay {
    /// Connect and authenticate the control channel
    ///
    /// Called once at startup; a failure here is fatal for relay-enabled
    /// configurations.
    pub async fn connect(config: &RelayConfig) -> Result<Self, RelayError> {
        let stream = timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| RelayError::Timeout)?
        .map_err(RelayError::Connect)?;
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let mut conn = Conn {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        read_until(&mut conn.reader, PASSWORD_PROMPT, config.connect_timeout).await?;
        conn.writer
            .write_all(format!("{}\r\n", config.password).as_bytes())
            .await?;
        conn.writer.flush().await?;

        let greeting = read_until(&mut conn.reader, PROMPT, config.connect_timeout).await?;
        if greeting.contains("Wrong password") {
            return Err(RelayError::AuthRejected);
        }

        tracing::info!(host = %config.host, port = config.port, "relay control connected");

        Ok(Self {
            config: config.clone(),
            conn: Mutex::new(conn),
        })
    }

    /// Run one command and return its output
    async fn command(&self, command: &str) -> Result<String, RelayError> {
        let mut conn = self.conn.lock().await;

        conn.writer
            .write_all(format!("{command}\r\n").as_bytes())
            .await?;
        conn.writer.flush().await?;

        let output = read_until(&mut conn.reader, PROMPT, self.config.connect_timeout).await?;
        tracing::trace!(command = %command, "relay command done");

        if output.lines().any(|l| l.trim_start().starts_with("Error")) {
            return Err(RelayError::Command {
                command: command.to_string(),
                output: output.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn output_chain(&self, id: &str, mux: &str, pre_access: Option<&str>) -> String {
        let pre = pre_access.unwrap_or("");
        format!(
            "#{pre}std{{access=http,mux={mux},dst=:{port}/{id}}}",
            port = self.config.out_port
        )
    }
}

#[async_trait]
impl RelayController for VlmRelay {
    async fn start_broadcast(
        &self,
        id: &str,
        input: &str,
        mux: &str,
        pre_access: Option<&str>,
    ) -> Result<(), RelayError> {
        self.command(&format!("new {id} broadcast enabled")).await?;
        self.command(&format!("setup {id} input \"{input}\"")).await?;
        let output = self.output_chain(id, mux, pre_access);
        self.command(&format!("setup {id} output {output}")).await?;
        self.command(&format!("control {id} play")).await?;

        tracing::info!(broadcast = %id, "relay broadcast started");
        Ok(())
    }

    async fn stop_broadcast(&self, id: &str) -> Result<(), RelayError> {
        self.command(&format!("control {id} stop")).await?;
        self.command(&format!("del {id}")).await?;

        tracing::info!(broadcast = %id, "relay broadcast stopped");
        Ok(())
    }

    async fn pause_broadcast(&self, id: &str) -> Result<(), RelayError> {
        self.command(&format!("control {id} pause")).await?;
        Ok(())
    }

    async fn unpause_broadcast(&self, id: &str) -> Result<(), RelayError> {
        self.command(&format!("control {id} play")).await?;
        Ok(())
    }

    fn published_url(&self, id: &str) -> String {
        format!(
            "http://{}:{}/{}",
            self.config.host, self.config.out_port, id
        )
    }
}

/// Read until `token` appears at the end of the accumulated output
async fn read_until(
    reader: &mut BufReader<OwnedReadHalf>,
    token: &str,
    wait: Duration,
) -> Result<String, RelayError> {
    timeout(wait, async {
        let mut text = String::new();
        let mut buf = [0u8; 512];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Err(RelayError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "relay closed the control connection",
                )));
            }
            text.push_str(&String::from_utf8_lossy(&buf[..n]));
            if text.trim_end_matches(' ').ends_with(token.trim_end_matches(' '))
                || text.ends_with(token)
            {
                return Ok(text);
            }
        }
    })
    .await
    .map_err(|_| RelayError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as AsyncMutex;

    /// Scripted VLM endpoint recording every command line it receives.
    async fn spawn_fake_vlm(accept_password: bool) -> (std::net::SocketAddr, Arc<AsyncMutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let seen_writer = Arc::clone(&seen);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            write_half.write_all(b"VLM control interface\r\nPassword: ").await.unwrap();
            let _password = lines.next_line().await.unwrap();
            if accept_password {
                write_half.write_all(b"Welcome!\r\n> ").await.unwrap();
            } else {
                write_half.write_all(b"Wrong password\r\n> ").await.unwrap();
                return;
            }

            while let Ok(Some(line)) = lines.next_line().await {
                seen_writer.lock().await.push(line.clone());
                if line.starts_with("control missing") {
                    write_half.write_all(b"Error: unknown media\r\n> ").await.unwrap();
                } else {
                    write_half.write_all(b"> ").await.unwrap();
                }
            }
        });

        (addr, seen)
    }

    fn config_for(addr: std::net::SocketAddr) -> RelayConfig {
        RelayConfig {
            enabled: true,
            host: addr.ip().to_string(),
            port: addr.port(),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_broadcast_command_sequence() {
        let (addr, seen) = spawn_fake_vlm(true).await;
        let relay = VlmRelay::connect(&config_for(addr)).await.unwrap();

        relay
            .start_broadcast("deadbeef", "http://origin/x.ts", "ts", None)
            .await
            .unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen[0], "new deadbeef broadcast enabled");
        assert_eq!(seen[1], "setup deadbeef input \"http://origin/x.ts\"");
        assert!(seen[2].starts_with("setup deadbeef output #std{access=http,mux=ts,dst=:"));
        assert_eq!(seen[3], "control deadbeef play");
    }

    #[tokio::test]
    async fn test_error_output_is_surfaced() {
        let (addr, _seen) = spawn_fake_vlm(true).await;
        let relay = VlmRelay::connect(&config_for(addr)).await.unwrap();

        let err = relay.pause_broadcast("missing").await.unwrap_err();
        assert!(matches!(err, RelayError::Command { .. }));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let (addr, _seen) = spawn_fake_vlm(false).await;
        let err = VlmRelay::connect(&config_for(addr)).await.unwrap_err();
        assert!(matches!(err, RelayError::AuthRejected));
    }

    #[tokio::test]
    async fn test_published_url() {
        let (addr, _seen) = spawn_fake_vlm(true).await;
        let mut config = config_for(addr);
        config.out_port = 8081;
        let relay = VlmRelay::connect(&config).await.unwrap();

        assert_eq!(
            relay.published_url("deadbeef"),
            format!("http://{}:8081/deadbeef", addr.ip())
        );
    }
}
