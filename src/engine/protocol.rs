//! Engine control-protocol codec
//!
//! The control channel is line-oriented text. The client sends commands,
//! the engine answers with tagged lines; content events (resolved URL,
//! playback state) arrive asynchronously on the same channel. This module
//! is the pure format/parse layer — no I/O.
//!
//! ```text
//! Client                                  Engine
//!   |-- HELLO version=1 ------------------->|
//!   |<------------- HELLO key=<challenge> --|
//!   |-- READY key=<product-key> ----------->|
//!   |<----------------------- AUTH granted--|
//!   |-- START pid content_id=... ---------->|
//!   |<-------------------- START <url> -----|   (when the content is ready)
//!   |<-------------------- EVENT play ------|   (repeats as playback changes)
//!   |-- SHUTDOWN -------------------------->|
//! ```

use super::StartRequest;

/// Protocol version spoken by this client
pub const PROTOCOL_VERSION: u32 = 1;

/// Playback state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Play,
    Pause,
    Stop,
}

/// One parsed engine reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReply {
    /// Handshake greeting with the auth challenge
    Hello { key: String },
    /// Authentication verdict
    Auth { granted: bool },
    /// The playable URL for the started content
    StartUrl(String),
    /// Playback state change
    Event(PlaybackEvent),
    /// Informational status line
    Status(String),
    /// Engine-side failure for the running content
    Error(String),
}

/// Parse one reply line; `None` for lines this client ignores
pub fn parse_reply(line: &str) -> Option<EngineReply> {
    let line = line.trim();
    let (tag, rest) = match line.split_once(' ') {
        Some((tag, rest)) => (tag, rest.trim()),
        None => (line, ""),
    };

    match tag {
        "HELLO" => kv(rest, "key").map(|key| EngineReply::Hello { key }),
        "AUTH" => Some(EngineReply::Auth {
            granted: rest == "granted",
        }),
        "START" if !rest.is_empty() => Some(EngineReply::StartUrl(rest.to_string())),
        "EVENT" => match rest {
            "play" => Some(EngineReply::Event(PlaybackEvent::Play)),
            "pause" => Some(EngineReply::Event(PlaybackEvent::Pause)),
            "stop" => Some(EngineReply::Event(PlaybackEvent::Stop)),
            _ => None,
        },
        "STATUS" => Some(EngineReply::Status(rest.to_string())),
        "ERROR" => Some(EngineReply::Error(rest.to_string())),
        _ => None,
    }
}

/// Handshake opener
pub fn hello_command() -> String {
    format!("HELLO version={PROTOCOL_VERSION}")
}

/// Authentication answer to the greeting
pub fn ready_command(product_key: &str) -> String {
    format!("READY key={product_key}")
}

/// Content-start command
///
/// String values are percent-encoded so payload URLs survive the
/// space-delimited line format.
pub fn start_command(request: &StartRequest) -> String {
    match request {
        StartRequest::Pid {
            content_id,
            file_indexes,
        } => format!(
            "START pid content_id={} file_indexes={}",
            urlencoding::encode(content_id),
            file_indexes
        ),
        StartRequest::Torrent {
            url,
            file_indexes,
            developer_id,
            affiliate_id,
            zone_id,
            stream_id,
        } => format!(
            "START torrent url={} file_indexes={} developer_id={} affiliate_id={} zone_id={} stream_id={}",
            urlencoding::encode(url),
            file_indexes,
            developer_id,
            affiliate_id,
            zone_id,
            stream_id
        ),
    }
}

/// Session teardown command
pub fn shutdown_command() -> &'static str {
    "SHUTDOWN"
}

fn kv(rest: &str, wanted: &str) -> Option<String> {
    rest.split_whitespace().find_map(|pair| {
        pair.split_once('=')
            .filter(|(k, _)| *k == wanted)
            .map(|(_, v)| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hello() {
        assert_eq!(
            parse_reply("HELLO key=abc123 version=1"),
            Some(EngineReply::Hello { key: "abc123".into() })
        );
    }

    #[test]
    fn test_parse_auth() {
        assert_eq!(parse_reply("AUTH granted"), Some(EngineReply::Auth { granted: true }));
        assert_eq!(parse_reply("AUTH denied"), Some(EngineReply::Auth { granted: false }));
    }

    #[test]
    fn test_parse_start_url() {
        assert_eq!(
            parse_reply("START http://127.0.0.1:6878/content/x.ts"),
            Some(EngineReply::StartUrl("http://127.0.0.1:6878/content/x.ts".into()))
        );
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(parse_reply("EVENT play"), Some(EngineReply::Event(PlaybackEvent::Play)));
        assert_eq!(parse_reply("EVENT pause"), Some(EngineReply::Event(PlaybackEvent::Pause)));
        assert_eq!(parse_reply("EVENT stop"), Some(EngineReply::Event(PlaybackEvent::Stop)));
        assert_eq!(parse_reply("EVENT rewind"), None);
    }

    #[test]
    fn test_parse_error_line() {
        assert_eq!(
            parse_reply("ERROR cannot load content"),
            Some(EngineReply::Error("cannot load content".into()))
        );
    }

    #[test]
    fn test_unknown_lines_ignored() {
        assert_eq!(parse_reply("NOISE whatever"), None);
        assert_eq!(parse_reply(""), None);
    }

    #[test]
    fn test_start_command_encodes_url() {
        let cmd = start_command(&StartRequest::Torrent {
            url: "http://t.example/a file.torrent".into(),
            file_indexes: 2,
            developer_id: 0,
            affiliate_id: 0,
            zone_id: 0,
            stream_id: 0,
        });

        assert!(cmd.starts_with("START torrent url=http%3A%2F%2Ft.example%2Fa%20file.torrent"));
        assert!(cmd.contains("file_indexes=2"));
        assert!(cmd.ends_with("stream_id=0"));
    }

    #[test]
    fn test_pid_start_command() {
        let cmd = start_command(&StartRequest::Pid {
            content_id: "deadbeef".into(),
            file_indexes: 0,
        });
        assert_eq!(cmd, "START pid content_id=deadbeef file_indexes=0");
    }
}
