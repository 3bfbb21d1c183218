//! Request-head parsing
//!
//! Reads the request line and headers off a buffered socket. Only what the
//! gateway needs: method, target path, and the header list in arrival order
//! (order matters when forwarding to the origin).

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{GatewayError, Result};

/// Longest accepted request or header line, in bytes
const MAX_LINE: usize = 8 * 1024;

/// Most headers accepted on one request
const MAX_HEADERS: usize = 100;

/// Parsed request line plus headers
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Request method, as sent
    pub method: String,
    /// Request target (path plus optional query), as sent
    pub target: String,
    /// Protocol version token, e.g. `HTTP/1.1`
    pub version: String,
    /// Headers in arrival order
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Case-insensitive single-header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `User-Agent` header, if present
    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// First path segment, lowercased — the request-kind or plugin token
    pub fn path_token(&self) -> Option<String> {
        self.target
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase())
    }
}

/// Read and parse one request head
///
/// Errors are all `BadRequest`; socket-level failures surface as `Io`.
pub async fn read_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<RequestHead> {
    let request_line = read_line(reader).await?;
    let mut parts = request_line.split_whitespace();

    let method = parts
        .next()
        .ok_or_else(|| GatewayError::BadRequest("empty request line".into()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| GatewayError::BadRequest("request line lacks a target".into()))?
        .to_string();
    let version = parts.next().unwrap_or("HTTP/1.0").to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader).await?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(GatewayError::BadRequest("too many headers".into()));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| GatewayError::BadRequest(format!("malformed header: {line}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(RequestHead {
        method,
        target,
        version,
        headers,
    })
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(GatewayError::BadRequest("connection closed mid-head".into()));
    }
    if n > MAX_LINE {
        return Err(GatewayError::BadRequest("request line too long".into()));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &str) -> Result<RequestHead> {
        let mut reader = tokio::io::BufReader::new(raw.as_bytes());
        read_head(&mut reader).await
    }

    #[tokio::test]
    async fn test_parse_simple_get() {
        let head = parse("GET /pid/abc/0/video.mpg HTTP/1.1\r\nHost: example\r\nUser-Agent: vlc\r\n\r\n")
            .await
            .unwrap();

        assert_eq!(head.method, "GET");
        assert_eq!(head.target, "/pid/abc/0/video.mpg");
        assert_eq!(head.version, "HTTP/1.1");
        assert_eq!(head.header("host"), Some("example"));
        assert_eq!(head.user_agent(), Some("vlc"));
        assert_eq!(head.path_token().as_deref(), Some("pid"));
    }

    #[tokio::test]
    async fn test_header_lookup_is_case_insensitive() {
        let head = parse("GET / HTTP/1.1\r\nX-Thing: 1\r\n\r\n").await.unwrap();
        assert_eq!(head.header("x-thing"), Some("1"));
        assert_eq!(head.header("X-THING"), Some("1"));
    }

    #[tokio::test]
    async fn test_path_token_lowercases() {
        let head = parse("GET /PID/abc/video.ts HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(head.path_token().as_deref(), Some("pid"));
    }

    #[tokio::test]
    async fn test_missing_target_rejected() {
        let err = parse("GET\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_malformed_header_rejected() {
        let err = parse("GET / HTTP/1.1\r\nnot-a-header\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_truncated_head_rejected() {
        let err = parse("GET / HTTP/1.1\r\nHost: x").await.unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }
}
