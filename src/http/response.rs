//! Response-head writing
//!
//! Builds status lines and header blocks into one buffer and writes them in
//! a single syscall. Also owns the hop-by-hop strip list applied when
//! relaying origin headers to the client.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Origin headers never relayed to the client
pub const STRIPPED_HEADERS: [&str; 4] = ["connection", "server", "transfer-encoding", "keep-alive"];

/// Whether an origin header must be dropped before relaying
pub fn is_stripped(name: &str) -> bool {
    STRIPPED_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s))
}

/// Reason phrase for the status codes the gateway emits
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Write a status line plus headers, terminated by the empty line
pub async fn write_head<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u16,
    headers: &[(String, String)],
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(256);
    buf.put_slice(format!("HTTP/1.1 {} {}\r\n", status, status_reason(status)).as_bytes());
    for (name, value) in headers {
        buf.put_slice(name.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"\r\n");

    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Write a complete minimal error response
pub async fn write_error<W: AsyncWrite + Unpin>(writer: &mut W, status: u16) -> std::io::Result<()> {
    let body = format!("{} {}\n", status, status_reason(status));
    let headers = [
        ("Content-Type".to_string(), "text/plain".to_string()),
        ("Content-Length".to_string(), body.len().to_string()),
        ("Connection".to_string(), "close".to_string()),
    ];
    write_head(writer, status, &headers).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await
}

/// Write an empty 200 carrying only a content type
///
/// Used for the health-check bypass and the fake-header client path.
pub async fn write_empty_ok<W: AsyncWrite + Unpin>(
    writer: &mut W,
    content_type: &str,
) -> std::io::Result<()> {
    let headers = [("Content-Type".to_string(), content_type.to_string())];
    write_head(writer, 200, &headers).await
}
