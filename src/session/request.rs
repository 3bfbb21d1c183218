//! Stream request parsing
//!
//! `GET /{kind}/{urlencoded-payload}/{up to 5 numeric params}/{file.ext}`.
//! The positional parameters are best-effort: any segment in positions
//! 3–7 that does not parse as an integer (including the trailing filename)
//! counts as zero.

use crate::error::{GatewayError, Result};
use crate::registry::ContentKey;

/// Extensions accepted on the final path segment
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "avi", "flv", "mkv", "mov", "mp4", "mpeg", "mpg", "ogv", "ts",
];

/// How the content is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Direct content identifier
    Pid,
    /// Torrent URL
    Torrent,
}

impl RequestKind {
    /// Parse the first path segment; `None` for tokens owned by plugins or
    /// simply unknown
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "pid" => Some(RequestKind::Pid),
            "torrent" => Some(RequestKind::Torrent),
            _ => None,
        }
    }
}

/// One validated stream request
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub kind: RequestKind,
    /// Decoded payload segment (content id or torrent URL)
    pub payload: String,
    /// Positional parameters, zero where absent or non-numeric
    pub params: [i64; 5],
    /// Registry key: all clients for this payload share one session
    pub content_key: ContentKey,
    /// Relay channel id, identical for all clients of this payload
    pub broadcast_id: String,
}

impl StreamRequest {
    /// Parse and validate a request target
    pub fn parse(target: &str) -> Result<Self> {
        let path = target.split('?').next().unwrap_or(target);
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        let kind = segments
            .first()
            .and_then(|token| RequestKind::from_token(&token.to_ascii_lowercase()))
            .ok_or_else(|| GatewayError::BadRequest(format!("unsupported request kind in {path}")))?;

        if !has_video_extension(path) {
            return Err(GatewayError::BadRequest(format!(
                "no accepted video extension in {path}"
            )));
        }

        let raw_payload = segments
            .get(1)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::BadRequest("missing payload segment".into()))?;
        let payload = urlencoding::decode(raw_payload)
            .map_err(|e| GatewayError::BadRequest(format!("undecodable payload: {e}")))?
            .into_owned();

        let mut params = [0i64; 5];
        for (i, slot) in params.iter_mut().enumerate() {
            *slot = segments
                .get(2 + i)
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0);
        }

        let broadcast_id = match kind {
            RequestKind::Pid => payload.clone(),
            RequestKind::Torrent => format!("{:x}", md5::compute(payload.as_bytes())),
        };

        Ok(Self {
            kind,
            content_key: ContentKey::new(payload.clone()),
            payload,
            params,
            broadcast_id,
        })
    }
}

fn has_video_extension(path: &str) -> bool {
    let filename = path.rsplit('/').next().unwrap_or(path);
    match filename.rsplit_once('.') {
        Some((_, ext)) => VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pid_request() {
        let req = StreamRequest::parse("/pid/abcdef0123/0/video.mpg").unwrap();

        assert_eq!(req.kind, RequestKind::Pid);
        assert_eq!(req.payload, "abcdef0123");
        assert_eq!(req.params, [0, 0, 0, 0, 0]);
        assert_eq!(req.content_key.as_str(), "abcdef0123");
        assert_eq!(req.broadcast_id, "abcdef0123");
    }

    #[test]
    fn test_parse_torrent_request_hashes_broadcast_id() {
        let req =
            StreamRequest::parse("/torrent/http%3A%2F%2Ft.example%2Fa.torrent/1/2/3/4/5/v.ts")
                .unwrap();

        assert_eq!(req.kind, RequestKind::Torrent);
        assert_eq!(req.payload, "http://t.example/a.torrent");
        assert_eq!(req.params, [1, 2, 3, 4, 5]);
        // Registry key stays the decoded payload; only the broadcast id is
        // content-addressed.
        assert_eq!(req.content_key.as_str(), "http://t.example/a.torrent");
        assert_eq!(
            req.broadcast_id,
            format!("{:x}", md5::compute(b"http://t.example/a.torrent"))
        );
    }

    #[test]
    fn test_missing_params_default_to_zero() {
        let req = StreamRequest::parse("/torrent/x.torrent/7/v.avi").unwrap();
        // Position 3 holds the filename, which is not numeric.
        assert_eq!(req.params, [7, 0, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = StreamRequest::parse("/magnet/x/v.mpg").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn test_bad_extension_rejected() {
        let err = StreamRequest::parse("/pid/abc/0/video.exe").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn test_missing_extension_rejected() {
        let err = StreamRequest::parse("/pid/abc/0/video").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn test_missing_payload_rejected() {
        let err = StreamRequest::parse("/pid//0/video.mpg").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert!(StreamRequest::parse("/pid/abc/0/video.MKV").is_ok());
    }
}
