//! Minimal HTTP/1.1 request-head parsing.
//!
//! The server peeks at the request line of every connection to decide
//! whether it is an ingestion stream (decoded here, chunk by chunk) or an
//! ordinary request handed to the HTTP router.

use crate::error::{ProtocolError, ProtocolResult};

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Try to parse a head from the front of `buf`.
    ///
    /// Returns the head and the number of bytes it occupies (including the
    /// blank line), or `Ok(None)` if the blank line has not arrived yet.
    pub fn parse(buf: &[u8]) -> ProtocolResult<Option<(RequestHead, usize)>> {
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            if buf.len() > MAX_HEAD_LEN {
                return Err(ProtocolError::HeadTooLarge(MAX_HEAD_LEN));
            }
            return Ok(None);
        };
        let head_len = end + 4;
        if head_len > MAX_HEAD_LEN {
            return Err(ProtocolError::HeadTooLarge(MAX_HEAD_LEN));
        }

        let text = std::str::from_utf8(&buf[..end])
            .map_err(|_| ProtocolError::MalformedRequestHead("head is not UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ').filter(|p| !p.is_empty());
        let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::MalformedRequestHead(format!(
                "bad request line: {request_line:?}"
            )));
        };
        if !version.starts_with("HTTP/") {
            return Err(ProtocolError::MalformedRequestHead(format!(
                "bad HTTP version: {version:?}"
            )));
        }

        let mut headers = Vec::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                return Err(ProtocolError::MalformedRequestHead(format!(
                    "bad header line: {line:?}"
                )));
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let path = target.split('?').next().unwrap_or(target).to_string();
        Ok(Some((
            RequestHead {
                method: method.to_string(),
                path,
                version: version.to_string(),
                headers,
            },
            head_len,
        )))
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| {
                v.split(',')
                    .any(|enc| enc.trim().eq_ignore_ascii_case("chunked"))
            })
            .unwrap_or(false)
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::request_head;

    #[test]
    fn parses_client_head() {
        let raw = format!("{}5\r\nhello\r\n", request_head("localhost"));
        let (head, len) = RequestHead::parse(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.path, "/send-metrics");
        assert!(head.is_chunked());
        assert_eq!(head.header("HOST"), Some("localhost"));
        assert_eq!(&raw.as_bytes()[len..], b"5\r\nhello\r\n");
    }

    #[test]
    fn incomplete_head_needs_more() {
        assert!(RequestHead::parse(b"GET /metrics HTTP/1.1\r\nHost: x\r\n")
            .unwrap()
            .is_none());
    }

    #[test]
    fn strips_query_string() {
        let (head, _) = RequestHead::parse(b"GET /metrics?x=1 HTTP/1.1\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(head.path, "/metrics");
        assert!(!head.is_chunked());
    }

    #[test]
    fn content_length_header() {
        let (head, _) =
            RequestHead::parse(b"POST /send-metrics HTTP/1.1\r\nContent-Length: 12\r\n\r\n")
                .unwrap()
                .unwrap();
        assert_eq!(head.content_length(), Some(12));
    }

    #[test]
    fn rejects_garbage_request_line() {
        let err = RequestHead::parse(b"hello\r\n\r\n").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedRequestHead(_)));
    }

    #[test]
    fn rejects_oversized_head() {
        let raw = vec![b'a'; MAX_HEAD_LEN + 1];
        let err = RequestHead::parse(&raw).unwrap_err();
        assert!(matches!(err, ProtocolError::HeadTooLarge(_)));
    }
}
