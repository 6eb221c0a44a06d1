//! One-message-per-chunk framing over HTTP/1.1 chunked transfer encoding.
//!
//! ```text
//! POST /send-metrics HTTP/1.1\r\n
//! Transfer-Encoding: chunked\r\n
//! ...headers...\r\n
//! \r\n
//! <HEX-LEN>\r\n<message bytes>\r\n      ← one logical message
//! <HEX-LEN>\r\n<message bytes>\r\n
//! 0\r\n\r\n                              ← end of stream
//! ```
//!
//! The sender must never split a message across chunks or coalesce two
//! messages into one; the receiver then gets exactly one decoded frame per
//! message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Path the ingestion stream is posted to.
pub const SEND_METRICS_PATH: &str = "/send-metrics";

/// The zero-length chunk that ends a stream.
pub const TERMINATOR: &[u8] = b"0\r\n\r\n";

/// Default upper bound on a single message, enforced by the decoder.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Longest chunk-size or trailer line accepted before giving up.
const MAX_LINE_LEN: usize = 1024;

/// The request line and headers that open an ingestion stream.
pub fn request_head(host: &str) -> String {
    format!(
        "POST {SEND_METRICS_PATH} HTTP/1.1\r\n\
         Transfer-Encoding: chunked\r\n\
         Host: {host}\r\n\
         Connection: Close\r\n\
         Content-Type: application/octet-stream\r\n\
         \r\n"
    )
}

/// Append one message as a single chunk: upper-case hex length, CRLF,
/// payload, CRLF.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    let len = format!("{:X}", payload.len());
    dst.reserve(len.len() + payload.len() + 4);
    dst.put_slice(len.as_bytes());
    dst.put_slice(b"\r\n");
    dst.put_slice(payload);
    dst.put_slice(b"\r\n");
}

/// Encode one message into a standalone frame.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    encode_frame(payload, &mut buf);
    buf.freeze()
}

/// A unit produced by [`ChunkDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// One complete logical message.
    Message(Bytes),
    /// The terminal zero-length chunk (and any trailers) were consumed.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data(usize),
    Trailer,
    Done,
}

/// Incremental chunked-body decoder.
///
/// Feed it a buffer that grows as bytes arrive; each call consumes at most
/// one frame from the front and returns `Ok(None)` when more input is
/// needed.
#[derive(Debug)]
pub struct ChunkDecoder {
    state: State,
    max_message_size: usize,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl ChunkDecoder {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: State::Size,
            max_message_size,
        }
    }

    /// True once the terminal chunk has been decoded.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// True when no chunk is partially consumed, i.e. the stream may end
    /// here without losing a message.
    pub fn at_boundary(&self) -> bool {
        matches!(self.state, State::Size | State::Done)
    }

    pub fn decode(&mut self, buf: &mut BytesMut) -> ProtocolResult<Option<Decoded>> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(buf)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    if size == 0 {
                        self.state = State::Trailer;
                    } else if size > self.max_message_size {
                        return Err(ProtocolError::ChunkTooLarge {
                            size,
                            limit: self.max_message_size,
                        });
                    } else {
                        self.state = State::Data(size);
                    }
                }
                State::Data(size) => {
                    if buf.len() < size + 2 {
                        buf.reserve(size + 2 - buf.len());
                        return Ok(None);
                    }
                    let payload = buf.split_to(size).freeze();
                    if &buf[..2] != b"\r\n" {
                        return Err(ProtocolError::MissingChunkTerminator);
                    }
                    buf.advance(2);
                    self.state = State::Size;
                    return Ok(Some(Decoded::Message(payload)));
                }
                State::Trailer => {
                    let Some(line) = take_line(buf)? else {
                        return Ok(None);
                    };
                    // Trailer headers are ignored; an empty line ends the body.
                    if line.is_empty() {
                        self.state = State::Done;
                        return Ok(Some(Decoded::End));
                    }
                }
                State::Done => return Ok(Some(Decoded::End)),
            }
        }
    }
}

/// Split one CRLF-terminated line off the front of `buf`, without the CRLF.
fn take_line(buf: &mut BytesMut) -> ProtocolResult<Option<BytesMut>> {
    match buf.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => {
            let line = buf.split_to(pos);
            buf.advance(2);
            Ok(Some(line))
        }
        None if buf.len() > MAX_LINE_LEN => Err(ProtocolError::InvalidChunkSize(
            String::from_utf8_lossy(&buf[..32]).into_owned(),
        )),
        None => Ok(None),
    }
}

/// Parse a chunk-size line, ignoring any `;extension` suffix.
fn parse_chunk_size(line: &[u8]) -> ProtocolResult<usize> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidChunkSize(String::from_utf8_lossy(line).into_owned()))?;
    let hex = text.split(';').next().unwrap_or_default().trim();
    if hex.is_empty() {
        return Err(ProtocolError::InvalidChunkSize(text.to_string()));
    }
    usize::from_str_radix(hex, 16).map_err(|_| ProtocolError::InvalidChunkSize(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_all(decoder: &mut ChunkDecoder, buf: &mut BytesMut) -> Vec<Decoded> {
        let mut out = Vec::new();
        while let Some(item) = decoder.decode(buf).unwrap() {
            let end = item == Decoded::End;
            out.push(item);
            if end {
                break;
            }
        }
        out
    }

    #[test]
    fn frame_uses_uppercase_hex() {
        let payload = vec![b'x'; 26];
        let framed = frame(&payload);
        assert!(framed.starts_with(b"1A\r\n"));
        assert!(framed.ends_with(b"\r\n"));
        assert_eq!(framed.len(), 4 + 26 + 2);
    }

    #[test]
    fn request_head_is_chunked_post() {
        let head = request_head("collector.local");
        assert!(head.starts_with("POST /send-metrics HTTP/1.1\r\n"));
        assert!(head.contains("Transfer-Encoding: chunked\r\n"));
        assert!(head.contains("Host: collector.local\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn decodes_messages_then_end() {
        let mut buf = BytesMut::new();
        encode_frame(br#"{"type":"a"}"#, &mut buf);
        encode_frame(br#"{"type":"b"}"#, &mut buf);
        buf.extend_from_slice(TERMINATOR);

        let mut decoder = ChunkDecoder::default();
        let items = decode_all(&mut decoder, &mut buf);
        assert_eq!(
            items,
            vec![
                Decoded::Message(Bytes::from_static(br#"{"type":"a"}"#)),
                Decoded::Message(Bytes::from_static(br#"{"type":"b"}"#)),
                Decoded::End,
            ]
        );
        assert!(decoder.is_done());
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_input_waits_for_more() {
        let framed = frame(b"hello world");
        let mut decoder = ChunkDecoder::default();
        let mut buf = BytesMut::from(&framed[..7]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(!decoder.at_boundary());
        buf.extend_from_slice(&framed[7..]);
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(Decoded::Message(Bytes::from_static(b"hello world")))
        );
        assert!(decoder.at_boundary());
    }

    #[test]
    fn chunk_extensions_and_trailers_ignored() {
        let mut buf = BytesMut::from(&b"3;name=v\r\nabc\r\n0\r\nX-Trailer: 1\r\n\r\n"[..]);
        let mut decoder = ChunkDecoder::default();
        let items = decode_all(&mut decoder, &mut buf);
        assert_eq!(
            items,
            vec![Decoded::Message(Bytes::from_static(b"abc")), Decoded::End]
        );
    }

    #[test]
    fn rejects_bad_size_line() {
        let mut buf = BytesMut::from(&b"zz\r\nabc\r\n"[..]);
        let err = ChunkDecoder::default().decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidChunkSize(_)));
    }

    #[test]
    fn rejects_missing_crlf_after_data() {
        let mut buf = BytesMut::from(&b"3\r\nabcXY"[..]);
        let err = ChunkDecoder::default().decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingChunkTerminator));
    }

    #[test]
    fn rejects_oversized_chunk() {
        let mut buf = BytesMut::from(&b"100\r\n"[..]);
        let err = ChunkDecoder::new(16).decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::ChunkTooLarge { size: 256, limit: 16 }));
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_sequence(
            messages in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..300), 0..20),
            split in 1usize..64,
        ) {
            let mut wire = BytesMut::new();
            for m in &messages {
                encode_frame(m, &mut wire);
            }
            wire.extend_from_slice(TERMINATOR);

            // Feed the wire bytes in arbitrary-sized pieces.
            let mut decoder = ChunkDecoder::default();
            let mut buf = BytesMut::new();
            let mut decoded = Vec::new();
            let mut ended = false;
            for piece in wire.chunks(split) {
                buf.extend_from_slice(piece);
                while let Some(item) = decoder.decode(&mut buf).unwrap() {
                    match item {
                        Decoded::Message(m) => decoded.push(m.to_vec()),
                        Decoded::End => {
                            ended = true;
                            break;
                        }
                    }
                }
            }
            prop_assert!(ended);
            prop_assert_eq!(decoded, messages);
        }
    }
}
