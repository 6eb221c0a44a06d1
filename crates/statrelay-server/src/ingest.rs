//! The `POST /send-metrics` ingestion path.
//!
//! hyper hands request bodies over in arbitrary pieces, but the wire
//! protocol needs chunk boundaries intact (one chunk is one message). So
//! ingestion connections bypass the router and are decoded here directly
//! with [`ChunkReader`]. Each decoded message goes to the collector in
//! arrival order; a bad message is counted and logged, and the rest of the
//! stream is still processed.

use std::net::SocketAddr;

use bytes::BytesMut;
use statrelay_protocol::{ChunkDecoder, ChunkReader, ProtocolError, RequestHead};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::state::ServerState;

/// What happened on one ingestion connection.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub messages: u64,
    pub bad_messages: u64,
    /// Status and description of the first message that failed.
    pub first_failure: Option<(u16, String)>,
    /// The stream could not be decoded past this point.
    pub framing_error: Option<ProtocolError>,
}

impl IngestOutcome {
    /// Status code and body of the final response.
    pub fn response(&self) -> (u16, String) {
        if let Some(err) = &self.framing_error {
            return (400, format!("Bad Request: {err}"));
        }
        match &self.first_failure {
            Some((status, reason)) => (*status, format!("Bad Metrics {reason}")),
            None => (200, "OK".to_string()),
        }
    }

    async fn process(&mut self, state: &ServerState, peer: SocketAddr, message: &[u8]) {
        self.messages += 1;
        state.stats.record_metric();
        if let Err(err) = state.collector.process(message).await {
            self.bad_messages += 1;
            state.stats.record_bad_metric();
            warn!(%peer, error = %err, "failed to process metric");
            if self.first_failure.is_none() {
                self.first_failure = Some((err.status_code(), err.to_string()));
            }
        }
    }
}

/// Consume an ingestion request whose head has been parsed, then write the
/// response and close.
///
/// `buffered` holds whatever was read past the head. A chunked body is
/// decoded message by message; a body with only `Content-Length` is one
/// message.
pub async fn serve_ingest<S>(
    state: &ServerState,
    head: &RequestHead,
    buffered: BytesMut,
    stream: S,
    peer: SocketAddr,
) -> std::io::Result<IngestOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    state.stats.record_session();
    let mut outcome = IngestOutcome::default();

    let mut stream = if head.is_chunked() {
        let decoder = ChunkDecoder::new(state.max_message_size);
        let mut reader = ChunkReader::with_buffer(stream, buffered, decoder);
        loop {
            match reader.next_message().await {
                Ok(Some(message)) => outcome.process(state, peer, &message).await,
                Ok(None) => break,
                Err(err) => {
                    warn!(%peer, error = %err, "dropping malformed metric stream");
                    outcome.framing_error = Some(err);
                    break;
                }
            }
        }
        reader.into_inner()
    } else {
        let mut stream = stream;
        match head.content_length() {
            Some(len) if len > state.max_message_size => {
                outcome.framing_error = Some(ProtocolError::ChunkTooLarge {
                    size: len,
                    limit: state.max_message_size,
                });
            }
            Some(len) => match read_body(&mut stream, buffered, len).await {
                Ok(body) => outcome.process(state, peer, &body).await,
                Err(err) => outcome.framing_error = Some(err),
            },
            None => {}
        }
        stream
    };

    debug!(
        %peer,
        messages = outcome.messages,
        bad = outcome.bad_messages,
        "metric session finished"
    );

    let (status, body) = outcome.response();
    write_response(&mut stream, status, &body).await?;
    let _ = stream.shutdown().await;
    Ok(outcome)
}

async fn read_body<S: AsyncRead + Unpin>(
    stream: &mut S,
    mut body: BytesMut,
    len: usize,
) -> Result<BytesMut, ProtocolError> {
    while body.len() < len {
        body.reserve(len - body.len());
        if stream.read_buf(&mut body).await? == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }
    }
    body.truncate(len);
    Ok(body)
}

pub(crate) async fn write_response<W: AsyncWrite + Unpin>(
    stream: &mut W,
    status: u16,
    body: &str,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bytes::BytesMut;
    use statrelay_collector::Collector;
    use statrelay_protocol::{encode_frame, request_head, TERMINATOR};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use crate::config::ServerConfig;

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn state() -> ServerState {
        ServerState::new(&ServerConfig::default(), Arc::new(Collector::new()))
    }

    /// Run one ingestion request through an in-memory pipe and return the
    /// outcome and the raw response.
    async fn ingest(state: &ServerState, request: Vec<u8>) -> (IngestOutcome, String) {
        let (head, head_len) = RequestHead::parse(&request).unwrap().unwrap();
        let buffered = BytesMut::from(&request[head_len..]);

        let (server_io, mut client_io) = duplex(64 * 1024);
        client_io.shutdown().await.unwrap();
        let outcome = serve_ingest(state, &head, buffered, server_io, peer())
            .await
            .unwrap();

        let mut response = String::new();
        client_io.read_to_string(&mut response).await.unwrap();
        (outcome, response)
    }

    fn chunked(messages: &[&str]) -> Vec<u8> {
        let mut buf = BytesMut::from(request_head("localhost").as_bytes());
        for m in messages {
            encode_frame(m.as_bytes(), &mut buf);
        }
        buf.extend_from_slice(TERMINATOR);
        buf.to_vec()
    }

    #[tokio::test]
    async fn every_message_is_processed() {
        let state = state();
        let (outcome, response) = ingest(
            &state,
            chunked(&[
                r#"{"type":"counter","name":"a_total","help":"a","value":1}"#,
                r#"{"type":"counter","name":"a_total","help":"a","value":2}"#,
            ]),
        )
        .await;

        assert_eq!(outcome.messages, 2);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("\r\n\r\nOK"));
        assert_eq!(state.stats.sessions_total(), 1);
        assert_eq!(state.stats.metrics_total(), 2);

        let text = state.render_metrics().await;
        assert!(text.contains("a_total 3\n"));
    }

    #[tokio::test]
    async fn bad_message_does_not_stop_the_stream() {
        let state = state();
        let (outcome, response) = ingest(
            &state,
            chunked(&[
                r#"{"type":"gauge","name":"g","help":"g","value":1}"#,
                "not json",
                r#"{"type":"gauge","name":"g","help":"g","value":7}"#,
            ]),
        )
        .await;

        assert_eq!(outcome.messages, 3);
        assert_eq!(outcome.bad_messages, 1);
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Bad Metrics"));
        assert_eq!(state.stats.bad_metrics_total(), 1);
        assert!(state.render_metrics().await.contains("\ng 7\n"));
    }

    #[tokio::test]
    async fn broken_framing_is_rejected() {
        let state = state();
        let mut request = request_head("localhost").into_bytes();
        request.extend_from_slice(b"zz\r\nabc\r\n");
        let (outcome, response) = ingest(&state, request).await;
        assert!(matches!(
            outcome.framing_error,
            Some(ProtocolError::InvalidChunkSize(_))
        ));
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn content_length_body_is_one_message() {
        let state = state();
        let body = r#"{"type":"gauge","name":"temp","help":"t","value":21.5}"#;
        let request = format!(
            "POST /send-metrics HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let (outcome, response) = ingest(&state, request.into_bytes()).await;
        assert_eq!(outcome.messages, 1);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(state.render_metrics().await.contains("temp 21.5\n"));
    }

    #[tokio::test]
    async fn truncated_content_length_body_is_rejected() {
        let state = state();
        let request = b"POST /send-metrics HTTP/1.1\r\nContent-Length: 50\r\n\r\n{\"type\"".to_vec();
        let (outcome, _) = ingest(&state, request).await;
        assert!(matches!(outcome.framing_error, Some(ProtocolError::UnexpectedEof)));
        assert_eq!(outcome.messages, 0);
    }
}
