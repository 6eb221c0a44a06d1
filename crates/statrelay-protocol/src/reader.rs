//! Async adapter that pulls decoded messages off a byte stream.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{ChunkDecoder, Decoded};

const READ_CHUNK: usize = 8 * 1024;

/// Reads chunk-framed messages from `R`.
///
/// `buf` may be pre-seeded with bytes that were read past the request head.
pub struct ChunkReader<R> {
    reader: R,
    buf: BytesMut,
    decoder: ChunkDecoder,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(reader: R, decoder: ChunkDecoder) -> Self {
        Self::with_buffer(reader, BytesMut::new(), decoder)
    }

    pub fn with_buffer(reader: R, buf: BytesMut, decoder: ChunkDecoder) -> Self {
        Self {
            reader,
            buf,
            decoder,
        }
    }

    /// Next message, or `None` once the terminal chunk was read.
    ///
    /// A peer that closes the connection between chunks without sending the
    /// terminal chunk is treated as a clean end; closing mid-chunk is an
    /// error.
    pub async fn next_message(&mut self) -> ProtocolResult<Option<Bytes>> {
        loop {
            match self.decoder.decode(&mut self.buf)? {
                Some(Decoded::Message(payload)) => return Ok(Some(payload)),
                Some(Decoded::End) => return Ok(None),
                None => {}
            }

            self.buf.reserve(READ_CHUNK);
            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.decoder.at_boundary() && self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::UnexpectedEof);
            }
        }
    }

    /// True if the stream ended with an explicit terminal chunk.
    pub fn finished_cleanly(&self) -> bool {
        self.decoder.is_done()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
