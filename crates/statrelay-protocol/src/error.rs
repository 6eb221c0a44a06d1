//! Protocol error types.

use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid chunk size line: {0:?}")]
    InvalidChunkSize(String),

    #[error("chunk of {size} bytes exceeds limit of {limit} bytes")]
    ChunkTooLarge { size: usize, limit: usize },

    #[error("chunk data not followed by CRLF")]
    MissingChunkTerminator,

    #[error("malformed request head: {0}")]
    MalformedRequestHead(String),

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("stream ended inside a chunk")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
