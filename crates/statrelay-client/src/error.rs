use std::io;

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to collector at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to collector: {0}")]
    Write(#[source] io::Error),

    #[error("failed to serialize metric message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to spawn delivery worker: {0}")]
    WorkerSpawn(#[source] io::Error),
}
