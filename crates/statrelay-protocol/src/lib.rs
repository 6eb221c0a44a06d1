//! statrelay-protocol — the producer → collector wire protocol.
//!
//! A producer opens one long-lived `POST /send-metrics` request with
//! `Transfer-Encoding: chunked` and writes each JSON message as exactly one
//! chunk. Chunk boundaries are therefore message boundaries, and the stream
//! needs no other length negotiation.
//!
//! # Components
//!
//! - **`frame`** — chunk encoding and the incremental [`ChunkDecoder`]
//! - **`reader`** — [`ChunkReader`], async message pull over any `AsyncRead`
//! - **`head`** — request-line/header parsing used to route connections
//! - **`message`** — [`MetricMessage`], the ad-hoc metric observation

pub mod error;
pub mod frame;
pub mod head;
pub mod message;
pub mod reader;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    encode_frame, frame, request_head, ChunkDecoder, Decoded, DEFAULT_MAX_MESSAGE_SIZE,
    SEND_METRICS_PATH, TERMINATOR,
};
pub use head::RequestHead;
pub use message::{Action, MetricMessage, MetricOptions};
pub use reader::ChunkReader;
