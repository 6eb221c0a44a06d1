//! statrelay-client — the producer side of the metrics pipeline.
//!
//! Application code calls [`Client::send`] (or a [`RemoteMetric`] handle)
//! from any thread. Messages are framed immediately and queued; a single
//! background worker holds one long-lived chunked `POST /send-metrics`
//! connection to the collector and writes frames in arrival order.
//!
//! Delivery is best-effort. When the collector is unreachable or the queue
//! overflows, messages are lost with a warning; the caller is never
//! blocked or failed.

pub mod client;
pub mod config;
pub mod error;
pub mod remote;
mod worker;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use remote::RemoteMetric;
