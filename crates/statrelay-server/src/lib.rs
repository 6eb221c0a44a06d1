//! statrelay-server — the collector endpoint.
//!
//! One TCP port serves both directions of the pipeline:
//!
//! | Method | Path | Handled by |
//! |---|---|---|
//! | POST | `/send-metrics` | [`ingest`]: chunk-per-message stream decoded in place |
//! | GET | `/metrics` | [`routes`]: Prometheus exposition via axum |
//! | GET | `/ping` | [`routes`] |
//!
//! The exposition always starts with the collector's own metrics
//! (`collector_working`, `collector_rss`, message and session counters),
//! followed by whatever the [`Collector`](statrelay_collector::Collector)
//! renders within the configured timeout.

pub mod config;
pub mod ingest;
pub mod io;
pub mod routes;
pub mod self_metrics;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use routes::build_router;
pub use self_metrics::SelfMetrics;
pub use server::MetricsServer;
pub use state::{ServerState, SharedState};
