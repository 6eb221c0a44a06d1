//! TCP accept loop and per-connection routing.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use bytes::BytesMut;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use statrelay_collector::Collector;
use statrelay_protocol::{RequestHead, SEND_METRICS_PATH};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::ingest::{serve_ingest, write_response};
use crate::io::PrefixedIo;
use crate::routes::build_router;
use crate::state::{ServerState, SharedState};

/// The collector endpoint: chunked ingestion plus the scrape surface on a
/// single port.
pub struct MetricsServer {
    listener: TcpListener,
    state: SharedState,
    router: Router,
}

impl MetricsServer {
    pub async fn bind(config: &ServerConfig, collector: Arc<Collector>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((config.bind.as_str(), config.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", config.bind, config.port))?;
        let state = Arc::new(ServerState::new(config, collector));
        Ok(Self {
            router: build_router(state.clone()),
            listener,
            state,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Accept connections until the shutdown signal fires. Each connection
    /// runs on its own task.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "metrics collector listening");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    let (stream, peer) = match accept_result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let state = self.state.clone();
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        handle_connection(state, router, stream, peer).await;
                    });
                }
                _ = shutdown.changed() => {
                    info!("metrics collector shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Read the request head, then either decode an ingestion stream natively
/// or replay the bytes into hyper for the router.
async fn handle_connection(
    state: SharedState,
    router: Router,
    mut stream: TcpStream,
    peer: SocketAddr,
) {
    let mut buf = BytesMut::with_capacity(4096);
    let (head, head_len) = loop {
        match RequestHead::parse(&buf) {
            Ok(Some(parsed)) => break parsed,
            Ok(None) => {}
            Err(err) => {
                warn!(%peer, error = %err, "rejecting malformed request");
                let _ = write_response(&mut stream, 400, "Bad Request").await;
                return;
            }
        }
        match stream.read_buf(&mut buf).await {
            Ok(0) => {
                if !buf.is_empty() {
                    debug!(%peer, "connection closed before request head completed");
                }
                return;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(%peer, error = %err, "read failed");
                return;
            }
        }
    };

    if head.method.eq_ignore_ascii_case("POST") && head.path == SEND_METRICS_PATH {
        let body = buf.split_off(head_len);
        if let Err(err) = serve_ingest(&state, &head, body, stream, peer).await {
            debug!(%peer, error = %err, "failed to send ingestion response");
        }
        return;
    }

    let io = TokioIo::new(PrefixedIo::new(buf, stream));
    let service = TowerToHyperService::new(router);
    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        error!(%peer, error = %e, "connection error");
    }
}
