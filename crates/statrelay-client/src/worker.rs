//! The background delivery worker.
//!
//! One OS thread per client runs a single-threaded tokio runtime. Each pass
//! retires a stale connection, then drains the queue over the open
//! connection (connecting lazily), then sleeps for `worker_sleep` or until
//! stopped. A failed write discards the connection and the message being
//! written; queued messages wait for the next pass.

use std::collections::VecDeque;
use std::process;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use statrelay_protocol::{request_head, TERMINATOR};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// State shared between the client handles and the worker thread.
pub(crate) struct Shared {
    pub config: ClientConfig,
    pub queue: Mutex<VecDeque<Bytes>>,
}

pub(crate) struct WorkerHandle {
    thread: JoinHandle<()>,
    pid: u32,
    stop: watch::Sender<bool>,
}

impl WorkerHandle {
    pub fn spawn(shared: Arc<Shared>) -> ClientResult<Self> {
        let (stop, stop_rx) = watch::channel(false);
        let thread = std::thread::Builder::new()
            .name("statrelay-client".into())
            .spawn(move || run_thread(shared, stop_rx))
            .map_err(ClientError::WorkerSpawn)?;
        Ok(Self {
            thread,
            pid: process::id(),
            stop,
        })
    }

    /// False once the thread has exited, or in a forked child where the
    /// thread does not exist. This is the fork guard: a child sees a dead
    /// worker, so the next enqueue spawns a fresh one with its own
    /// connection and never touches the parent's stream.
    pub fn is_alive(&self) -> bool {
        self.pid == process::id() && !self.thread.is_finished()
    }

    pub fn signal_stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stop the worker and wait up to `grace` for its final drain. A worker
    /// still blocked on the network after that is detached.
    pub fn stop(self, grace: Duration) {
        self.signal_stop();
        if self.pid != process::id() {
            return;
        }
        let deadline = Instant::now() + grace;
        while !self.thread.is_finished() {
            if Instant::now() >= deadline {
                warn!("delivery worker did not stop in time, detaching");
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        if self.thread.join().is_err() {
            error!("delivery worker panicked");
        }
    }
}

fn run_thread(shared: Arc<Shared>, stop: watch::Receiver<bool>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start delivery runtime");
            return;
        }
    };
    runtime.block_on(deliver_loop(shared, stop));
}

async fn deliver_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let config = &shared.config;
    debug!(addr = %config.addr(), "delivery worker started");

    let mut conn: Option<Connection> = None;
    loop {
        conn = retire_stale(conn, config.max_connection_age).await;

        if let Err(err) = drain(&shared, &mut conn).await {
            warn!(
                error = %err,
                queued = shared.queue.lock().len(),
                "failed to deliver metrics"
            );
        }

        if *stop.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(config.worker_sleep) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(conn) = conn {
        conn.finish().await;
    }
    debug!("delivery worker stopped");
}

async fn retire_stale(conn: Option<Connection>, max_age: Duration) -> Option<Connection> {
    let conn = conn?;
    if conn.opened_at.elapsed() > max_age {
        debug!("recycling collector connection");
        conn.finish().await;
        return None;
    }
    Some(conn)
}

/// Write queued frames until the queue is empty or a write fails.
async fn drain(shared: &Shared, conn: &mut Option<Connection>) -> ClientResult<()> {
    loop {
        if shared.queue.lock().is_empty() {
            return Ok(());
        }
        let mut active = match conn.take() {
            Some(active) => active,
            None => Connection::open(&shared.config).await?,
        };
        let frame = shared.queue.lock().pop_front();
        let Some(frame) = frame else {
            *conn = Some(active);
            return Ok(());
        };
        active
            .stream
            .write_all(&frame)
            .await
            .map_err(ClientError::Write)?;
        *conn = Some(active);
    }
}

struct Connection {
    stream: TcpStream,
    opened_at: Instant,
}

impl Connection {
    async fn open(config: &ClientConfig) -> ClientResult<Self> {
        let addr = config.addr();
        let connect_err = |source| ClientError::Connect {
            addr: addr.clone(),
            source,
        };

        let mut stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| connect_err(std::io::ErrorKind::TimedOut.into()))?
        .map_err(connect_err)?;
        stream.set_nodelay(true).map_err(connect_err)?;
        stream
            .write_all(request_head(&config.host).as_bytes())
            .await
            .map_err(ClientError::Write)?;

        debug!(%addr, "connected to collector");
        Ok(Self {
            stream,
            opened_at: Instant::now(),
        })
    }

    /// End the chunked body and close. Errors are only logged.
    async fn finish(mut self) {
        if let Err(err) = self.stream.write_all(TERMINATOR).await {
            debug!(error = %err, "failed to terminate collector stream");
            return;
        }
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Arc<Shared> {
        Arc::new(Shared {
            config: ClientConfig::default(),
            queue: Mutex::new(VecDeque::new()),
        })
    }

    #[test]
    fn worker_alive_until_stopped() {
        let handle = WorkerHandle::spawn(shared()).unwrap();
        assert!(handle.is_alive());
        handle.stop(Duration::from_secs(5));
    }

    #[test]
    fn worker_from_another_pid_is_not_alive() {
        let mut handle = WorkerHandle::spawn(shared()).unwrap();
        handle.pid = process::id().wrapping_add(1);
        assert!(!handle.is_alive());
        handle.signal_stop();
    }
}
