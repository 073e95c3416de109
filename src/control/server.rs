// src/control/server.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::control::protocol::{ControlRequest, ControlResponse};
use crate::manager::Manager;

/// Running control socket server. Dropping it stops accepting connections
/// and removes the socket file.
#[derive(Debug)]
pub struct ControlServer {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl ControlServer {
    /// Bind `path` and serve requests against `manager`.
    ///
    /// A leftover socket file from a previous daemon is removed; a socket
    /// that still accepts connections means another daemon is running.
    pub async fn bind(path: impl Into<PathBuf>, manager: Arc<Manager>) -> Result<Self> {
        let path = path.into();
        remove_stale_socket(&path).await?;

        let listener = UnixListener::bind(&path)
            .with_context(|| format!("binding control socket at {:?}", path))?;

        let task = tokio::spawn(accept_loop(listener, manager));
        Ok(Self { path, task })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.task.abort();
        if let Err(err) = std::fs::remove_file(&self.path) {
            debug!(socket = ?self.path, error = %err, "could not remove control socket");
        }
    }
}

async fn remove_stale_socket(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if UnixStream::connect(path).await.is_ok() {
        bail!("another procwatch daemon is already listening on {:?}", path);
    }
    debug!(socket = ?path, "removing stale control socket");
    std::fs::remove_file(path).with_context(|| format!("removing stale socket {:?}", path))
}

async fn accept_loop(listener: UnixListener, manager: Arc<Manager>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, manager).await {
                        warn!(error = %format!("{err:#}"), "control connection failed");
                    }
                });
            }
            Err(err) => {
                warn!(error = %err, "failed to accept control connection");
            }
        }
    }
}

/// One request per connection.
async fn serve_connection(stream: UnixStream, manager: Arc<Manager>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("reading control request")?;

    let response = match ControlRequest::parse(&line) {
        Ok(request) => {
            debug!(%request, "control request received");
            manager.handle_request(&request).await
        }
        Err(err) => ControlResponse::usage(err),
    };

    write_half
        .write_all(response.encode().as_bytes())
        .await
        .context("writing control response")?;
    write_half.shutdown().await.context("closing control connection")?;
    Ok(())
}
