// src/control/client.rs

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::control::protocol::{ControlRequest, ControlResponse};

/// Send one request to the daemon listening on `socket` and wait for the
/// complete response.
pub async fn send_request(socket: &Path, request: &ControlRequest) -> Result<ControlResponse> {
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("connecting to control socket {:?}", socket))?;

    stream
        .write_all(format!("{request}\n").as_bytes())
        .await
        .context("sending control request")?;

    let mut text = String::new();
    stream
        .read_to_string(&mut text)
        .await
        .context("reading control response")?;

    ControlResponse::decode(&text).map_err(anyhow::Error::msg)
}
