//! Daemon client for communicating with release-radard.
//!
//! Connects to the daemon's Unix socket and speaks line-delimited JSON-RPC.

use anyhow::Result;
use release_radar_core::{RunReport, SlotStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Response to `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub service: SlotStatus,
    pub user: SlotStatus,
    pub last_run: Option<RunReport>,
}

/// Client for communicating with the Release Radar daemon.
pub struct DaemonClient {
    stream: Option<UnixStream>,
    socket_path: PathBuf,
    next_id: u64,
}

impl DaemonClient {
    /// Attempt to connect to the daemon at the given socket path.
    ///
    /// A missing or refusing socket yields a disconnected client rather than
    /// an error; check [`DaemonClient::is_connected`].
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        debug!("Attempting to connect to daemon at {:?}", socket_path);

        let stream = if !socket_path.exists() {
            debug!("Socket does not exist at {:?}", socket_path);
            None
        } else {
            match UnixStream::connect(socket_path).await {
                Ok(stream) => {
                    debug!("Successfully connected to daemon");
                    Some(stream)
                }
                Err(e) => {
                    warn!("Failed to connect to daemon: {}", e);
                    None
                }
            }
        };

        Ok(Self {
            stream,
            socket_path: socket_path.to_path_buf(),
            next_id: 1,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a JSON-RPC request and receive a response.
    async fn send_request<T: for<'de> Deserialize<'de>>(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Not connected to daemon"))?;

        let id = self.next_id;
        self.next_id += 1;

        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let request_str = serde_json::to_string(&request)?;
        debug!("Sending request: {}", request_str);

        stream.write_all(request_str.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut response_str = String::new();
        reader.read_line(&mut response_str).await?;

        debug!("Received response: {}", response_str.trim());

        let response: serde_json::Value = serde_json::from_str(&response_str)?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            anyhow::bail!("RPC error: {}", message);
        }

        let result = response
            .get("result")
            .ok_or_else(|| anyhow::anyhow!("No result in response"))?;

        Ok(serde_json::from_value(result.clone())?)
    }

    /// Ask the daemon to run the pipeline now and wait for the report.
    pub async fn sync_now(&mut self) -> Result<RunReport> {
        self.send_request("sync_now", json!([])).await
    }

    pub async fn last_run(&mut self) -> Result<Option<RunReport>> {
        self.send_request("last_run", json!([])).await
    }

    pub async fn status(&mut self) -> Result<StatusResponse> {
        self.send_request("status", json!([])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_socket_gives_disconnected_client() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("absent.sock");

        let mut client = DaemonClient::connect(&socket).await.unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.socket_path(), socket.as_path());

        let err = client.status().await.unwrap_err();
        assert!(err.to_string().contains("Not connected"));
    }

    #[test]
    fn status_response_parses_daemon_json() {
        let raw = json!({
            "running": false,
            "service": {
                "scope": "service",
                "has_access_token": true,
                "expires_at": null,
                "has_refresh_token": false,
                "usable": true
            },
            "user": {
                "scope": "user",
                "has_access_token": false,
                "expires_at": null,
                "has_refresh_token": true,
                "usable": false
            },
            "last_run": null
        });

        let status: StatusResponse = serde_json::from_value(raw).unwrap();
        assert!(status.service.usable);
        assert!(status.user.has_refresh_token);
        assert!(status.last_run.is_none());
    }
}
