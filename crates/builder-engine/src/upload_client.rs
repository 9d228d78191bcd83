// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client side of the three-phase upload handshake with the repo daemon.
//! Opens a short-lived Unix socket connection per RPC call; see
//! `packhouse-repo-engine::reservation` for the daemon side of the
//! handshake.

use std::path::{Path, PathBuf};
use std::time::Duration;

use packhouse_adapters::FileTransfer;
use packhouse_protocol::{Envelope, PushStartResult, RepoRequest, RepoResponse};
use thiserror::Error;
use tokio::net::UnixStream;

const BUSY_BACKOFF: Duration = Duration::from_secs(60);
const MAX_BUSY_RETRIES: u32 = 10;
const MAX_TRANSPORT_RETRIES: u32 = 5;
const MIN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Protocol(#[from] packhouse_protocol::ProtocolError),
    #[error(transparent)]
    Transfer(#[from] packhouse_adapters::TransferError),
    #[error("repo daemon stayed busy after {0} attempts")]
    StillBusy(u32),
    #[error("transport to the repo daemon failed after {0} attempts: {1}")]
    TransportExhausted(u32, String),
    #[error("repo daemon rejected the upload: {0}")]
    Rejected(String),
    #[error("repo daemon gave an unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

/// One file this client needs to ship: its local path and the name the
/// repo daemon should know it by.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub local_path: PathBuf,
    pub remote_name: String,
}

#[derive(Debug, Clone)]
pub struct UploadClientConfig {
    pub socket_path: PathBuf,
    pub token: String,
    /// Uplink bandwidth, used in the same per-file timeout formula the
    /// repo daemon applies to its own reservation deadline.
    pub bandwidth_mbps: f64,
    pub rpc_timeout: Duration,
    /// Destination spec passed to the transfer command, e.g.
    /// `repo-host:/srv/packhouse/updates/`.
    pub remote_spec: String,
}

pub struct UploadClient {
    config: UploadClientConfig,
    transfer: FileTransfer,
}

/// `max(120, 2 * size_MB / (bandwidth_Mbps / 8))` seconds, matching the
/// repo daemon's own reservation-deadline formula.
pub fn per_file_timeout(size_mb: f64, bandwidth_mbps: f64) -> Duration {
    let computed = 2.0 * size_mb / (bandwidth_mbps / 8.0);
    Duration::from_secs_f64(computed.max(MIN_TIMEOUT.as_secs_f64()))
}

impl UploadClient {
    pub fn new(config: UploadClientConfig) -> Self {
        Self {
            config,
            transfer: FileTransfer::default(),
        }
    }

    async fn call(&self, request: RepoRequest) -> Result<RepoResponse, UploadError> {
        let mut stream = UnixStream::connect(&self.config.socket_path).await?;
        let envelope = Envelope::new(self.config.token.clone(), request);
        packhouse_protocol::write_request(&mut stream, &envelope, self.config.rpc_timeout).await?;
        let response: RepoResponse =
            packhouse_protocol::read_response(&mut stream, self.config.rpc_timeout).await?;
        Ok(response)
    }

    /// Ship every file in `files` to the repo daemon and integrate it,
    /// retrying busy reservations and transient transport failures.
    pub async fn upload(&self, files: &[UploadFile], overwrite: bool) -> Result<(), UploadError> {
        let mut sizes_mb = Vec::with_capacity(files.len());
        for f in files {
            let bytes = std::fs::metadata(&f.local_path).map(|m| m.len()).unwrap_or(0);
            sizes_mb.push(bytes as f64 / 1_000_000.0);
        }

        let timeouts = self.push_start(files, &sizes_mb).await?;

        for (file, timeout_secs) in files.iter().zip(timeouts.iter()) {
            self.transport_one(file, Duration::from_secs_f64(*timeout_secs))
                .await?;
        }

        self.push_done(files, overwrite).await
    }

    async fn push_start(
        &self,
        files: &[UploadFile],
        sizes_mb: &[f64],
    ) -> Result<Vec<f64>, UploadError> {
        let filenames: Vec<String> = files.iter().map(|f| f.remote_name.clone()).collect();
        let sizes: Vec<u64> = sizes_mb.iter().map(|mb| *mb as u64).collect();

        for attempt in 1..=MAX_BUSY_RETRIES {
            let response = self
                .call(RepoRequest::PushStart {
                    filenames: filenames.clone(),
                    sizes: sizes.clone(),
                })
                .await?;
            match response {
                RepoResponse::PushStart {
                    result: PushStartResult::Timeouts(timeouts),
                } => return Ok(timeouts),
                RepoResponse::PushStart {
                    result: PushStartResult::Busy(_),
                } => {
                    tracing::info!(attempt, "repo daemon busy, backing off");
                    tokio::time::sleep(BUSY_BACKOFF).await;
                }
                _ => return Err(UploadError::UnexpectedReply("push_start")),
            }
        }
        Err(UploadError::StillBusy(MAX_BUSY_RETRIES))
    }

    async fn transport_one(&self, file: &UploadFile, timeout: Duration) -> Result<(), UploadError> {
        let mut current_timeout = timeout;
        for attempt in 1..=MAX_TRANSPORT_RETRIES {
            let result = self
                .transfer
                .send(&file.local_path, &self.config.remote_spec, current_timeout)
                .await;
            match result {
                Ok(()) => return Ok(()),
                Err(err) if attempt < MAX_TRANSPORT_RETRIES => {
                    tracing::warn!(file = %file.remote_name, attempt, %err, "upload attempt failed, extending reservation");
                    let extra = (60 * attempt) as f64;
                    let _ = self
                        .call(RepoRequest::PushAddTime {
                            name: file.remote_name.clone(),
                            extra,
                        })
                        .await;
                    current_timeout += Duration::from_secs_f64(extra);
                    tokio::time::sleep(Duration::from_secs(60 * attempt as u64)).await;
                }
                Err(err) => {
                    let _ = self
                        .call(RepoRequest::PushFail {
                            name: file.remote_name.clone(),
                        })
                        .await;
                    return Err(UploadError::TransportExhausted(
                        MAX_TRANSPORT_RETRIES,
                        err.to_string(),
                    ));
                }
            }
        }
        unreachable!("loop always returns within its bounds")
    }

    async fn push_done(&self, files: &[UploadFile], overwrite: bool) -> Result<(), UploadError> {
        let filenames: Vec<String> = files.iter().map(|f| f.remote_name.clone()).collect();
        for attempt in 1..=MAX_TRANSPORT_RETRIES {
            match self
                .call(RepoRequest::PushDone {
                    filenames: filenames.clone(),
                    overwrite,
                })
                .await
            {
                Ok(RepoResponse::PushDone { error: None }) => return Ok(()),
                Ok(RepoResponse::PushDone { error: Some(msg) }) => {
                    return Err(UploadError::Rejected(msg))
                }
                Ok(_) => return Err(UploadError::UnexpectedReply("push_done")),
                Err(_) if attempt < MAX_TRANSPORT_RETRIES => {
                    tokio::time::sleep(Duration::from_secs(60 * attempt as u64)).await;
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("loop always returns within its bounds")
    }
}

pub fn remote_name_for(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_file_timeout_floors_at_120_seconds() {
        assert_eq!(per_file_timeout(1.0, 100.0), Duration::from_secs(120));
    }

    #[test]
    fn per_file_timeout_scales_with_size_above_the_floor() {
        // 2 * 10000 / (100/8) = 1600s, comfortably above the 120s floor.
        let got = per_file_timeout(10_000.0, 100.0);
        assert_eq!(got, Duration::from_secs(1600));
    }
}
