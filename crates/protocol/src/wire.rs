// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON wire framing shared by both control servers.
//!
//! Wire format: 4-byte big-endian length prefix + JSON payload, generic
//! over any `Serialize`/`DeserializeOwned` payload since the builder and
//! the repo daemon each define their own request/response enums.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Wraps a request with the shared-secret auth token every call carries
/// alongside its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub token: String,
    pub request: T,
}

impl<T> Envelope<T> {
    pub fn new(token: impl Into<String>, request: T) -> Self {
        Self {
            token: token.into(),
            request,
        }
    }
}

/// Errors from framing or transporting a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout waiting for message")]
    Timeout,
}

/// Maximum message size: artifact transfers ride a separate file-transfer
/// command, so the control channel only ever carries small JSON.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request with a timeout, decoding it as `T`.
pub async fn read_request<T, R>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: tokio::io::AsyncReadExt + Unpin,
{
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Write a response with a timeout, encoding it from `T`.
pub async fn write_response<T, W>(
    writer: &mut W,
    response: &T,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError>
where
    T: Serialize,
    W: tokio::io::AsyncWriteExt + Unpin,
{
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Write a request with a timeout, encoding it from `T`. The client-side
/// counterpart to `write_response`.
pub async fn write_request<T, W>(
    writer: &mut W,
    request: &T,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError>
where
    T: Serialize,
    W: tokio::io::AsyncWriteExt + Unpin,
{
    let data = encode(request)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Read a response with a timeout, decoding it as `T`. The client-side
/// counterpart to `read_request`.
pub async fn read_response<T, R>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: tokio::io::AsyncReadExt + Unpin,
{
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_framing() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"hello").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let got = read_message(&mut cursor).await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn rejects_oversized_message() {
        let big = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let mut buf = Vec::new();
        let err = write_message(&mut buf, &big).await.unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
    }
}
