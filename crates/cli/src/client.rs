// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin one-shot client for the builder and repo daemons' control
//! sockets. Unlike the original daemon client this does not auto-start or
//! restart the target daemon on version mismatch: both daemons are
//! expected to be started by a process supervisor, so a connection
//! failure here is simply reported to the operator.

use std::path::{Path, PathBuf};

use packhouse_protocol::{AuthToken, Envelope, ProtocolError, DEFAULT_TIMEOUT};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read auth token at {path}: {source}")]
    Token {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Connect to `socket_path`, send one request with the token loaded from
/// `token_path`, and return the decoded response.
pub async fn call<Req, Resp>(socket_path: &Path, token_path: &Path, request: Req) -> Result<Resp, ClientError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let token = AuthToken::load(token_path).map_err(|source| ClientError::Token {
        path: token_path.to_path_buf(),
        source,
    })?;

    let mut stream = UnixStream::connect(socket_path).await.map_err(|source| ClientError::Connect {
        path: socket_path.to_path_buf(),
        source,
    })?;

    let envelope = Envelope {
        token: token.as_str().to_string(),
        request,
    };
    packhouse_protocol::write_request(&mut stream, &envelope, DEFAULT_TIMEOUT).await?;
    let response: Resp = packhouse_protocol::read_response(&mut stream, DEFAULT_TIMEOUT).await?;
    Ok(response)
}
