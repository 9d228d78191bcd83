// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The builder's `ControlServer`: accepts connections on the control
//! socket, authenticates, and forwards each request into the single build
//! loop over an `mpsc` channel.

use packhouse_protocol::{AuthToken, BuilderRequest, BuilderResponse, Envelope};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};

use crate::command::Command;

pub struct ControlServer {
    listener: UnixListener,
    token: AuthToken,
    commands: mpsc::Sender<Command>,
}

impl ControlServer {
    pub fn new(listener: UnixListener, token: AuthToken, commands: mpsc::Sender<Command>) -> Self {
        Self { listener, token, commands }
    }

    /// Accept connections forever. A connection-level error is logged and
    /// the server loops to accept the next one — it never exits on its
    /// own.
    pub async fn run(self) {
        loop {
            let (stream, _addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(%err, "control socket accept failed");
                    continue;
                }
            };
            let token = self.token.clone();
            let commands = self.commands.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, &token, &commands).await {
                    tracing::warn!(%err, "control connection ended with an error");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: tokio::net::UnixStream,
    token: &AuthToken,
    commands: &mpsc::Sender<Command>,
) -> Result<(), packhouse_protocol::ProtocolError> {
    let envelope: Envelope<BuilderRequest> =
        packhouse_protocol::read_request(&mut stream, packhouse_protocol::DEFAULT_TIMEOUT).await?;

    if !token.matches(&envelope.token) {
        tracing::warn!("rejected control connection with invalid token");
        return packhouse_protocol::write_response(
            &mut stream,
            &BuilderResponse::Unknown,
            packhouse_protocol::DEFAULT_TIMEOUT,
        )
        .await;
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    let command = Command::from_request(envelope.request, reply_tx);
    if commands.send(command).await.is_err() {
        tracing::error!("build loop command channel closed");
        return packhouse_protocol::write_response(
            &mut stream,
            &BuilderResponse::Unknown,
            packhouse_protocol::DEFAULT_TIMEOUT,
        )
        .await;
    }

    let response = reply_rx.await.unwrap_or(BuilderResponse::Unknown);
    packhouse_protocol::write_response(&mut stream, &response, packhouse_protocol::DEFAULT_TIMEOUT).await
}
