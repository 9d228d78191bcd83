// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! phctl - operator control client for the builder and repo daemons.
//!
//! Deliberately thin compared to a daemon-managing CLI: both daemons are
//! started by a process supervisor, so `phctl` only ever opens one
//! connection per invocation and reports whatever it gets back.

mod client;
mod commands;
mod env;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::{builder, repo};

#[derive(Parser)]
#[command(name = "phctl", version, about = "Operator control client for packhouse")]
struct Cli {
    /// Override the builder daemon's control socket path
    #[arg(long, global = true)]
    builder_socket: Option<PathBuf>,

    /// Override the repo daemon's control socket path
    #[arg(long, global = true)]
    repo_socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the builder daemon
    Builder(builder::BuilderArgs),
    /// Talk to the repo daemon
    Repo(repo::RepoArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Builder(args) => {
            let state_dir = match cli.builder_socket.as_ref().and_then(|p| p.parent().map(PathBuf::from)) {
                Some(dir) => Some(dir),
                None => env::builder_state_dir(),
            };
            let socket_path = cli
                .builder_socket
                .or_else(|| state_dir.as_ref().map(|d| d.join("builderd.sock")));
            let token_path = state_dir.as_ref().map(|d| d.join("token"));
            match (socket_path, token_path) {
                (Some(socket), Some(token)) => builder::run(args, &socket, &token).await,
                _ => Err(anyhow::anyhow!("could not determine builder daemon's state directory")),
            }
        }
        Commands::Repo(args) => {
            let state_dir = match cli.repo_socket.as_ref().and_then(|p| p.parent().map(PathBuf::from)) {
                Some(dir) => Some(dir),
                None => env::repo_state_dir(),
            };
            let socket_path = cli.repo_socket.or_else(|| state_dir.as_ref().map(|d| d.join("repod.sock")));
            let token_path = state_dir.as_ref().map(|d| d.join("token"));
            match (socket_path, token_path) {
                (Some(socket), Some(token)) => repo::run(args, &socket, &token).await,
                _ => Err(anyhow::anyhow!("could not determine repo daemon's state directory")),
            }
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
