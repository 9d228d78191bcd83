// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `phctl repo ...` — the repo daemon's operator surface. The upload
//! handshake (`push_start`/`push_add_time`/`push_done`/`push_fail`) is
//! internal to `UploadClient` and is not exposed here.

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use packhouse_protocol::{RepoRequest, RepoResponse};

use crate::client;

#[derive(Args)]
pub struct RepoArgs {
    #[command(subcommand)]
    pub command: RepoCommand,
}

#[derive(Subcommand)]
pub enum RepoCommand {
    /// Evict superseded versions from the archive tree
    Clean,
    /// Reconcile the served tree against what's on disk
    Regenerate {
        /// Restrict to these architectures (default: all configured)
        #[arg(long = "arch")]
        archs: Vec<String>,
    },
    /// Remove named packages from the served tree
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long = "arch")]
        archs: Vec<String>,
    },
    /// Integrate staged artifacts from the updates directory
    Update {
        #[arg(long)]
        overwrite: bool,
    },
}

pub async fn run(args: RepoArgs, socket_path: &Path, token_path: &Path) -> Result<()> {
    let request = match args.command {
        RepoCommand::Clean => RepoRequest::Clean,
        RepoCommand::Regenerate { archs } => RepoRequest::Regenerate { archs: none_if_empty(archs) },
        RepoCommand::Remove { names, archs } => RepoRequest::Remove {
            names,
            archs: none_if_empty(archs),
        },
        RepoCommand::Update { overwrite } => RepoRequest::Update { overwrite },
    };

    let response: RepoResponse = client::call(socket_path, token_path, request).await?;
    print_response(response);
    Ok(())
}

fn none_if_empty(v: Vec<String>) -> Option<Vec<String>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn print_response(response: RepoResponse) {
    match response {
        RepoResponse::Ok { detail } => println!("ok{}", detail.map(|d| format!(": {d}")).unwrap_or_default()),
        RepoResponse::Bool { value } => println!("{value}"),
        RepoResponse::PushStart { .. } | RepoResponse::PushDone { .. } => {
            println!("unexpected response to an operator command")
        }
        RepoResponse::Unknown => println!("unknown request or unauthorized"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_arch_list_becomes_none() {
        assert_eq!(none_if_empty(vec![]), None);
    }

    #[test]
    fn nonempty_arch_list_is_preserved() {
        assert_eq!(none_if_empty(vec!["x86_64".to_string()]), Some(vec!["x86_64".to_string()]));
    }
}
