// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `phctl builder ...` — the builder daemon's operator surface.

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use packhouse_protocol::{BuilderRequest, BuilderResponse};

use crate::client;

#[derive(Args)]
pub struct BuilderArgs {
    #[command(subcommand)]
    pub command: BuilderCommand,
}

#[derive(Subcommand)]
pub enum BuilderCommand {
    /// Show queue/ledger status
    Info {
        /// Print a human-readable summary instead of JSON
        #[arg(long)]
        human: bool,
    },
    /// Force an immediate update-check and build for one recipe
    Rebuild {
        dirname: String,
        /// Discard existing sources/artifacts before building
        #[arg(long)]
        clean: bool,
    },
    /// Mark a recipe for a clean build on its next scheduled run
    Clean { dirname: String },
    /// Mark every recipe for a clean build on its next scheduled run
    CleanAll,
    /// Re-sign and re-upload a recipe's existing artifacts without rebuilding
    ForceUpload {
        dirname: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Run an out-of-cycle scan of every non-quarantined recipe
    Getup,
    /// List quarantined recipes
    ListQuarantine,
    /// Clear a recipe's quarantine failure count
    ClearQuarantine { pkgname: String },
}

pub async fn run(args: BuilderArgs, socket_path: &Path, token_path: &Path) -> Result<()> {
    let request = match args.command {
        BuilderCommand::Info { human } => BuilderRequest::Info { human },
        BuilderCommand::Rebuild { dirname, clean } => BuilderRequest::RebuildPackage { dirname, clean },
        BuilderCommand::Clean { dirname } => BuilderRequest::Clean { dirname },
        BuilderCommand::CleanAll => BuilderRequest::CleanAll,
        BuilderCommand::ForceUpload { dirname, overwrite } => BuilderRequest::ForceUpload { dirname, overwrite },
        BuilderCommand::Getup => BuilderRequest::Getup,
        BuilderCommand::ListQuarantine => BuilderRequest::Extras {
            action: "list".to_string(),
            pkgname: None,
        },
        BuilderCommand::ClearQuarantine { pkgname } => BuilderRequest::Extras {
            action: "clear".to_string(),
            pkgname: Some(pkgname),
        },
    };

    let response: BuilderResponse = client::call(socket_path, token_path, request).await?;
    print_response(response);
    Ok(())
}

fn print_response(response: BuilderResponse) {
    match response {
        BuilderResponse::Info { text } => println!("{text}"),
        BuilderResponse::Ok { detail } => println!("ok{}", detail.map(|d| format!(": {d}")).unwrap_or_default()),
        BuilderResponse::Bool { value } => println!("{value}"),
        BuilderResponse::Unknown => println!("unknown request or unauthorized"),
    }
}
