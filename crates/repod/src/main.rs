// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! packhouse-repod
//!
//! Owns the single integration loop: admits uploaded artifacts behind a
//! reservation slot, verifies their signatures, and reconciles the served
//! per-architecture trees. Serves an operator control socket.
//!
//! Architecture mirrors `packhouse-builderd`'s split between a listener
//! task (socket I/O) and an engine loop (sequential processing):
//! `ControlServer` is the listener task, the loop in `run` below is the
//! engine loop, and the two communicate over an `mpsc` command channel
//! rather than shared, locked state.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod command;
mod config;
mod env;
mod lifecycle;
mod listener;

use packhouse_adapters::{ExternalVercmp, Gpg};
use packhouse_core::{Arch, Clock, SystemClock};
use packhouse_protocol::{PushStartResult, RepoResponse};
use packhouse_repo_engine::{Integrator, PushStartOutcome, ReservationManager};
use packhouse_storage::RepoLayout;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::command::Command;
use crate::config::Config;
use crate::lifecycle::{LifecycleError, StartupResult};
use crate::listener::ControlServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("packhouse-repod {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("packhouse-repod {}", env!("CARGO_PKG_VERSION"));
                println!("Admits uploaded packages and integrates them into the served repository.");
                println!();
                println!("USAGE:");
                println!("    packhouse-repod");
                println!();
                println!("Configured via <state-dir>/repod.yaml. The daemon should be");
                println!("started by a process supervisor, not invoked interactively.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: packhouse-repod [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let state_dir = env::state_dir()?;
    let config_path = env::config_path_override().unwrap_or_else(|| state_dir.join("repod.yaml"));
    let config = Config::load(&config_path, state_dir)?;

    let _log_guard = setup_logging(&config)?;
    info!("starting repo daemon");

    let startup = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            eprintln!("packhouse-repod is already running (lock held at {})", config.lock_path.display());
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to start repo daemon");
            return Err(e.into());
        }
    };

    run(config, startup).await
}

async fn run(config: Config, startup: StartupResult) -> Result<(), Box<dyn std::error::Error>> {
    let StartupResult { listener, token, lock: _lock } = startup;

    let layout = RepoLayout::new(config.repo_root.clone(), config.package_suffix.clone());
    let gpg = Gpg::new(config.gpg_key_id.clone());
    let repo_tools = packhouse_adapters::RepoTools::new();
    let vercmp = ExternalVercmp::default();
    let clock = SystemClock;
    let mut reservations = ReservationManager::new();

    let (tx, mut rx) = mpsc::channel::<Command>(64);
    let server = ControlServer::new(listener, token, tx);
    tokio::spawn(server.run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "repo daemon ready");

    loop {
        tokio::select! {
            Some(command) = rx.recv() => {
                handle_command(command, &config, &layout, &gpg, &repo_tools, &vercmp, &clock, &mut reservations).await;
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    info!("repo daemon stopped");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    command: Command,
    config: &Config,
    layout: &RepoLayout,
    gpg: &Gpg,
    repo_tools: &packhouse_adapters::RepoTools,
    vercmp: &ExternalVercmp,
    clock: &SystemClock,
    reservations: &mut ReservationManager,
) {
    let integrator = Integrator {
        layout,
        archs: &config.archs,
        cmp: vercmp,
        repo_tools,
        clock,
    };

    match command {
        Command::Clean { reply } => {
            let response = match integrator.clean_archive(config.archive_keep_new).await {
                Ok(moved) => RepoResponse::Ok {
                    detail: Some(format!("archived {} superseded artifact(s)", moved.len())),
                },
                Err(err) => {
                    error!(%err, "clean-archive failed");
                    RepoResponse::Ok { detail: Some(format!("clean failed: {err}")) }
                }
            };
            let _ = reply.send(response);
        }

        Command::Regenerate { archs, reply } => {
            let targets = resolve_archs(archs.as_deref());
            let response = match integrator.regenerate(targets.as_deref()).await {
                Ok(()) => RepoResponse::Ok { detail: None },
                Err(err) => {
                    error!(%err, "regenerate failed");
                    RepoResponse::Ok { detail: Some(format!("regenerate failed: {err}")) }
                }
            };
            let _ = reply.send(response);
        }

        Command::Remove { names, archs, reply } => {
            let targets = resolve_archs(archs.as_deref());
            let response = match integrator.remove(&names, targets.as_deref()).await {
                Ok(()) => RepoResponse::Ok { detail: None },
                Err(err) => {
                    error!(%err, "remove failed");
                    RepoResponse::Ok { detail: Some(format!("remove failed: {err}")) }
                }
            };
            let _ = reply.send(response);
        }

        Command::Update { overwrite, reply } => {
            let response = match integrator.update(overwrite).await {
                Ok(()) => RepoResponse::Ok { detail: None },
                Err(err) => {
                    error!(%err, "update failed");
                    RepoResponse::Ok { detail: Some(format!("update failed: {err}")) }
                }
            };
            let _ = reply.send(response);
        }

        Command::PushStart { filenames, sizes, reply } => {
            let sizes_mb: Vec<f64> = sizes.iter().map(|&s| s as f64).collect();
            let outcome = reservations.push_start(filenames, sizes_mb, config.push_bandwidth_mbps, clock);
            let result = match outcome {
                PushStartOutcome::Created(timeouts) => PushStartResult::Timeouts(timeouts),
                PushStartOutcome::Busy(remaining) => {
                    PushStartResult::Busy(remaining.try_into().unwrap_or(u32::MAX))
                }
            };
            let _ = reply.send(RepoResponse::PushStart { result });
        }

        Command::PushAddTime { name, extra, reply } => {
            match reservations.push_add_time(extra) {
                Ok(()) => {
                    let _ = reply.send(RepoResponse::Ok { detail: None });
                }
                Err(err) => {
                    warn!(%name, %err, "push_add_time with no active reservation");
                    let _ = reply.send(RepoResponse::Ok { detail: Some(err.to_string()) });
                }
            }
        }

        Command::PushDone { filenames, overwrite, reply } => {
            let response = handle_push_done(&integrator, reservations, layout, gpg, clock, &filenames, overwrite).await;
            let _ = reply.send(response);
        }

        Command::PushFail { name, reply } => {
            warn!(%name, "push_fail reported by client, releasing reservation");
            reservations.force_release();
            let _ = reply.send(RepoResponse::Ok { detail: None });
        }
    }
}

/// Verify every artifact's detached signature before handing off to the
/// Integrator; a verification failure is surfaced to the uploader as a
/// reservation-refusal without quarantining anything (files are left in
/// `updates/` for the operator to inspect).
async fn handle_push_done(
    integrator: &Integrator<'_>,
    reservations: &mut ReservationManager,
    layout: &RepoLayout,
    gpg: &Gpg,
    clock: &dyn Clock,
    filenames: &[String],
    overwrite: bool,
) -> RepoResponse {
    reservations.tick(clock);
    for name in filenames {
        if name.ends_with(".sig") {
            continue;
        }
        let artifact = layout.updates_dir().join(name);
        let mut sig_name = name.to_string();
        sig_name.push_str(".sig");
        let sig = layout.updates_dir().join(&sig_name);
        if let Err(err) = gpg.verify(&sig, &artifact).await {
            let _ = reservations.release(filenames);
            return RepoResponse::PushDone {
                error: Some(format!("GPG verify failed for {name}: {err}")),
            };
        }
    }

    if let Err(err) = integrator.update(overwrite).await {
        let _ = reservations.release(filenames);
        return RepoResponse::PushDone { error: Some(err.to_string()) };
    }

    match reservations.release(filenames) {
        Ok(()) => RepoResponse::PushDone { error: None },
        Err(err) => RepoResponse::PushDone { error: Some(err.to_string()) },
    }
}

fn resolve_archs(requested: Option<&[String]>) -> Option<Vec<Arch>> {
    requested.map(|names| names.iter().map(Arch::new).collect())
}

fn setup_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    std::fs::create_dir_all(&config.log_dir).map_err(|source| LifecycleError::Token {
        path: config.log_dir.clone(),
        source,
    })?;
    let file_appender = tracing_appender::rolling::never(&config.log_dir, "repod.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
