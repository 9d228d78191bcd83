// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! packhouse-builderd
//!
//! Owns the single build loop: scans recipes for upstream updates on an
//! interval, runs queued builds one at a time, and serves an operator
//! control socket.
//!
//! `ControlServer` is the listener task (socket I/O); the loop in `run`
//! below is the engine loop (sequential processing); the two communicate
//! over an `mpsc` command channel rather than shared, locked state.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod command;
mod config;
mod env;
mod lifecycle;
mod listener;

use std::collections::BTreeSet;

use packhouse_adapters::{ContainerShell, ExternalVercmp, Gpg};
use packhouse_builder_engine::{
    BuildExecutor, JobQueue, RecipeScanResult, UpdateDetector, UploadClient, UploadClientConfig,
};
use packhouse_core::{Dirname, SystemClock, VersionLedger};
use packhouse_protocol::{AuthToken, BuilderResponse};
use packhouse_recipe::RecipeSet;
use packhouse_storage::LedgerStore;
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
                println!("packhouse-builderd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("packhouse-builderd {}", env!("CARGO_PKG_VERSION"));
                println!("Builds packages in an isolated container and pushes them to the repo daemon.");
                println!();
                println!("USAGE:");
                println!("    packhouse-builderd");
                println!();
                println!("Configured via <state-dir>/builderd.yaml. The daemon should be");
                println!("started by a process supervisor, not invoked interactively.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: packhouse-builderd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let state_dir = env::state_dir()?;
    let config_path = env::config_path_override().unwrap_or_else(|| state_dir.join("builderd.yaml"));
    let config = Config::load(&config_path, state_dir)?;

    let _log_guard = setup_logging(&config)?;
    info!("starting builder daemon");

    let startup = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            eprintln!("packhouse-builderd is already running (lock held at {})", config.lock_path.display());
            std::process::exit(1);
        }
        Err(LifecycleError::NestedContainer) => {
            eprintln!("refusing to start: this process is itself running inside a container");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to start builder daemon");
            return Err(e.into());
        }
    };

    run(config, startup).await
}

async fn run(config: Config, startup: StartupResult) -> Result<(), Box<dyn std::error::Error>> {
    let StartupResult {
        listener,
        mut ledger,
        token,
        lock: _lock,
    } = startup;

    let container = ContainerShell::new(
        config.container_root.clone(),
        config.x86_shell_invocation.clone(),
        config.arm_shell_invocation.clone(),
    );
    let container = match &config.arm_shell_preamble {
        Some(preamble) => container.with_arm_preamble(preamble.clone()),
        None => container,
    };
    let gpg = Gpg::new(config.gpg_key_id.clone());
    let vercmp = ExternalVercmp::default();

    let repo_token = AuthToken::load(&config.repo_token_path).map_err(|source| LifecycleError::Token {
        path: config.repo_token_path.clone(),
        source,
    })?;
    let upload = UploadClient::new(UploadClientConfig {
        socket_path: config.repo_socket_path.clone(),
        token: repo_token.as_str().to_string(),
        bandwidth_mbps: config.push_bandwidth_mbps,
        rpc_timeout: packhouse_protocol::DEFAULT_TIMEOUT,
        remote_spec: config.repo_remote_spec.clone(),
    });

    let loaded = packhouse_recipe::load_all(&config.recipe_root)?;
    let (mut recipes, skipped) = RecipeSet::from_loaded(loaded);
    for (dirname, reason) in &skipped {
        warn!(%dirname, %reason, "recipe skipped at load time");
    }
    info!(count = recipes.len(), "loaded recipes");

    let mut queue = JobQueue::new();
    let mut force_clean: BTreeSet<Dirname> = BTreeSet::new();

    let (tx, mut rx) = mpsc::channel::<Command>(64);
    let server = ControlServer::new(listener, token, tx);
    tokio::spawn(server.run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut update_tick = tokio::time::interval(config.update_check_interval);
    update_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let clock = SystemClock;
    let ledger_store = LedgerStore::new(config.ledger_path.clone());

    info!(socket = %config.socket_path.display(), "builder daemon ready");

    loop {
        tokio::select! {
            _ = update_tick.tick() => {
                scan_and_enqueue(&config, &container, &clock, &vercmp, &mut ledger, &recipes, &mut queue, None).await;
                save_ledger(&ledger_store, &ledger);
                drain_queue(&config, &container, &gpg, &upload, &recipes, &mut queue, &mut force_clean).await;
            }

            Some(command) = rx.recv() => {
                handle_command(
                    command,
                    &config,
                    &container,
                    &gpg,
                    &upload,
                    &vercmp,
                    &clock,
                    &ledger_store,
                    &mut ledger,
                    &mut recipes,
                    &mut queue,
                    &mut force_clean,
                ).await;
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

    save_ledger(&ledger_store, &ledger);
    info!("builder daemon stopped");
    Ok(())
}

/// Scan for updates (optionally restricted to one recipe), push enqueued
/// jobs into `queue`. Runs a single update-check pass; the ledger is
/// saved by the caller afterward.
async fn scan_and_enqueue(
    config: &Config,
    container: &ContainerShell,
    clock: &SystemClock,
    vercmp: &ExternalVercmp,
    ledger: &mut VersionLedger,
    recipes: &RecipeSet,
    queue: &mut JobQueue,
    targeted: Option<&Dirname>,
) {
    let detector = UpdateDetector {
        recipe_root: &config.recipe_root,
        archs: &config.archs,
        container,
        toolchain: &config.toolchain,
        log_dir: &config.log_dir,
        update_check_timeout: config.update_check_timeout,
        clock,
    };
    let results = detector.scan(ledger, recipes, vercmp, targeted).await;
    for (dirname, outcome) in results {
        match outcome {
            RecipeScanResult::Enqueued(job) => {
                info!(%dirname, version = %job.version, "enqueuing build");
                queue.enqueue(job);
            }
            RecipeScanResult::UpToDate => {}
            RecipeScanResult::DowngradeAttempted => {
                warn!(%dirname, "downgrade attempted, ignoring");
            }
            RecipeScanResult::Skipped { reason } => {
                info!(%dirname, %reason, "update check skipped");
            }
            RecipeScanResult::Failed { error } => {
                error!(%dirname, %error, "update check failed");
            }
        }
    }
}

fn save_ledger(store: &LedgerStore, ledger: &VersionLedger) {
    if let Err(err) = store.save(ledger) {
        error!(%err, "failed to persist version ledger");
    }
}

/// Run every queued job to completion, one at a time, applying any
/// pending `force_clean` override (`Clean`/`CleanAll` only take effect on
/// a recipe's next scheduled build).
async fn drain_queue(
    config: &Config,
    container: &ContainerShell,
    gpg: &Gpg,
    upload: &UploadClient,
    recipes: &RecipeSet,
    queue: &mut JobQueue,
    force_clean: &mut BTreeSet<Dirname>,
) {
    while let Some(job) = queue.take() {
        let Some(recipe) = recipes.get(&job.dirname) else {
            warn!(dirname = %job.dirname, "queued job has no matching recipe, dropping");
            let _ = queue.finish(&job.dirname, &job.arch, true);
            continue;
        };
        let recipe = if force_clean.remove(&job.dirname) {
            let mut forced = recipe.clone();
            forced.cleanbuild = true;
            forced
        } else {
            recipe.clone()
        };

        let executor = BuildExecutor {
            recipe_root: &config.recipe_root,
            container,
            gpg,
            upload,
            build_commands: &config.build_commands,
            package_suffix: &config.package_suffix,
            log_dir: &config.log_dir,
        };
        info!(dirname = %job.dirname, arch = %job.arch, version = %job.version, "starting build");
        match executor.execute(&job, &recipe).await {
            Ok(()) => info!(dirname = %job.dirname, arch = %job.arch, "build finished"),
            Err(err) => error!(dirname = %job.dirname, arch = %job.arch, %err, "build failed"),
        }
        let _ = queue.finish(&job.dirname, &job.arch, true);
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    command: Command,
    config: &Config,
    container: &ContainerShell,
    gpg: &Gpg,
    upload: &UploadClient,
    vercmp: &ExternalVercmp,
    clock: &SystemClock,
    ledger_store: &LedgerStore,
    ledger: &mut VersionLedger,
    recipes: &mut RecipeSet,
    queue: &mut JobQueue,
    force_clean: &mut BTreeSet<Dirname>,
) {
    match command {
        Command::Info { human, reply } => {
            let text = info_text(queue, ledger, recipes, human);
            let _ = reply.send(BuilderResponse::Info { text });
        }

        Command::RebuildPackage { dirname, clean, reply } => {
            let dirname = Dirname::new(dirname);
            if recipes.get(&dirname).is_none() {
                let _ = reply.send(BuilderResponse::Bool { value: false });
                return;
            }
            if clean {
                force_clean.insert(dirname.clone());
            }
            scan_and_enqueue(config, container, clock, vercmp, ledger, recipes, queue, Some(&dirname)).await;
            save_ledger(ledger_store, ledger);
            drain_queue(config, container, gpg, upload, recipes, queue, force_clean).await;
            let _ = reply.send(BuilderResponse::Bool { value: true });
        }

        Command::Clean { dirname, reply } => {
            let dirname = Dirname::new(dirname);
            let known = recipes.get(&dirname).is_some();
            if known {
                force_clean.insert(dirname);
            }
            let _ = reply.send(BuilderResponse::Bool { value: known });
        }

        Command::CleanAll { reply } => {
            for recipe in recipes.iter() {
                force_clean.insert(recipe.dirname.clone());
            }
            let _ = reply.send(BuilderResponse::Ok { detail: None });
        }

        Command::ForceUpload { dirname, overwrite, reply } => {
            let executor = BuildExecutor {
                recipe_root: &config.recipe_root,
                container,
                gpg,
                upload,
                build_commands: &config.build_commands,
                package_suffix: &config.package_suffix,
                log_dir: &config.log_dir,
            };
            match executor.upload_existing(&dirname, overwrite).await {
                Ok(count) => {
                    let _ = reply.send(BuilderResponse::Ok {
                        detail: Some(format!("uploaded {count} artifact(s)")),
                    });
                }
                Err(err) => {
                    let _ = reply.send(BuilderResponse::Ok {
                        detail: Some(format!("upload failed: {err}")),
                    });
                }
            }
        }

        Command::Getup { reply } => {
            scan_and_enqueue(config, container, clock, vercmp, ledger, recipes, queue, None).await;
            save_ledger(ledger_store, ledger);
            drain_queue(config, container, gpg, upload, recipes, queue, force_clean).await;
            let _ = reply.send(BuilderResponse::Ok { detail: None });
        }

        Command::Extras { action, pkgname, reply } => {
            let response = handle_extras(&action, pkgname.as_deref(), ledger);
            let _ = reply.send(response);
        }
    }
}

/// Operator maintenance hatch over the quarantine mechanism: `list`
/// enumerates quarantined recipes with their failure counts, `clear`
/// un-quarantines one. Any other action is rejected rather than guessed
/// at.
fn handle_extras(action: &str, pkgname: Option<&str>, ledger: &mut VersionLedger) -> BuilderResponse {
    match action {
        "list" => {
            let mut lines = Vec::new();
            for (dirname, entry) in ledger.iter() {
                if entry.is_quarantined() {
                    lines.push(format!("{dirname} ({} failures)", entry.failures));
                }
            }
            BuilderResponse::Info { text: lines.join("\n") }
        }
        "clear" => match pkgname {
            Some(name) => {
                ledger.clear_failures(name);
                BuilderResponse::Ok { detail: None }
            }
            None => BuilderResponse::Ok {
                detail: Some("clear requires a pkgname".to_string()),
            },
        },
        _ => BuilderResponse::Unknown,
    }
}

fn info_text(queue: &JobQueue, ledger: &VersionLedger, recipes: &RecipeSet, human: bool) -> String {
    let quarantined = ledger.iter().filter(|(_, e)| e.is_quarantined()).count();
    if human {
        format!(
            "recipes: {}\nqueued: {}\ncurrent: {}\nquarantined: {}",
            recipes.len(),
            queue.len(),
            queue
                .current()
                .map(|j| format!("{} ({})", j.dirname, j.arch))
                .unwrap_or_else(|| "none".to_string()),
            quarantined,
        )
    } else {
        serde_json::json!({
            "recipes": recipes.len(),
            "queued": queue.len(),
            "current": queue.current().map(|j| j.dirname.to_string()),
            "quarantined": quarantined,
        })
        .to_string()
    }
}

fn setup_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    std::fs::create_dir_all(&config.log_dir).map_err(|source| LifecycleError::Token {
        path: config.log_dir.clone(),
        source,
    })?;
    let file_appender = tracing_appender::rolling::never(&config.log_dir, "builderd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
