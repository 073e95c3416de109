// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod errors;
pub mod logging;
pub mod manager;
pub mod supervisor;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::control::ControlRequest;
use crate::errors::exit_code;
use crate::manager::Manager;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// `run` (the default) wires together:
/// - config loading
/// - one supervisor (and optional watcher) per unit
/// - the control socket
/// - Ctrl-C / SIGTERM handling
///
/// The other subcommands are control clients of a running daemon.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = args.config;
    let command = args.command.unwrap_or(Command::Run { dry_run: false });

    match command.to_request() {
        None => {
            let dry_run = matches!(command, Command::Run { dry_run: true });
            run_daemon(config_path, dry_run).await
        }
        Some(request) => run_client(config_path, request).await,
    }
}

async fn run_daemon(config_path: PathBuf, dry_run: bool) -> Result<i32> {
    let cfg = load_and_validate(&config_path)?;

    if dry_run {
        print_dry_run(&cfg);
        return Ok(exit_code::SUCCESS);
    }

    for (name, reason) in cfg.rejected() {
        error!(unit = %name, %reason, "unit skipped: invalid configuration");
    }

    let manager = Arc::new(Manager::from_config(&cfg));

    #[cfg(unix)]
    let server = crate::control::server::ControlServer::bind(
        cfg.settings().control_socket.clone(),
        Arc::clone(&manager),
    )
    .await?;
    #[cfg(unix)]
    info!(socket = ?server.path(), "accepting control requests");

    let names: Vec<&str> = manager.unit_names().collect();
    info!(units = ?names, "starting units");
    manager.start_all().await;

    wait_for_shutdown_signal().await;
    info!("shutdown requested; stopping all units");

    manager.shutdown().await;
    Ok(exit_code::SUCCESS)
}

#[cfg(unix)]
async fn run_client(config_path: PathBuf, request: ControlRequest) -> Result<i32> {
    let settings = crate::config::load_settings(&config_path)?;
    let socket = settings.control_socket;

    match crate::control::client::send_request(&socket, &request).await {
        Ok(response) => {
            for line in &response.lines {
                println!("{line}");
            }
            Ok(response.code)
        }
        Err(err) => {
            eprintln!("procwatch: cannot reach daemon: {err:#}");
            Ok(exit_code::CONTROL_ERROR)
        }
    }
}

#[cfg(not(unix))]
async fn run_client(_config_path: PathBuf, _request: ControlRequest) -> Result<i32> {
    eprintln!("procwatch: the control socket is only available on Unix");
    Ok(exit_code::CONTROL_ERROR)
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            error!(error = %e, "failed to listen for Ctrl+C");
                        }
                    }
                    _ = term.recv() => debug!("received SIGTERM"),
                }
                return;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Simple dry-run output: print settings and units.
fn print_dry_run(cfg: &ConfigFile) {
    let settings = cfg.settings();

    println!("procwatch dry-run");
    println!("  config.stop_timeout = {:?}", settings.stop_timeout);
    println!("  config.debounce = {:?}", settings.debounce);
    println!("  config.control_socket = {}", settings.control_socket.display());
    println!(
        "  config.backoff = initial {:?}, max {:?}, x{}, reset after {:?}",
        settings.backoff.initial,
        settings.backoff.max,
        settings.backoff.multiplier,
        settings.backoff.reset_after
    );
    println!();

    println!("units ({}):", cfg.units().len());
    for unit in cfg.units() {
        let spec = &unit.spec;
        println!("  - {}", spec.name);
        println!("      cmd: {}", spec.command_line());
        if let Some(ref cwd) = spec.cwd {
            println!("      cwd: {}", cwd.display());
        }
        if !spec.env.is_empty() {
            println!("      env: {:?}", spec.env);
        }
        println!("      autorestart: {}", spec.autorestart);
        match spec.max_restarts {
            Some(n) => println!("      max_restarts: {n}"),
            None => println!("      max_restarts: unlimited"),
        }
        if let Some(ref watch) = unit.watch {
            println!("      watch: {:?}", watch.roots());
            if !watch.ignore().is_empty() {
                println!("      ignore_watch: {:?}", watch.ignore());
            }
            if watch.follow_symlinks() {
                println!("      follow_symlinks: true");
            }
        }
    }

    if !cfg.rejected().is_empty() {
        println!();
        println!("rejected ({}):", cfg.rejected().len());
        for (name, reason) in cfg.rejected() {
            println!("  - {name}: {reason}");
        }
    }

    debug!("dry-run complete (nothing launched)");
}
