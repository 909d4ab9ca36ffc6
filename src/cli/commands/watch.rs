//! Watch command - runs the reward engine against a live backend.

use crate::cli::args::{OutputFormat, WatchArgs};
use crate::config::Config;
use crate::engine::Navigation;
use crate::runtime::{RuntimeCommand, RuntimeHandle, WatchRuntime};
use crate::sync::{HttpBackend, SyncEvent};
use crate::telemetry::{self, LogHandle};
use crate::time::SystemClock;
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

/// One line typed by the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerCommand {
    Runtime(RuntimeCommand),
    LogLevel(String),
    Help,
}

pub fn parse_viewer_command(line: &str) -> Result<Option<ViewerCommand>> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    let nav = |nav: Navigation| -> Result<Option<ViewerCommand>> {
        Ok(Some(ViewerCommand::Runtime(RuntimeCommand::Navigate(nav))))
    };
    match (verb.to_ascii_lowercase().as_str(), arg) {
        ("next" | "n", None) => nav(Navigation::Next),
        ("prev" | "previous" | "p", None) => nav(Navigation::Previous),
        ("pause", None) => nav(Navigation::Pause),
        ("resume", None) => nav(Navigation::Resume),
        ("close", None) => nav(Navigation::Close),
        ("open", Some(index)) => match index.parse::<usize>() {
            Ok(index) => nav(Navigation::Open(index)),
            Err(_) => bail!("open expects a catalog index, got {index:?}"),
        },
        ("balance", None) => Ok(Some(ViewerCommand::Runtime(RuntimeCommand::RefreshBalance))),
        ("quit" | "exit" | "q", None) => Ok(Some(ViewerCommand::Runtime(RuntimeCommand::Shutdown))),
        ("log", Some(level)) => Ok(Some(ViewerCommand::LogLevel(level.to_string()))),
        ("help" | "?", None) => Ok(Some(ViewerCommand::Help)),
        _ => bail!("unrecognised command {:?}; type `help`", line.trim()),
    }
}

const HELP: &str =
    "commands: next | prev | open <n> | pause | resume | close | balance | log <level> | quit";

pub async fn run_watch(args: WatchArgs) -> Result<()> {
    let mut config = Config::load(&args.config)?;
    config.apply_env_overrides()?;
    if let Some(url) = args.backend_url {
        config.backend.base_url = url;
    }
    if args.token.is_some() {
        config.backend.token = args.token;
    }
    if args.no_shuffle {
        config.session.shuffle = false;
    }

    let log_handle = telemetry::init_tracing(config.telemetry.log_level.as_deref())?;
    let backend = Arc::new(HttpBackend::from_config(&config.backend));
    let mut runtime = WatchRuntime::new(config, backend, SystemClock, Some(log_handle.clone()))?;
    let ads = runtime.load_catalog().await?;
    if ads == 0 {
        tracing::warn!("backend returned no playable ads");
    }

    let handle = runtime.handle();
    if let Some(index) = args.open {
        handle.navigate(Navigation::Open(index));
    }
    tokio::spawn(print_events(runtime.subscribe(), args.format));
    tokio::spawn(read_commands(handle.clone(), log_handle));
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("shutdown signal received");
            signal_handle.shutdown();
        }
    });
    drop(handle);

    let balance = runtime.run().await?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "final_balance": balance })),
        OutputFormat::Text => println!("final balance: {} points", balance.displayed),
    }
    Ok(())
}

async fn read_commands(handle: RuntimeHandle, log_handle: LogHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("{HELP}");
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("stdin read failed: {err}");
                break;
            }
        };
        match parse_viewer_command(&line) {
            Ok(None) => {}
            Ok(Some(ViewerCommand::Runtime(command))) => {
                let quit = command == RuntimeCommand::Shutdown;
                if !handle.send(command) || quit {
                    return;
                }
            }
            Ok(Some(ViewerCommand::LogLevel(level))) => {
                if let Err(err) = telemetry::set_log_level(&log_handle, &level) {
                    eprintln!("{err}");
                }
            }
            Ok(Some(ViewerCommand::Help)) => eprintln!("{HELP}"),
            Err(err) => eprintln!("{err}"),
        }
    }
    // stdin closed: stop the viewer
    handle.shutdown();
}

async fn print_events(mut events: broadcast::Receiver<SyncEvent>, format: OutputFormat) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event, format),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &SyncEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let value = match event {
                SyncEvent::Confirmed { key, points_earned } => serde_json::json!({
                    "event": "confirmed", "key": key, "points_earned": points_earned,
                }),
                SyncEvent::Failed {
                    key,
                    attempts,
                    reason,
                } => serde_json::json!({
                    "event": "failed", "key": key, "attempts": attempts, "reason": reason,
                }),
                SyncEvent::BalanceReconciled(view) => serde_json::json!({
                    "event": "balance", "balance": view,
                }),
                SyncEvent::BalanceStale(view) => serde_json::json!({
                    "event": "balance_stale", "balance": view,
                }),
            };
            println!("{value}");
        }
        OutputFormat::Text => match event {
            SyncEvent::Confirmed { key, points_earned } => {
                println!("+{points_earned} points ({key})");
            }
            SyncEvent::Failed { key, reason, .. } => {
                println!("reward {key} not confirmed: {reason}");
            }
            SyncEvent::BalanceReconciled(view) => println!("balance: {} points", view.displayed),
            SyncEvent::BalanceStale(view) => {
                println!("balance: {} points (offline, may be out of date)", view.displayed);
            }
        },
    }
}
