//! authsync - interactive terminal driver for an auth session scope.
//!
//! Opens a session scope against the in-memory identity provider, prints
//! every auth state change as it arrives, and exposes sign-up, sign-in,
//! sign-out and password reset as commands.

mod commands;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use authsync_core::{use_auth, AuthConfig, InMemoryProvider, SessionScope};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{describe, Command, Shell, HELP};
use config::CliConfig;

/// Initialize the tracing subscriber, logging to a daily file so output
/// does not interleave with the prompt.
fn init_tracing() -> Result<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = CliConfig::log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        log_dir,
        "authsync.log",
    ));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("usage: authsync [--auto-confirm]\n\n{HELP}");
        return Ok(());
    }

    let _log_guard = init_tracing()?;
    info!("authsync starting");

    let mut config = match CliConfig::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            CliConfig::default()
        }
    };
    if args.iter().any(|a| a == "--auto-confirm") {
        config.auto_confirm_signups = true;
    }

    let provider = InMemoryProvider::new().with_auto_confirm(config.auto_confirm_signups);
    let scope = SessionScope::start(
        Arc::new(provider.clone()),
        AuthConfig::default().with_bootstrap_timeout(config.bootstrap_timeout()),
    );

    let result = scope.provide(run(&provider, &mut config)).await;
    scope.shutdown().await;

    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    info!("authsync shutting down");
    result
}

async fn run(provider: &InMemoryProvider, config: &mut CliConfig) -> Result<()> {
    let ctx = use_auth()?;

    let mut changes = ctx.changes();
    changes
        .wait_for(|state| !state.loading())
        .await
        .context("Session scope closed during bootstrap")?;
    println!("{}", describe(&ctx.state()));

    // Report every store update; the scope's teardown ends the loop.
    let watcher = tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let line = describe(&changes.borrow_and_update());
            println!("[auth] {line}");
        }
    });

    println!("Type 'help' for commands.");
    let mut shell = Shell {
        ctx,
        provider,
        config,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Some(Ok(command)) => command,
            Some(Err(message)) => {
                println!("{message}");
                continue;
            }
            None => continue,
        };
        if !shell.execute(command).await? {
            break;
        }
    }

    watcher.abort();
    Ok(())
}
