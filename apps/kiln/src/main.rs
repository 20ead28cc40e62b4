//! kiln - installs apk packages into a target root
//!
//! This is the CLI application; every operation is carried out by the ops
//! crate while this binary loads configuration, relays events and renders
//! results.

mod cli;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands, GlobalArgs};
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use kiln_config::Config;
use kiln_events::EventReceiver;
use kiln_ops::{OperationResult, OpsContextBuilder, OpsCtx, PackageSummary};
use kiln_resources::CancelScope;
use std::process;
use tokio::select;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting kiln v{}", env!("CARGO_PKG_VERSION"));

    // File config (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref())
        .await
        .map_err(CliError::Config)?;
    config.merge_env().map_err(CliError::Config)?;
    apply_cli_config(&mut config, &cli.global);

    let (event_sender, event_receiver) = kiln_events::channel();
    let scope = CancelScope::new();
    let ops_ctx = OpsContextBuilder::new()
        .with_config(config.clone())
        .with_event_sender(event_sender)
        .with_cancel_scope(scope.clone())
        .build()?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            scope.cancel();
        }
    });

    let renderer = OutputRenderer::new(cli.global.json, config.general.color);
    let mut event_handler =
        EventHandler::new(renderer.supports_color(), cli.global.json, cli.global.debug);

    info!(command = cli.command.name(), root = %config.root().display(), "Running command");
    let result =
        execute_command_with_events(cli.command, ops_ctx, event_receiver, &mut event_handler)
            .await?;

    renderer.render_result(&result)?;

    info!("Command completed successfully");
    Ok(())
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    ops_ctx: OpsCtx,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<OperationResult, CliError> {
    let mut command_future = Box::pin(execute_command(command, ops_ctx));

    loop {
        select! {
            result = &mut command_future => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            event = event_receiver.recv() => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => { /* Channel closed: keep waiting for command to finish */ }
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(command: Commands, ctx: OpsCtx) -> Result<OperationResult, CliError> {
    match command {
        Commands::Init {
            repositories,
            packages,
        } => {
            kiln_ops::init_db(&ctx, &repositories, &packages).await?;
            Ok(OperationResult::Initialized {
                root: ctx.config.root().display().to_string(),
                arch: ctx.arch.clone(),
            })
        }

        Commands::Install { source_date_epoch } => {
            let report = kiln_ops::fixate_world(&ctx, source_date_epoch).await?;
            Ok(OperationResult::InstallReport(report))
        }

        Commands::Add {
            packages,
            source_date_epoch,
        } => {
            let report = kiln_ops::add_packages(&ctx, &packages, source_date_epoch).await?;
            Ok(OperationResult::InstallReport(report))
        }

        Commands::Fetch => {
            if ctx.config.cache_dir().is_none() {
                warn!("No cache directory configured; fetched packages will not be kept");
            }
            let fetched = kiln_ops::calculate_world(&ctx).await?;
            Ok(OperationResult::Fetched(
                fetched
                    .iter()
                    .map(|(package, _)| PackageSummary::from(package.as_ref()))
                    .collect(),
            ))
        }

        Commands::List => {
            let installed = kiln_ops::list_installed(&ctx).await?;
            Ok(OperationResult::PackageList(
                installed
                    .iter()
                    .map(|installed| PackageSummary::from(&installed.package))
                    .collect(),
            ))
        }
    }
}

/// Initialize tracing/logging
///
/// JSON mode keeps stdout for results: logs are off unless debugging was
/// asked for, in which case they go to stderr as JSON records.
fn init_tracing(json_mode: bool, debug_flag: bool) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_flag;
    let default_filter = if debug_enabled {
        "info,kiln=debug,kiln_ops=debug"
    } else {
        "warn,kiln=warn,kiln_ops=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json_mode {
        if debug_enabled {
            tracing_subscriber::fmt()
                .json()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_writer(std::io::sink)
                .with_env_filter("off")
                .init();
        }
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &GlobalArgs) {
    if let Some(color) = global.color {
        config.general.color = color.into();
    }
    if let Some(root) = &global.root {
        config.paths.root = Some(root.clone());
    }
    if let Some(cache_dir) = &global.cache_dir {
        config.paths.cache_dir = Some(cache_dir.clone());
    }
    if let Some(arch) = &global.arch {
        config.repository.arch = Some(arch.clone());
    }
    if let Some(jobs) = global.jobs {
        config.general.jobs = jobs;
    }
}
