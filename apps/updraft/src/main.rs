//! updraft - over-the-air application update client
//!
//! Thin host around the deployment engine: loads `updraft.toml`, wires
//! the event channel to the terminal, and maps subcommands onto the
//! engine operations.

mod cli;
mod config;
mod events;

use crate::cli::{Cli, Commands};
use crate::config::HostConfig;
use clap::Parser;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use updraft_deployment::{
    DeploymentConfig, DeploymentInstance, InstallMode, PlatformHooks, SyncOptions, SyncOutcome,
    UpdateCheck,
};
use updraft_errors::Error;
use updraft_hash::PackageHash;
use updraft_signing::{BundleVerifier, MinisignVerifier};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;
    init_tracing(cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("{e}");
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Log lines go to stderr so JSON output on stdout stays parseable.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The CLI process cannot relaunch itself mid-command; an immediate
/// install surfaces as an instruction to the operator instead.
struct CliPlatform {
    storage_root: PathBuf,
    app_version: String,
}

impl PlatformHooks for CliPlatform {
    fn storage_root(&self) -> PathBuf {
        self.storage_root.clone()
    }

    fn current_app_version(&self) -> String {
        self.app_version.clone()
    }

    fn perform_restart(&self) -> Result<(), Error> {
        info!("update staged; relaunch the application to run it");
        Ok(())
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    // Packing needs no server or engine.
    if let Commands::Pack { dir, output } = &cli.command {
        return pack(dir, output.as_deref(), cli.global.json).await;
    }

    let host = HostConfig::load(cli.global.config.as_deref()).await?;

    let platform = Arc::new(CliPlatform {
        storage_root: host
            .storage_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(".updraft")),
        app_version: host.app_version.clone(),
    });

    let mut builder = DeploymentConfig::builder()
        .server_url(&host.server_url)
        .deployment_key(&host.deployment_key);
    if let Some(id) = &host.client_unique_id {
        builder = builder.client_unique_id(id);
    }
    if let Some(key) = &host.public_key {
        builder = builder.public_key(key);
    }
    let config = builder.build(platform.as_ref())?;

    let verifier: Option<Arc<dyn BundleVerifier>> = host
        .public_key
        .is_some()
        .then(|| Arc::new(MinisignVerifier) as Arc<dyn BundleVerifier>);

    let (tx, rx) = updraft_events::channel();
    let drain = events::spawn_drain(rx, cli.global.json);

    let engine = DeploymentInstance::new(config, platform, verifier, Some(tx)).await?;
    let result = dispatch(&cli.command, &engine).await;

    // Dropping the engine closes the channel once detached report tasks
    // finish, so the drain task sees every event before we exit.
    drop(engine);
    let _ = drain.await;
    result
}

async fn dispatch(command: &Commands, engine: &DeploymentInstance) -> Result<(), Error> {
    match command {
        Commands::Check => check(engine).await,
        Commands::Sync {
            immediate,
            on_resume,
            key,
        } => sync(engine, *immediate, *on_resume, key.clone()).await,
        Commands::Ready => {
            engine.notify_application_ready().await?;
            info!("current package confirmed");
            Ok(())
        }
        Commands::Rollback => {
            let restored = engine.rollback().await?;
            info!("rolled back to {}", restored.package.label);
            Ok(())
        }
        Commands::Clear => {
            engine.clear_updates().await?;
            info!("removed all installed packages and flags");
            Ok(())
        }
        Commands::Pack { .. } => unreachable!("handled before engine construction"),
    }
}

async fn check(engine: &DeploymentInstance) -> Result<(), Error> {
    match engine.check_for_update(None).await? {
        UpdateCheck::UpdateAvailable(remote) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "update_available": true,
                    "package": remote,
                }))?
            );
        }
        UpdateCheck::NoUpdateAvailable => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "update_available": false }))?
            );
        }
    }
    Ok(())
}

async fn sync(
    engine: &DeploymentInstance,
    immediate: bool,
    on_resume: bool,
    key: Option<String>,
) -> Result<(), Error> {
    let install_mode = if immediate {
        InstallMode::Immediate
    } else if on_resume {
        InstallMode::OnNextResume
    } else {
        InstallMode::OnNextRestart
    };

    let outcome = engine
        .sync(&SyncOptions {
            deployment_key: key,
            install_mode,
            ..SyncOptions::default()
        })
        .await?;

    match outcome {
        SyncOutcome::SyncInProgress => info!("another sync is already running"),
        SyncOutcome::UpToDate => info!("already up to date"),
        SyncOutcome::UpdateInstalled { package, .. } => {
            info!(
                "installed {} ({})",
                package.package.label,
                package.package_hash()
            );
        }
    }
    Ok(())
}

async fn pack(dir: &Path, output: Option<&Path>, json: bool) -> Result<(), Error> {
    let archive = output.map_or_else(|| PathBuf::from("bundle.tar"), Path::to_path_buf);
    updraft_store::archive::pack_bundle(dir, &archive).await?;

    let hash = PackageHash::from_file(&archive).await?.to_hex();
    let size = tokio::fs::metadata(&archive).await?.len();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "archive": archive.display().to_string(),
                "package_hash": hash,
                "package_size": size,
            }))?
        );
    } else {
        println!("archive: {}", archive.display());
        println!("package_hash: {hash}");
        println!("package_size: {size}");
    }
    Ok(())
}
