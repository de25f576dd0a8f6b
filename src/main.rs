use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::error;
use tokio::sync::mpsc;

use draftsmith_updater::coordinator::{CheckCallback, DownloadCallback, UpdateCoordinator};
use draftsmith_updater::manifest::UpdateManifest;
use draftsmith_updater::settings::JsonFileStore;
use draftsmith_updater::{CheckEvent, DownloadEvent};

#[derive(Parser, Debug)]
#[command(
    name = "Draftsmith Updater",
    author,
    version,
    about = "Update subsystem driver for the Draftsmith desktop app"
)]
struct Cli {
    /// Override the update endpoint for this invocation.
    #[arg(long)]
    server_url: Option<String>,

    /// Report this version to the update server instead of the built-in one.
    #[arg(long)]
    app_version: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the update server whether a newer release exists.
    Check,
    /// Download an installer and verify its checksum.
    Download {
        url: String,
        /// Expected SHA-256 digest (hex; a `sha256:` prefix is accepted).
        #[arg(long)]
        checksum: Option<String>,
    },
    /// Launch a downloaded installer.
    Install {
        path: PathBuf,
        /// Run the silent install path.
        #[arg(long)]
        force: bool,
    },
    /// Remove leftover installer downloads from the temp directory.
    Cleanup,
    /// Persist a new periodic-check interval (hours).
    SetInterval { hours: u32 },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let store = Arc::new(JsonFileStore::default_location());
    let version = cli
        .app_version
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned());
    let coordinator = UpdateCoordinator::new(store, version);
    if let Some(url) = cli.server_url {
        coordinator.set_server_url(url);
    }

    match cli.command {
        Command::Check => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let callback: CheckCallback = Box::new(move |event| {
                let _ = tx.send(event);
            });
            coordinator
                .check_for_updates(Some(callback))
                .map_err(|err| err.to_string())?;

            match rx.recv().await {
                Some(CheckEvent::UpdateAvailable(manifest)) => print_manifest(&manifest),
                Some(CheckEvent::NoUpdate) => println!("Already up to date."),
                Some(CheckEvent::Error(kind, message)) => {
                    return Err(format!("update check failed ({kind:?}): {message}"));
                }
                None => return Err("update check ended without a result".into()),
            }
        }
        Command::Download { url, checksum } => {
            let manifest = UpdateManifest {
                download_url: url,
                checksum: checksum.unwrap_or_default(),
                ..Default::default()
            };
            let (tx, mut rx) = mpsc::unbounded_channel();
            let callback: DownloadCallback = Box::new(move |event| {
                let _ = tx.send(event);
            });
            coordinator
                .download_update(&manifest, Some(callback))
                .map_err(|err| err.to_string())?;

            while let Some(event) = rx.recv().await {
                match event {
                    DownloadEvent::Progress {
                        downloaded,
                        total,
                        percent,
                    } => eprint!("\r{percent:>3}% ({downloaded}/{total} bytes)"),
                    DownloadEvent::Completed(path) => {
                        eprintln!();
                        println!("Saved installer to {}", path.display());
                        break;
                    }
                    DownloadEvent::Failed(message) => {
                        eprintln!();
                        return Err(format!("download failed: {message}"));
                    }
                }
            }
        }
        Command::Install { path, force } => {
            coordinator
                .install_update(&path, force)
                .map_err(|err| err.to_string())?;
            println!("Installer launched.");
        }
        Command::Cleanup => coordinator.cleanup_temp_files(),
        Command::SetInterval { hours } => {
            coordinator
                .set_check_interval(hours)
                .map_err(|err| err.to_string())?;
            println!("Periodic check interval set to {hours} hours.");
        }
    }

    Ok(())
}

fn print_manifest(manifest: &UpdateManifest) {
    println!(
        "Update available: {} (build {})",
        manifest.version, manifest.build
    );
    if !manifest.release_date.is_empty() {
        println!("Released: {}", manifest.release_date);
    }
    if !manifest.description.is_empty() {
        println!("{}", manifest.description);
    }
    for change in &manifest.changes {
        println!("  - {change}");
    }
    if !manifest.download_url.is_empty() {
        println!("Download: {}", manifest.download_url);
    }
}
