use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{Cli, Command};
use crate::core::config::Config;
use crate::core::error::{SyncError, SyncResult};
use crate::core::identity::{load_or_create_machine_id, GateState, IdentityGate};
use crate::core::lifecycle::SysinfoGame;
use crate::core::saves::LayoutMode;
use crate::core::session::{LaunchOptions, Session};
use crate::core::status::{JsonLinesSink, NullSink, StatusSink};
use crate::core::storage::{DriveStore, MemoryStore, RetryPolicy, RetryingStore, StorageClient};
use crate::core::sync::{SyncEngine, SyncReport};

/// `craftsync status` output.
#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub machine_id: String,
    pub local_marker_path: String,
    pub layout: LayoutMode,
    pub saves_root: String,
    pub cloud_root: String,
    pub store: String,
    pub local_worlds: usize,
    pub local_marker: Option<String>,
    pub gate: GateState,
}

fn build_store(config: &Config, memory: bool) -> SyncResult<Box<dyn StorageClient>> {
    if memory {
        warn!("Using the in-memory store, nothing will reach the cloud");
        return Ok(Box::new(MemoryStore::new()));
    }

    let token = config.drive_token.as_deref().ok_or_else(|| {
        SyncError::Config(
            "no Drive access token: pass --drive-token, set CRAFTSYNC_DRIVE_TOKEN or use --memory-store"
                .into(),
        )
    })?;
    Ok(Box::new(RetryingStore::new(
        DriveStore::new(token)?,
        RetryPolicy::default(),
    )))
}

fn print_json<T: Serialize>(value: &T) -> SyncResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_report(pass: &str, report: &SyncReport) {
    for failure in &report.failures {
        warn!("{} failed for {}: {}", pass, failure.item, failure.error);
    }
    if !report.kept.is_empty() {
        info!("{} kept {} previous remote entries", pass, report.kept.len());
    }
}

/// Resolve configuration, then dispatch the requested command.
///
/// Configuration problems surface here, before any remote call.
pub async fn execute(cli: Cli) -> SyncResult<()> {
    let config = Config::resolve(cli.options.overrides())?;
    config.validate()?;
    info!(
        "Layout {} at {:?}, cloud root '{}'",
        config.layout, config.saves_root, config.cloud_root
    );

    let machine_id = load_or_create_machine_id(&config.machine_id_path)?;
    let store = build_store(&config, cli.options.memory_store)?;
    let store: &dyn StorageClient = store.as_ref();

    let engine = SyncEngine::new(config.saves_tree(), config.cloud_root.clone());
    let gate = IdentityGate::new(machine_id, &config.saves_root);
    let game = SysinfoGame::new();

    let command = cli.command.unwrap_or(Command::Run);
    let stdout_sink;
    let sink: &dyn StatusSink = match command {
        Command::Run => {
            stdout_sink = JsonLinesSink::stdout();
            &stdout_sink
        }
        _ => &NullSink,
    };

    let session = Session::new(
        engine,
        gate,
        store,
        &game,
        sink,
        LaunchOptions::from(&config),
    );

    match command {
        Command::Run => {
            let outcome = session.run().await?;
            if let Some(report) = &outcome.restore {
                log_report("Restore", report);
            }
            if let Some(report) = &outcome.upload {
                log_report("Upload", report);
            }
            info!("Run finished");
        }
        Command::Upload => {
            let report = session.upload().await?;
            log_report("Upload", &report);
            print_json(&report)?;
        }
        Command::Restore { force } => {
            let (_, report) = session.restore_if_needed(force).await?;
            match report {
                Some(report) => {
                    log_report("Restore", &report);
                    print_json(&report)?;
                }
                None => info!("Nothing restored, pass --force to restore anyway"),
            }
        }
        Command::Status => {
            let gate = session.check_identity().await?;
            let local_worlds = config.saves_tree().list_entries().await?.len();
            let local_marker = session
                .gate()
                .local_marker()
                .await?
                .map(|marker| marker.machine_id);
            print_json(&StatusSummary {
                machine_id: session.gate().machine_id().to_string(),
                local_marker_path: session.gate().local_marker_path().display().to_string(),
                layout: config.layout,
                saves_root: config.saves_root.display().to_string(),
                cloud_root: config.cloud_root.clone(),
                store: store.name().to_string(),
                local_worlds,
                local_marker,
                gate,
            })?;
        }
    }

    Ok(())
}
