// ─── Session ───
// One full run: identity check, restore, play, upload.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::config::Config;
use crate::core::error::SyncResult;
use crate::core::identity::{GateState, IdentityGate};
use crate::core::lifecycle::{
    wait_until_exited, wait_until_running, GameProcess, DEFAULT_POLL_INTERVAL,
};
use crate::core::status::{StatusEvent, StatusSink, Step, StepStatus};
use crate::core::storage::StorageClient;
use crate::core::sync::{SyncEngine, SyncReport};

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub launcher: Option<PathBuf>,
    pub enabled: bool,
    pub poll_interval: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            launcher: None,
            enabled: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl From<&Config> for LaunchOptions {
    fn from(config: &Config) -> Self {
        Self {
            launcher: config.launcher_path.clone(),
            enabled: config.launch_enabled,
            poll_interval: config.poll_interval,
        }
    }
}

/// What a full run did. `gate` is `None` when the identity check could not
/// reach the store and the run went ahead without syncing.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub gate: Option<GateState>,
    pub restore: Option<SyncReport>,
    pub upload: Option<SyncReport>,
}

/// Wires the sync engine, identity gate and game process together for a run.
pub struct Session<'a> {
    engine: SyncEngine,
    gate: IdentityGate,
    store: &'a dyn StorageClient,
    game: &'a dyn GameProcess,
    status: &'a dyn StatusSink,
    launch: LaunchOptions,
}

impl<'a> Session<'a> {
    pub fn new(
        engine: SyncEngine,
        gate: IdentityGate,
        store: &'a dyn StorageClient,
        game: &'a dyn GameProcess,
        status: &'a dyn StatusSink,
        launch: LaunchOptions,
    ) -> Self {
        Self {
            engine,
            gate,
            store,
            game,
            status,
            launch,
        }
    }

    pub fn gate(&self) -> &IdentityGate {
        &self.gate
    }

    fn emit(&self, step: Step, status: StepStatus) {
        self.status.emit(StatusEvent::new(step, status));
    }

    /// Emit `started`, run `work`, then `completed` or `failed`.
    async fn tracked<T, F>(&self, step: Step, work: F) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        self.emit(step, StepStatus::Started);
        match work.await {
            Ok(value) => {
                self.emit(step, StepStatus::Completed);
                Ok(value)
            }
            Err(err) => {
                self.emit(step, StepStatus::Failed);
                Err(err)
            }
        }
    }

    pub async fn check_identity(&self) -> SyncResult<GateState> {
        self.tracked(Step::IdentityCheck, async {
            let layout = self.engine.resolve_layout(self.store).await?;
            self.gate.check(self.store, &layout.root).await
        })
        .await
    }

    /// A marker that could not be written is logged; the saves on both
    /// sides are already in place by then.
    async fn refresh_identity(&self) {
        let refreshed = self
            .tracked(Step::IdentityRefresh, async {
                let layout = self.engine.resolve_layout(self.store).await?;
                self.gate.refresh(self.store, &layout.root).await
            })
            .await;
        if let Err(err) = refreshed {
            warn!("Identity marker not refreshed: {}", err);
        }
    }

    /// Restore when the gate says so, or always when `force` is set.
    /// The marker is only rewritten after a restore without failures.
    pub async fn restore_if_needed(
        &self,
        force: bool,
    ) -> SyncResult<(GateState, Option<SyncReport>)> {
        let state = self.check_identity().await?;
        let report = self.restore_for(state, force).await?;
        Ok((state, report))
    }

    async fn restore_for(&self, state: GateState, force: bool) -> SyncResult<Option<SyncReport>> {
        if !force && !state.restore_required() {
            info!("Local saves are current, skipping restore");
            self.emit(Step::Restore, StepStatus::Skipped);
            return Ok(None);
        }

        self.emit(Step::Restore, StepStatus::Started);
        let report = match self.engine.sync_and_restore_from_cloud(self.store).await {
            Ok(report) => report,
            Err(err) => {
                self.emit(Step::Restore, StepStatus::Failed);
                return Err(err);
            }
        };

        if report.is_clean() {
            self.emit(Step::Restore, StepStatus::Completed);
            self.refresh_identity().await;
        } else {
            warn!(
                "Restore finished with {} failures, identity marker left as is",
                report.failures.len()
            );
            self.emit(Step::Restore, StepStatus::Failed);
            self.emit(Step::IdentityRefresh, StepStatus::Skipped);
        }
        Ok(Some(report))
    }

    /// Upload pass followed by a marker refresh when it went through cleanly.
    pub async fn upload(&self) -> SyncResult<SyncReport> {
        self.emit(Step::Upload, StepStatus::Started);
        let report = match self.engine.sync_to_cloud(self.store).await {
            Ok(report) => report,
            Err(err) => {
                self.emit(Step::Upload, StepStatus::Failed);
                return Err(err);
            }
        };

        if report.skipped {
            self.emit(Step::Upload, StepStatus::Skipped);
            self.emit(Step::IdentityRefresh, StepStatus::Skipped);
        } else if report.is_clean() {
            self.emit(Step::Upload, StepStatus::Completed);
            self.refresh_identity().await;
        } else {
            self.emit(Step::Upload, StepStatus::Failed);
            self.emit(Step::IdentityRefresh, StepStatus::Skipped);
        }
        Ok(report)
    }

    fn launch_game(&self) {
        if self.game.is_running() {
            info!("Minecraft is already running");
            self.emit(Step::Launch, StepStatus::Skipped);
            return;
        }
        if !self.launch.enabled {
            info!("Launching disabled, start the game manually");
            self.emit(Step::Launch, StepStatus::Skipped);
            return;
        }

        self.emit(Step::Launch, StepStatus::Started);
        let launched = match &self.launch.launcher {
            Some(path) => self.game.launch(path),
            None => {
                warn!("No launcher configured, start the game manually");
                false
            }
        };
        let status = if launched {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        self.emit(Step::Launch, status);
    }

    /// The whole run. Waiting on the game has no timeout.
    ///
    /// When the store cannot be reached for the identity check the game is
    /// still launched, but neither restore nor upload runs.
    pub async fn run(&self) -> SyncResult<RunOutcome> {
        let gate = match self.check_identity().await {
            Ok(state) => Some(state),
            Err(err) => {
                warn!("Identity check failed, playing without sync: {}", err);
                self.emit(Step::Restore, StepStatus::Skipped);
                None
            }
        };
        let restore = match gate {
            Some(state) => self.restore_for(state, false).await?,
            None => None,
        };

        self.launch_game();

        self.emit(Step::WaitForStart, StepStatus::Started);
        wait_until_running(self.game, self.launch.poll_interval).await;
        self.emit(Step::WaitForStart, StepStatus::Completed);

        self.emit(Step::WaitForExit, StepStatus::Started);
        wait_until_exited(self.game, self.launch.poll_interval).await;
        self.emit(Step::WaitForExit, StepStatus::Completed);

        // Uploading over a half-restored tree would push missing worlds as deletions.
        let upload = match (&gate, &restore) {
            (None, _) => {
                warn!("Cloud state unknown, skipping upload");
                self.emit(Step::Upload, StepStatus::Skipped);
                None
            }
            (_, Some(report)) if !report.is_clean() => {
                warn!(
                    "Restore had failures, skipping upload; check {:?}",
                    self.engine.saves().backup_dir()
                );
                self.emit(Step::Upload, StepStatus::Skipped);
                None
            }
            _ => Some(self.upload().await?),
        };

        Ok(RunOutcome {
            gate,
            restore,
            upload,
        })
    }
}
