// ─── Lifecycle Controller ───
// Finds the running game, starts the launcher and waits on the game process.

pub mod process;
pub mod wait;

use std::path::Path;

pub use process::{is_minecraft_process, SysinfoGame};
pub use wait::{wait_until_exited, wait_until_running, DEFAULT_POLL_INTERVAL};

/// The external game as seen from a sync run.
pub trait GameProcess: Send + Sync {
    fn is_running(&self) -> bool;

    /// Start the launcher at `launcher`. Returns `false` when nothing could
    /// be started; the caller carries on regardless.
    fn launch(&self, launcher: &Path) -> bool;
}
