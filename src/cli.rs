use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::core::config::Overrides;
use crate::core::saves::LayoutMode;

/// Back up Minecraft worlds to a cloud folder and restore them on the next
/// machine you play on.
#[derive(Debug, Parser)]
#[command(name = "craftsync", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    /// What to do. Defaults to a full `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Args)]
pub struct GlobalOptions {
    /// Save layout: `vanilla` (.minecraft/saves) or `curseforge` (modpack instances).
    #[arg(long = "type", value_name = "LAYOUT", global = true)]
    pub layout: Option<LayoutMode>,

    /// Saves root; defaults to the platform location for the layout.
    #[arg(long, global = true)]
    pub saves_root: Option<PathBuf>,

    /// Launcher executable started when the game is not running.
    #[arg(long, global = true)]
    pub launcher: Option<PathBuf>,

    /// Name of the top-level cloud folder.
    #[arg(long, global = true)]
    pub cloud_root: Option<String>,

    /// Seconds between game process checks.
    #[arg(long, value_name = "SECS", global = true)]
    pub poll_interval: Option<u64>,

    /// Never start the launcher; wait for the game to be started by hand.
    #[arg(long, global = true)]
    pub no_launch: bool,

    /// Google Drive OAuth access token.
    #[arg(long, env = "CRAFTSYNC_DRIVE_TOKEN", hide_env_values = true, global = true)]
    pub drive_token: Option<String>,

    /// Use a throwaway in-memory store instead of Google Drive.
    #[arg(long, global = true)]
    pub memory_store: bool,

    /// Settings file to read instead of the default one.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Restore if needed, play, then upload.
    Run,
    /// Upload the local saves now.
    Upload,
    /// Restore from the cloud now.
    Restore {
        /// Restore even when this machine wrote the cloud copy last.
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration and identity state as JSON.
    Status,
}

impl GlobalOptions {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            layout: self.layout,
            saves_root: self.saves_root.clone(),
            launcher_path: self.launcher.clone(),
            cloud_root: self.cloud_root.clone(),
            poll_interval_secs: self.poll_interval,
            no_launch: self.no_launch,
            drive_token: self.drive_token.clone(),
            settings_path: self.settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_run_with_no_overrides() {
        let cli = Cli::try_parse_from(["craftsync"]).unwrap();
        assert!(cli.command.is_none());
        let overrides = cli.options.overrides();
        assert_eq!(overrides.layout, None);
        assert!(!overrides.no_launch);
    }

    #[test]
    fn parses_layout_and_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "craftsync",
            "restore",
            "--force",
            "--type",
            "curseforge",
            "--memory-store",
            "--poll-interval",
            "2",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Restore { force: true })));
        assert_eq!(cli.options.layout, Some(LayoutMode::Nested));
        assert!(cli.options.memory_store);
        assert_eq!(cli.options.poll_interval, Some(2));
    }

    #[test]
    fn rejects_unknown_layout() {
        assert!(Cli::try_parse_from(["craftsync", "--type", "bedrock"]).is_err());
    }
}
