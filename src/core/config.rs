// ─── Configuration ───
// Resolved once at startup: OS defaults, then settings.json, then CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{SyncError, SyncResult};
use crate::core::lifecycle::DEFAULT_POLL_INTERVAL;
use crate::core::saves::{LayoutMode, SaveTree};
use crate::core::sync::DEFAULT_CLOUD_ROOT;

const APP_DIR_NAME: &str = "craftsync";
const SETTINGS_FILE: &str = "settings.json";
const MACHINE_ID_FILE: &str = "machine_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    pub fn current() -> SyncResult<Self> {
        match std::env::consts::OS {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            other => Err(SyncError::UnsupportedPlatform(other.to_string())),
        }
    }
}

/// Optional `<config dir>/craftsync/settings.json`. Every field may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SettingsFile {
    pub layout: Option<LayoutMode>,
    pub saves_root: Option<PathBuf>,
    pub launcher_path: Option<PathBuf>,
    pub cloud_root: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub drive_token: Option<String>,
}

impl SettingsFile {
    /// A missing file is the empty settings; an unreadable one is logged and ignored.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Cannot read settings {:?}: {}", path, e);
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Ignoring malformed settings {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE))
    }
}

/// Command-line values; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub layout: Option<LayoutMode>,
    pub saves_root: Option<PathBuf>,
    pub launcher_path: Option<PathBuf>,
    pub cloud_root: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub no_launch: bool,
    pub drive_token: Option<String>,
    pub settings_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub layout: LayoutMode,
    pub saves_root: PathBuf,
    pub launcher_path: Option<PathBuf>,
    pub cloud_root: String,
    pub poll_interval: Duration,
    pub launch_enabled: bool,
    pub machine_id_path: PathBuf,
    pub drive_token: Option<String>,
}

impl Config {
    /// Resolve against the current machine.
    pub fn resolve(overrides: Overrides) -> SyncResult<Self> {
        let platform = Platform::current()?;
        let home = dirs::home_dir()
            .ok_or_else(|| SyncError::Config("cannot determine the home directory".into()))?;
        let data_dir = dirs::data_dir()
            .ok_or_else(|| SyncError::Config("cannot determine the data directory".into()))?;

        let settings = overrides
            .settings_path
            .clone()
            .or_else(SettingsFile::default_path)
            .map(|path| SettingsFile::load(&path))
            .unwrap_or_default();

        Self::resolve_with(platform, &home, &data_dir, settings, overrides)
    }

    /// Pure resolution: CLI over settings file over OS defaults.
    pub fn resolve_with(
        platform: Platform,
        home: &Path,
        data_dir: &Path,
        settings: SettingsFile,
        overrides: Overrides,
    ) -> SyncResult<Self> {
        let layout = overrides
            .layout
            .or(settings.layout)
            .unwrap_or(LayoutMode::Flat);

        let saves_root = overrides
            .saves_root
            .or(settings.saves_root)
            .unwrap_or_else(|| default_saves_root(platform, layout, home, data_dir));

        let launcher_path = overrides
            .launcher_path
            .or(settings.launcher_path)
            .or_else(|| default_launcher(platform, layout, home));

        let cloud_root = overrides
            .cloud_root
            .or(settings.cloud_root)
            .unwrap_or_else(|| DEFAULT_CLOUD_ROOT.to_string());
        if cloud_root.trim().is_empty() {
            return Err(SyncError::Config("cloud root name is empty".into()));
        }

        let poll_interval = match overrides.poll_interval_secs.or(settings.poll_interval_secs) {
            Some(0) => {
                return Err(SyncError::Config(
                    "poll interval must be at least 1 second".into(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_POLL_INTERVAL,
        };

        let drive_token = overrides
            .drive_token
            .or(settings.drive_token)
            .filter(|token| !token.trim().is_empty());

        Ok(Self {
            layout,
            saves_root,
            launcher_path,
            cloud_root,
            poll_interval,
            launch_enabled: !overrides.no_launch,
            machine_id_path: data_dir.join(APP_DIR_NAME).join(MACHINE_ID_FILE),
            drive_token,
        })
    }

    /// The saves root must exist before anything touches the remote.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.saves_root.is_dir() {
            return Err(SyncError::SavesRootMissing(self.saves_root.clone()));
        }
        Ok(())
    }

    pub fn saves_tree(&self) -> SaveTree {
        SaveTree::new(self.saves_root.clone(), self.layout)
    }
}

fn default_saves_root(
    platform: Platform,
    layout: LayoutMode,
    home: &Path,
    data_dir: &Path,
) -> PathBuf {
    match (layout, platform) {
        (LayoutMode::Flat, Platform::Windows) => data_dir.join(".minecraft").join("saves"),
        (LayoutMode::Flat, Platform::Linux) => home.join(".minecraft").join("saves"),
        (LayoutMode::Flat, Platform::MacOs) => data_dir.join("minecraft").join("saves"),
        (LayoutMode::Nested, _) => home.join("curseforge").join("minecraft").join("Instances"),
    }
}

fn default_launcher(platform: Platform, layout: LayoutMode, home: &Path) -> Option<PathBuf> {
    let path = match (layout, platform) {
        (LayoutMode::Flat, Platform::Windows) => {
            PathBuf::from(r"C:\Program Files (x86)\Minecraft Launcher\MinecraftLauncher.exe")
        }
        (LayoutMode::Flat, Platform::Linux) => PathBuf::from("/usr/bin/minecraft-launcher"),
        (LayoutMode::Flat, Platform::MacOs) => {
            PathBuf::from("/Applications/Minecraft.app/Contents/MacOS/launcher")
        }
        (LayoutMode::Nested, Platform::Windows) => home
            .join("AppData")
            .join("Local")
            .join("Programs")
            .join("CurseForge Windows")
            .join("CurseForge.exe"),
        (LayoutMode::Nested, Platform::MacOs) => {
            PathBuf::from("/Applications/CurseForge.app/Contents/MacOS/CurseForge")
        }
        (LayoutMode::Nested, Platform::Linux) => return None,
    };
    Some(path)
}
