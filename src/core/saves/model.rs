use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::archive::archive_name;

/// Directory holding the worlds inside a modpack instance.
pub const INSTANCE_SAVES_DIR: &str = "saves";

/// How worlds are laid out under the saves root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LayoutMode {
    /// Every immediate subdirectory is a world (`.minecraft/saves`).
    #[serde(rename = "vanilla", alias = "flat")]
    Flat,
    /// Every immediate subdirectory is a modpack instance holding its worlds
    /// under `<instance>/saves/<world>` (CurseForge `Instances`).
    #[serde(rename = "curseforge", alias = "nested", alias = "modded")]
    Nested,
}

impl LayoutMode {
    /// Name of the remote folder mirroring this layout.
    pub fn remote_folder_name(self) -> &'static str {
        match self {
            LayoutMode::Flat => "Vanilla",
            LayoutMode::Nested => "Modded",
        }
    }
}

impl std::fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutMode::Flat => write!(f, "vanilla"),
            LayoutMode::Nested => write!(f, "curseforge"),
        }
    }
}

impl std::str::FromStr for LayoutMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vanilla" | "flat" => Ok(LayoutMode::Flat),
            "curseforge" | "nested" | "modded" => Ok(LayoutMode::Nested),
            other => Err(format!(
                "unknown layout '{other}', expected 'vanilla' or 'curseforge'"
            )),
        }
    }
}

/// One world on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalWorldEntry {
    /// Modpack instance owning the world; `None` in the flat layout.
    pub instance: Option<String>,
    pub world: String,
    /// Absolute path of the world directory.
    pub path: PathBuf,
}

impl LocalWorldEntry {
    /// Correlation key shared with the remote side: `world1` or
    /// `instanceA/saves/survival`.
    pub fn key(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{instance}/{INSTANCE_SAVES_DIR}/{}", self.world),
            None => self.world.clone(),
        }
    }

    /// Path relative to the saves root.
    pub fn relative_path(&self) -> PathBuf {
        match &self.instance {
            Some(instance) => PathBuf::from(instance)
                .join(INSTANCE_SAVES_DIR)
                .join(&self.world),
            None => PathBuf::from(&self.world),
        }
    }

    /// Title of the remote archive holding this world.
    pub fn archive_title(&self) -> String {
        archive_name(&self.world)
    }
}
