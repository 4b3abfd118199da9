// ─── Machine Identity Gate ───
// Decides whether this machine needs a restore, by comparing its own id with
// the id recorded by whichever machine last touched the cloud copy.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{SyncError, SyncResult};
use crate::core::storage::{download_verified, EntryQuery, FolderRef, RemoteEntry, StorageClient};

pub const MARKER_FILE_NAME: &str = "machine_id.json";

/// `{"machine_id": "..."}`, stored under the saves root and in the sync root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineIdentityMarker {
    pub machine_id: String,
}

impl MachineIdentityMarker {
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
        }
    }

    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub async fn load(path: &Path) -> SyncResult<Option<Self>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SyncError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub async fn save(&self, path: &Path) -> SyncResult<()> {
        tokio::fs::write(path, self.to_bytes()?)
            .await
            .map_err(|source| SyncError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Outcome of the identity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// The cloud copy was last written by another machine, or nobody.
    Unverified,
    /// This machine wrote the cloud copy last; its saves are current.
    Verified,
}

impl GateState {
    pub fn restore_required(self) -> bool {
        self == GateState::Unverified
    }
}

/// Compares the remote marker with this machine's id and rewrites both
/// copies once this machine has become the last writer.
///
/// It only avoids redundant restores. Two machines playing at once can
/// still overwrite each other.
pub struct IdentityGate {
    machine_id: String,
    local_marker_path: PathBuf,
}

impl IdentityGate {
    pub fn new(machine_id: impl Into<String>, saves_root: &Path) -> Self {
        Self {
            machine_id: machine_id.into(),
            local_marker_path: saves_root.join(MARKER_FILE_NAME),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn local_marker_path(&self) -> &Path {
        &self.local_marker_path
    }

    pub async fn local_marker(&self) -> SyncResult<Option<MachineIdentityMarker>> {
        MachineIdentityMarker::load(&self.local_marker_path).await
    }

    pub async fn remote_marker(
        &self,
        store: &dyn StorageClient,
        root: &FolderRef,
    ) -> SyncResult<Option<MachineIdentityMarker>> {
        let mut markers = remote_marker_entries(store, root).await?;
        // Newest first; a leftover duplicate must not shadow the latest write.
        markers.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));

        let Some(file) = markers.first().and_then(RemoteEntry::as_file) else {
            return Ok(None);
        };

        let bytes = download_verified(store, &file).await?;
        match MachineIdentityMarker::from_bytes(&bytes) {
            Ok(marker) => Ok(Some(marker)),
            Err(err) => {
                warn!("Ignoring unreadable remote identity marker: {}", err);
                Ok(None)
            }
        }
    }

    pub async fn check(
        &self,
        store: &dyn StorageClient,
        root: &FolderRef,
    ) -> SyncResult<GateState> {
        let state = match self.remote_marker(store, root).await? {
            None => {
                info!("No remote identity marker, restore required");
                GateState::Unverified
            }
            Some(marker) if marker.machine_id == self.machine_id => {
                info!("Cloud saves were last written by this machine");
                GateState::Verified
            }
            Some(marker) => {
                info!(
                    "Cloud saves were last written by {}, restore required",
                    marker.machine_id
                );
                GateState::Unverified
            }
        };
        Ok(state)
    }

    /// Record this machine as the last writer, locally and remotely.
    ///
    /// The new remote marker is uploaded before the old ones are removed.
    pub async fn refresh(&self, store: &dyn StorageClient, root: &FolderRef) -> SyncResult<()> {
        let marker = MachineIdentityMarker::new(self.machine_id.clone());
        if let Some(parent) = self.local_marker_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SyncError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        marker.save(&self.local_marker_path).await?;

        let previous = remote_marker_entries(store, root).await?;
        let uploaded = store
            .upload_content(root, MARKER_FILE_NAME, marker.to_bytes()?)
            .await?;

        for old in previous.iter().filter(|entry| entry.id != uploaded.id) {
            if let Err(err) = store.delete_entry(&old.id).await {
                warn!("Cannot delete previous identity marker {}: {}", old.id, err);
            }
        }

        debug!("Identity marker refreshed for {}", self.machine_id);
        Ok(())
    }
}

async fn remote_marker_entries(
    store: &dyn StorageClient,
    root: &FolderRef,
) -> SyncResult<Vec<RemoteEntry>> {
    store
        .query(&EntryQuery::file_named(MARKER_FILE_NAME, root))
        .await
}

/// This machine's own stable id: read from `path`, or generated and
/// persisted there on first use.
pub fn load_or_create_machine_id(path: &Path) -> SyncResult<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => return Ok(raw.trim().to_string()),
        Ok(_) => warn!("Empty machine id file {:?}, generating a new id", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(SyncError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let id = Uuid::new_v4().to_string();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SyncError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, &id).map_err(|source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Generated machine id {}", id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::{resolve_folder, MemoryStore};

    #[tokio::test]
    async fn missing_remote_marker_requires_restore() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let root = resolve_folder(&store, "MinecraftBackups", None).await.unwrap();

        let gate = IdentityGate::new("machine-a", tmp.path());
        assert_eq!(gate.check(&store, &root).await.unwrap(), GateState::Unverified);
    }

    #[tokio::test]
    async fn matching_marker_is_verified() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let root = resolve_folder(&store, "MinecraftBackups", None).await.unwrap();
        let marker = MachineIdentityMarker::new("machine-a");
        store
            .upload_content(&root, MARKER_FILE_NAME, marker.to_bytes().unwrap())
            .await
            .unwrap();

        let gate = IdentityGate::new("machine-a", tmp.path());
        let state = gate.check(&store, &root).await.unwrap();
        assert_eq!(state, GateState::Verified);
        assert!(!state.restore_required());
    }

    #[tokio::test]
    async fn foreign_marker_is_unverified_until_refreshed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let root = resolve_folder(&store, "MinecraftBackups", None).await.unwrap();
        store
            .upload_content(
                &root,
                MARKER_FILE_NAME,
                MachineIdentityMarker::new("machine-b").to_bytes().unwrap(),
            )
            .await
            .unwrap();

        let gate = IdentityGate::new("machine-a", tmp.path());
        assert_eq!(gate.check(&store, &root).await.unwrap(), GateState::Unverified);

        gate.refresh(&store, &root).await.unwrap();

        assert_eq!(gate.check(&store, &root).await.unwrap(), GateState::Verified);
        assert_eq!(store.titles_in(&root).await, vec![MARKER_FILE_NAME]);
        assert_eq!(
            gate.local_marker().await.unwrap(),
            Some(MachineIdentityMarker::new("machine-a"))
        );
    }

    #[tokio::test]
    async fn garbage_remote_marker_counts_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let root = resolve_folder(&store, "MinecraftBackups", None).await.unwrap();
        store
            .upload_content(&root, MARKER_FILE_NAME, b"not json".to_vec())
            .await
            .unwrap();

        let gate = IdentityGate::new("machine-a", tmp.path());
        assert_eq!(gate.check(&store, &root).await.unwrap(), GateState::Unverified);
    }

    #[test]
    fn marker_wire_format() {
        let marker = MachineIdentityMarker::new("abc");
        assert_eq!(marker.to_bytes().unwrap(), br#"{"machine_id":"abc"}"#);
    }

    #[test]
    fn machine_id_is_generated_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("craftsync").join("machine_id");

        let first = load_or_create_machine_id(&path).unwrap();
        let second = load_or_create_machine_id(&path).unwrap();

        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
