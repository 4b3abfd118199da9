// ─── Storage Client ───
// Abstract remote object store plus the concrete backends.

pub mod drive;
pub mod memory;
pub mod model;
pub mod retry;

use async_trait::async_trait;
use md5::{Digest, Md5};
use tracing::{debug, info, warn};

use crate::core::error::{SyncError, SyncResult};

pub use drive::DriveStore;
pub use memory::MemoryStore;
pub use model::{EntryKind, EntryQuery, FileRef, FolderRef, RemoteEntry};
pub use retry::{RetryPolicy, RetryingStore};

/// Remote folder/file store the sync engine talks to.
///
/// Every call is a remote round trip: slow, possibly failing, and never
/// atomic with respect to other calls. A second actor may interleave.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn query(&self, query: &EntryQuery) -> SyncResult<Vec<RemoteEntry>>;

    async fn create_folder(&self, name: &str, parent: Option<&FolderRef>)
        -> SyncResult<FolderRef>;

    async fn upload_content(
        &self,
        parent: &FolderRef,
        title: &str,
        bytes: Vec<u8>,
    ) -> SyncResult<FileRef>;

    /// Delete a file or a folder (with everything below it).
    async fn delete_entry(&self, id: &str) -> SyncResult<()>;

    async fn download_content(&self, file: &FileRef) -> SyncResult<Vec<u8>>;

    /// Canonical folder called `name` under `parent`.
    ///
    /// The store does not enforce unique names, so two actors can create
    /// duplicates. The one with the smallest id wins so that every caller
    /// settles on the same folder.
    async fn find_folder(
        &self,
        name: &str,
        parent: Option<&FolderRef>,
    ) -> SyncResult<Option<FolderRef>> {
        let mut folders: Vec<FolderRef> = self
            .query(&EntryQuery::folder_named(name, parent))
            .await?
            .iter()
            .filter_map(RemoteEntry::as_folder)
            .collect();
        folders.sort_by(|a, b| a.id.cmp(&b.id));

        if folders.len() > 1 {
            warn!(
                "{} folders named '{}' found, using {}",
                folders.len(),
                name,
                folders[0].id
            );
        }

        Ok(folders.into_iter().next())
    }

    async fn list_children(&self, folder: &FolderRef) -> SyncResult<Vec<RemoteEntry>> {
        self.query(&EntryQuery::children_of(folder)).await
    }
}

/// Find-or-create. Calling it twice for the same (name, parent) returns the
/// same folder and creates at most one.
pub async fn resolve_folder(
    store: &dyn StorageClient,
    name: &str,
    parent: Option<&FolderRef>,
) -> SyncResult<FolderRef> {
    if let Some(folder) = store.find_folder(name, parent).await? {
        debug!("Using remote folder '{}' ({})", name, folder.id);
        return Ok(folder);
    }

    let folder = store.create_folder(name, parent).await?;
    info!("Created remote folder '{}' ({})", name, folder.id);
    Ok(folder)
}

/// Download a file and check it against the store's checksum when present.
pub async fn download_verified(store: &dyn StorageClient, file: &FileRef) -> SyncResult<Vec<u8>> {
    let bytes = store.download_content(file).await?;

    if let Some(expected) = file.md5.as_deref() {
        let actual = md5_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(SyncError::Md5Mismatch {
                title: file.title.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    Ok(bytes)
}

pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_folder_is_idempotent() {
        let store = MemoryStore::new();

        let first = resolve_folder(&store, "MinecraftBackups", None).await.unwrap();
        let second = resolve_folder(&store, "MinecraftBackups", None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.folders_created().await, 1);
    }

    #[tokio::test]
    async fn resolve_folder_scopes_by_parent() {
        let store = MemoryStore::new();
        let root = resolve_folder(&store, "MinecraftBackups", None).await.unwrap();

        let vanilla = resolve_folder(&store, "Vanilla", Some(&root)).await.unwrap();
        let modded = resolve_folder(&store, "Modded", Some(&root)).await.unwrap();
        let vanilla_again = resolve_folder(&store, "Vanilla", Some(&root)).await.unwrap();

        assert_ne!(vanilla, modded);
        assert_eq!(vanilla, vanilla_again);
        assert_eq!(store.folders_created().await, 3);
    }

    #[tokio::test]
    async fn duplicate_folders_resolve_to_smallest_id() {
        let store = MemoryStore::new();
        let first = store.create_folder("Vanilla", None).await.unwrap();
        let _second = store.create_folder("Vanilla", None).await.unwrap();

        let found = store.find_folder("Vanilla", None).await.unwrap();
        assert_eq!(found, Some(first));
    }

    #[tokio::test]
    async fn download_verified_rejects_corrupt_content() {
        let store = MemoryStore::new();
        let root = store.create_folder("root", None).await.unwrap();
        let mut file = store
            .upload_content(&root, "world.zip", b"payload".to_vec())
            .await
            .unwrap();

        assert_eq!(download_verified(&store, &file).await.unwrap(), b"payload");

        file.md5 = Some(md5_hex(b"something else"));
        let err = download_verified(&store, &file).await.unwrap_err();
        assert!(matches!(err, SyncError::Md5Mismatch { .. }));
    }
}
