use crate::core::error::SyncResult;
use crate::core::saves::LayoutMode;
use crate::core::storage::{resolve_folder, FolderRef, StorageClient};

pub const DEFAULT_CLOUD_ROOT: &str = "MinecraftBackups";

/// The three folders every pass works against:
/// `<root>/Vanilla` and `<root>/Modded`.
#[derive(Debug, Clone)]
pub struct RemoteLayout {
    pub root: FolderRef,
    pub vanilla: FolderRef,
    pub modded: FolderRef,
}

impl RemoteLayout {
    /// Find-or-create the root and both scope folders.
    pub async fn resolve(store: &dyn StorageClient, root_name: &str) -> SyncResult<Self> {
        let root = resolve_folder(store, root_name, None).await?;
        let vanilla =
            resolve_folder(store, LayoutMode::Flat.remote_folder_name(), Some(&root)).await?;
        let modded =
            resolve_folder(store, LayoutMode::Nested.remote_folder_name(), Some(&root)).await?;

        Ok(Self {
            root,
            vanilla,
            modded,
        })
    }
}
