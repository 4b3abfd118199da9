use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::model::{EntryKind, EntryQuery, FileRef, FolderRef, RemoteEntry};
use super::{md5_hex, StorageClient};
use crate::core::error::{SyncError, SyncResult};

struct Node {
    entry: RemoteEntry,
    content: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    next_id: u64,
    folders_created: usize,
    failing_uploads: HashSet<String>,
    failing_deletes: HashSet<String>,
    /// Names whose next create, upload or delete applies and then errors.
    landed_failures: HashSet<String>,
    downloads_down: bool,
}

impl Inner {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem-{:08}", self.next_id)
    }

    fn ensure_folder(&self, id: &str) -> SyncResult<()> {
        match self.nodes.get(id) {
            Some(node) if node.entry.is_folder() => Ok(()),
            _ => Err(SyncError::NotFound(id.to_string())),
        }
    }

    fn descendants_of(&self, id: &str) -> Vec<String> {
        let mut pending = vec![id.to_string()];
        let mut found = Vec::new();
        while let Some(current) = pending.pop() {
            for (child_id, node) in &self.nodes {
                if node.entry.parent.as_deref() == Some(current.as_str()) {
                    pending.push(child_id.clone());
                }
            }
            found.push(current);
        }
        found
    }
}

/// In-process store. Backs the test suite and `--memory-store` dry runs.
///
/// Ids are allocated in increasing order, so the oldest of two duplicate
/// folders is also the canonical one.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of folders created since construction.
    pub async fn folders_created(&self) -> usize {
        self.inner.lock().await.folders_created
    }

    /// Make every upload with this title fail with a server error.
    pub async fn fail_uploads_titled(&self, title: &str) {
        self.inner
            .lock()
            .await
            .failing_uploads
            .insert(title.to_string());
    }

    /// Make deleting any entry with this title fail with a server error.
    pub async fn fail_deletes_titled(&self, title: &str) {
        self.inner
            .lock()
            .await
            .failing_deletes
            .insert(title.to_string());
    }

    /// Make every download fail with a server error.
    pub async fn fail_downloads(&self) {
        self.inner.lock().await.downloads_down = true;
    }

    /// Let the next create, upload or delete of this name take effect and
    /// still report a server error, as a request that timed out late would.
    pub async fn fail_once_after_applying(&self, name: &str) {
        self.inner
            .lock()
            .await
            .landed_failures
            .insert(name.to_string());
    }

    /// Sorted titles of the children of `folder`.
    pub async fn titles_in(&self, folder: &FolderRef) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut titles: Vec<String> = inner
            .nodes
            .values()
            .filter(|node| node.entry.parent.as_deref() == Some(&folder.id))
            .map(|node| node.entry.title.clone())
            .collect();
        titles.sort();
        titles
    }

    /// Raw content of a file, bypassing failure injection.
    pub async fn content_of(&self, id: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().await;
        inner.nodes.get(id).map(|node| node.content.clone())
    }
}

fn injected_failure(operation: &str, title: &str) -> SyncError {
    SyncError::RemoteStatus {
        operation: operation.to_string(),
        status: 503,
        body: format!("injected failure for {title}"),
    }
}

#[async_trait]
impl StorageClient for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn query(&self, query: &EntryQuery) -> SyncResult<Vec<RemoteEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .nodes
            .values()
            .filter(|node| query.matches(&node.entry, false))
            .map(|node| node.entry.clone())
            .collect())
    }

    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&FolderRef>,
    ) -> SyncResult<FolderRef> {
        let mut inner = self.inner.lock().await;
        if let Some(parent) = parent {
            inner.ensure_folder(&parent.id)?;
        }

        let id = inner.allocate_id();
        inner.nodes.insert(
            id.clone(),
            Node {
                entry: RemoteEntry {
                    id: id.clone(),
                    title: name.to_string(),
                    kind: EntryKind::Folder,
                    parent: parent.map(|p| p.id.clone()),
                    modified_at: Some(Utc::now()),
                    md5: None,
                },
                content: Vec::new(),
            },
        );
        inner.folders_created += 1;
        if inner.landed_failures.remove(name) {
            return Err(injected_failure("create folder", name));
        }

        Ok(FolderRef {
            id,
            name: name.to_string(),
        })
    }

    async fn upload_content(
        &self,
        parent: &FolderRef,
        title: &str,
        bytes: Vec<u8>,
    ) -> SyncResult<FileRef> {
        let mut inner = self.inner.lock().await;
        if inner.failing_uploads.contains(title) {
            return Err(injected_failure("upload", title));
        }
        inner.ensure_folder(&parent.id)?;

        let id = inner.allocate_id();
        let md5 = md5_hex(&bytes);
        inner.nodes.insert(
            id.clone(),
            Node {
                entry: RemoteEntry {
                    id: id.clone(),
                    title: title.to_string(),
                    kind: EntryKind::File,
                    parent: Some(parent.id.clone()),
                    modified_at: Some(Utc::now()),
                    md5: Some(md5.clone()),
                },
                content: bytes,
            },
        );
        if inner.landed_failures.remove(title) {
            return Err(injected_failure("upload", title));
        }

        Ok(FileRef {
            id,
            title: title.to_string(),
            md5: Some(md5),
        })
    }

    async fn delete_entry(&self, id: &str) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        let title = match inner.nodes.get(id) {
            Some(node) => node.entry.title.clone(),
            _ => return Err(SyncError::NotFound(id.to_string())),
        };
        if inner.failing_deletes.contains(&title) {
            return Err(injected_failure("delete", &title));
        }

        for doomed in inner.descendants_of(id) {
            inner.nodes.remove(&doomed);
        }
        if inner.landed_failures.remove(&title) {
            return Err(injected_failure("delete", &title));
        }
        Ok(())
    }

    async fn download_content(&self, file: &FileRef) -> SyncResult<Vec<u8>> {
        let inner = self.inner.lock().await;
        if inner.downloads_down {
            return Err(injected_failure("download", &file.title));
        }
        match inner.nodes.get(&file.id) {
            Some(node) if !node.entry.is_folder() => Ok(node.content.clone()),
            _ => Err(SyncError::NotFound(file.title.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deleting_a_folder_removes_its_subtree() {
        let store = MemoryStore::new();
        let root = store.create_folder("root", None).await.unwrap();
        let instance = store.create_folder("instanceA", Some(&root)).await.unwrap();
        let save = store
            .upload_content(&instance, "survival.zip", vec![1, 2, 3])
            .await
            .unwrap();

        store.delete_entry(&instance.id).await.unwrap();

        assert!(store.titles_in(&root).await.is_empty());
        assert!(store.content_of(&save.id).await.is_none());
    }

    #[tokio::test]
    async fn upload_into_missing_folder_fails() {
        let store = MemoryStore::new();
        let ghost = FolderRef {
            id: "mem-404".into(),
            name: "ghost".into(),
        };
        let err = store
            .upload_content(&ghost, "world.zip", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn injected_upload_failure_is_transient() {
        let store = MemoryStore::new();
        let root = store.create_folder("root", None).await.unwrap();
        store.fail_uploads_titled("world.zip").await;

        let err = store
            .upload_content(&root, "world.zip", Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(store.titles_in(&root).await.is_empty());
    }

    #[tokio::test]
    async fn landed_failure_applies_once_then_errors() {
        let store = MemoryStore::new();
        let root = store.create_folder("root", None).await.unwrap();
        store.fail_once_after_applying("world.zip").await;

        let err = store
            .upload_content(&root, "world.zip", vec![1])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.titles_in(&root).await, vec!["world.zip"]);

        store.upload_content(&root, "world.zip", vec![2]).await.unwrap();
        assert_eq!(store.titles_in(&root).await.len(), 2);
    }

    #[tokio::test]
    async fn deleting_twice_reports_not_found() {
        let store = MemoryStore::new();
        let root = store.create_folder("root", None).await.unwrap();
        let file = store.upload_content(&root, "a.zip", Vec::new()).await.unwrap();

        store.delete_entry(&file.id).await.unwrap();
        let err = store.delete_entry(&file.id).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }
}
