use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::model::{LayoutMode, LocalWorldEntry, INSTANCE_SAVES_DIR};
use crate::core::error::{SyncError, SyncResult};

/// Sibling of the saves root receiving pre-restore copies.
const BACKUP_DIR_NAME: &str = "backupsSave";

/// Reads and mutates the local save tree. Nothing else writes under the root.
#[derive(Debug, Clone)]
pub struct SaveTree {
    root: PathBuf,
    mode: LayoutMode,
}

impl SaveTree {
    pub fn new(root: PathBuf, mode: LayoutMode) -> Self {
        Self { root, mode }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    /// `<root>/../backupsSave`
    pub fn backup_dir(&self) -> PathBuf {
        match self.root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(BACKUP_DIR_NAME),
            _ => self.root.join("..").join(BACKUP_DIR_NAME),
        }
    }

    /// `<root>/<instance>/saves`
    pub fn instance_saves_dir(&self, instance: &str) -> PathBuf {
        self.root.join(instance).join(INSTANCE_SAVES_DIR)
    }

    /// Every world under the root for the active layout, sorted by key.
    pub async fn list_entries(&self) -> SyncResult<Vec<LocalWorldEntry>> {
        let mut entries = Vec::new();

        match self.mode {
            LayoutMode::Flat => {
                for (world, path) in read_subdirs(&self.root).await? {
                    entries.push(LocalWorldEntry {
                        instance: None,
                        world,
                        path,
                    });
                }
            }
            LayoutMode::Nested => {
                for instance in self.list_instances().await? {
                    let saves_dir = self.instance_saves_dir(&instance);
                    let worlds = read_subdirs(&saves_dir).await?;
                    if worlds.is_empty() {
                        warn!("Instance '{}' has no saves", instance);
                        continue;
                    }
                    for (world, path) in worlds {
                        entries.push(LocalWorldEntry {
                            instance: Some(instance.clone()),
                            world,
                            path,
                        });
                    }
                }
            }
        }

        entries.sort_by_key(LocalWorldEntry::key);
        debug!("Found {} local worlds under {:?}", entries.len(), self.root);
        Ok(entries)
    }

    /// Instances that have a `saves` directory. Always empty in the flat layout.
    pub async fn list_instances(&self) -> SyncResult<Vec<String>> {
        if self.mode == LayoutMode::Flat {
            return Ok(Vec::new());
        }

        let mut instances = Vec::new();
        for (instance, path) in read_subdirs(&self.root).await? {
            if path.join(INSTANCE_SAVES_DIR).is_dir() {
                instances.push(instance);
            } else {
                debug!("Skipping '{}': no saves directory", instance);
            }
        }
        Ok(instances)
    }

    /// Delete everything inside `path` but keep `path` itself. A missing
    /// directory is created and counts as cleared.
    pub async fn clear_directory(path: &Path) -> SyncResult<()> {
        if !path.exists() {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|source| SyncError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            return Ok(());
        }

        let mut children = tokio::fs::read_dir(path)
            .await
            .map_err(|source| SyncError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        while let Some(child) = children
            .next_entry()
            .await
            .map_err(|source| SyncError::Io {
                path: path.to_path_buf(),
                source,
            })?
        {
            let child_path = child.path();
            let file_type = child.file_type().await.map_err(|source| SyncError::Io {
                path: child_path.clone(),
                source,
            })?;
            let removed = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&child_path).await
            } else {
                tokio::fs::remove_file(&child_path).await
            };
            removed.map_err(|source| SyncError::Io {
                path: child_path,
                source,
            })?;
        }

        debug!("Cleared {:?}", path);
        Ok(())
    }

    /// Move a world directory, creating the destination's parents.
    ///
    /// A plain rename when possible; when the rename fails (different
    /// filesystems) the tree is copied and the source removed.
    pub async fn move_entry(from: &Path, to: &Path) -> SyncResult<()> {
        if to.exists() {
            return Err(SyncError::DestinationExists(to.to_path_buf()));
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SyncError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        match tokio::fs::rename(from, to).await {
            Ok(()) => {}
            Err(rename_err) => {
                info!(
                    "Rename {:?} -> {:?} failed ({}), copying instead",
                    from, to, rename_err
                );
                let (src, dst) = (from.to_path_buf(), to.to_path_buf());
                tokio::task::spawn_blocking(move || {
                    copy_dir_recursive(&src, &dst)?;
                    std::fs::remove_dir_all(&src).map_err(|e| SyncError::Io {
                        path: src.clone(),
                        source: e,
                    })
                })
                .await
                .map_err(|e| SyncError::Other(format!("move task failed: {e}")))??;
            }
        }

        debug!("Moved {:?} -> {:?}", from, to);
        Ok(())
    }
}

/// Immediate subdirectories of `path` as `(name, path)`, sorted by name.
/// A missing directory yields nothing.
async fn read_subdirs(path: &Path) -> SyncResult<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    if !path.exists() {
        return Ok(found);
    }

    let mut children = tokio::fs::read_dir(path)
        .await
        .map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    while let Some(child) = children
        .next_entry()
        .await
        .map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?
    {
        let child_path = child.path();
        if !child_path.is_dir() {
            continue;
        }
        match child.file_name().into_string() {
            Ok(name) => found.push((name, child_path)),
            Err(raw) => warn!("Skipping directory with non UTF-8 name {:?}", raw),
        }
    }

    found.sort();
    Ok(found)
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> SyncResult<()> {
    std::fs::create_dir_all(destination).map_err(|e| SyncError::Io {
        path: destination.to_path_buf(),
        source: e,
    })?;

    let entries = std::fs::read_dir(source).map_err(|e| SyncError::Io {
        path: source.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = destination.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            std::fs::copy(&src_path, &dst_path).map_err(|e| SyncError::Io {
                path: src_path.clone(),
                source: e,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(root: &Path, rel: &str) {
        let dir = root.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("level.dat"), rel.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn flat_layout_lists_directories_only() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("saves");
        world(&root, "world2");
        world(&root, "world1");
        std::fs::write(root.join("machine_id.json"), b"{}").unwrap();
        std::fs::write(root.join("stray.zip"), b"PK").unwrap();

        let tree = SaveTree::new(root.clone(), LayoutMode::Flat);
        let keys: Vec<String> = tree
            .list_entries()
            .await
            .unwrap()
            .iter()
            .map(LocalWorldEntry::key)
            .collect();

        assert_eq!(keys, vec!["world1", "world2"]);
        assert!(tree.list_instances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nested_layout_skips_instances_without_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Instances");
        world(&root, "instanceA/saves/survival");
        world(&root, "instanceA/saves/creative");
        std::fs::create_dir_all(root.join("instanceB/mods")).unwrap();
        std::fs::create_dir_all(root.join("instanceC/saves")).unwrap();

        let tree = SaveTree::new(root, LayoutMode::Nested);
        let keys: Vec<String> = tree
            .list_entries()
            .await
            .unwrap()
            .iter()
            .map(LocalWorldEntry::key)
            .collect();

        assert_eq!(
            keys,
            vec!["instanceA/saves/creative", "instanceA/saves/survival"]
        );
        assert_eq!(
            tree.list_instances().await.unwrap(),
            vec!["instanceA", "instanceC"]
        );
    }

    #[tokio::test]
    async fn missing_root_has_no_content() {
        let tmp = tempfile::tempdir().unwrap();
        let tree = SaveTree::new(tmp.path().join("nope"), LayoutMode::Flat);
        assert!(tree.list_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_directory_keeps_the_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let backup = tmp.path().join("backupsSave");
        world(&backup, "old/nested");
        std::fs::write(backup.join("loose.txt"), b"x").unwrap();

        SaveTree::clear_directory(&backup).await.unwrap();

        assert!(backup.is_dir());
        assert_eq!(std::fs::read_dir(&backup).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn clear_directory_creates_missing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let backup = tmp.path().join("backupsSave");

        SaveTree::clear_directory(&backup).await.unwrap();
        assert!(backup.is_dir());
    }

    #[tokio::test]
    async fn move_entry_creates_parents_and_refuses_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        world(tmp.path(), "saves/world1");
        let from = tmp.path().join("saves/world1");
        let to = tmp.path().join("backupsSave/instanceA/saves/world1");

        SaveTree::move_entry(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(
            std::fs::read(to.join("level.dat")).unwrap(),
            b"saves/world1"
        );

        world(tmp.path(), "saves/world1");
        let err = SaveTree::move_entry(&from, &to).await.unwrap_err();
        assert!(matches!(err, SyncError::DestinationExists(_)));
        assert!(from.exists());
    }

    #[test]
    fn backup_dir_is_sibling_of_root() {
        let tree = SaveTree::new(PathBuf::from("/home/steve/.minecraft/saves"), LayoutMode::Flat);
        assert_eq!(
            tree.backup_dir(),
            PathBuf::from("/home/steve/.minecraft/backupsSave")
        );
    }

    #[test]
    fn copy_fallback_copies_nested_tree() {
        let tmp = tempfile::tempdir().unwrap();
        world(tmp.path(), "src/region");
        copy_dir_recursive(&tmp.path().join("src"), &tmp.path().join("dst")).unwrap();
        assert_eq!(
            std::fs::read(tmp.path().join("dst/region/level.dat")).unwrap(),
            b"src/region"
        );
    }
}
