use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, info};

use super::remote::RemoteLayout;
use super::report::SyncReport;
use crate::core::archive::{self, archive_stem, is_plain_name, Staging};
use crate::core::error::{SyncError, SyncResult};
use crate::core::saves::{LayoutMode, LocalWorldEntry, SaveTree};
use crate::core::storage::{
    download_verified, resolve_folder, FileRef, FolderRef, RemoteEntry, StorageClient,
};

/// A remote archive and where it unpacks to.
#[derive(Debug, Clone)]
struct RestoreTarget {
    file: FileRef,
    stem: String,
    dest_dir: PathBuf,
    label: String,
}

/// Drives upload and restore passes between the local save tree and the
/// remote `<root>/{Vanilla,Modded}` folders.
///
/// The store is passed into each pass; the engine holds no remote handle.
pub struct SyncEngine {
    saves: SaveTree,
    cloud_root: String,
}

impl SyncEngine {
    pub fn new(saves: SaveTree, cloud_root: impl Into<String>) -> Self {
        Self {
            saves,
            cloud_root: cloud_root.into(),
        }
    }

    pub fn saves(&self) -> &SaveTree {
        &self.saves
    }

    pub async fn resolve_layout(&self, store: &dyn StorageClient) -> SyncResult<RemoteLayout> {
        RemoteLayout::resolve(store, &self.cloud_root).await
    }

    // ── Upload ──────────────────────────────────────────

    /// Make the remote scope for the active layout mirror the local saves.
    ///
    /// New archives are uploaded before anything is deleted. Old entries go
    /// only once every upload in their scope succeeded, except those whose
    /// own replacement landed. An empty local tree leaves the remote alone.
    pub async fn sync_to_cloud(&self, store: &dyn StorageClient) -> SyncResult<SyncReport> {
        let mode = self.saves.mode();
        info!(
            "Uploading {} saves to '{}' ({})",
            mode,
            self.cloud_root,
            store.name()
        );

        let layout = self.resolve_layout(store).await?;
        let entries = self.saves.list_entries().await?;
        if entries.is_empty() {
            info!(
                "No local saves, remote '{}' left untouched",
                mode.remote_folder_name()
            );
            return Ok(SyncReport::skipped());
        }

        let mut report = SyncReport::default();
        match mode {
            LayoutMode::Flat => {
                let worlds: Vec<&LocalWorldEntry> = entries.iter().collect();
                self.mirror_folder(store, &layout.vanilla, &worlds, &mut report)
                    .await;
            }
            LayoutMode::Nested => {
                self.mirror_instances(store, &layout.modded, &entries, &mut report)
                    .await;
            }
        }

        info!(
            "Upload finished: {} uploaded, {} deleted, {} kept, {} failed",
            report.uploaded.len(),
            report.deleted.len(),
            report.kept.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn mirror_instances(
        &self,
        store: &dyn StorageClient,
        modded: &FolderRef,
        entries: &[LocalWorldEntry],
        report: &mut SyncReport,
    ) {
        let previous = match store.list_children(modded).await {
            Ok(children) => children,
            Err(err) => {
                report.record_failure(modded.name.clone(), &err);
                return;
            }
        };

        let mut by_instance: BTreeMap<&str, Vec<&LocalWorldEntry>> = BTreeMap::new();
        for entry in entries {
            if let Some(instance) = entry.instance.as_deref() {
                by_instance.entry(instance).or_default().push(entry);
            }
        }

        let mut complete = true;
        let mut mirrored = HashSet::new();
        for (instance, worlds) in by_instance {
            let folder = match resolve_folder(store, instance, Some(modded)).await {
                Ok(folder) => folder,
                Err(err) => {
                    complete = false;
                    report.record_failure(instance, &err);
                    continue;
                }
            };
            if !self.mirror_folder(store, &folder, &worlds, report).await {
                complete = false;
            }
            mirrored.insert(folder.id);
        }

        let stale = previous.iter().filter(|entry| !mirrored.contains(&entry.id));
        self.remove_superseded(store, modded, stale, |_| complete, report)
            .await;
    }

    /// Upload `worlds` into `folder`, then drop what they replace.
    /// Returns whether every upload succeeded.
    async fn mirror_folder(
        &self,
        store: &dyn StorageClient,
        folder: &FolderRef,
        worlds: &[&LocalWorldEntry],
        report: &mut SyncReport,
    ) -> bool {
        let previous = match store.list_children(folder).await {
            Ok(children) => children,
            Err(err) => {
                report.record_failure(folder.name.clone(), &err);
                return false;
            }
        };

        let mut complete = true;
        let mut replaced = HashSet::new();
        for entry in worlds {
            match self.upload_entry(store, folder, entry).await {
                Ok(file) => {
                    replaced.insert(file.title);
                    report.uploaded.push(entry.key());
                }
                Err(err) => {
                    complete = false;
                    report.record_failure(entry.key(), &err);
                }
            }
        }

        self.remove_superseded(
            store,
            folder,
            previous.iter(),
            |old| complete || replaced.contains(&old.title),
            report,
        )
        .await;
        complete
    }

    async fn remove_superseded<'a>(
        &self,
        store: &dyn StorageClient,
        folder: &FolderRef,
        previous: impl Iterator<Item = &'a RemoteEntry>,
        superseded: impl Fn(&RemoteEntry) -> bool,
        report: &mut SyncReport,
    ) {
        for old in previous {
            let label = format!("{}/{}", folder.name, old.title);
            if !superseded(old) {
                info!("Keeping {} until it has a replacement", label);
                report.kept.push(label);
                continue;
            }
            match store.delete_entry(&old.id).await {
                Ok(()) => {
                    debug!("Deleted superseded {}", label);
                    report.deleted.push(label);
                }
                Err(err) => report.record_failure(label, &err),
            }
        }
    }

    async fn upload_entry(
        &self,
        store: &dyn StorageClient,
        folder: &FolderRef,
        entry: &LocalWorldEntry,
    ) -> SyncResult<FileRef> {
        let staging = Staging::new()?;
        let archive_path = staging.archive_path(&entry.archive_title());
        let stats = archive::pack(&entry.path, &archive_path)?;
        let bytes = tokio::fs::read(&archive_path)
            .await
            .map_err(|source| SyncError::Io {
                path: archive_path.clone(),
                source,
            })?;
        let size = bytes.len();

        let file = store
            .upload_content(folder, &entry.archive_title(), bytes)
            .await?;
        info!(
            "Uploaded {} -> {}/{} ({} files, {} bytes)",
            entry.key(),
            folder.name,
            file.title,
            stats.files,
            size
        );
        Ok(file)
    }

    // ── Restore ─────────────────────────────────────────

    /// Replace the local saves with the cloud copy.
    ///
    /// Current worlds are moved into the backup snapshot first. Nothing local
    /// is touched when the cloud has no archives for the active layout.
    pub async fn sync_and_restore_from_cloud(
        &self,
        store: &dyn StorageClient,
    ) -> SyncResult<SyncReport> {
        let mode = self.saves.mode();
        info!(
            "Restoring {} saves from '{}' ({})",
            mode,
            self.cloud_root,
            store.name()
        );

        let layout = self.resolve_layout(store).await?;
        let mut report = SyncReport::default();
        let targets = match mode {
            LayoutMode::Flat => self.plan_flat_restore(store, &layout.vanilla).await?,
            LayoutMode::Nested => {
                self.plan_nested_restore(store, &layout.modded, &mut report)
                    .await?
            }
        };

        if targets.is_empty() {
            info!("Nothing to restore, local saves left in place");
            report.skipped = true;
            return Ok(report);
        }

        let entries = self.saves.list_entries().await?;
        if entries.is_empty() {
            info!("No local saves to back up, keeping the previous backup snapshot");
        } else {
            self.backup_entries(&entries, &mut report).await?;
        }

        for target in targets {
            match self.restore_archive(store, &target).await {
                Ok(()) => report.downloaded.push(target.label),
                Err(err) => report.record_failure(target.label, &err),
            }
        }

        info!(
            "Restore finished: {} restored, {} backed up, {} failed",
            report.downloaded.len(),
            report.backed_up.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn plan_flat_restore(
        &self,
        store: &dyn StorageClient,
        vanilla: &FolderRef,
    ) -> SyncResult<Vec<RestoreTarget>> {
        let children = store.list_children(vanilla).await?;
        let targets = archive_targets(&children, self.saves.root().to_path_buf(), None);
        if targets.is_empty() {
            info!("No saves found in cloud for '{}'", vanilla.name);
        }
        Ok(targets)
    }

    async fn plan_nested_restore(
        &self,
        store: &dyn StorageClient,
        modded: &FolderRef,
        report: &mut SyncReport,
    ) -> SyncResult<Vec<RestoreTarget>> {
        let mut targets = Vec::new();
        let mut instances: Vec<FolderRef> = store
            .list_children(modded)
            .await?
            .iter()
            .filter_map(RemoteEntry::as_folder)
            .collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name));

        if instances.is_empty() {
            info!("No instances found in cloud for '{}'", modded.name);
        }

        for instance in instances {
            if !is_plain_name(&instance.name) {
                report.record_failure(
                    instance.name.clone(),
                    &SyncError::Other("instance folder name is not a plain name".into()),
                );
                continue;
            }

            let children = match store.list_children(&instance).await {
                Ok(children) => children,
                Err(err) => {
                    report.record_failure(instance.name.clone(), &err);
                    continue;
                }
            };
            let dest_dir = self.saves.instance_saves_dir(&instance.name);
            let found = archive_targets(&children, dest_dir, Some(&instance.name));
            if found.is_empty() {
                info!("No saves found in cloud for instance '{}'", instance.name);
            }
            targets.extend(found);
        }

        Ok(targets)
    }

    async fn backup_entries(
        &self,
        entries: &[LocalWorldEntry],
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let backup_dir = self.saves.backup_dir();
        SaveTree::clear_directory(&backup_dir).await?;
        info!("Backing up {} worlds to {:?}", entries.len(), backup_dir);

        for entry in entries {
            let dest = backup_dir.join(entry.relative_path());
            match SaveTree::move_entry(&entry.path, &dest).await {
                Ok(()) => report.backed_up.push(entry.key()),
                Err(err) => report.record_failure(entry.key(), &err),
            }
        }
        Ok(())
    }

    async fn restore_archive(
        &self,
        store: &dyn StorageClient,
        target: &RestoreTarget,
    ) -> SyncResult<()> {
        let dest = target.dest_dir.join(&target.stem);
        if dest.exists() {
            return Err(SyncError::DestinationExists(dest));
        }
        tokio::fs::create_dir_all(&target.dest_dir)
            .await
            .map_err(|source| SyncError::Io {
                path: target.dest_dir.clone(),
                source,
            })?;

        let bytes = download_verified(store, &target.file).await?;
        let staging = Staging::new()?;
        let archive_path = staging.archive_path(&target.file.title);
        tokio::fs::write(&archive_path, &bytes)
            .await
            .map_err(|source| SyncError::Io {
                path: archive_path.clone(),
                source,
            })?;

        let stats = archive::unpack(&archive_path, &dest)?;
        info!(
            "Restored {} -> {:?} ({} files)",
            target.label, dest, stats.files
        );
        Ok(())
    }
}

/// One restore target per archive stem. When a failed delete left several
/// copies of the same title behind, the most recently modified one wins.
fn archive_targets(
    children: &[RemoteEntry],
    dest_dir: PathBuf,
    instance: Option<&str>,
) -> Vec<RestoreTarget> {
    let mut newest: BTreeMap<&str, &RemoteEntry> = BTreeMap::new();
    for entry in children.iter().filter(|entry| !entry.is_folder()) {
        let Some(stem) = archive_stem(&entry.title) else {
            debug!("Ignoring non-archive remote entry '{}'", entry.title);
            continue;
        };
        if let Some(kept) = newest.get(stem) {
            let older = if is_newer(entry, kept) { *kept } else { entry };
            info!("Skipping older duplicate of '{}' ({})", older.title, older.id);
            if older.id == entry.id {
                continue;
            }
        }
        newest.insert(stem, entry);
    }

    let mut targets: Vec<RestoreTarget> = newest
        .into_iter()
        .filter_map(|(stem, entry)| {
            let file = entry.as_file()?;
            let label = match instance {
                Some(instance) => format!("{instance}/saves/{stem}"),
                None => stem.to_string(),
            };
            Some(RestoreTarget {
                file,
                stem: stem.to_string(),
                dest_dir: dest_dir.clone(),
                label,
            })
        })
        .collect();
    targets.sort_by(|a, b| a.label.cmp(&b.label));
    targets
}

/// Whether `candidate` was modified after `current`; the id breaks ties.
fn is_newer(candidate: &RemoteEntry, current: &RemoteEntry) -> bool {
    (candidate.modified_at, &candidate.id) > (current.modified_at, &current.id)
}
