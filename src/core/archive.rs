// ─── Archive Codec ───
// Packs a world directory into a single zip and unpacks it again.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::error::{SyncError, SyncResult};

pub const ARCHIVE_EXTENSION: &str = "zip";

/// `world1` -> `world1.zip`
pub fn archive_name(stem: &str) -> String {
    format!("{stem}.{ARCHIVE_EXTENSION}")
}

/// `world1.zip` -> `world1`. `None` for anything that is not a usable
/// single-component archive name.
pub fn archive_stem(title: &str) -> Option<&str> {
    let stem = title.strip_suffix(&format!(".{ARCHIVE_EXTENSION}"))?;
    is_plain_name(stem).then_some(stem)
}

/// A name that can be joined onto a directory without leaving it.
pub fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// Counts of what went into or came out of an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub directories: usize,
}

/// Zip every descendant of `source_dir` into `archive_path`.
///
/// Entries are written in sorted order with paths relative to `source_dir`.
/// Directories get explicit entries so empty ones survive the round trip.
/// Symlinks are skipped.
pub fn pack(source_dir: &Path, archive_path: &Path) -> SyncResult<ArchiveStats> {
    let out = File::create(archive_path).map_err(|source| SyncError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut writer = ZipWriter::new(BufWriter::new(out));
    let mut stats = ArchiveStats::default();

    for entry in WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
        .follow_links(false)
    {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_default();
            SyncError::Io {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            }
        })?;

        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| SyncError::Other(format!("{:?} escapes {:?}", entry.path(), source_dir)))?;
        let name = zip_entry_name(relative)?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            writer.add_directory(format!("{name}/"), entry_options(0))?;
            stats.directories += 1;
        } else if file_type.is_file() {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            writer.start_file(name, entry_options(size))?;
            let mut input = File::open(entry.path()).map_err(|source| SyncError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
            std::io::copy(&mut input, &mut writer).map_err(|source| SyncError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
            stats.files += 1;
        } else {
            warn!("Skipping non-regular entry {:?}", entry.path());
        }
    }

    let mut out = writer.finish()?;
    out.flush().map_err(|source| SyncError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;

    debug!(
        "Packed {:?} -> {:?} ({} files, {} dirs)",
        source_dir, archive_path, stats.files, stats.directories
    );
    Ok(stats)
}

/// Extract `archive_path` into `dest`, which must not exist yet.
///
/// A failed extraction removes the partially written `dest`.
pub fn unpack(archive_path: &Path, dest: &Path) -> SyncResult<ArchiveStats> {
    if dest.exists() {
        return Err(SyncError::DestinationExists(dest.to_path_buf()));
    }

    std::fs::create_dir_all(dest).map_err(|source| SyncError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    match extract_into(archive_path, dest) {
        Ok(stats) => {
            debug!(
                "Unpacked {:?} -> {:?} ({} files, {} dirs)",
                archive_path, dest, stats.files, stats.directories
            );
            Ok(stats)
        }
        Err(err) => {
            if let Err(cleanup) = std::fs::remove_dir_all(dest) {
                warn!("Cannot remove partial extraction {:?}: {}", dest, cleanup);
            }
            Err(err)
        }
    }
}

fn extract_into(archive_path: &Path, dest: &Path) -> SyncResult<ArchiveStats> {
    let zip_file = File::open(archive_path).map_err(|source| SyncError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(zip_file)?;
    let mut stats = ArchiveStats::default();

    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;
        let relative = zipped
            .enclosed_name()
            .ok_or_else(|| SyncError::Other(format!("Unsafe zip entry path: {}", zipped.name())))?;
        let out_path = dest.join(relative);

        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| SyncError::Io {
                path: out_path,
                source,
            })?;
            stats.directories += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SyncError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut out = File::create(&out_path).map_err(|source| SyncError::Io {
            path: out_path.clone(),
            source,
        })?;
        std::io::copy(&mut zipped, &mut out).map_err(|source| SyncError::Io {
            path: out_path,
            source,
        })?;
        stats.files += 1;
    }

    Ok(stats)
}

fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u32::MAX as u64)
}

/// Forward-slash entry name; rejects anything that is not a plain relative path.
fn zip_entry_name(relative: &Path) -> SyncResult<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            other => {
                return Err(SyncError::Other(format!(
                    "Unexpected path component {:?} in {:?}",
                    other, relative
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Private scratch directory for archives in flight, removed with its
/// contents on drop. Archives never share a directory with user files.
pub struct Staging {
    dir: tempfile::TempDir,
}

impl Staging {
    pub fn new() -> SyncResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("craftsync-")
            .tempdir()
            .map_err(|source| SyncError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        debug!("Staging archives in {:?}", dir.path());
        Ok(Self { dir })
    }

    /// Where an archive titled `title` is written.
    pub fn archive_path(&self, title: &str) -> PathBuf {
        self.dir.path().join(title)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap())
            .map(|e| {
                let rel = zip_entry_name(e.path().strip_prefix(root).unwrap()).unwrap();
                let content = e.file_type().is_file().then(|| std::fs::read(e.path()).unwrap());
                (rel, content)
            })
            .collect()
    }

    fn sample_world(root: &Path) {
        std::fs::create_dir_all(root.join("region")).unwrap();
        std::fs::create_dir_all(root.join("datapacks")).unwrap();
        std::fs::create_dir_all(root.join("playerdata/nested/deep")).unwrap();
        std::fs::write(root.join("level.dat"), [0x1f, 0x8b, 0, 1, 2, 3]).unwrap();
        std::fs::write(root.join("region/r.0.0.mca"), vec![7u8; 70_000]).unwrap();
        std::fs::write(root.join("playerdata/nested/deep/p.dat"), b"steve").unwrap();
        std::fs::write(root.join("session.lock"), b"").unwrap();
    }

    #[test]
    fn round_trip_preserves_tree_and_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let world = tmp.path().join("world1");
        sample_world(&world);

        let zip_path = tmp.path().join("world1.zip");
        let packed = pack(&world, &zip_path).unwrap();
        let restored = tmp.path().join("restored");
        let unpacked = unpack(&zip_path, &restored).unwrap();

        assert_eq!(packed, unpacked);
        assert_eq!(packed.files, 4);
        assert_eq!(snapshot(&world), snapshot(&restored));
        assert!(restored.join("datapacks").is_dir());
    }

    #[test]
    fn empty_directory_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let world = tmp.path().join("empty");
        std::fs::create_dir_all(&world).unwrap();

        let zip_path = tmp.path().join("empty.zip");
        pack(&world, &zip_path).unwrap();
        let restored = tmp.path().join("out");
        let stats = unpack(&zip_path, &restored).unwrap();

        assert_eq!(stats, ArchiveStats::default());
        assert!(restored.is_dir());
    }

    #[test]
    fn unpack_refuses_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let world = tmp.path().join("world");
        sample_world(&world);
        let zip_path = tmp.path().join("world.zip");
        pack(&world, &zip_path).unwrap();

        let err = unpack(&zip_path, &world).unwrap_err();
        assert!(matches!(err, SyncError::DestinationExists(_)));
        assert_eq!(std::fs::read(world.join("session.lock")).unwrap(), b"");
    }

    #[test]
    fn corrupt_archive_leaves_no_partial_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("broken.zip");
        std::fs::write(&zip_path, b"definitely not a zip").unwrap();

        let dest = tmp.path().join("broken");
        assert!(unpack(&zip_path, &dest).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn archive_stem_accepts_only_plain_names() {
        assert_eq!(archive_stem("world1.zip"), Some("world1"));
        assert_eq!(archive_stem("My World.zip"), Some("My World"));
        assert_eq!(archive_stem("world1.tar"), None);
        assert_eq!(archive_stem("../evil.zip"), None);
        assert_eq!(archive_stem("a/b.zip"), None);
        assert_eq!(archive_stem(".zip"), None);
    }

    #[test]
    fn staging_is_private_and_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let user_zip = tmp.path().join("world.zip");
        std::fs::write(&user_zip, b"exported by hand").unwrap();

        let path = {
            let staging = Staging::new().unwrap();
            let path = staging.archive_path("world.zip");
            assert_ne!(path.parent(), Some(tmp.path()));
            std::fs::write(&path, b"PK").unwrap();
            path
        };

        assert!(!path.exists());
        assert_eq!(std::fs::read(&user_zip).unwrap(), b"exported by hand");
    }
}
