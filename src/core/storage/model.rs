use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a remote entry is a folder or a file with content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
}

/// Handle to a remote folder. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderRef {
    pub id: String,
    pub name: String,
}

/// Handle to a remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub id: String,
    pub title: String,
    /// Content checksum reported by the store, when it offers one.
    pub md5: Option<String>,
}

/// A direct child of a remote folder, as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub title: String,
    pub kind: EntryKind,
    pub parent: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub md5: Option<String>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn as_folder(&self) -> Option<FolderRef> {
        self.is_folder().then(|| FolderRef {
            id: self.id.clone(),
            name: self.title.clone(),
        })
    }

    pub fn as_file(&self) -> Option<FileRef> {
        (!self.is_folder()).then(|| FileRef {
            id: self.id.clone(),
            title: self.title.clone(),
            md5: self.md5.clone(),
        })
    }
}

/// Structured listing filter, translated by each store implementation.
///
/// Every populated field narrows the result; `parent: None` means "any
/// location". Trashed entries are excluded unless `include_trashed` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    pub parent: Option<String>,
    pub title: Option<String>,
    pub kind: Option<EntryKind>,
    pub include_trashed: bool,
}

impl EntryQuery {
    /// All direct children of `folder`.
    pub fn children_of(folder: &FolderRef) -> Self {
        Self {
            parent: Some(folder.id.clone()),
            ..Self::default()
        }
    }

    /// Folders called `name`, optionally restricted to one parent.
    pub fn folder_named(name: &str, parent: Option<&FolderRef>) -> Self {
        Self {
            parent: parent.map(|p| p.id.clone()),
            title: Some(name.to_string()),
            kind: Some(EntryKind::Folder),
            include_trashed: false,
        }
    }

    /// Files titled `title` directly inside `parent`.
    pub fn file_named(title: &str, parent: &FolderRef) -> Self {
        Self {
            parent: Some(parent.id.clone()),
            title: Some(title.to_string()),
            kind: Some(EntryKind::File),
            include_trashed: false,
        }
    }

    /// In-process evaluation, used by stores without a query language.
    pub fn matches(&self, entry: &RemoteEntry, trashed: bool) -> bool {
        if trashed && !self.include_trashed {
            return false;
        }
        if let Some(parent) = &self.parent {
            if entry.parent.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(title) = &self.title {
            if &entry.title != title {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        true
    }
}
