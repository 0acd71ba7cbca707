//! Filesystem-backed asset backend.
//!
//! # Overview
//!
//! Treats every media file under a root directory as an asset. The asset
//! identifier is the file path relative to the root, with `/` separators, so
//! identifiers stay stable across runs as long as files are not moved.
//!
//! - Listing walks the tree with [`walkdir`], skips hidden entries, filters
//!   by extension and orders newest first.
//! - Deletion moves files to the system trash by default (recoverable) or
//!   removes them permanently.
//! - Identifiers that would escape the root (`..`, absolute paths) are
//!   treated as unknown assets.
//!
//! # Example
//!
//! ```no_run
//! use phototriage::backend::{AssetBackend, AssetKind, DirectoryBackend};
//! use std::path::Path;
//!
//! let backend = DirectoryBackend::new(Path::new("/home/user/Pictures"));
//! for asset in backend.list_assets(AssetKind::Image).unwrap() {
//!     println!("{}", asset.id);
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use super::{Asset, AssetBackend, AssetId, AssetKind, BackendDeleteError, FetchError, ListError};

/// File extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "heic", "heif", "webp", "tif", "tiff", "bmp", "dng", "cr2",
    "cr3", "nef", "arw", "raf", "orf", "rw2",
];

/// File extensions treated as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "avi", "mkv", "3gp"];

/// How [`DirectoryBackend`] removes files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Move to the system trash (recoverable)
    #[default]
    Trash,
    /// Remove from disk
    Permanent,
}

/// [`AssetBackend`] over a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    root: PathBuf,
    delete_mode: DeleteMode,
    follow_symlinks: bool,
}

impl DirectoryBackend {
    /// Create a backend rooted at `root`, deleting to the trash.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            delete_mode: DeleteMode::Trash,
            follow_symlinks: false,
        }
    }

    /// Choose how files are deleted.
    #[must_use]
    pub fn with_delete_mode(mut self, mode: DeleteMode) -> Self {
        self.delete_mode = mode;
        self
    }

    /// Follow symbolic links while listing.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Root directory of this backend.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an identifier to a path under the root.
    ///
    /// Returns `None` for identifiers with parent, root or prefix components.
    #[must_use]
    pub fn resolve(&self, id: &AssetId) -> Option<PathBuf> {
        let relative = Path::new(id.as_str());
        if id.as_str().is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn id_for(&self, path: &Path) -> Option<AssetId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(AssetId::new(parts.join("/")))
    }

    fn is_hidden(entry: &walkdir::DirEntry) -> bool {
        entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
    }

    fn matches_kind(path: &Path, kind: AssetKind) -> bool {
        let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            return false;
        };
        let is_image = IMAGE_EXTENSIONS.contains(&ext.as_str());
        let is_video = VIDEO_EXTENSIONS.contains(&ext.as_str());
        match kind {
            AssetKind::Image => is_image,
            AssetKind::Video => is_video,
            AssetKind::Any => is_image || is_video,
        }
    }

    fn creation_time(metadata: &fs::Metadata) -> Option<DateTime<Utc>> {
        metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    fn remove(&self, path: &Path) -> Result<(), String> {
        match self.delete_mode {
            DeleteMode::Trash => trash::delete(path).map_err(|e| e.to_string()),
            DeleteMode::Permanent => fs::remove_file(path).map_err(|e| e.to_string()),
        }
    }
}

impl AssetBackend for DirectoryBackend {
    fn list_assets(&self, kind: AssetKind) -> Result<Vec<Asset>, ListError> {
        if !self.root.is_dir() {
            return Err(ListError::Unavailable(format!(
                "Not a directory: {}",
                self.root.display()
            )));
        }

        let mut assets = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|e| !Self::is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !Self::matches_kind(entry.path(), kind) {
                continue;
            }
            let Some(id) = self.id_for(entry.path()) else {
                continue;
            };
            let creation_time = entry.metadata().ok().and_then(|m| Self::creation_time(&m));
            assets.push(Asset { id, creation_time });
        }

        // Newest first; assets without a timestamp go last.
        assets.sort_by(|a, b| {
            b.creation_time
                .cmp(&a.creation_time)
                .then_with(|| a.id.cmp(&b.id))
        });

        log::debug!(
            "Listed {} asset(s) under {}",
            assets.len(),
            self.root.display()
        );
        Ok(assets)
    }

    fn fetch_bytes(&self, id: &AssetId) -> Result<Vec<u8>, FetchError> {
        let path = self
            .resolve(id)
            .ok_or_else(|| FetchError::NotFound(id.clone()))?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound(id.clone()),
            io::ErrorKind::PermissionDenied => FetchError::PermissionDenied(id.clone()),
            _ => FetchError::Io {
                id: id.clone(),
                source: Arc::new(e),
            },
        })
    }

    fn delete_assets(&self, ids: &BTreeSet<AssetId>) -> Result<(), BackendDeleteError> {
        // Validate every target before touching any of them.
        let mut targets = Vec::with_capacity(ids.len());
        for id in ids {
            match self.resolve(id) {
                Some(path) if path.is_file() => targets.push((id.clone(), path)),
                _ => {
                    return Err(BackendDeleteError::Rejected {
                        ids: ids.clone(),
                        message: format!("asset not found: {}", id),
                    })
                }
            }
        }

        let mut deleted = BTreeSet::new();
        let mut failed = BTreeSet::new();
        let mut last_error = String::new();

        for (id, path) in targets {
            match self.remove(&path) {
                Ok(()) => {
                    log::info!("Deleted asset: {}", id);
                    deleted.insert(id);
                }
                Err(message) => {
                    log::error!("Failed to delete {}: {}", path.display(), message);
                    last_error = message;
                    failed.insert(id);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else if deleted.is_empty() {
            Err(BackendDeleteError::Rejected {
                ids: ids.clone(),
                message: last_error,
            })
        } else {
            Err(BackendDeleteError::Partial {
                deleted,
                failed,
                message: last_error,
            })
        }
    }

    fn supports_partial_delete(&self) -> bool {
        true
    }

    fn contains(&self, id: &AssetId) -> bool {
        self.resolve(id).is_some_and(|p| p.is_file())
    }
}
