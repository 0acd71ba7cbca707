//! JSON file persistence with integrity checks.
//!
//! All sets live in one file wrapped in a versioned envelope with a SHA256
//! checksum of the payload. Writes go to a sibling temporary file which is
//! flushed to disk and then renamed over the original, so a crash leaves
//! either the old file or the new one, never a torn write.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{PersistenceError, PersistenceStore};

/// Current version of the decision file format.
pub const STORE_VERSION: u32 = 1;

type SetMap = BTreeMap<String, BTreeSet<String>>;

/// On-disk envelope.
#[derive(Debug, Serialize, Deserialize)]
struct StoreEnvelope {
    version: u32,
    /// SHA256 of the compact JSON encoding of `sets`.
    checksum: String,
    sets: SetMap,
}

fn checksum(sets: &SetMap) -> Result<String, PersistenceError> {
    // Compact encoding; must match between save and load.
    let payload = serde_json::to_string(sets)?;
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// [`PersistenceStore`] backed by a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    sets: Mutex<SetMap>,
}

impl JsonFileStore {
    /// Open the store at `path`, reading and verifying it if it exists.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the file cannot be parsed or its checksum does
    /// not match, `UnsupportedVersion` for files from another format version.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let sets = if path.exists() {
            Self::read(path)?
        } else {
            log::debug!("No decision file at {}, starting empty", path.display());
            SetMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            sets: Mutex::new(sets),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SetMap> {
        self.sets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(path: &Path) -> Result<SetMap, PersistenceError> {
        let content = fs::read_to_string(path).map_err(|e| PersistenceError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: StoreEnvelope =
            serde_json::from_str(&content).map_err(|e| PersistenceError::Corrupted {
                path: path.to_path_buf(),
                reason: format!("failed to parse decision file: {}", e),
            })?;

        if envelope.version != STORE_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: envelope.version,
                expected: STORE_VERSION,
            });
        }

        if checksum(&envelope.sets)? != envelope.checksum {
            return Err(PersistenceError::Corrupted {
                path: path.to_path_buf(),
                reason: "checksum mismatch".to_string(),
            });
        }

        log::debug!(
            "Loaded {} set(s) from {}",
            envelope.sets.len(),
            path.display()
        );
        Ok(envelope.sets)
    }

    fn write(&self, sets: &SetMap) -> Result<(), PersistenceError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PersistenceError::Io { path, source }
        };

        let envelope = StoreEnvelope {
            version: STORE_VERSION,
            checksum: checksum(sets)?,
            sets: sets.clone(),
        };
        let json = serde_json::to_string_pretty(&envelope)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        file.write_all(json.as_bytes())
            .map_err(io_err(&tmp_path))?;
        file.sync_all().map_err(io_err(&tmp_path))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }
}

impl PersistenceStore for JsonFileStore {
    fn load_set(&self, key: &str) -> Result<BTreeSet<String>, PersistenceError> {
        Ok(self.lock().get(key).cloned().unwrap_or_default())
    }

    fn save_sets(&self, entries: &[(&str, &BTreeSet<String>)]) -> Result<(), PersistenceError> {
        let mut current = self.lock();
        let mut next = current.clone();
        for (key, set) in entries {
            next.insert((*key).to_string(), (*set).clone());
        }
        // Cache is only replaced once the file is durable.
        self.write(&next)?;
        *current = next;
        Ok(())
    }
}
