//! Cache hit/miss decisions and all-or-nothing persistence.

use std::path::PathBuf;

use kiln_backend::ExportMetadata;
use kiln_common::ContentHash;

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::info::CacheInfo;
use crate::paths::CacheKey;

/// An artifact and its metadata loaded from a cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedObject {
    /// The artifact bytes, opaque to the driver.
    pub image: Vec<u8>,
    /// Export metadata recorded when the artifact was compiled.
    pub metadata: ExportMetadata,
}

/// Result of a cache check.
#[derive(Debug)]
pub enum CacheCheck {
    /// No valid cache entry for the key and fingerprint.
    Miss,
    /// A valid entry exists; not loaded because the check was probe-only.
    Present,
    /// A valid entry, loaded.
    Loaded(CachedObject),
}

impl CacheCheck {
    /// Returns `true` for `Present` and `Loaded`.
    pub fn is_hit(&self) -> bool {
        !matches!(self, CacheCheck::Miss)
    }
}

/// Decides cache validity and persists artifacts.
///
/// Stateless; every operation takes the key explicitly. Reads are
/// fail-safe (corruption is a miss); writes go through temp files and
/// renames with the info file written last, so a failure between the
/// artifact and info writes can never be observed as a later hit.
pub struct CacheCoordinator;

impl CacheCoordinator {
    /// Checks whether a valid cached artifact exists for `key` with the
    /// given request fingerprint.
    ///
    /// A hit requires the artifact file to exist, the info file to parse,
    /// and the stored fingerprint to equal `fingerprint`. With
    /// `check_only` the artifact is not read; otherwise the artifact bytes
    /// must also match the info file's recorded content hash, and the hit
    /// carries the loaded image and metadata.
    pub fn check(key: &CacheKey, fingerprint: Fingerprint, check_only: bool) -> CacheCheck {
        let object_path = key.object_path();
        if !object_path.exists() {
            return CacheCheck::Miss;
        }

        let Some(info) = CacheInfo::load(&key.info_path()) else {
            return CacheCheck::Miss;
        };
        if info.fingerprint != fingerprint {
            return CacheCheck::Miss;
        }

        if check_only {
            return CacheCheck::Present;
        }

        // The info file validated; an unreadable or corrupted artifact is
        // still a miss.
        match std::fs::read(&object_path) {
            Ok(image) if ContentHash::from_bytes(&image) == info.object_hash => {
                CacheCheck::Loaded(CachedObject {
                    image,
                    metadata: info.metadata,
                })
            }
            _ => CacheCheck::Miss,
        }
    }

    /// Persists an artifact and its info file under `key`.
    ///
    /// Creates the cache directory if needed. The artifact is written
    /// first (temp + rename), the info file last, so an interrupted
    /// persist leaves at most an artifact without a valid info file,
    /// which later checks treat as a miss.
    pub fn persist(key: &CacheKey, image: &[u8], info: &CacheInfo) -> Result<(), CacheError> {
        std::fs::create_dir_all(&key.dir).map_err(|e| CacheError::Io {
            path: key.dir.clone(),
            source: e,
        })?;

        let object_path = key.object_path();
        let mut tmp = object_path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, image).map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &object_path).map_err(|e| CacheError::Io {
            path: object_path,
            source: e,
        })?;

        info.save(&key.info_path())
    }
}
