//! The cache info file: metadata plus the validity fingerprint.

use std::path::Path;

use serde::{Deserialize, Serialize};

use kiln_backend::ExportMetadata;
use kiln_common::ContentHash;

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

/// Current info file format version. Increment on breaking changes.
const INFO_FORMAT_VERSION: u32 = 1;

/// The metadata sidecar written next to every cached artifact.
///
/// Serialized as JSON at the key's info path. A hit requires the stored
/// fingerprint to equal the fingerprint of the current request; anything
/// else (missing file, unparseable JSON, old format version) is a miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Info file format version.
    pub format_version: u32,

    /// Backend version that produced the artifact.
    pub backend_version: String,

    /// Fingerprint of the request that produced the artifact.
    pub fingerprint: Fingerprint,

    /// Content hash of the artifact bytes, checked when a hit is loaded.
    pub object_hash: ContentHash,

    /// Export metadata of the artifact.
    pub metadata: ExportMetadata,
}

impl CacheInfo {
    /// Creates an info record for a freshly compiled artifact.
    pub fn new(
        backend_version: &str,
        fingerprint: Fingerprint,
        image: &[u8],
        metadata: ExportMetadata,
    ) -> Self {
        Self {
            format_version: INFO_FORMAT_VERSION,
            backend_version: backend_version.to_string(),
            fingerprint,
            object_hash: ContentHash::from_bytes(image),
            metadata,
        }
    }

    /// Loads an info file, returning `None` if it is missing, unparseable,
    /// or from an incompatible format version.
    ///
    /// This is fail-safe: any problem is a cache miss, never an error.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        let info: Self = serde_json::from_str(&content).ok()?;
        (info.format_version == INFO_FORMAT_VERSION).then_some(info)
    }

    /// Saves the info file via a temp file and rename, so a torn write is
    /// never visible as a structurally valid info file.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);

        std::fs::write(&tmp, json).map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
