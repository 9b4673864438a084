//! Deterministic cache path derivation.

use std::path::{Path, PathBuf};

use kiln_common::ObjectType;

/// Suffix appended to an artifact path to name its metadata file.
const INFO_SUFFIX: &str = ".info";

/// The triple identifying one cache entry: directory, logical name, and
/// object type.
///
/// Two keys built from the same triple derive the same paths across
/// process runs; cache reuse depends on this stability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    /// Cache directory.
    pub dir: PathBuf,
    /// Logical artifact name.
    pub name: String,
    /// Artifact kind; selects the file extension.
    pub object_type: ObjectType,
}

impl CacheKey {
    /// Creates a cache key.
    ///
    /// `object_type` must not be `Unknown`: path derivation before an
    /// object type has been chosen is a programming error.
    pub fn new(dir: &Path, name: &str, object_type: ObjectType) -> Self {
        assert!(
            object_type != ObjectType::Unknown,
            "cache key requested for unknown object type"
        );
        Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            object_type,
        }
    }

    /// Path of the binary artifact: `<dir>/<name>.<o|so>`.
    pub fn object_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.name, self.object_type.extension()))
    }

    /// Path of the metadata info file: the artifact path plus `.info`.
    pub fn info_path(&self) -> PathBuf {
        let mut path = self.object_path().into_os_string();
        path.push(INFO_SUFFIX);
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocatable_uses_o_extension() {
        let key = CacheKey::new(Path::new("/cache"), "main", ObjectType::Relocatable);
        assert_eq!(key.object_path(), PathBuf::from("/cache/main.o"));
    }

    #[test]
    fn executable_shares_o_extension() {
        let key = CacheKey::new(Path::new("/cache"), "main", ObjectType::Executable);
        assert_eq!(key.object_path(), PathBuf::from("/cache/main.o"));
    }

    #[test]
    fn shared_object_uses_so_extension() {
        let key = CacheKey::new(Path::new("/cache"), "main", ObjectType::SharedObject);
        assert_eq!(key.object_path(), PathBuf::from("/cache/main.so"));
    }

    #[test]
    fn info_path_appends_suffix() {
        let key = CacheKey::new(Path::new("/cache"), "main", ObjectType::SharedObject);
        assert_eq!(key.info_path(), PathBuf::from("/cache/main.so.info"));
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = CacheKey::new(Path::new("/cache"), "main", ObjectType::Relocatable);
        let b = CacheKey::new(Path::new("/cache"), "main", ObjectType::Relocatable);
        assert_eq!(a.object_path(), b.object_path());
        assert_eq!(a.info_path(), b.info_path());
    }

    #[test]
    #[should_panic(expected = "unknown object type")]
    fn unknown_object_type_panics() {
        let _ = CacheKey::new(Path::new("/cache"), "main", ObjectType::Unknown);
    }
}
