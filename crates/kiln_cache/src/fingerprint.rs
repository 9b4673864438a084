//! Cache fingerprints: the staleness check for cached artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

use kiln_common::{CompileFlags, ContentHash, ObjectType};

/// A fingerprint over everything that determines a compiled artifact:
/// backend version, object type, relocation model, flags, and the
/// identity of every source unit.
///
/// Equal requests produce equal fingerprints; any change to a source,
/// a flag, or the backend invalidates prior cache entries. External
/// symbols and the resolver hook are deliberately excluded: they affect
/// link-time resolution, not the relocatable image.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(ContentHash);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

/// Streams fingerprint inputs into an XXH3 hasher.
///
/// Every variable-length input is length-prefixed so that field
/// boundaries cannot alias.
pub struct FingerprintBuilder {
    hasher: Xxh3,
}

impl FingerprintBuilder {
    /// Starts a fingerprint for the given backend version and artifact kind.
    pub fn new(backend_version: &str, object_type: ObjectType) -> Self {
        let mut builder = Self {
            hasher: Xxh3::new(),
        };
        builder.push_bytes(backend_version.as_bytes());
        builder.hasher.update(&[object_type.fingerprint_tag()]);
        builder
    }

    /// Folds in the relocation model tag.
    pub fn reloc_tag(mut self, tag: u8) -> Self {
        self.hasher.update(&[tag]);
        self
    }

    /// Folds in the compile flag bits.
    pub fn flags(mut self, flags: CompileFlags) -> Self {
        self.hasher.update(&flags.bits().to_le_bytes());
        self
    }

    /// Folds in one source unit: its slot index and content hash.
    pub fn source(mut self, slot: usize, hash: ContentHash) -> Self {
        self.hasher.update(&(slot as u64).to_le_bytes());
        self.hasher.update(hash.as_bytes());
        self
    }

    /// Finishes the fingerprint.
    pub fn finish(self) -> Fingerprint {
        Fingerprint(ContentHash::from_u128(self.hasher.digest128()))
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}
