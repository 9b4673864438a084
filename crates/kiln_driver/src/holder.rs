//! The mutually exclusive compiled-or-cached result holder.

use kiln_backend::ExportMetadata;
use kiln_common::CompileFlags;

/// Where the active result of a script came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptStatus {
    /// No result yet; no pipeline has completed.
    Unknown,
    /// The result came from a fresh backend compile this process.
    Compiled,
    /// The result was loaded from the cache, or has been written back.
    Cached,
}

/// The artifact and metadata of one prepared result.
///
/// Both freshly compiled and cache-loaded results are held in this shape,
/// so every metadata accessor and symbol lookup behaves identically
/// regardless of provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectHolder {
    /// The native artifact bytes, opaque to the driver.
    pub image: Vec<u8>,
    /// Export metadata for the artifact.
    pub metadata: ExportMetadata,
    /// Flags the result was produced with; decides cache eligibility.
    pub flags: CompileFlags,
}

/// The tagged result owned by a script: freshly compiled xor cached.
///
/// Exactly one variant is alive at a time; the script replaces the whole
/// value on a state transition and drops it on destruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptResult {
    /// Produced by a backend invocation in this process.
    Compiled(ObjectHolder),
    /// Adopted from a cache hit or confirmed by a cache write-back.
    Cached(ObjectHolder),
}

impl ScriptResult {
    /// The holder, independent of provenance.
    pub fn holder(&self) -> &ObjectHolder {
        match self {
            ScriptResult::Compiled(h) | ScriptResult::Cached(h) => h,
        }
    }

    /// The status this result implies.
    pub fn status(&self) -> ScriptStatus {
        match self {
            ScriptResult::Compiled(_) => ScriptStatus::Compiled,
            ScriptResult::Cached(_) => ScriptStatus::Cached,
        }
    }

    /// Rewraps the holder as cached, for the Compiled → Cached transition
    /// after a successful write-back.
    pub fn into_cached(self) -> ScriptResult {
        match self {
            ScriptResult::Compiled(h) | ScriptResult::Cached(h) => ScriptResult::Cached(h),
        }
    }
}
