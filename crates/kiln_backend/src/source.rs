//! Source units consumed by the backend.

use std::path::PathBuf;

use kiln_common::{CompileFlags, ContentHash};

use crate::backend::BackendError;

/// An opaque handle to an in-memory intermediate-representation module.
///
/// Produced by an embedder that has already lowered its input; the driver
/// never inspects the IR text, it only forwards the handle to the backend
/// and hashes it for cache fingerprinting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleHandle {
    /// Logical module name, used in diagnostics.
    pub name: String,
    /// The IR payload.
    pub ir: String,
}

/// Where a source unit's content comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Raw bitcode bytes supplied directly by the embedder.
    Bitcode {
        /// Logical resource name, used in diagnostics.
        name: String,
        /// The bitcode payload.
        bytes: Vec<u8>,
    },
    /// A pre-lowered in-memory module.
    Module(ModuleHandle),
    /// A path to a source file read at compile time.
    File(PathBuf),
}

/// One compilation input: an origin plus its compilation flags.
///
/// The driver holds at most two of these, indexed by slot: slot 0 is the
/// primary source and is required before any compile or cache operation,
/// slot 1 is an optional auxiliary/library source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceUnit {
    /// Where the content comes from.
    pub origin: SourceOrigin,
    /// Flags applied when compiling this unit.
    pub flags: CompileFlags,
}

impl SourceUnit {
    /// Creates a source unit.
    pub fn new(origin: SourceOrigin, flags: CompileFlags) -> Self {
        Self { origin, flags }
    }

    /// Logical name of this unit, used in diagnostics.
    pub fn name(&self) -> String {
        match &self.origin {
            SourceOrigin::Bitcode { name, .. } => name.clone(),
            SourceOrigin::Module(handle) => handle.name.clone(),
            SourceOrigin::File(path) => path.display().to_string(),
        }
    }

    /// Computes the content hash identifying this unit for cache
    /// fingerprinting.
    ///
    /// `File` origins are read from disk, so the hash reflects the file's
    /// current content, not the content at `add_source` time.
    pub fn identity_hash(&self) -> Result<ContentHash, BackendError> {
        match &self.origin {
            SourceOrigin::Bitcode { bytes, .. } => Ok(ContentHash::from_bytes(bytes)),
            SourceOrigin::Module(handle) => Ok(ContentHash::from_bytes(handle.ir.as_bytes())),
            SourceOrigin::File(path) => {
                let content = std::fs::read(path).map_err(|e| BackendError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                Ok(ContentHash::from_bytes(&content))
            }
        }
    }

    /// Returns the unit's content as text for backends that consume
    /// line-oriented input.
    pub fn read_text(&self) -> Result<String, BackendError> {
        match &self.origin {
            SourceOrigin::Bitcode { name, bytes } => String::from_utf8(bytes.clone())
                .map_err(|_| BackendError::Compile {
                    diagnostic: format!("source '{name}' is not valid UTF-8"),
                }),
            SourceOrigin::Module(handle) => Ok(handle.ir.clone()),
            SourceOrigin::File(path) => {
                std::fs::read_to_string(path).map_err(|e| BackendError::Io {
                    path: path.clone(),
                    source: e,
                })
            }
        }
    }
}
