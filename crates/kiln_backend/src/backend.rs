//! The backend trait, its request/response types, and process-wide
//! one-time initialization.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use kiln_common::{CompileFlags, ObjectType};

use crate::metadata::ExportMetadata;
use crate::resolver::SymbolResolver;
use crate::source::SourceUnit;

/// Relocation model requested for a relocatable compile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RelocModel {
    /// Let the backend pick.
    #[default]
    Default,
    /// Non-relocatable code.
    Static,
    /// Position-independent code.
    Pic,
}

impl RelocModel {
    /// Stable byte tag used when fingerprinting cache entries.
    pub fn fingerprint_tag(self) -> u8 {
        match self {
            RelocModel::Default => 0,
            RelocModel::Static => 1,
            RelocModel::Pic => 2,
        }
    }
}

/// Errors produced at the backend boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Process-wide backend initialization failed.
    #[error("backend initialization failed: {reason}")]
    Init {
        /// Description of the initialization failure.
        reason: String,
    },

    /// The backend could not produce an artifact.
    #[error("compile failed: {diagnostic}")]
    Compile {
        /// The backend's diagnostic text.
        diagnostic: String,
    },

    /// The backend's linking stage failed, typically on unresolved symbols.
    #[error("link failed: {diagnostic}")]
    Link {
        /// The backend's diagnostic text.
        diagnostic: String,
    },

    /// A source file could not be read.
    #[error("source I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl BackendError {
    /// The diagnostic text for compile and link failures, or the full
    /// error message otherwise.
    pub fn diagnostic(&self) -> String {
        match self {
            BackendError::Compile { diagnostic } | BackendError::Link { diagnostic } => {
                diagnostic.clone()
            }
            other => other.to_string(),
        }
    }
}

/// A compile request: the ordered sources and the build configuration.
pub struct CompileRequest<'a> {
    /// Source units in slot order (slot 0 first).
    pub sources: Vec<&'a SourceUnit>,
    /// Flags for this compile, combined with each unit's own flags.
    pub flags: CompileFlags,
    /// The artifact kind being produced.
    pub object_type: ObjectType,
    /// Relocation model for relocatable output.
    pub reloc_model: RelocModel,
}

/// A link request: a relocatable image and the resolution policy.
pub struct LinkRequest<'a> {
    /// The relocatable object image to link.
    pub image: &'a [u8],
    /// The output kind: `SharedObject` or `Executable`.
    pub kind: ObjectType,
    /// Symbols allowed to remain undefined after linking.
    pub allowed_undefined: &'a [String],
    /// Optional hook consulted for symbols not otherwise resolvable.
    pub resolver: Option<&'a dyn SymbolResolver>,
}

/// The product of a successful compile: the artifact and its exports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledObject {
    /// The native artifact bytes, opaque to the driver.
    pub image: Vec<u8>,
    /// Export metadata for the artifact.
    pub metadata: ExportMetadata,
}

/// A code-generation backend.
///
/// Given source units and a requested object type, produces a native
/// artifact plus export metadata, or fails with a diagnostic. The driver
/// treats the artifact bytes as opaque.
pub trait Backend {
    /// Backend version string, folded into cache fingerprints so that a
    /// backend upgrade invalidates prior artifacts.
    fn version(&self) -> &str;

    /// Compiles the request's sources into a relocatable object image.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompiledObject, BackendError>;

    /// Links a relocatable image into a shared object or executable.
    fn link(&self, request: &LinkRequest<'_>) -> Result<Vec<u8>, BackendError>;
}

static INIT: Once = Once::new();
static INIT_OK: AtomicBool = AtomicBool::new(false);

/// Performs process-wide backend initialization exactly once.
///
/// The first call does the work; every later call is a no-op that reports
/// the recorded outcome. Safe to invoke from multiple script constructions
/// concurrently.
pub fn initialize() -> Result<(), BackendError> {
    INIT.call_once(|| {
        // Target and runtime registration would go here for a real
        // code-generation engine; the reference backend needs none.
        INIT_OK.store(true, Ordering::Release);
    });

    if INIT_OK.load(Ordering::Acquire) {
        Ok(())
    } else {
        Err(BackendError::Init {
            reason: "global backend initialization previously failed".to_string(),
        })
    }
}
