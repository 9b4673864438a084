//! The code-generation backend boundary of the kiln driver.
//!
//! This crate defines the types that cross between the driver and a
//! code-generation engine: source units, export metadata, the [`Backend`]
//! trait, the symbol resolver hook, and process-wide one-time backend
//! initialization. It also ships [`TextBackend`], a deterministic reference
//! backend over a line-oriented pseudo-bitcode format, used by the driver's
//! tests and by embedders that need a hermetic backend.

#![warn(missing_docs)]

pub mod backend;
pub mod metadata;
pub mod resolver;
pub mod source;
pub mod text;

pub use backend::{
    initialize, Backend, BackendError, CompileRequest, CompiledObject, LinkRequest, RelocModel,
};
pub use metadata::{Export, ExportMetadata, FuncInfo};
pub use resolver::SymbolResolver;
pub use source::{ModuleHandle, SourceOrigin, SourceUnit};
pub use text::TextBackend;
