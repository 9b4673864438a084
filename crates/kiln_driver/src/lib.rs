//! The kiln compilation driver.
//!
//! [`Script`] orchestrates the pipeline from bitcode-like source units to a
//! cacheable native artifact: it tracks one or two sources, decides whether
//! a previously cached artifact can be reused, runs the
//! bitcode → relocatable → shared-object/executable stages through a
//! [`Backend`](kiln_backend::Backend), and serves compiled-result metadata
//! through one interface regardless of whether the result came from a fresh
//! compile or a cache hit.
//!
//! A `Script` instance is not synchronized; use one instance per logical
//! compilation unit and keep concurrent callers off the same instance.

#![warn(missing_docs)]

pub mod error;
pub mod holder;
pub mod script;

pub use error::{DriverError, ErrorCode};
pub use holder::{ObjectHolder, ScriptResult, ScriptStatus};
pub use script::{CachePolicy, Script};
