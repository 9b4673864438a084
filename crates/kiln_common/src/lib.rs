//! Shared foundational types for the kiln compilation driver.
//!
//! This crate provides the content hash used for source identity and cache
//! fingerprints, the native object-type enumeration that drives cache file
//! naming and pipeline staging, and the compilation flag bitmask.

#![warn(missing_docs)]

pub mod flags;
pub mod hash;
pub mod object;

pub use flags::CompileFlags;
pub use hash::ContentHash;
pub use object::ObjectType;
