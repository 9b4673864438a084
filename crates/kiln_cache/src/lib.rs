//! Artifact cache coordination for the kiln compilation driver.
//!
//! This crate derives canonical artifact and info paths from a cache
//! directory, a logical name, and an object type; fingerprints compile
//! requests so stale entries are never reused; and persists artifacts
//! all-or-nothing so a partial write can never be observed as a hit.
//! All reads are fail-safe: corruption or version mismatches result in
//! cache misses rather than errors.

#![warn(missing_docs)]

pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod info;
pub mod paths;

pub use coordinator::{CacheCheck, CacheCoordinator, CachedObject};
pub use error::CacheError;
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use info::CacheInfo;
pub use paths::CacheKey;
