//! Native object-type enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of native artifact a compilation pipeline produces.
///
/// Determines both the cache file-name suffix and which pipeline stages run:
/// a relocatable object is a prerequisite for shared-object and executable
/// links when no pre-built relocatable is supplied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// No artifact kind has been requested yet.
    Unknown,
    /// A relocatable object (`.o`).
    Relocatable,
    /// A shared object (`.so`).
    SharedObject,
    /// A standalone executable.
    Executable,
}

impl ObjectType {
    /// Returns the cache file extension for this object type.
    ///
    /// Relocatable and executable artifacts share the `.o` class;
    /// shared objects use `.so`. Calling this with `Unknown` is a
    /// contract violation: path derivation must never happen before an
    /// object type has been chosen.
    pub fn extension(self) -> &'static str {
        match self {
            ObjectType::Relocatable | ObjectType::Executable => "o",
            ObjectType::SharedObject => "so",
            ObjectType::Unknown => panic!("cache path requested for unknown object type"),
        }
    }

    /// Stable byte tag used when fingerprinting cache entries.
    pub fn fingerprint_tag(self) -> u8 {
        match self {
            ObjectType::Unknown => 0,
            ObjectType::Relocatable => 1,
            ObjectType::SharedObject => 2,
            ObjectType::Executable => 3,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectType::Unknown => "unknown",
            ObjectType::Relocatable => "relocatable",
            ObjectType::SharedObject => "shared-object",
            ObjectType::Executable => "executable",
        };
        f.write_str(s)
    }
}
