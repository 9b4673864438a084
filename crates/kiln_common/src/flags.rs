//! Compilation flag bitmask shared between the driver and the backend.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Flags controlling how a source unit is compiled.
    ///
    /// Carried on each source unit and on the prepare operations; folded
    /// into the cache fingerprint so that a flag change invalidates any
    /// previously cached artifact.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CompileFlags: u32 {
        /// Emit debug symbols. Results compiled with this flag are not
        /// eligible for cache persistence.
        const DEBUG_SYMBOLS = 1 << 0;
        /// Skip the backend's optimization passes.
        const SKIP_OPT = 1 << 1;
    }
}

impl CompileFlags {
    /// Returns `true` if a result compiled with these flags may be
    /// persisted to the cache.
    pub fn cacheable(self) -> bool {
        !self.contains(CompileFlags::DEBUG_SYMBOLS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_cacheable() {
        assert!(CompileFlags::default().cacheable());
    }

    #[test]
    fn debug_symbols_blocks_caching() {
        assert!(!CompileFlags::DEBUG_SYMBOLS.cacheable());
        assert!(!(CompileFlags::DEBUG_SYMBOLS | CompileFlags::SKIP_OPT).cacheable());
    }

    #[test]
    fn skip_opt_alone_is_cacheable() {
        assert!(CompileFlags::SKIP_OPT.cacheable());
    }

    #[test]
    fn bits_are_stable() {
        assert_eq!(CompileFlags::DEBUG_SYMBOLS.bits(), 1);
        assert_eq!(CompileFlags::SKIP_OPT.bits(), 2);
    }

    #[test]
    fn serde_roundtrip() {
        let flags = CompileFlags::DEBUG_SYMBOLS | CompileFlags::SKIP_OPT;
        let json = serde_json::to_string(&flags).unwrap();
        let back: CompileFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }
}
