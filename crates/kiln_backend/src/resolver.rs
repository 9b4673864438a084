//! External symbol resolution hook.

/// Resolves symbol names that the compiled artifact does not define.
///
/// Consulted by the backend's linker for names absent from both the
/// artifact and the externally-marked allowed-undefined list, and by the
/// driver's `lookup` as a fallback. Returning `None` means "not found",
/// which is a valid outcome rather than an error.
///
/// Replaces the C-style function-pointer-plus-context pair: any closure
/// `Fn(&str) -> Option<u64>` is a resolver.
pub trait SymbolResolver {
    /// Returns the address of `name`, or `None` if this resolver does not
    /// know it.
    fn resolve(&self, name: &str) -> Option<u64>;
}

impl<F> SymbolResolver for F
where
    F: Fn(&str) -> Option<u64>,
{
    fn resolve(&self, name: &str) -> Option<u64> {
        self(name)
    }
}
