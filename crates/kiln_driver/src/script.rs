//! The script driver: source tracking, cache coherency, and the
//! compile/link pipeline.

use std::path::Path;

use kiln_backend::{
    Backend, CompileRequest, CompiledObject, Export, ExportMetadata, FuncInfo, LinkRequest,
    RelocModel, SourceOrigin, SourceUnit, SymbolResolver,
};
use kiln_cache::{CacheCheck, CacheCoordinator, CacheInfo, CacheKey, Fingerprint, FingerprintBuilder};
use kiln_common::{CompileFlags, ObjectType};

use crate::error::{DriverError, ErrorCode};
use crate::holder::{ObjectHolder, ScriptResult, ScriptStatus};

/// Number of source slots. Slot 0 is the primary source, slot 1 an
/// optional auxiliary/library source.
const SOURCE_SLOTS: usize = 2;

/// Whether a script participates in the artifact cache.
///
/// Chosen at construction; replaces build-time cache conditionals with a
/// runtime dispatch so both paths are always present and testable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    /// Check the cache before compiling and persist results after.
    Enabled,
    /// Never touch the cache during prepare operations. An explicit
    /// [`Script::write_cache`] still persists on demand.
    Disabled,
}

/// Drives one logical compilation unit from sources to a native artifact.
///
/// A script owns at most one result, either freshly compiled or loaded
/// from the cache, never both. Status moves only forward:
/// Unknown → Compiled (backend success), Compiled → Cached (write-back),
/// or Unknown → Cached (cache hit). Prepare operations on an
/// already-prepared script return `Ok` without re-running the pipeline.
///
/// Not synchronized; a script requires exclusive access. Construction
/// triggers idempotent process-wide backend initialization.
pub struct Script {
    backend: Box<dyn Backend>,
    cache_policy: CachePolicy,

    /// Recorded failure of global backend initialization, if any.
    init_error: Option<String>,

    sources: [Option<SourceUnit>; SOURCE_SLOTS],
    external_symbols: Vec<String>,
    resolver: Option<Box<dyn SymbolResolver>>,

    result: Option<ScriptResult>,

    /// Cache key recorded by the last prepare, used by `write_cache`.
    cache_key: Option<CacheKey>,
    fingerprint: Option<Fingerprint>,

    /// Sticky first-error code; drained by `take_error`.
    error: ErrorCode,

    /// Last backend diagnostic text.
    diagnostic: Option<String>,
}

impl Script {
    /// Creates a script over the given backend.
    ///
    /// Invokes process-wide backend initialization; if that has failed,
    /// the script is constructed anyway and `add_source` reports the
    /// failure.
    pub fn new(backend: Box<dyn Backend>, cache_policy: CachePolicy) -> Self {
        let init_error = kiln_backend::initialize().err().map(|e| e.to_string());
        Self {
            backend,
            cache_policy,
            init_error,
            sources: [None, None],
            external_symbols: Vec::new(),
            resolver: None,
            result: None,
            cache_key: None,
            fingerprint: None,
            error: ErrorCode::NoError,
            diagnostic: None,
        }
    }

    // -- source registration --

    /// Registers a source unit at slot 0 (primary) or 1 (auxiliary).
    ///
    /// Re-adding to an occupied slot replaces the previous unit; sources
    /// are only read when a prepare operation compiles, and a prepared
    /// script never re-runs the pipeline, so the replacement is inert
    /// after the first successful prepare.
    pub fn add_source(
        &mut self,
        slot: usize,
        origin: SourceOrigin,
        flags: CompileFlags,
    ) -> Result<(), DriverError> {
        self.run(|s| {
            if slot >= SOURCE_SLOTS {
                return Err(DriverError::InvalidSlot { slot });
            }
            if let Some(reason) = &s.init_error {
                return Err(DriverError::BackendInit {
                    reason: reason.clone(),
                });
            }
            s.sources[slot] = Some(SourceUnit::new(origin, flags));
            Ok(())
        })
    }

    /// Appends a symbol name to the allowed-undefined list consulted
    /// during linking. Ordered, duplicate-tolerant, unvalidated.
    pub fn mark_external_symbol(&mut self, name: impl Into<String>) {
        self.external_symbols.push(name.into());
    }

    /// The externally-marked symbol names, in registration order.
    pub fn external_symbols(&self) -> &[String] {
        &self.external_symbols
    }

    /// Installs the external symbol resolution hook, replacing any
    /// previously installed one.
    pub fn register_symbol_resolver(&mut self, resolver: Box<dyn SymbolResolver>) {
        self.resolver = Some(resolver);
    }

    // -- pipeline --

    /// Produces a relocatable object for the registered sources.
    ///
    /// Checks the cache first (policy permitting); on a hit the cached
    /// result is adopted without invoking the backend. On a miss the
    /// backend compiles slot 0 and, if present, slot 1; with caching
    /// enabled the result is persisted and the script becomes Cached.
    pub fn prepare_relocatable(
        &mut self,
        cache_dir: &Path,
        cache_name: &str,
        reloc_model: RelocModel,
        flags: CompileFlags,
    ) -> Result<(), DriverError> {
        self.run(|s| s.prepare_relocatable_inner(cache_dir, cache_name, reloc_model, flags))
    }

    /// Produces a shared object at `dso_path`.
    ///
    /// If `obj_path` names an existing relocatable artifact it is linked
    /// directly, with no compile stage and no cache involvement (the
    /// result then carries no export metadata and no cache key).
    /// Otherwise the relocatable stage runs first, with its intermediate
    /// artifact cached under the Relocatable key regardless of policy,
    /// and its output is linked. Only slot 0 participates in this
    /// pipeline; slot 1 is ignored by design.
    pub fn prepare_shared_object(
        &mut self,
        cache_dir: &Path,
        cache_name: &str,
        obj_path: Option<&Path>,
        dso_path: &Path,
        flags: CompileFlags,
    ) -> Result<(), DriverError> {
        self.run(|s| {
            s.prepare_shared_object_inner(cache_dir, cache_name, obj_path, dso_path, flags)
        })
    }

    /// Produces a standalone executable artifact.
    ///
    /// Two-stage pipeline: relocatable compile of slot 0 (and slot 1 if
    /// present), then an executable link against the allowed-undefined
    /// list and the resolver hook.
    pub fn prepare_executable(
        &mut self,
        cache_dir: &Path,
        cache_name: &str,
        flags: CompileFlags,
    ) -> Result<(), DriverError> {
        self.run(|s| s.prepare_executable_inner(cache_dir, cache_name, flags))
    }

    /// Forces persistence of the active result to its cache paths.
    ///
    /// Idempotent. A no-op when no result is active, no cache key has
    /// been recorded, or the result is not cacheable. On success a
    /// Compiled result becomes Cached; on I/O failure the in-memory
    /// state is unchanged.
    pub fn write_cache(&mut self) -> Result<(), DriverError> {
        self.run(Self::persist_active)
    }

    // -- queries --

    /// Where the active result came from.
    pub fn status(&self) -> ScriptStatus {
        self.result
            .as_ref()
            .map_or(ScriptStatus::Unknown, ScriptResult::status)
    }

    /// Resolves a symbol name to its runtime address.
    ///
    /// Consults the active result's exports first, then the registered
    /// resolver hook. `None` means not found, which is a valid outcome
    /// for probing, not an error.
    pub fn lookup(&self, name: &str) -> Option<u64> {
        self.metadata()
            .and_then(|m| m.lookup(name))
            .or_else(|| self.resolver.as_ref().and_then(|r| r.resolve(name)))
    }

    /// Whether the active result may be persisted to the cache.
    pub fn is_cacheable(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| r.holder().flags.cacheable())
    }

    /// The last diagnostic text reported by the backend, if any.
    pub fn compiler_diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    // -- metadata accessors; empty until a prepare succeeds --

    /// Exported variables of the active result.
    pub fn export_vars(&self) -> &[Export] {
        self.metadata().map_or(&[], |m| m.export_vars.as_slice())
    }

    /// Number of exported variables.
    pub fn export_var_count(&self) -> usize {
        self.export_vars().len()
    }

    /// Exported functions of the active result.
    pub fn export_funcs(&self) -> &[Export] {
        self.metadata().map_or(&[], |m| m.export_funcs.as_slice())
    }

    /// Number of exported functions.
    pub fn export_func_count(&self) -> usize {
        self.export_funcs().len()
    }

    /// Exported kernel ("for-each") entry points of the active result.
    pub fn export_foreach(&self) -> &[Export] {
        self.metadata().map_or(&[], |m| m.export_foreach.as_slice())
    }

    /// Number of exported kernels.
    pub fn export_foreach_count(&self) -> usize {
        self.export_foreach().len()
    }

    /// `{key, value}` pragma pairs of the active result.
    pub fn pragmas(&self) -> &[(String, String)] {
        self.metadata().map_or(&[], |m| m.pragmas.as_slice())
    }

    /// Number of pragmas.
    pub fn pragma_count(&self) -> usize {
        self.pragmas().len()
    }

    /// Per-function descriptors of the active result.
    pub fn func_infos(&self) -> &[FuncInfo] {
        self.metadata().map_or(&[], |m| m.func_infos.as_slice())
    }

    /// Number of function descriptors.
    pub fn func_count(&self) -> usize {
        self.func_infos().len()
    }

    /// Object slot indices referenced by the active result.
    pub fn object_slots(&self) -> &[u32] {
        self.metadata().map_or(&[], |m| m.object_slots.as_slice())
    }

    /// Number of referenced object slots.
    pub fn object_slot_count(&self) -> usize {
        self.object_slots().len()
    }

    /// Raw bytes of the active artifact; empty until a prepare succeeds.
    pub fn object_image(&self) -> &[u8] {
        self.result.as_ref().map_or(&[], |r| r.holder().image.as_slice())
    }

    /// Size of the active artifact in bytes.
    pub fn object_image_size(&self) -> usize {
        self.object_image().len()
    }

    // -- sticky error --

    /// Records an error code; the first recorded code wins until drained.
    pub fn set_error(&mut self, code: ErrorCode) {
        if self.error == ErrorCode::NoError && code != ErrorCode::NoError {
            self.error = code;
        }
    }

    /// Drains the sticky error: returns the recorded code and resets it
    /// to `NoError`.
    pub fn take_error(&mut self) -> ErrorCode {
        std::mem::replace(&mut self.error, ErrorCode::NoError)
    }

    // -- internals --

    /// Runs an operation, recording any failure in the sticky error slot
    /// and the diagnostic buffer before returning it.
    fn run(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<(), DriverError>,
    ) -> Result<(), DriverError> {
        match op(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let DriverError::Compile { diagnostic } | DriverError::Link { diagnostic } =
                    &err
                {
                    self.diagnostic = Some(diagnostic.clone());
                }
                self.set_error(err.code());
                Err(err)
            }
        }
    }

    fn metadata(&self) -> Option<&ExportMetadata> {
        self.result.as_ref().map(|r| &r.holder().metadata)
    }

    fn require_primary(&self) -> Result<(), DriverError> {
        if self.sources[0].is_none() {
            return Err(DriverError::Compile {
                diagnostic: "no primary source registered at slot 0".to_string(),
            });
        }
        Ok(())
    }

    fn compute_fingerprint(
        &self,
        object_type: ObjectType,
        reloc_model: RelocModel,
        flags: CompileFlags,
        primary_only: bool,
    ) -> Result<Fingerprint, DriverError> {
        let mut builder = FingerprintBuilder::new(self.backend.version(), object_type)
            .reloc_tag(reloc_model.fingerprint_tag())
            .flags(flags);
        for (slot, unit) in self.sources.iter().enumerate() {
            if primary_only && slot > 0 {
                break;
            }
            if let Some(unit) = unit {
                builder = builder.source(slot, unit.identity_hash()?);
            }
        }
        Ok(builder.finish())
    }

    fn compile_sources(
        &self,
        flags: CompileFlags,
        reloc_model: RelocModel,
        primary_only: bool,
    ) -> Result<CompiledObject, DriverError> {
        let limit = if primary_only { 1 } else { SOURCE_SLOTS };
        let sources: Vec<&SourceUnit> = self.sources[..limit].iter().flatten().collect();
        let request = CompileRequest {
            sources,
            flags,
            object_type: ObjectType::Relocatable,
            reloc_model,
        };
        self.backend.compile(&request).map_err(Into::into)
    }

    fn link_image(&self, image: &[u8], kind: ObjectType) -> Result<Vec<u8>, DriverError> {
        let request = LinkRequest {
            image,
            kind,
            allowed_undefined: &self.external_symbols,
            resolver: self.resolver.as_deref(),
        };
        self.backend.link(&request).map_err(Into::into)
    }

    fn write_output(&self, path: &Path, bytes: &[u8]) -> Result<(), DriverError> {
        std::fs::write(path, bytes).map_err(|e| DriverError::Link {
            diagnostic: format!("cannot write linked output {}: {e}", path.display()),
        })
    }

    fn adopt_compiled(&mut self, image: Vec<u8>, metadata: ExportMetadata, flags: CompileFlags) {
        self.result = Some(ScriptResult::Compiled(ObjectHolder {
            image,
            metadata,
            flags,
        }));
    }

    fn adopt_cached(&mut self, image: Vec<u8>, metadata: ExportMetadata, flags: CompileFlags) {
        self.result = Some(ScriptResult::Cached(ObjectHolder {
            image,
            metadata,
            flags,
        }));
    }

    /// Persists the active result and promotes Compiled to Cached.
    fn persist_active(&mut self) -> Result<(), DriverError> {
        let (Some(key), Some(fingerprint), Some(result)) =
            (self.cache_key.as_ref(), self.fingerprint, self.result.as_ref())
        else {
            return Ok(());
        };
        let holder = result.holder();
        if !holder.flags.cacheable() {
            return Ok(());
        }

        let info = CacheInfo::new(
            self.backend.version(),
            fingerprint,
            &holder.image,
            holder.metadata.clone(),
        );
        CacheCoordinator::persist(key, &holder.image, &info)?;

        if let Some(result) = self.result.take() {
            self.result = Some(result.into_cached());
        }
        Ok(())
    }

    fn prepare_relocatable_inner(
        &mut self,
        cache_dir: &Path,
        cache_name: &str,
        reloc_model: RelocModel,
        flags: CompileFlags,
    ) -> Result<(), DriverError> {
        if self.result.is_some() {
            return Ok(());
        }
        self.require_primary()?;

        let fingerprint =
            self.compute_fingerprint(ObjectType::Relocatable, reloc_model, flags, false)?;
        let key = CacheKey::new(cache_dir, cache_name, ObjectType::Relocatable);
        self.cache_key = Some(key.clone());
        self.fingerprint = Some(fingerprint);

        if self.cache_policy == CachePolicy::Enabled {
            if let CacheCheck::Loaded(obj) = CacheCoordinator::check(&key, fingerprint, false) {
                self.adopt_cached(obj.image, obj.metadata, flags);
                return Ok(());
            }
        }

        let compiled = self.compile_sources(flags, reloc_model, false)?;
        self.adopt_compiled(compiled.image, compiled.metadata, flags);

        if self.cache_policy == CachePolicy::Enabled {
            self.persist_active()?;
        }
        Ok(())
    }

    fn prepare_shared_object_inner(
        &mut self,
        cache_dir: &Path,
        cache_name: &str,
        obj_path: Option<&Path>,
        dso_path: &Path,
        flags: CompileFlags,
    ) -> Result<(), DriverError> {
        if self.result.is_some() {
            return Ok(());
        }

        // A pre-built relocatable bypasses both the compile stage and
        // the cache.
        if let Some(obj) = obj_path {
            if obj.exists() {
                let image = std::fs::read(obj).map_err(|e| DriverError::Link {
                    diagnostic: format!(
                        "cannot read relocatable object {}: {e}",
                        obj.display()
                    ),
                })?;
                let linked = self.link_image(&image, ObjectType::SharedObject)?;
                self.write_output(dso_path, &linked)?;
                self.adopt_compiled(linked, ExportMetadata::default(), flags);
                return Ok(());
            }
        }

        self.require_primary()?;

        let fingerprint =
            self.compute_fingerprint(ObjectType::SharedObject, RelocModel::Pic, flags, true)?;
        let key = CacheKey::new(cache_dir, cache_name, ObjectType::SharedObject);
        self.cache_key = Some(key.clone());
        self.fingerprint = Some(fingerprint);

        if self.cache_policy == CachePolicy::Enabled {
            if let CacheCheck::Loaded(obj) = CacheCoordinator::check(&key, fingerprint, false) {
                self.write_output(dso_path, &obj.image)?;
                self.adopt_cached(obj.image, obj.metadata, flags);
                return Ok(());
            }
        }

        // Relocatable stage, with the intermediate artifact cached
        // regardless of policy so later links can reuse it.
        let reloc_fingerprint =
            self.compute_fingerprint(ObjectType::Relocatable, RelocModel::Pic, flags, true)?;
        let reloc_key = CacheKey::new(cache_dir, cache_name, ObjectType::Relocatable);
        let compiled = match CacheCoordinator::check(&reloc_key, reloc_fingerprint, false) {
            CacheCheck::Loaded(obj) => CompiledObject {
                image: obj.image,
                metadata: obj.metadata,
            },
            _ => {
                let compiled = self.compile_sources(flags, RelocModel::Pic, true)?;
                if flags.cacheable() {
                    let info = CacheInfo::new(
                        self.backend.version(),
                        reloc_fingerprint,
                        &compiled.image,
                        compiled.metadata.clone(),
                    );
                    CacheCoordinator::persist(&reloc_key, &compiled.image, &info)?;
                }
                compiled
            }
        };

        let linked = self.link_image(&compiled.image, ObjectType::SharedObject)?;
        self.write_output(dso_path, &linked)?;
        self.adopt_compiled(linked, compiled.metadata, flags);

        if self.cache_policy == CachePolicy::Enabled {
            self.persist_active()?;
        }
        Ok(())
    }

    fn prepare_executable_inner(
        &mut self,
        cache_dir: &Path,
        cache_name: &str,
        flags: CompileFlags,
    ) -> Result<(), DriverError> {
        if self.result.is_some() {
            return Ok(());
        }
        self.require_primary()?;

        let fingerprint =
            self.compute_fingerprint(ObjectType::Executable, RelocModel::Default, flags, false)?;
        let key = CacheKey::new(cache_dir, cache_name, ObjectType::Executable);
        self.cache_key = Some(key.clone());
        self.fingerprint = Some(fingerprint);

        if self.cache_policy == CachePolicy::Enabled {
            if let CacheCheck::Loaded(obj) = CacheCoordinator::check(&key, fingerprint, false) {
                self.adopt_cached(obj.image, obj.metadata, flags);
                return Ok(());
            }
        }

        let compiled = self.compile_sources(flags, RelocModel::Default, false)?;
        let linked = self.link_image(&compiled.image, ObjectType::Executable)?;
        self.adopt_compiled(linked, compiled.metadata, flags);

        if self.cache_policy == CachePolicy::Enabled {
            self.persist_active()?;
        }
        Ok(())
    }
}
