//! Deterministic reference backend over line-oriented pseudo-bitcode.
//!
//! `TextBackend` exists so the driver and cache layers can be exercised
//! without a real instruction-selection engine. Input is a textual script
//! of directives, one per line:
//!
//! ```text
//! # comment
//! var gCount
//! func root
//! kernel blur
//! pragma version 1
//! slot 2
//! ref malloc
//! ```
//!
//! Compilation assigns deterministic addresses in encounter order and emits
//! an object image framed with magic bytes, a format version, and a
//! checksum. Linking validates every `ref` against the allowed-undefined
//! list and the registered resolver. Identical inputs always produce
//! byte-identical images.

use serde::{Deserialize, Serialize};

use kiln_common::{ContentHash, ObjectType};

use crate::backend::{Backend, BackendError, CompileRequest, CompiledObject, LinkRequest};
use crate::metadata::{Export, ExportMetadata, FuncInfo};

/// Magic bytes identifying a kiln object image.
const IMAGE_MAGIC: [u8; 4] = *b"KOBJ";

/// Current image format version. Increment on breaking changes to the
/// header or payload format.
const IMAGE_FORMAT_VERSION: u32 = 1;

/// Address of the first exported symbol.
const BASE_ADDRESS: u64 = 0x1000;

/// Address distance between consecutive symbols.
const SYMBOL_STRIDE: u64 = 0x10;

/// Header prepended to every object image for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageHeader {
    /// Magic bytes: must be `b"KOBJ"`.
    magic: [u8; 4],

    /// Image format version.
    format_version: u32,

    /// Backend version that produced this image.
    backend_version: String,

    /// Content hash of the payload (for integrity checks).
    checksum: ContentHash,
}

/// Kind of a defined symbol within an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum SymbolKind {
    Var,
    Func,
    Kernel,
}

/// A symbol defined by an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageSymbol {
    name: String,
    address: u64,
    kind: SymbolKind,
}

/// The decoded payload of an object image.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectImage {
    /// Artifact kind tag (`ObjectType::fingerprint_tag`).
    kind: u8,

    /// Symbols defined by this image, in address order.
    symbols: Vec<ImageSymbol>,

    /// Names referenced but not defined; must be satisfied at link time.
    refs: Vec<String>,
}

/// Accumulated state while parsing one compile request.
#[derive(Default)]
struct ParseState {
    symbols: Vec<ImageSymbol>,
    pragmas: Vec<(String, String)>,
    object_slots: Vec<u32>,
    refs: Vec<String>,
}

impl ParseState {
    fn is_defined(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s.name == name)
    }
}

/// The deterministic reference backend.
#[derive(Debug, Default)]
pub struct TextBackend;

impl TextBackend {
    /// Creates a new reference backend.
    pub fn new() -> Self {
        Self
    }

    fn parse_source(
        &self,
        name: &str,
        text: &str,
        state: &mut ParseState,
    ) -> Result<(), BackendError> {
        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let directive = parts.next().unwrap_or_default();
            self.parse_directive(directive, parts, state)
                .map_err(|reason| BackendError::Compile {
                    diagnostic: format!("{name}:{}: {reason}", idx + 1),
                })?;
        }
        Ok(())
    }

    fn parse_directive<'a>(
        &self,
        directive: &str,
        mut args: impl Iterator<Item = &'a str>,
        state: &mut ParseState,
    ) -> Result<(), String> {
        match directive {
            "var" | "func" | "kernel" => {
                let name = args
                    .next()
                    .ok_or_else(|| format!("'{directive}' directive missing a symbol name"))?;
                if args.next().is_some() {
                    return Err(format!("trailing tokens after '{directive} {name}'"));
                }
                if state.is_defined(name) {
                    return Err(format!("duplicate definition of symbol '{name}'"));
                }
                let kind = match directive {
                    "var" => SymbolKind::Var,
                    "func" => SymbolKind::Func,
                    _ => SymbolKind::Kernel,
                };
                let address = BASE_ADDRESS + state.symbols.len() as u64 * SYMBOL_STRIDE;
                state.symbols.push(ImageSymbol {
                    name: name.to_string(),
                    address,
                    kind,
                });
                Ok(())
            }
            "pragma" => {
                let key = args
                    .next()
                    .ok_or_else(|| "'pragma' directive missing a key".to_string())?;
                let value: Vec<&str> = args.collect();
                if value.is_empty() {
                    return Err(format!("pragma '{key}' missing a value"));
                }
                state.pragmas.push((key.to_string(), value.join(" ")));
                Ok(())
            }
            "slot" => {
                let index = args
                    .next()
                    .ok_or_else(|| "'slot' directive missing an index".to_string())?;
                let index: u32 = index
                    .parse()
                    .map_err(|_| format!("invalid slot index '{index}'"))?;
                if args.next().is_some() {
                    return Err(format!("trailing tokens after 'slot {index}'"));
                }
                state.object_slots.push(index);
                Ok(())
            }
            "ref" => {
                let name = args
                    .next()
                    .ok_or_else(|| "'ref' directive missing a symbol name".to_string())?;
                if args.next().is_some() {
                    return Err(format!("trailing tokens after 'ref {name}'"));
                }
                if !state.refs.iter().any(|r| r == name) {
                    state.refs.push(name.to_string());
                }
                Ok(())
            }
            other => Err(format!("unknown directive '{other}'")),
        }
    }

    fn encode_image(&self, image: &ObjectImage) -> Result<Vec<u8>, BackendError> {
        let payload = bincode::serde::encode_to_vec(image, bincode::config::standard()).map_err(
            |e| BackendError::Compile {
                diagnostic: format!("failed to encode object image: {e}"),
            },
        )?;

        let header = ImageHeader {
            magic: IMAGE_MAGIC,
            format_version: IMAGE_FORMAT_VERSION,
            backend_version: self.version().to_string(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| BackendError::Compile {
                diagnostic: format!("failed to encode image header: {e}"),
            })?;

        // Layout: 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);
        Ok(output)
    }

    fn decode_image(&self, bytes: &[u8]) -> Result<ObjectImage, BackendError> {
        let fail = |reason: &str| BackendError::Link {
            diagnostic: format!("invalid object image: {reason}"),
        };

        if bytes.len() < 4 {
            return Err(fail("truncated header length"));
        }
        let header_len = u32::from_le_bytes(
            bytes[..4]
                .try_into()
                .map_err(|_| fail("truncated header length"))?,
        ) as usize;
        if bytes.len() < 4 + header_len {
            return Err(fail("truncated header"));
        }

        let header: ImageHeader =
            bincode::serde::decode_from_slice(&bytes[4..4 + header_len], bincode::config::standard())
                .map_err(|_| fail("unreadable header"))?
                .0;

        if header.magic != IMAGE_MAGIC {
            return Err(fail("bad magic bytes"));
        }
        if header.format_version != IMAGE_FORMAT_VERSION {
            return Err(fail("unsupported format version"));
        }

        let payload = &bytes[4 + header_len..];
        if ContentHash::from_bytes(payload) != header.checksum {
            return Err(fail("checksum mismatch"));
        }

        let image: ObjectImage =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|_| fail("unreadable payload"))?
                .0;
        Ok(image)
    }
}

impl Backend for TextBackend {
    fn version(&self) -> &str {
        "text-1"
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompiledObject, BackendError> {
        if request.sources.is_empty() {
            return Err(BackendError::Compile {
                diagnostic: "no source units supplied".to_string(),
            });
        }

        let mut state = ParseState::default();
        for unit in &request.sources {
            let text = unit.read_text()?;
            self.parse_source(&unit.name(), &text, &mut state)?;
        }

        // A locally defined symbol satisfies its own refs.
        let symbols = &state.symbols;
        state
            .refs
            .retain(|r| !symbols.iter().any(|s| s.name == *r));

        let mut metadata = ExportMetadata::default();
        for sym in &state.symbols {
            let export = Export {
                name: sym.name.clone(),
                address: sym.address,
            };
            match sym.kind {
                SymbolKind::Var => metadata.export_vars.push(export),
                SymbolKind::Func => {
                    metadata.export_funcs.push(export);
                    metadata.func_infos.push(FuncInfo {
                        name: sym.name.clone(),
                        address: sym.address,
                        size: SYMBOL_STRIDE,
                    });
                }
                SymbolKind::Kernel => {
                    metadata.export_foreach.push(export);
                    metadata.func_infos.push(FuncInfo {
                        name: sym.name.clone(),
                        address: sym.address,
                        size: SYMBOL_STRIDE,
                    });
                }
            }
        }
        metadata.pragmas = state.pragmas;
        metadata.object_slots = state.object_slots;

        let image = ObjectImage {
            kind: ObjectType::Relocatable.fingerprint_tag(),
            symbols: state.symbols,
            refs: state.refs,
        };

        Ok(CompiledObject {
            image: self.encode_image(&image)?,
            metadata,
        })
    }

    fn link(&self, request: &LinkRequest<'_>) -> Result<Vec<u8>, BackendError> {
        if !matches!(
            request.kind,
            ObjectType::SharedObject | ObjectType::Executable
        ) {
            return Err(BackendError::Link {
                diagnostic: format!("cannot link a {} output", request.kind),
            });
        }

        let image = self.decode_image(request.image)?;
        if image.kind != ObjectType::Relocatable.fingerprint_tag() {
            return Err(BackendError::Link {
                diagnostic: "input is not a relocatable object image".to_string(),
            });
        }

        let unresolved: Vec<&str> = image
            .refs
            .iter()
            .filter(|name| {
                !request.allowed_undefined.iter().any(|a| a == *name)
                    && request
                        .resolver
                        .map_or(true, |r| r.resolve(name).is_none())
            })
            .map(String::as_str)
            .collect();

        if !unresolved.is_empty() {
            return Err(BackendError::Link {
                diagnostic: format!("unresolved symbols: {}", unresolved.join(", ")),
            });
        }

        let linked = ObjectImage {
            kind: request.kind.fingerprint_tag(),
            symbols: image.symbols,
            refs: image.refs,
        };
        self.encode_image(&linked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceOrigin, SourceUnit};
    use kiln_common::CompileFlags;

    fn unit(name: &str, text: &str) -> SourceUnit {
        SourceUnit::new(
            SourceOrigin::Bitcode {
                name: name.to_string(),
                bytes: text.as_bytes().to_vec(),
            },
            CompileFlags::default(),
        )
    }

    fn compile(sources: &[&SourceUnit]) -> Result<CompiledObject, BackendError> {
        let backend = TextBackend::new();
        backend.compile(&CompileRequest {
            sources: sources.to_vec(),
            flags: CompileFlags::default(),
            object_type: ObjectType::Relocatable,
            reloc_model: Default::default(),
        })
    }

    #[test]
    fn compile_collects_exports() {
        let src = unit(
            "main",
            "# sample script\nvar gCount\nfunc root\nkernel blur\npragma version 1\nslot 2\n",
        );
        let obj = compile(&[&src]).unwrap();

        assert_eq!(obj.metadata.export_vars.len(), 1);
        assert_eq!(obj.metadata.export_funcs.len(), 1);
        assert_eq!(obj.metadata.export_foreach.len(), 1);
        assert_eq!(obj.metadata.func_infos.len(), 2);
        assert_eq!(obj.metadata.pragmas, vec![("version".into(), "1".into())]);
        assert_eq!(obj.metadata.object_slots, vec![2]);
        assert!(!obj.image.is_empty());
    }

    #[test]
    fn addresses_are_deterministic_and_ordered() {
        let src = unit("main", "var a\nfunc b\nkernel c\n");
        let obj = compile(&[&src]).unwrap();
        assert_eq!(obj.metadata.export_vars[0].address, BASE_ADDRESS);
        assert_eq!(
            obj.metadata.export_funcs[0].address,
            BASE_ADDRESS + SYMBOL_STRIDE
        );
        assert_eq!(
            obj.metadata.export_foreach[0].address,
            BASE_ADDRESS + 2 * SYMBOL_STRIDE
        );
    }

    #[test]
    fn identical_inputs_give_identical_images() {
        let src = unit("main", "func root\nref malloc\npragma version 2\n");
        let a = compile(&[&src]).unwrap();
        let b = compile(&[&src]).unwrap();
        assert_eq!(a.image, b.image);
        assert_eq!(a.metadata, b.metadata);
    }

    #[test]
    fn two_sources_share_the_address_space() {
        let main = unit("main", "func root\n");
        let lib = unit("lib", "func helper\n");
        let obj = compile(&[&main, &lib]).unwrap();
        assert_eq!(obj.metadata.export_funcs.len(), 2);
        assert_eq!(
            obj.metadata.export_funcs[1].address,
            BASE_ADDRESS + SYMBOL_STRIDE
        );
    }

    #[test]
    fn local_definition_satisfies_ref() {
        let src = unit("main", "func helper\nref helper\n");
        let backend = TextBackend::new();
        let obj = compile(&[&src]).unwrap();
        let image = backend.decode_image(&obj.image).unwrap();
        assert!(image.refs.is_empty());
    }

    #[test]
    fn only_undefined_refs_survive_compilation() {
        let src = unit("main", "func root\nref root\nref malloc\nref free\n");
        let backend = TextBackend::new();
        let obj = compile(&[&src]).unwrap();
        let image = backend.decode_image(&obj.image).unwrap();
        assert_eq!(image.refs, ["malloc", "free"]);
    }

    #[test]
    fn duplicate_definition_is_a_compile_error() {
        let src = unit("main", "func root\nvar root\n");
        let err = compile(&[&src]).unwrap_err();
        assert!(err.diagnostic().contains("duplicate definition"));
        assert!(err.diagnostic().contains("main:2"));
    }

    #[test]
    fn unknown_directive_is_a_compile_error() {
        let src = unit("main", "fnuc root\n");
        let err = compile(&[&src]).unwrap_err();
        assert!(err.diagnostic().contains("unknown directive 'fnuc'"));
    }

    #[test]
    fn malformed_slot_is_a_compile_error() {
        let src = unit("main", "slot many\n");
        let err = compile(&[&src]).unwrap_err();
        assert!(err.diagnostic().contains("invalid slot index"));
    }

    #[test]
    fn pragma_without_value_is_a_compile_error() {
        let src = unit("main", "pragma version\n");
        let err = compile(&[&src]).unwrap_err();
        assert!(err.diagnostic().contains("missing a value"));
    }

    #[test]
    fn no_sources_is_a_compile_error() {
        let err = compile(&[]).unwrap_err();
        assert!(err.diagnostic().contains("no source units"));
    }

    #[test]
    fn link_allows_marked_undefined() {
        let src = unit("main", "func root\nref foo\n");
        let obj = compile(&[&src]).unwrap();

        let backend = TextBackend::new();
        let allowed = vec!["foo".to_string()];
        let linked = backend
            .link(&LinkRequest {
                image: &obj.image,
                kind: ObjectType::SharedObject,
                allowed_undefined: &allowed,
                resolver: None,
            })
            .unwrap();

        let image = backend.decode_image(&linked).unwrap();
        assert_eq!(image.kind, ObjectType::SharedObject.fingerprint_tag());
    }

    #[test]
    fn link_fails_on_unresolved_symbol() {
        let src = unit("main", "func root\nref foo\n");
        let obj = compile(&[&src]).unwrap();

        let backend = TextBackend::new();
        let err = backend
            .link(&LinkRequest {
                image: &obj.image,
                kind: ObjectType::SharedObject,
                allowed_undefined: &[],
                resolver: None,
            })
            .unwrap_err();
        assert!(err.diagnostic().contains("unresolved symbols: foo"));
    }

    #[test]
    fn link_consults_the_resolver() {
        let src = unit("main", "func root\nref foo\n");
        let obj = compile(&[&src]).unwrap();

        let backend = TextBackend::new();
        let resolver = |name: &str| (name == "foo").then_some(0x8000u64);
        let linked = backend.link(&LinkRequest {
            image: &obj.image,
            kind: ObjectType::Executable,
            allowed_undefined: &[],
            resolver: Some(&resolver),
        });
        assert!(linked.is_ok());
    }

    #[test]
    fn link_rejects_relocatable_output_kind() {
        let src = unit("main", "func root\n");
        let obj = compile(&[&src]).unwrap();

        let backend = TextBackend::new();
        let err = backend
            .link(&LinkRequest {
                image: &obj.image,
                kind: ObjectType::Relocatable,
                allowed_undefined: &[],
                resolver: None,
            })
            .unwrap_err();
        assert!(err.diagnostic().contains("cannot link"));
    }

    #[test]
    fn link_rejects_linked_input() {
        let src = unit("main", "func root\n");
        let obj = compile(&[&src]).unwrap();

        let backend = TextBackend::new();
        let so = backend
            .link(&LinkRequest {
                image: &obj.image,
                kind: ObjectType::SharedObject,
                allowed_undefined: &[],
                resolver: None,
            })
            .unwrap();

        // Linking an already-linked image must be rejected.
        let err = backend
            .link(&LinkRequest {
                image: &so,
                kind: ObjectType::Executable,
                allowed_undefined: &[],
                resolver: None,
            })
            .unwrap_err();
        assert!(err.diagnostic().contains("not a relocatable"));
    }

    #[test]
    fn decode_rejects_garbage() {
        let backend = TextBackend::new();
        assert!(backend.decode_image(b"AB").is_err());
        assert!(backend.decode_image(b"garbage data here").is_err());
    }

    #[test]
    fn decode_rejects_tampered_payload() {
        let src = unit("main", "func root\n");
        let obj = compile(&[&src]).unwrap();

        let backend = TextBackend::new();
        let mut tampered = obj.image.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        let err = backend.decode_image(&tampered).unwrap_err();
        assert!(err.diagnostic().contains("invalid object image"));
    }
}
