//! Export metadata produced by a successful compile or cache load.

use serde::{Deserialize, Serialize};

/// One exported symbol: its name and the address assigned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    /// Symbol name.
    pub name: String,
    /// Runtime address within the compiled artifact.
    pub address: u64,
}

/// Descriptor for a compiled function body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncInfo {
    /// Function name.
    pub name: String,
    /// Entry address.
    pub address: u64,
    /// Body size in bytes.
    pub size: u64,
}

/// Metadata describing the exported surface of a compiled result.
///
/// Produced only as a byproduct of a successful backend compile or a cache
/// load, and read-only from then on. The lists preserve the order in which
/// symbols appeared in the source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Exported global variables.
    pub export_vars: Vec<Export>,
    /// Exported functions.
    pub export_funcs: Vec<Export>,
    /// Exported kernel ("for-each") entry points.
    pub export_foreach: Vec<Export>,
    /// `{key, value}` pragma pairs.
    pub pragmas: Vec<(String, String)>,
    /// Per-function descriptors for functions and kernels.
    pub func_infos: Vec<FuncInfo>,
    /// Object slot indices referenced by the script.
    pub object_slots: Vec<u32>,
}

impl ExportMetadata {
    /// Resolves a symbol name to its address within this result.
    ///
    /// Functions take precedence over kernels, which take precedence over
    /// variables. Returns `None` if the name is not exported; absence is a
    /// valid outcome, not an error.
    pub fn lookup(&self, name: &str) -> Option<u64> {
        self.export_funcs
            .iter()
            .chain(self.export_foreach.iter())
            .chain(self.export_vars.iter())
            .find(|e| e.name == name)
            .map(|e| e.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExportMetadata {
        ExportMetadata {
            export_vars: vec![Export {
                name: "gCount".to_string(),
                address: 0x1000,
            }],
            export_funcs: vec![Export {
                name: "root".to_string(),
                address: 0x1010,
            }],
            export_foreach: vec![Export {
                name: "blur".to_string(),
                address: 0x1020,
            }],
            pragmas: vec![("version".to_string(), "1".to_string())],
            func_infos: vec![FuncInfo {
                name: "root".to_string(),
                address: 0x1010,
                size: 0x10,
            }],
            object_slots: vec![0, 2],
        }
    }

    #[test]
    fn default_is_empty() {
        let m = ExportMetadata::default();
        assert!(m.export_vars.is_empty());
        assert!(m.export_funcs.is_empty());
        assert!(m.export_foreach.is_empty());
        assert!(m.pragmas.is_empty());
        assert!(m.func_infos.is_empty());
        assert!(m.object_slots.is_empty());
    }

    #[test]
    fn lookup_finds_each_kind() {
        let m = sample();
        assert_eq!(m.lookup("root"), Some(0x1010));
        assert_eq!(m.lookup("blur"), Some(0x1020));
        assert_eq!(m.lookup("gCount"), Some(0x1000));
    }

    #[test]
    fn lookup_absent_is_none() {
        assert_eq!(sample().lookup("missing"), None);
    }

    #[test]
    fn serde_roundtrip() {
        let m = sample();
        let json = serde_json::to_string(&m).unwrap();
        let back: ExportMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
