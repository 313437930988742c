//! Code unit loading
//!
//! Loading turns a verified [`CodeUnit`] into a [`LoadedUnit`]: symbolic
//! type names, member references and def call sites are linked against the
//! whitelist once, string constants become shared `Arc<str>`s, and the
//! static initializer (hoisted regex patterns) runs exactly once.

use crate::compiler::bytecode::{verify_unit, CodeUnit, FunctionCode, UnitError, VerifyError};
use crate::settings::CompilerSettings;
use crate::vm::dispatch::CallSite;
use crate::vm::exception::ScriptException;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::Value;
use crate::whitelist::{DefReference, DefReferenceError, MemberId, ScriptType, Whitelist};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("Unknown type [{0}]")]
    UnknownType(String),

    #[error("Unknown member [{0}]")]
    UnknownMember(String),

    #[error(transparent)]
    CallSite(#[from] DefReferenceError),

    #[error("Static initializer failed: {0}")]
    StaticInit(Box<ScriptException>),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// A linked, executable code unit.
pub struct LoadedUnit {
    pub name: String,
    pub source: String,
    pub flags: u32,
    pub whitelist: Arc<Whitelist>,
    pub settings: CompilerSettings,
    pub functions: Vec<FunctionCode>,
    pub strings: Vec<Arc<str>>,
    pub types: Vec<ScriptType>,
    pub members: Vec<MemberId>,
    pub call_sites: Vec<CallSite>,
    /// Static slots, filled by the static initializer
    pub statics: RwLock<Vec<Value>>,
}

impl LoadedUnit {
    pub fn function(&self, index: u16) -> Option<&FunctionCode> {
        self.functions.get(index as usize)
    }

    pub fn function_index(&self, name: &str) -> Option<u16> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .and_then(|i| u16::try_from(i).ok())
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

impl fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("name", &self.name)
            .field("functions", &self.functions.len())
            .field("types", &self.types.len())
            .field("members", &self.members.len())
            .field("call_sites", &self.call_sites.len())
            .finish()
    }
}

/// Decode, verify and load an encoded code unit.
pub fn load_bytes(data: &[u8], whitelist: Arc<Whitelist>, settings: &CompilerSettings) -> LoadResult<Arc<LoadedUnit>> {
    let unit = CodeUnit::decode(data)?;
    load(&unit, whitelist, settings)
}

/// Verify and link `unit`, then run its static initializer.
pub fn load(unit: &CodeUnit, whitelist: Arc<Whitelist>, settings: &CompilerSettings) -> LoadResult<Arc<LoadedUnit>> {
    verify_unit(unit)?;

    let types = unit
        .types
        .iter()
        .map(|name| whitelist.lookup_type(name).ok_or_else(|| LoadError::UnknownType(name.clone())))
        .collect::<LoadResult<Vec<_>>>()?;
    let members = unit
        .members
        .iter()
        .map(|reference| {
            whitelist
                .resolve_member_ref(reference)
                .ok_or_else(|| LoadError::UnknownMember(format!("{}.{}/{}", reference.owner, reference.name, reference.arity)))
        })
        .collect::<LoadResult<Vec<_>>>()?;
    let call_sites = unit
        .call_sites
        .iter()
        .map(|encoded| DefReference::decode(encoded).map(CallSite::new))
        .collect::<Result<Vec<_>, _>>()?;

    let loaded = Arc::new(LoadedUnit {
        name: unit.name.clone(),
        source: unit.source.clone(),
        flags: unit.flags,
        whitelist,
        settings: settings.clone(),
        functions: unit.functions.clone(),
        strings: unit.constants.strings.iter().map(|s| Arc::from(s.as_str())).collect(),
        types,
        members,
        call_sites,
        statics: RwLock::new(vec![Value::Null; unit.static_slots as usize]),
    });

    if let Some(init) = unit.static_init {
        Interpreter::new(&loaded)
            .call(&loaded, init, Vec::new())
            .map_err(|fault| {
                let position = loaded.function(init).and_then(|f| f.lines.first()).map(|l| l.offset as usize);
                LoadError::StaticInit(Box::new(ScriptException::from_fault(fault, &loaded.source, position)))
            })?;
    }

    tracing::debug!(
        script = %loaded.name,
        types = loaded.types.len(),
        members = loaded.members.len(),
        call_sites = loaded.call_sites.len(),
        statics = unit.static_slots,
        "loaded"
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::{BytecodeWriter, FunctionRole, Opcode};
    use crate::whitelist::standard;

    fn unit_returning_type(type_name: &str) -> CodeUnit {
        let mut unit = CodeUnit::new("t", "");
        unit.types.push(type_name.to_string());
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::ConstNull);
        w.emit_opcode(Opcode::CheckCast);
        w.emit_u32(0);
        w.emit_opcode(Opcode::Return);
        unit.functions.push(FunctionCode {
            name: "execute".into(),
            role: FunctionRole::Entry,
            param_count: 0,
            slot_count: 0,
            code: w.into_bytes(),
            handlers: Vec::new(),
            lines: Vec::new(),
        });
        unit
    }

    #[test]
    fn test_links_known_types() {
        let loaded = load(&unit_returning_type("Map"), standard(), &CompilerSettings::default()).unwrap();
        assert_eq!(loaded.types.len(), 1);
        assert_eq!(loaded.function_index("execute"), Some(0));
    }

    #[test]
    fn test_unknown_type_fails() {
        let err = load(&unit_returning_type("Nope"), standard(), &CompilerSettings::default()).unwrap_err();
        assert!(matches!(err, LoadError::UnknownType(name) if name == "Nope"));
    }

    #[test]
    fn test_corrupt_bytes_fail() {
        let bytes = unit_returning_type("Map").encode();
        let mut corrupt = bytes.clone();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        assert!(load_bytes(&bytes, standard(), &CompilerSettings::default()).is_ok());
        assert!(matches!(
            load_bytes(&corrupt, standard(), &CompilerSettings::default()),
            Err(LoadError::Unit(_))
        ));
    }
}
