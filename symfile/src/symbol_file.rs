//! The entry point for reading a PDB.

use crate::compilands::{CompileUnit, create_compile_unit, num_compile_units};
use crate::index::PdbIndex;
use crate::lines::{LineTable, support_files};
use crate::materialize::{Materializer, TypeCache};
use crate::options::SymbolFileOptions;
use crate::parent_index::{ParentIndex, build_parent_index};
use crate::symbols::{Function, Variable, create_function, create_global_variable};
use crate::type_system::TypeSystem;
use crate::types::TypeRef;
use crate::uid::{PdbCompilandId, PdbCompilandSymId, PdbGlobalSymId, PdbSymUid, PdbTypeSymId};
use bstr::BString;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Reads the types and symbols of a PDB and converts them for a debugger.
///
/// Everything is decoded on demand and cached. Types are converted through `TS`, which owns the
/// debugger's representation of them.
pub struct SymbolFile<'a, TS: TypeSystem> {
    pub(crate) index: PdbIndex<'a>,
    pub(crate) parents: ParentIndex,
    pub(crate) type_system: TS,
    pub(crate) types: TypeCache<TS>,
    pub(crate) compile_units: HashMap<u16, Rc<CompileUnit>>,
    pub(crate) functions: HashMap<PdbSymUid, Rc<Function>>,
    pub(crate) global_vars: HashMap<PdbSymUid, Rc<Variable>>,
    pub(crate) line_tables: HashMap<u16, Rc<LineTable>>,
}

impl<'a, TS: TypeSystem> SymbolFile<'a, TS> {
    /// Opens a PDB from its contents. `image` must contain the entire file.
    pub fn open(
        image: &'a [u8],
        type_system: TS,
        options: SymbolFileOptions,
    ) -> anyhow::Result<Self> {
        let index = PdbIndex::open(image, options)?;
        let parents = build_parent_index(index.tpi());
        debug!(num_nested = parents.len(), "built parent index");

        Ok(Self {
            index,
            parents,
            type_system,
            types: TypeCache::default(),
            compile_units: HashMap::new(),
            functions: HashMap::new(),
            global_vars: HashMap::new(),
            line_tables: HashMap::new(),
        })
    }

    /// The parsed streams of the PDB.
    pub fn index(&self) -> &PdbIndex<'a> {
        &self.index
    }

    #[allow(missing_docs)]
    pub fn type_system(&self) -> &TS {
        &self.type_system
    }

    #[allow(missing_docs)]
    pub fn type_system_mut(&mut self) -> &mut TS {
        &mut self.type_system
    }

    /// The types created so far.
    pub fn type_cache(&self) -> &TypeCache<TS> {
        &self.types
    }

    /// Identifies the PDB. Together with [`Self::age`], this matches the PDB to its executable.
    pub fn guid(&self) -> Uuid {
        self.index.pdbi().guid()
    }

    #[allow(missing_docs)]
    pub fn age(&self) -> u32 {
        self.index.pdbi().age()
    }

    fn materializer(&mut self) -> Materializer<'_, 'a, TS> {
        Materializer {
            index: &self.index,
            parents: &self.parents,
            ts: &mut self.type_system,
            cache: &mut self.types,
        }
    }

    /// Gets the type for a type record or simple type index, creating it if necessary.
    ///
    /// Returns `None` if the type cannot be represented. A forward reference and the full
    /// declaration of the same UDT return the same object.
    pub fn get_or_create_type(&mut self, id: PdbTypeSymId) -> Option<TypeRef<TS::CompilerType>> {
        self.materializer().get_or_create_type(id)
    }

    /// Gets the type for a UID.
    ///
    /// # Panics
    ///
    /// Panics if `uid` does not identify a type.
    pub fn resolve_type_uid(&mut self, uid: PdbSymUid) -> Option<TypeRef<TS::CompilerType>> {
        if let Some(t) = self.types.get(uid) {
            return Some(t.clone());
        }
        let id = uid.as_type();
        self.get_or_create_type(id)
    }

    /// Adds the members of a tag type that was created by this symbol file. Returns `true` if
    /// the type is complete afterward. Completing a type twice does nothing the second time.
    ///
    /// # Panics
    ///
    /// Panics if `compiler_type` is a tag type that this symbol file did not create.
    pub fn complete_type(&mut self, compiler_type: &TS::CompilerType) -> bool {
        self.materializer().complete_type(compiler_type)
    }

    /// Finds the types named `name`. Returns at most `max_matches` types, or all of them if
    /// `max_matches` is 0.
    ///
    /// A forward reference and its full declaration are the same type, so each type is returned
    /// once.
    pub fn find_types_by_name(
        &mut self,
        name: &str,
        max_matches: usize,
    ) -> Vec<TypeRef<TS::CompilerType>> {
        let candidates = self.index.tpi().find_records_by_name(name).to_vec();

        let mut found: Vec<TypeRef<TS::CompilerType>> = Vec::new();
        for ti in candidates {
            if max_matches != 0 && found.len() >= max_matches {
                break;
            }
            let Some(t) = self.get_or_create_type(PdbTypeSymId::tpi(ti)) else {
                continue;
            };
            if found.iter().any(|f| Rc::ptr_eq(f, &t)) {
                continue;
            }
            found.push(t);
        }
        found
    }

    /// The number of compile units. This does not count the linker module.
    pub fn num_compile_units(&self) -> usize {
        num_compile_units(&self.index)
    }

    /// Gets a compile unit by its position.
    pub fn compile_unit_at_index(&mut self, i: usize) -> Option<Rc<CompileUnit>> {
        if i >= self.num_compile_units() {
            return None;
        }
        let modi = u16::try_from(i).ok()?;
        self.get_or_create_compile_unit(PdbCompilandId { modi })
    }

    #[allow(missing_docs)]
    pub fn get_or_create_compile_unit(&mut self, id: PdbCompilandId) -> Option<Rc<CompileUnit>> {
        if let Some(cu) = self.compile_units.get(&id.modi) {
            return Some(cu.clone());
        }

        match create_compile_unit(&self.index, id.modi) {
            Ok(cu) => {
                let cu = Rc::new(cu);
                self.compile_units.insert(id.modi, cu.clone());
                Some(cu)
            }
            Err(e) => {
                warn!(modi = id.modi, "failed to read compile unit: {e:#}");
                None
            }
        }
    }

    /// Gets the line table of a compile unit. The table is empty if the module has no line
    /// information.
    pub fn line_table(&mut self, id: PdbCompilandId) -> Option<Rc<LineTable>> {
        if let Some(t) = self.line_tables.get(&id.modi) {
            return Some(t.clone());
        }

        let table = match self.build_line_table(id.modi) {
            Ok(t) => Rc::new(t),
            Err(e) => {
                warn!(modi = id.modi, "failed to read line table: {e:#}");
                return None;
            }
        };
        self.line_tables.insert(id.modi, table.clone());
        Some(table)
    }

    fn build_line_table(&self, modi: u16) -> anyhow::Result<LineTable> {
        let index = &self.index;
        let Some(ms) = index.module_stream(modi)? else {
            return Ok(LineTable::default());
        };
        LineTable::build(ms.c13_line_data_bytes()?, index.names(), |segment, offset| {
            index.make_virtual_address(segment, offset)
        })
    }

    /// Lists the source files of a compile unit: every file in its checksum table, including
    /// headers that contribute no line rows.
    pub fn support_files(&self, id: PdbCompilandId) -> Option<Vec<BString>> {
        let index = &self.index;
        let files = index.module_stream(id.modi).and_then(|ms| match ms {
            Some(ms) => support_files(ms.c13_line_data_bytes()?, index.names()),
            None => Ok(Vec::new()),
        });
        match files {
            Ok(files) => Some(files),
            Err(e) => {
                warn!(modi = id.modi, "failed to read file checksums: {e:#}");
                None
            }
        }
    }

    /// Gets the function defined by a procedure record in a module stream.
    pub fn get_or_create_function(&mut self, id: PdbCompilandSymId) -> Option<Rc<Function>> {
        let uid = PdbSymUid::from(id);
        if let Some(f) = self.functions.get(&uid) {
            return Some(f.clone());
        }

        match create_function(&self.index, id) {
            Ok(Some(f)) => {
                let f = Rc::new(f);
                self.functions.insert(uid, f.clone());
                Some(f)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(modi = id.modi, offset = id.offset, "failed to read function: {e:#}");
                None
            }
        }
    }

    /// Gets the variable defined by a record in the global symbol stream.
    pub fn get_or_create_global_variable(&mut self, id: PdbGlobalSymId) -> Option<Rc<Variable>> {
        let uid = PdbSymUid::from(id);
        if let Some(v) = self.global_vars.get(&uid) {
            return Some(v.clone());
        }

        match create_global_variable(&self.index, id) {
            Ok(Some(v)) => {
                let v = Rc::new(v);
                self.global_vars.insert(uid, v.clone());
                Some(v)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(offset = id.offset, "failed to read global variable: {e:#}");
                None
            }
        }
    }

    /// Finds the global variables (including statics, thread-locals, and constants) named
    /// `name`. Returns at most `max_matches` variables, or all of them if `max_matches` is 0.
    pub fn find_global_variables(&mut self, name: &str, max_matches: usize) -> Vec<Rc<Variable>> {
        let offsets = self.index.globals().find_records_by_name(name).to_vec();

        let mut found = Vec::new();
        for offset in offsets {
            if max_matches != 0 && found.len() >= max_matches {
                break;
            }
            let id = PdbGlobalSymId {
                offset,
                is_public: false,
            };
            if let Some(v) = self.get_or_create_global_variable(id) {
                found.push(v);
            }
        }
        found
    }

    /// Gets the type of a variable.
    pub fn variable_type(&mut self, variable: &Variable) -> Option<TypeRef<TS::CompilerType>> {
        self.resolve_type_uid(variable.type_uid)
    }
}
