//! Symbol contexts: what is known about an address, or about a function found by name.

use crate::compilands::CompileUnit;
use crate::lines::LineEntry;
use crate::symbol_file::SymbolFile;
use crate::symbols::Function;
use crate::type_system::TypeSystem;
use crate::uid::{PdbCompilandId, PdbCompilandSymId};
use bitflags::bitflags;
use bstr::BString;
use ms_codeview::syms::{SymData, SymKind};
use std::rc::Rc;
use tracing::{debug, trace, warn};

bitflags! {
    /// Selects the parts of a [`SymbolContext`] to resolve.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
    pub struct SymbolContextItem: u32 {
        /// The compile unit that contains the address.
        const COMPILE_UNIT = 1;
        /// The function that contains the address. Implies `COMPILE_UNIT`.
        const FUNCTION = 2;
        /// The line table row that covers the address. Implies `COMPILE_UNIT`.
        const LINE_ENTRY = 4;
    }
}

/// The entities associated with an address.
#[derive(Clone, Debug, Default)]
pub struct SymbolContext {
    #[allow(missing_docs)]
    pub compile_unit: Option<Rc<CompileUnit>>,
    #[allow(missing_docs)]
    pub function: Option<Rc<Function>>,
    #[allow(missing_docs)]
    pub line_entry: Option<LineEntry>,
    /// The source file of `line_entry`.
    pub line_file: Option<BString>,
}

impl<'a, TS: TypeSystem> SymbolFile<'a, TS> {
    /// Resolves the parts of the symbol context of `address` that `items` asks for. Returns the
    /// context and the parts that were actually found.
    pub fn resolve_symbol_context(
        &mut self,
        address: u64,
        items: SymbolContextItem,
    ) -> (SymbolContext, SymbolContextItem) {
        let mut sc = SymbolContext::default();
        let mut resolved = SymbolContextItem::empty();

        if items.is_empty() {
            return (sc, resolved);
        }

        let Some(modi) = self.index.module_index_for_va(address) else {
            trace!(address, "address is not in any module");
            return (sc, resolved);
        };

        let Some(cu) = self.get_or_create_compile_unit(PdbCompilandId { modi }) else {
            return (sc, resolved);
        };
        sc.compile_unit = Some(cu);
        resolved |= SymbolContextItem::COMPILE_UNIT;

        if items.contains(SymbolContextItem::FUNCTION) {
            match self.index.find_procedure_at(modi, address) {
                Ok(Some(offset)) => {
                    let id = PdbCompilandSymId { modi, offset };
                    if let Some(f) = self.get_or_create_function(id) {
                        sc.function = Some(f);
                        resolved |= SymbolContextItem::FUNCTION;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(modi, address, "failed to search module symbols: {e:#}"),
            }
        }

        if items.contains(SymbolContextItem::LINE_ENTRY) {
            if let Some(table) = self.line_table(PdbCompilandId { modi }) {
                if let Some(entry) = table.find_entry_by_address(address) {
                    sc.line_file = table.file_name(entry).cloned();
                    sc.line_entry = Some(entry.clone());
                    resolved |= SymbolContextItem::LINE_ENTRY;
                }
            }
        }

        (sc, resolved)
    }

    /// Finds the functions named `name`, through the procedure references in the global symbol
    /// stream. Returns at most `max_matches` results, or all of them if `max_matches` is 0.
    pub fn find_functions(&mut self, name: &str, max_matches: usize) -> Vec<SymbolContext> {
        let offsets = self.index.globals().find_records_by_name(name).to_vec();

        let mut found = Vec::new();
        for offset in offsets {
            if max_matches != 0 && found.len() >= max_matches {
                break;
            }

            let target = match self.index.globals().record_at(offset) {
                Ok(sym) if matches!(sym.kind, SymKind::S_PROCREF | SymKind::S_LPROCREF) => {
                    match sym.parse() {
                        Ok(SymData::RefSym2(r)) => {
                            Some((r.header.module_index.get(), r.header.symbol_offset.get()))
                        }
                        _ => None,
                    }
                }
                Ok(_) => None,
                Err(e) => {
                    warn!(offset, "failed to read global symbol: {e:#}");
                    None
                }
            };
            let Some((module_index, symbol_offset)) = target else {
                continue;
            };

            // Procedure references use 1-based module indexes.
            let Some(modi) = module_index.checked_sub(1) else {
                debug!(offset, "procedure reference has module index 0");
                continue;
            };

            let Some(function) = self.get_or_create_function(PdbCompilandSymId {
                modi,
                offset: symbol_offset,
            }) else {
                continue;
            };
            let compile_unit = self.get_or_create_compile_unit(PdbCompilandId { modi });

            found.push(SymbolContext {
                compile_unit,
                function: Some(function),
                line_entry: None,
                line_file: None,
            });
        }
        found
    }
}
