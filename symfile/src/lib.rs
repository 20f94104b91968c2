//! Reads Program Database (PDB) files for a debugger.
//!
//! [`SymbolFile`] opens a PDB and converts its contents on demand: types are materialized through
//! a caller-supplied [`TypeSystem`], and functions, variables, compile units, and line tables are
//! decoded from the symbol streams. Every entity is identified by a [`PdbSymUid`].
//!
//! Tag types (classes, structs, unions, enums) are created as forward declarations. Their members
//! are added when the debugger asks for them through [`SymbolFile::complete_type`].
//!
//! # References
//! * <https://llvm.org/docs/PDB/index.html>
//! * <https://github.com/microsoft/microsoft-pdb>

#![forbid(unused_must_use)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::single_match)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::new_without_default)]

pub mod compilands;
pub mod dbi;
pub mod globals;
pub mod guid;
pub mod index;
pub mod lines;
pub mod modi;
pub mod names;
pub mod options;
pub mod parent_index;
pub mod pdbi;
pub mod resolve;
pub mod simple;
mod stream_index;
pub mod symbols;
pub mod tpi;
pub mod type_system;
pub mod types;
pub mod uid;
pub mod unique_name;

mod completer;
mod decl_context;
mod materialize;
mod symbol_file;

#[cfg(test)]
mod model;
#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use ::ms_codeview as codeview;
pub use ::ms_pdb_msf as msf;
pub use ::uuid::Uuid;
pub use bstr::BStr;
pub use compilands::{CompileUnit, Language};
pub use index::PdbIndex;
pub use materialize::TypeCache;
pub use options::SymbolFileOptions;
pub use resolve::{SymbolContext, SymbolContextItem};
pub use stream_index::{Stream, StreamIndexU16};
pub use symbol_file::SymbolFile;
pub use symbols::{Function, Variable, VariableLocation, VariableScope};
pub use type_system::TypeSystem;
pub use types::{ResolveState, Type, TypeRef};
pub use uid::{
    PdbCompilandId, PdbCompilandSymId, PdbGlobalSymId, PdbSymId, PdbSymUid, PdbSymUidKind,
    PdbTypeSymId,
};
