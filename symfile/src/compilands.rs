//! Compile units
//!
//! Each module in the DBI is a compile unit, except for the module that the linker adds for its
//! own symbols.

use crate::dbi::LINKER_MODULE_NAME;
use crate::index::PdbIndex;
use crate::uid::{PdbCompilandId, PdbSymUid};
use bstr::{BStr, BString, ByteSlice};
use ms_codeview::syms::{SymData, SymKind, source_language};
use ms_codeview::types::{BuildInfoIndex, TypeData, TypeIndex};
use tracing::{debug, trace};

/// The source language of a compile unit.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum Language {
    #[default]
    Unknown,
    C,
    CPlusPlus,
    Masm,
    CSharp,
    Rust,
    Swift,
}

impl Language {
    /// Converts the `CV_CFL_LANG` value of `S_COMPILE3`.
    pub fn from_cv(lang: u8) -> Self {
        match lang {
            source_language::C => Self::C,
            source_language::CXX => Self::CPlusPlus,
            source_language::MASM => Self::Masm,
            source_language::CSHARP => Self::CSharp,
            source_language::RUST => Self::Rust,
            source_language::SWIFT => Self::Swift,
            _ => Self::Unknown,
        }
    }
}

/// A compile unit.
#[derive(Clone, Debug)]
pub struct CompileUnit {
    #[allow(missing_docs)]
    pub uid: PdbSymUid,
    /// Zero-based module index in the DBI.
    pub modi: u16,
    /// The module name from the DBI, usually the path of the object file.
    pub name: BString,
    /// The primary source file, or the object file if the source file is unknown.
    pub main_file: BString,
    #[allow(missing_docs)]
    pub language: Language,
    /// Built with PGO or LTCG.
    pub is_optimized: bool,
}

/// The number of modules that are compile units. The linker module is excluded; it is always
/// the last one.
pub(crate) fn num_compile_units(index: &PdbIndex<'_>) -> usize {
    let modules = index.modules();
    match modules.last() {
        Some(m) if m.module_name == LINKER_MODULE_NAME => modules.len() - 1,
        _ => modules.len(),
    }
}

/// Reads the compile unit for module `modi`.
pub(crate) fn create_compile_unit(index: &PdbIndex<'_>, modi: u16) -> anyhow::Result<CompileUnit> {
    let Some(desc) = index.module(modi) else {
        anyhow::bail!("Module index {modi} is out of range");
    };

    let mut language = Language::Unknown;
    let mut is_optimized = false;
    let mut main_file: Option<BString> = None;

    if let Some(ms) = index.module_stream(modi)? {
        for (_, sym) in ms.iter_syms()? {
            match sym.kind {
                SymKind::S_COMPILE3 => {
                    if let Ok(SymData::Compile3(c)) = sym.parse() {
                        let flags = c.flags();
                        language = Language::from_cv(flags.language());
                        is_optimized = flags.has_optimizations();
                    }
                }
                SymKind::S_BUILDINFO => {
                    if let Ok(SymData::BuildInfo(b)) = sym.parse() {
                        main_file = source_file_from_build_info(index, TypeIndex(b.item));
                    }
                }
                _ => {}
            }
            if sym.kind.starts_scope() {
                // Compiland-level records come before the first procedure.
                break;
            }
        }
    } else {
        debug!(modi, "module has no stream");
    }

    let main_file = main_file.unwrap_or_else(|| {
        if desc.obj_file.is_empty() {
            desc.module_name.clone()
        } else {
            desc.obj_file.clone()
        }
    });

    trace!(modi, name = %desc.module_name, %main_file, ?language, "created compile unit");

    Ok(CompileUnit {
        uid: PdbCompilandId { modi }.into(),
        modi,
        name: desc.module_name.clone(),
        main_file,
        language,
        is_optimized,
    })
}

fn source_file_from_build_info(index: &PdbIndex<'_>, item: TypeIndex) -> Option<BString> {
    let ipi = index.ipi();
    let TypeData::BuildInfo(bi) = ipi.get_type(item).ok()? else {
        return None;
    };

    let string_id = |i: BuildInfoIndex| -> Option<&BStr> {
        let id = bi.arg(i)?;
        match ipi.get_type(TypeIndex(id)).ok()? {
            TypeData::StringId(s) => Some(s.name),
            _ => None,
        }
    };

    let source = string_id(BuildInfoIndex::SourceFile)?;
    if source.is_empty() {
        return None;
    }
    if is_absolute_path(source) {
        return Some(source.to_owned());
    }

    match string_id(BuildInfoIndex::CurrentDirectory) {
        Some(cwd) if !cwd.is_empty() => Some(join_path(cwd, source)),
        _ => Some(source.to_owned()),
    }
}

/// Recognizes `/x`, `\x`, and `C:x` paths.
fn is_absolute_path(path: &[u8]) -> bool {
    matches!(path.first(), Some(b'/' | b'\\'))
        || (path.len() >= 2 && path[0].is_ascii_alphabetic() && path[1] == b':')
}

fn join_path(dir: &[u8], file: &[u8]) -> BString {
    let mut s = BString::from(dir);
    if !s.ends_with(b"\\") && !s.ends_with(b"/") {
        s.push(b'\\');
    }
    s.extend_from_slice(file);
    s
}
