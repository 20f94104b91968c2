//! Functions and variables, decoded from symbol records.
//!
//! Global variables come from the global symbol stream; functions come from module streams.
//! These objects only refer to their types by UID. The caller materializes the types.

use crate::index::{PdbIndex, is_proc_kind};
use crate::uid::{PdbCompilandId, PdbCompilandSymId, PdbGlobalSymId, PdbSymUid, PdbTypeSymId};
use anyhow::bail;
use bstr::BString;
use ms_codeview::syms::{Constant, Data, SymData, SymKind};
use ms_codeview::types::TypeIndex;
use std::ops::Range;
use tracing::{debug, trace};

/// `DW_OP_addr`
pub const DW_OP_ADDR: u8 = 0x03;
/// `DW_OP_const4u`
pub const DW_OP_CONST4U: u8 = 0x0c;
/// `DW_OP_form_tls_address`
pub const DW_OP_FORM_TLS_ADDRESS: u8 = 0x9b;

/// Where a variable is visible.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VariableScope {
    /// A global variable (`S_GDATA32`, `S_CONSTANT`).
    Global,
    /// A file-static variable (`S_LDATA32`).
    Static,
    /// A thread-local variable (`S_GTHREAD32`, `S_LTHREAD32`).
    ThreadLocal,
}

/// How to find the value of a variable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VariableLocation {
    /// A DWARF location expression. For data symbols this is `DW_OP_addr <address>`; for
    /// thread-local symbols it is `DW_OP_const4u <offset> DW_OP_form_tls_address`. Empty if the
    /// address could not be computed.
    Expression(Vec<u8>),
    /// The value itself, for constants. Little-endian, sized by the constant's type.
    ConstantValueData(Vec<u8>),
}

impl VariableLocation {
    /// Returns `true` if the value is stored in the symbol, rather than in target memory.
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::ConstantValueData(_))
    }
}

/// A global, static, thread-local, or constant variable.
#[derive(Clone, Debug)]
pub struct Variable {
    #[allow(missing_docs)]
    pub uid: PdbSymUid,
    /// The name, as found in the symbol record.
    pub name: BString,
    /// The name qualified with the global scope, e.g. `::g_count`.
    pub qualified_name: String,
    /// The UID of the variable's type.
    pub type_uid: PdbSymUid,
    #[allow(missing_docs)]
    pub scope: VariableScope,
    /// The symbol is visible outside of its compile unit.
    pub is_external: bool,
    /// The compile unit whose code or data contains the variable's address, if known.
    pub compile_unit: Option<PdbSymUid>,
    #[allow(missing_docs)]
    pub location: VariableLocation,
}

/// A function, from an `S_GPROC32` or `S_LPROC32` record.
#[derive(Clone, Debug)]
pub struct Function {
    #[allow(missing_docs)]
    pub uid: PdbSymUid,
    #[allow(missing_docs)]
    pub name: BString,
    /// The compile unit that defines the function.
    pub compile_unit: PdbSymUid,
    /// The addresses of the function's code.
    pub range: Range<u64>,
    /// The UID of the function's signature type. Signatures are not decoded yet, so this is
    /// always the UID of `T_NOTYPE`.
    pub signature_uid: PdbSymUid,
    /// The `LF_PROCEDURE` or `LF_MFUNCTION` record of the function, as found in the symbol.
    pub proc_type: TypeIndex,
}

/// Decodes the global variable at `id`. Returns `Ok(None)` if the record is not a variable.
pub(crate) fn create_global_variable(
    index: &PdbIndex<'_>,
    id: PdbGlobalSymId,
) -> anyhow::Result<Option<Variable>> {
    let uid = PdbSymUid::from(id);
    let sym = index.globals().record_at(id.offset)?;

    let (scope, is_external) = match sym.kind {
        SymKind::S_GDATA32 => (VariableScope::Global, true),
        SymKind::S_LDATA32 => (VariableScope::Static, false),
        SymKind::S_GTHREAD32 => (VariableScope::ThreadLocal, true),
        SymKind::S_LTHREAD32 => (VariableScope::ThreadLocal, false),
        SymKind::S_CONSTANT => {
            let SymData::Constant(c) = sym.parse()? else {
                bail!("S_CONSTANT record at {} did not decode as a constant", id.offset);
            };
            return Ok(Some(create_constant(index, uid, &c)?));
        }
        kind => {
            debug!(offset = id.offset, ?kind, "global symbol is not a variable");
            return Ok(None);
        }
    };

    let data: Data<'_> = match sym.parse()? {
        SymData::Data(d) | SymData::ThreadData(d) => d,
        _ => bail!("Data record at {} did not decode", id.offset),
    };

    let os = &data.header.offset_segment;
    let (location, compile_unit) = if scope == VariableScope::ThreadLocal {
        let mut expr = vec![DW_OP_CONST4U];
        expr.extend_from_slice(&os.offset().to_le_bytes());
        expr.push(DW_OP_FORM_TLS_ADDRESS);
        (expr, None)
    } else {
        match index.make_virtual_address(os.segment(), os.offset()) {
            Some(va) => {
                let modi = index.module_index_for_va(va);
                (
                    make_global_location_expression(va, index.options().address_size),
                    modi.map(|modi| PdbSymUid::from(PdbCompilandId { modi })),
                )
            }
            None => {
                debug!(
                    name = %data.name,
                    segment = os.segment(),
                    "variable has an invalid section"
                );
                (Vec::new(), None)
            }
        }
    };

    trace!(offset = id.offset, name = %data.name, ?scope, "created global variable");

    Ok(Some(Variable {
        uid,
        name: data.name.to_owned(),
        qualified_name: format!("::{}", data.name),
        type_uid: PdbTypeSymId::tpi(data.header.type_.get()).into(),
        scope,
        is_external,
        compile_unit,
        location: VariableLocation::Expression(location),
    }))
}

fn create_constant(
    index: &PdbIndex<'_>,
    uid: PdbSymUid,
    c: &Constant<'_>,
) -> anyhow::Result<Variable> {
    let Some(bits) = c.value.bits() else {
        bail!("The value of constant {} is not an integer", c.name);
    };

    let size = match index.tpi().integral_type_info(c.type_) {
        Some((size, _)) => size,
        None => bits.width / 8,
    };
    let size = (size as usize).min(16);
    let value = bits.extended(bits.signed).to_le_bytes();

    Ok(Variable {
        uid,
        name: c.name.to_owned(),
        qualified_name: format!("::{}", c.name),
        type_uid: PdbTypeSymId::tpi(c.type_).into(),
        scope: VariableScope::Global,
        is_external: false,
        compile_unit: None,
        location: VariableLocation::ConstantValueData(value[..size].to_vec()),
    })
}

/// Builds `DW_OP_addr <va>`, with an operand of `address_size` bytes.
pub fn make_global_location_expression(va: u64, address_size: u8) -> Vec<u8> {
    let size = (address_size as usize).min(8);
    let mut expr = Vec::with_capacity(1 + size);
    expr.push(DW_OP_ADDR);
    expr.extend_from_slice(&va.to_le_bytes()[..size]);
    expr
}

/// Decodes the function at `id`. Returns `Ok(None)` if the record is not a procedure or its
/// code has no address.
pub(crate) fn create_function(
    index: &PdbIndex<'_>,
    id: PdbCompilandSymId,
) -> anyhow::Result<Option<Function>> {
    let Some(ms) = index.module_stream(id.modi)? else {
        bail!("Module {} has no stream", id.modi);
    };
    let sym = ms.symbol_at(id.offset)?;
    if !is_proc_kind(sym.kind) {
        debug!(modi = id.modi, offset = id.offset, kind = ?sym.kind, "symbol is not a procedure");
        return Ok(None);
    }

    let SymData::Proc(proc) = sym.parse()? else {
        bail!("Procedure record at {} did not decode", id.offset);
    };

    let os = &proc.fixed.offset_segment;
    let Some(va) = index.make_virtual_address(os.segment(), os.offset()) else {
        debug!(name = %proc.name, "procedure has an invalid section");
        return Ok(None);
    };
    if va == index.options().load_address {
        debug!(name = %proc.name, "procedure has address 0");
        return Ok(None);
    }

    let len = proc.fixed.proc_len.get() as u64;
    let Some(end) = va.checked_add(len) else {
        debug!(name = %proc.name, va, len, "procedure extends past the end of the address space");
        return Ok(None);
    };
    Ok(Some(Function {
        uid: id.into(),
        name: proc.name.to_owned(),
        compile_unit: PdbCompilandId { modi: id.modi }.into(),
        range: va..end,
        signature_uid: PdbTypeSymId::tpi(TypeIndex::T_NOTYPE).into(),
        proc_type: proc.fixed.proc_type.get(),
    }))
}
