//! Symbol records, as stored in module symbol streams and the global symbol stream
//!
//! # References
//!
//! * [`cvinfo.h`](https://github.com/microsoft/microsoft-pdb/blob/805655a28bd8198004be2ac27e6e0290121a5e89/include/cvinfo.h)
//! * [CodeView Symbols](https://llvm.org/docs/PDB/CodeViewSymbols.html)

mod iter;
mod kind;
mod offset_segment;

#[doc(inline)]
pub use self::{iter::*, kind::SymKind, offset_segment::*};

use crate::parser::{Parse, Parser, ParserError};
use crate::types::number::Number;
use crate::types::{ItemId, TypeIndex, TypeIndexLe};
use bitfield::bitfield;
use bitflags::bitflags;
use bstr::BStr;
use std::fmt::Debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U16, U32, Unaligned};

/// Fixed part of `S_LPROC32` and `S_GPROC32` (`PROCSYM32`).
#[derive(IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned, Debug)]
#[repr(C)]
#[allow(missing_docs)]
pub struct ProcFixed {
    pub p_parent: U32<LE>,
    /// Stream offset of the `S_END` that closes this procedure's scope.
    pub p_end: U32<LE>,
    pub p_next: U32<LE>,
    /// Length of the procedure's code, in bytes.
    pub proc_len: U32<LE>,
    pub debug_start: U32<LE>,
    pub debug_end: U32<LE>,
    pub proc_type: TypeIndexLe,
    pub offset_segment: OffsetSegment,
    pub flags: u8,
}

bitflags! {
    /// `CV_PROCFLAGS`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcFlags: u8 {
        /// Frame pointer present.
        const NOFPO = 1 << 0;
        /// Interrupt return.
        const INT = 1 << 1;
        /// Far return.
        const FAR = 1 << 2;
        /// Does not return.
        const NEVER = 1 << 3;
        /// Label isn't fallen into.
        const NOTREACHED = 1 << 4;
        /// Custom calling convention.
        const CUST_CALL = 1 << 5;
        /// Marked `noinline`.
        const NOINLINE = 1 << 6;
        /// Has debug information for optimized code.
        const OPTDBGINFO = 1 << 7;
    }
}

/// `S_LPROC32` and `S_GPROC32`: the start of a function's symbol scope.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Proc<'a> {
    pub fixed: &'a ProcFixed,
    pub name: &'a BStr,
}

impl<'a> Proc<'a> {
    #[allow(missing_docs)]
    pub fn flags(&self) -> ProcFlags {
        ProcFlags::from_bits_retain(self.fixed.flags)
    }
}

impl<'a> Parse<'a> for Proc<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            fixed: p.get()?,
            name: p.strz()?,
        })
    }
}

/// The `len` and `kind` prefix of every symbol record. `len` counts `kind` but not itself.
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Clone, Default)]
#[allow(missing_docs)]
pub struct SymHeader {
    pub len: U16<LE>,
    pub kind: U16<LE>,
}

/// One symbol record: its kind and its payload (without the prefix).
#[derive(Clone)]
#[allow(missing_docs)]
pub struct Sym<'a> {
    pub kind: SymKind,
    pub data: &'a [u8],
}

impl<'a> Sym<'a> {
    /// Decodes the payload according to `kind`.
    pub fn parse(&self) -> Result<SymData<'a>, ParserError> {
        SymData::parse(self.kind, self.data)
    }

    /// Decodes the payload as `T`, for callers that already checked `kind`.
    pub fn parse_as<T>(&self) -> Result<T, ParserError>
    where
        T: Parse<'a>,
    {
        Parser::new(self.data).parse::<T>()
    }
}

impl<'a> Debug for Sym<'a> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{:?}", self.kind)
    }
}

/// `S_PUB32`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Pub<'a> {
    pub fixed: &'a PubFixed,
    pub name: &'a BStr,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
pub struct PubFixed {
    pub flags: U32<LE>,
    pub offset_segment: OffsetSegment,
}

impl<'a> Parse<'a> for Pub<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            fixed: p.get()?,
            name: p.strz()?,
        })
    }
}

/// `S_CONSTANT`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Constant<'a> {
    pub type_: TypeIndex,
    pub value: Number<'a>,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Constant<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            type_: p.type_index()?,
            value: p.number()?,
            name: p.strz()?,
        })
    }
}

/// `S_PROCREF`, `S_LPROCREF`, and `S_DATAREF`. Found in the global symbol stream; they point at
/// the real record inside a module's symbol stream.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct RefSym2<'a> {
    pub header: &'a RefSym2Fixed,
    pub name: &'a BStr,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
pub struct RefSym2Fixed {
    pub name_checksum: U32<LE>,
    /// Byte offset of the target record in the module symbol stream.
    pub symbol_offset: U32<LE>,
    /// 1-based module index.
    pub module_index: U16<LE>,
}

impl<'a> Parse<'a> for RefSym2<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            header: p.get()?,
            name: p.strz()?,
        })
    }
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
pub struct DataFixed {
    pub type_: TypeIndexLe,
    pub offset_segment: OffsetSegment,
}

/// `S_LDATA32`, `S_GDATA32`, `S_LTHREAD32`, and `S_GTHREAD32`. The thread-local forms store a
/// TLS offset where the others store a section offset.
#[allow(missing_docs)]
#[derive(Clone)]
pub struct Data<'a> {
    pub header: &'a DataFixed,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Data<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            header: p.get()?,
            name: p.strz()?,
        })
    }
}

impl<'a> Debug for Data<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Data: {} {:?} {}",
            self.header.offset_segment,
            self.header.type_.get(),
            self.name
        )
    }
}

/// `S_UDT`: a typedef or a named UDT in symbol scope.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct Udt<'a> {
    pub type_: TypeIndex,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Udt<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            type_: p.type_index()?,
            name: p.strz()?,
        })
    }
}

/// `S_OBJNAME`
#[derive(Clone, Debug)]
pub struct ObjectName<'a> {
    /// Changes whenever the object file changes.
    pub signature: u32,
    /// Path of the object file.
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for ObjectName<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            signature: p.u32()?,
            name: p.strz()?,
        })
    }
}

bitfield! {
    /// The `flags` field of `S_COMPILE3`.
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct Compile3Flags(u32);
    impl Debug;
    /// `CV_CFL_LANG`
    pub u8, language, set_language: 7, 0;
    pub ec, set_ec: 8;
    pub no_dbg_info, set_no_dbg_info: 9;
    pub ltcg, set_ltcg: 10;
    pub no_data_align, set_no_data_align: 11;
    pub managed_present, set_managed_present: 12;
    pub security_checks, set_security_checks: 13;
    pub hot_patch, set_hot_patch: 14;
    pub cvtcil, set_cvtcil: 15;
    pub msil_module, set_msil_module: 16;
    pub sdl, set_sdl: 17;
    pub pgo, set_pgo: 18;
    pub exp, set_exp: 19;
}

impl Compile3Flags {
    /// Compiled with link-time code generation or profile-guided optimization.
    pub fn has_optimizations(self) -> bool {
        self.ltcg() || self.pgo()
    }
}

/// `CV_CFL_LANG` values.
#[allow(missing_docs)]
pub mod source_language {
    pub const C: u8 = 0x00;
    pub const CXX: u8 = 0x01;
    pub const FORTRAN: u8 = 0x02;
    pub const MASM: u8 = 0x03;
    pub const PASCAL: u8 = 0x04;
    pub const BASIC: u8 = 0x05;
    pub const COBOL: u8 = 0x06;
    pub const LINK: u8 = 0x07;
    pub const CVTRES: u8 = 0x08;
    pub const CVTPGD: u8 = 0x09;
    pub const CSHARP: u8 = 0x0a;
    pub const VB: u8 = 0x0b;
    pub const ILASM: u8 = 0x0c;
    pub const JAVA: u8 = 0x0d;
    pub const JSCRIPT: u8 = 0x0e;
    pub const MSIL: u8 = 0x0f;
    pub const HLSL: u8 = 0x10;
    pub const RUST: u8 = 0x15;
    pub const SWIFT: u8 = 0x53;
}

/// Fixed part of `S_COMPILE3`
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
#[repr(C)]
#[allow(missing_docs)]
pub struct Compile3Fixed {
    pub flags: U32<LE>,
    pub machine: U16<LE>,
    pub frontend_major: U16<LE>,
    pub frontend_minor: U16<LE>,
    pub frontend_build: U16<LE>,
    pub frontend_qfe: U16<LE>,
    pub ver_major: U16<LE>,
    pub ver_minor: U16<LE>,
    pub ver_build: U16<LE>,
    pub ver_qfe: U16<LE>,
}

/// `S_COMPILE3`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Compile3<'a> {
    pub fixed: &'a Compile3Fixed,
    pub name: &'a BStr,
}

impl<'a> Compile3<'a> {
    #[allow(missing_docs)]
    pub fn flags(&self) -> Compile3Flags {
        Compile3Flags(self.fixed.flags.get())
    }
}

impl<'a> Parse<'a> for Compile3<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            fixed: p.get()?,
            name: p.strz()?,
        })
    }
}

/// `S_BUILDINFO`: points at an `LF_BUILDINFO` record in the IPI.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct BuildInfo {
    pub item: ItemId,
}

impl<'a> Parse<'a> for BuildInfo {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self { item: p.u32()? })
    }
}

/// A decoded symbol record.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum SymData<'a> {
    Unknown,
    ObjName(ObjectName<'a>),
    Compile3(Compile3<'a>),
    Proc(Proc<'a>),
    Udt(Udt<'a>),
    Constant(Constant<'a>),
    RefSym2(RefSym2<'a>),
    Data(Data<'a>),
    ThreadData(Data<'a>),
    Pub(Pub<'a>),
    BuildInfo(BuildInfo),
    End,
}

impl<'a> SymData<'a> {
    /// Decodes the payload of a record of kind `kind`.
    pub fn parse(kind: SymKind, data: &'a [u8]) -> Result<Self, ParserError> {
        Self::from_parser(kind, &mut Parser::new(data))
    }

    /// Decodes the payload of a record of kind `kind`.
    pub fn from_parser(kind: SymKind, p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(match kind {
            SymKind::S_OBJNAME => Self::ObjName(p.parse()?),
            SymKind::S_GPROC32
            | SymKind::S_LPROC32
            | SymKind::S_GPROC32_ID
            | SymKind::S_LPROC32_ID => Self::Proc(p.parse()?),
            SymKind::S_COMPILE3 => Self::Compile3(p.parse()?),
            SymKind::S_UDT => Self::Udt(p.parse()?),
            SymKind::S_CONSTANT => Self::Constant(p.parse()?),
            SymKind::S_PUB32 => Self::Pub(p.parse()?),
            SymKind::S_PROCREF | SymKind::S_LPROCREF | SymKind::S_DATAREF => {
                Self::RefSym2(p.parse()?)
            }
            SymKind::S_LDATA32 | SymKind::S_GDATA32 => Self::Data(p.parse()?),
            SymKind::S_LTHREAD32 | SymKind::S_GTHREAD32 => Self::ThreadData(p.parse()?),
            SymKind::S_BUILDINFO => Self::BuildInfo(p.parse()?),
            SymKind::S_END | SymKind::S_PROC_ID_END => Self::End,
            _ => Self::Unknown,
        })
    }

    /// The name of the symbol, if it has one.
    pub fn name(&self) -> Option<&'a BStr> {
        match self {
            Self::Proc(s) => Some(s.name),
            Self::Udt(s) => Some(s.name),
            Self::Constant(s) => Some(s.name),
            Self::RefSym2(s) => Some(s.name),
            Self::Data(s) | Self::ThreadData(s) => Some(s.name),
            Self::Pub(s) => Some(s.name),
            _ => None,
        }
    }
}
