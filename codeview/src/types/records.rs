#![allow(missing_docs)]

use super::*;
use bstr::BStr;

bitfield! {
    /// Properties of a class, struct, union, or enum (`CV_prop_t`).
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct UdtProperties(u16);
    impl Debug;

    pub packed,        set_packed:        0;
    pub ctor,          set_ctor:          1;
    pub ovlops,        set_ovlops:        2;
    pub isnested,      set_isnested:      3;
    /// The type declares nested types.
    pub cnested,       set_cnested:       4;
    pub opassign,      set_opassign:      5;
    pub opcast,        set_opcast:        6;
    /// Incomplete definition; the full one is elsewhere in the stream.
    pub fwdref,        set_fwdref:        7;
    pub scoped,        set_scoped:        8;
    /// A decorated (mangled) name follows the display name.
    pub hasuniquename, set_hasuniquename: 9;
    pub sealed,        set_sealed:        10;
    pub hfa,           set_hfa:           12, 11;
    pub intrinsic,     set_intrinsic:     13;
    pub mocom,         set_mocom:         15, 14;
}

#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned)]
#[repr(transparent)]
pub struct UdtPropertiesLe(pub U16<LE>);

impl Debug for UdtPropertiesLe {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        Debug::fmt(&self.get(), fmt)
    }
}

impl UdtPropertiesLe {
    #[inline(always)]
    pub fn get(&self) -> UdtProperties {
        UdtProperties(self.0.get())
    }
}

fn unique_name_if<'a>(
    p: &mut Parser<'a>,
    property: UdtProperties,
) -> Result<Option<&'a BStr>, ParserError> {
    Ok(if property.hasuniquename() {
        Some(p.strz()?)
    } else {
        None
    })
}

/// `LF_ENUM`
#[derive(Clone, Debug)]
pub struct Enum<'a> {
    pub fixed: &'a EnumFixed,
    pub name: &'a BStr,
    pub unique_name: Option<&'a BStr>,
}

#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
#[repr(C)]
pub struct EnumFixed {
    pub count: U16<LE>,
    pub property: UdtPropertiesLe,
    pub underlying_type: TypeIndexLe,
    pub fields: TypeIndexLe,
}

impl<'a> Parse<'a> for Enum<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let fixed: &EnumFixed = p.get()?;
        let name = p.strz()?;
        let unique_name = unique_name_if(p, fixed.property.get())?;
        Ok(Self {
            fixed,
            name,
            unique_name,
        })
    }
}

/// `LF_ARRAY`. `len` is the total size of the array in bytes, not the element count.
#[derive(Clone, Debug)]
pub struct Array<'a> {
    pub fixed: &'a ArrayFixed,
    pub len: Number<'a>,
    pub name: &'a BStr,
}

#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
#[repr(C)]
pub struct ArrayFixed {
    pub element_type: TypeIndexLe,
    pub index_type: TypeIndexLe,
}

impl<'a> Parse<'a> for Array<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Array {
            fixed: p.get()?,
            len: p.number()?,
            name: p.strz()?,
        })
    }
}

/// `LF_CLASS`, `LF_STRUCTURE`, and `LF_INTERFACE`.
#[derive(Clone, Debug)]
pub struct Struct<'a> {
    pub fixed: &'a StructFixed,
    pub length: Number<'a>,
    pub name: &'a BStr,
    pub unique_name: Option<&'a BStr>,
}

#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
pub struct StructFixed {
    /// Count of field-list members, including bases, methods, and nested types.
    pub num_elements: U16<LE>,
    pub property: UdtPropertiesLe,
    pub field_list: TypeIndexLe,
    pub derivation_list: TypeIndexLe,
    pub vtable_shape: TypeIndexLe,
}

impl<'a> Parse<'a> for Struct<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let fixed: &StructFixed = p.get()?;
        let length = p.number()?;
        let name = p.strz()?;
        let unique_name = unique_name_if(p, fixed.property.get())?;
        Ok(Struct {
            fixed,
            length,
            name,
            unique_name,
        })
    }
}

/// `LF_UNION`
#[derive(Clone, Debug)]
pub struct Union<'a> {
    pub fixed: &'a UnionFixed,
    pub length: Number<'a>,
    pub name: &'a BStr,
    pub unique_name: Option<&'a BStr>,
}

#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
#[repr(C)]
pub struct UnionFixed {
    pub count: U16<LE>,
    pub property: UdtPropertiesLe,
    pub fields: TypeIndexLe,
}

impl<'a> Parse<'a> for Union<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let fixed: &UnionFixed = p.get()?;
        let length = p.number()?;
        let name = p.strz()?;
        let unique_name = unique_name_if(p, fixed.property.get())?;
        Ok(Union {
            fixed,
            length,
            name,
            unique_name,
        })
    }
}

/// `LF_MODIFIER`: a `const`, `volatile`, or `__unaligned` variant of another type.
#[derive(IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned, Clone, Debug)]
#[repr(C)]
pub struct TypeModifier {
    pub underlying_type: TypeIndexLe,
    pub attributes: U16<LE>,
}

impl TypeModifier {
    pub fn attributes(&self) -> TypeModifierBits {
        TypeModifierBits(self.attributes.get())
    }

    pub fn is_const(&self) -> bool {
        self.attributes().is_const()
    }

    pub fn is_volatile(&self) -> bool {
        self.attributes().is_volatile()
    }

    pub fn is_unaligned(&self) -> bool {
        self.attributes().is_unaligned()
    }
}

bitfield! {
    #[repr(transparent)]
    #[derive(Clone)]
    pub struct TypeModifierBits(u16);
    impl Debug;

    pub is_const, set_is_const: 0;
    pub is_volatile, set_is_volatile: 1;
    pub is_unaligned, set_is_unaligned: 2;
}

/// Calling convention byte of `LF_PROCEDURE` and `LF_MFUNCTION` (`CV_call_e`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CallingConvention(pub u8);

impl CallingConvention {
    pub const NEAR_C: Self = Self(0x00);
    pub const FAR_C: Self = Self(0x01);
    pub const NEAR_PASCAL: Self = Self(0x02);
    pub const FAR_PASCAL: Self = Self(0x03);
    pub const NEAR_FAST: Self = Self(0x04);
    pub const FAR_FAST: Self = Self(0x05);
    pub const NEAR_STD: Self = Self(0x07);
    pub const FAR_STD: Self = Self(0x08);
    pub const NEAR_SYS: Self = Self(0x09);
    pub const FAR_SYS: Self = Self(0x0a);
    pub const THISCALL: Self = Self(0x0b);
    pub const MIPSCALL: Self = Self(0x0c);
    pub const GENERIC: Self = Self(0x0d);
    pub const CLRCALL: Self = Self(0x16);
    pub const INLINE: Self = Self(0x17);
    pub const NEAR_VECTOR: Self = Self(0x18);
}

/// `LF_PROCEDURE`
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
pub struct Proc {
    pub return_value: TypeIndexLe,
    pub call: u8,
    pub reserved: u8,
    pub num_params: U16<LE>,
    pub arg_list: TypeIndexLe,
}

impl Proc {
    pub fn calling_convention(&self) -> CallingConvention {
        CallingConvention(self.call)
    }
}

/// `LF_MFUNCTION`
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
pub struct MemberFunc {
    pub return_value: TypeIndexLe,
    pub class: TypeIndexLe,
    pub this: TypeIndexLe,
    pub call: u8,
    pub reserved: u8,
    pub num_params: U16<LE>,
    pub arg_list: TypeIndexLe,
    pub this_adjust: U32<LE>,
}

impl MemberFunc {
    pub fn calling_convention(&self) -> CallingConvention {
        CallingConvention(self.call)
    }
}

/// Iterates the entries of an `LF_METHODLIST` record.
#[derive(Clone)]
pub struct MethodList<'a> {
    pub rest: &'a [u8],
}

impl<'a> MethodList<'a> {
    pub fn new(record_data: &'a [u8]) -> Self {
        Self { rest: record_data }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<MethodListItem>, ParserError> {
        if self.rest.is_empty() {
            return Ok(None);
        }

        let mut p = Parser::new(self.rest);
        let attr = p.u16()?;
        p.skip(2)?;
        let ty = p.type_index()?;
        let vtab_offset = if introduces_virtual(attr) {
            Some(p.u32()?)
        } else {
            None
        };

        self.rest = p.take_rest();

        Ok(Some(MethodListItem {
            attr,
            ty,
            vtab_offset,
        }))
    }
}

impl<'a> Debug for MethodList<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "MethodList({} bytes)", self.rest.len())
    }
}

/// True if a method with attribute bits `attr` starts a new vtable slot, in which case its
/// record carries a vtable offset.
pub fn introduces_virtual(attr: u16) -> bool {
    matches!((attr >> 2) & 0xf, 4 | 6)
}

pub struct MethodListItem {
    pub attr: u16,
    pub ty: TypeIndex,
    pub vtab_offset: Option<u32>,
}

#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
#[repr(C)]
pub struct PointerFixed {
    pub ty: TypeIndexLe,
    pub attr: U32<LE>,
}

impl PointerFixed {
    pub fn attr(&self) -> PointerFlags {
        PointerFlags(self.attr.get())
    }
}

/// `LF_POINTER`. `variant` holds mode-specific trailing data.
#[derive(Clone)]
pub struct Pointer<'a> {
    pub fixed: &'a PointerFixed,
    pub variant: &'a [u8],
}

/// The `mode` bits of [`PointerFlags`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PointerMode {
    Pointer,
    LValueReference,
    PointerToDataMember,
    PointerToMemberFunction,
    RValueReference,
}

impl<'a> Pointer<'a> {
    pub fn mode(&self) -> Option<PointerMode> {
        Some(match self.fixed.attr().mode() {
            0 => PointerMode::Pointer,
            1 => PointerMode::LValueReference,
            2 => PointerMode::PointerToDataMember,
            3 => PointerMode::PointerToMemberFunction,
            4 => PointerMode::RValueReference,
            _ => return None,
        })
    }

    pub fn is_pointer_to_member(&self) -> bool {
        matches!(
            self.mode(),
            Some(PointerMode::PointerToDataMember | PointerMode::PointerToMemberFunction)
        )
    }

    /// For pointers to members, the class that contains the member.
    pub fn containing_class(&self) -> Result<Option<TypeIndex>, ParserError> {
        if !self.is_pointer_to_member() {
            return Ok(None);
        }
        let mut p = Parser::new(self.variant);
        Ok(Some(p.type_index()?))
    }
}

impl<'a> Parse<'a> for Pointer<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let fixed = p.get()?;
        let variant = p.take_rest();
        Ok(Self { fixed, variant })
    }
}

impl<'a> Debug for Pointer<'a> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let attr = self.fixed.attr();
        write!(fmt, "ty: {:?}", self.fixed.ty.get())?;
        write!(fmt, " attr: 0x{:08x} mode: {:?}", attr.0, self.mode())
    }
}

bitfield! {
    #[derive(Copy, Clone)]
    pub struct PointerFlags(u32);
    impl Debug;
    pub pointer_kind, set_pointer_kind: 4, 0;
    pub mode, set_mode: 7, 5;
    pub flat32, set_flat32: 8;
    pub volatile, set_volatile: 9;
    pub r#const, set_const: 10;
    pub unaligned, set_unaligned: 11;
    pub restrict, set_restrict: 12;
    /// Size of the pointer in bytes.
    pub size, set_size: 18, 13;
    pub ismocom, set_ismocom: 19;
    pub islref, set_islref: 20;
    pub isrref, set_isrref: 21;
}

/// `LF_ARGLIST`
#[derive(Clone, Debug)]
pub struct ArgList<'a> {
    pub args: &'a [TypeIndexLe],
}

impl<'a> Parse<'a> for ArgList<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let arg_count = p.u32()?;
        let args = p.slice(arg_count as usize)?;
        Ok(Self { args })
    }
}

/// `LF_BITFIELD`
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
pub struct BitField {
    pub underlying_type: TypeIndexLe,
    /// Width in bits.
    pub length: u8,
    /// Offset of the lowest bit within the storage unit.
    pub position: u8,
}

/// `LF_ALIAS`
#[derive(Clone, Debug)]
pub struct Alias<'a> {
    pub utype: TypeIndex,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Alias<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            utype: p.type_index()?,
            name: p.strz()?,
        })
    }
}

/// Little-endian reference to an IPI record.
pub type ItemIdLe = U32<LE>;

/// Identifies a record within the IPI stream.
pub type ItemId = u32;

/// `LF_FUNC_ID`
#[derive(Clone, Debug)]
pub struct FuncId<'a> {
    pub fixed: &'a FuncIdFixed,
    pub name: &'a BStr,
}

#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, Unaligned, Debug)]
pub struct FuncIdFixed {
    /// Enclosing scope in the IPI, or 0 for global scope.
    pub scope: ItemIdLe,
    pub func_type: TypeIndexLe,
}

impl<'a> Parse<'a> for FuncId<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            fixed: p.get()?,
            name: p.strz()?,
        })
    }
}

/// `LF_STRING_ID`
#[derive(Clone, Debug)]
pub struct StringId<'a> {
    pub id: ItemId,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for StringId<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let id = p.u32()?;
        let name = p.strz()?;
        Ok(Self { id, name })
    }
}

/// `LF_BUILDINFO`
#[derive(Clone, Debug)]
pub struct BuildInfo<'a> {
    pub args: &'a [ItemIdLe],
}

impl<'a> BuildInfo<'a> {
    pub fn arg(&self, index: BuildInfoIndex) -> Option<ItemId> {
        let a = self.args.get(index as usize)?;
        Some(a.get())
    }
}

impl<'a> Parse<'a> for BuildInfo<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let n = p.u16()?;
        let args = p.slice(n as usize)?;
        Ok(Self { args })
    }
}

/// Positions within [`BuildInfo::args`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(u32)]
pub enum BuildInfoIndex {
    CurrentDirectory = 0,
    BuildTool = 1,
    SourceFile = 2,
    ProgramDatabaseFile = 3,
    CommandArguments = 4,
}
