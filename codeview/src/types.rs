//! Type records, as stored in the TPI and IPI streams

mod iter;
#[doc(inline)]
pub use iter::*;

mod kind;
#[doc(inline)]
pub use kind::*;

pub mod fields;
pub mod number;
pub mod primitive;

mod records;
#[doc(inline)]
pub use records::*;

pub use fields::{Field, FieldList};

use crate::parser::{Parse, Parser, ParserError};
use bitfield::bitfield;
use bstr::BStr;
use number::Number;
use std::fmt::Debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U16, U32, Unaligned};

/// Refers to a type record, or (below [`TypeIndex::MIN_BEGIN`]) to a built-in type.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TypeIndex(pub u32);

impl TypeIndex {
    /// The first index that refers to a record. Lower values are simple types.
    pub const MIN_BEGIN: TypeIndex = TypeIndex(0x1000);
}

impl std::fmt::Debug for TypeIndex {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_simple() {
            primitive::dump_simple_type_index(fmt, *self)
        } else {
            write!(fmt, "T#0x{:x}", self.0)
        }
    }
}

/// [`TypeIndex`] as stored on disk.
#[derive(Copy, Clone, Eq, PartialEq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct TypeIndexLe(pub U32<LE>);

impl From<TypeIndex> for TypeIndexLe {
    #[inline(always)]
    fn from(value: TypeIndex) -> TypeIndexLe {
        TypeIndexLe(U32::new(value.0))
    }
}

impl Debug for TypeIndexLe {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        Debug::fmt(&self.get(), fmt)
    }
}

impl TypeIndexLe {
    #[inline(always)]
    #[allow(missing_docs)]
    pub fn get(self) -> TypeIndex {
        TypeIndex(self.0.get())
    }
}

/// A decoded type record.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum TypeData<'a> {
    Array(Array<'a>),
    Struct(Struct<'a>),
    Union(Union<'a>),
    Enum(Enum<'a>),
    Proc(&'a Proc),
    MemberFunc(&'a MemberFunc),
    Pointer(Pointer<'a>),
    Modifier(TypeModifier),
    FieldList(FieldList<'a>),
    MethodList(MethodList<'a>),
    ArgList(ArgList<'a>),
    BitField(&'a BitField),
    Alias(Alias<'a>),
    FuncId(FuncId<'a>),
    StringId(StringId<'a>),
    BuildInfo(BuildInfo<'a>),
    Unknown,
}

impl<'a> TypeData<'a> {
    /// Decodes the payload of a record of kind `kind`.
    pub fn parse_bytes(kind: Leaf, bytes: &'a [u8]) -> Result<Self, ParserError> {
        Self::parse(kind, &mut Parser::new(bytes))
    }

    /// Decodes the payload of a record of kind `kind`.
    pub fn parse(kind: Leaf, p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(match kind {
            Leaf::LF_ARRAY => Self::Array(p.parse()?),
            Leaf::LF_CLASS | Leaf::LF_STRUCTURE | Leaf::LF_INTERFACE => Self::Struct(p.parse()?),
            Leaf::LF_UNION => Self::Union(p.parse()?),
            Leaf::LF_ENUM => Self::Enum(p.parse()?),
            Leaf::LF_PROCEDURE => Self::Proc(p.get()?),
            Leaf::LF_MFUNCTION => Self::MemberFunc(p.get()?),
            Leaf::LF_POINTER => Self::Pointer(p.parse()?),
            Leaf::LF_MODIFIER => Self::Modifier(p.copy()?),
            Leaf::LF_FIELDLIST => Self::FieldList(FieldList {
                bytes: p.take_rest(),
            }),
            Leaf::LF_METHODLIST => Self::MethodList(MethodList::new(p.take_rest())),
            Leaf::LF_ARGLIST => Self::ArgList(p.parse()?),
            Leaf::LF_BITFIELD => Self::BitField(p.get()?),
            Leaf::LF_ALIAS => Self::Alias(p.parse()?),
            Leaf::LF_FUNC_ID => Self::FuncId(p.parse()?),
            Leaf::LF_STRING_ID => Self::StringId(p.parse()?),
            Leaf::LF_BUILDINFO => Self::BuildInfo(p.parse()?),
            _ => Self::Unknown,
        })
    }

    /// The primary name of the record, if it has one.
    pub fn name(&self) -> Option<&'a BStr> {
        match self {
            Self::Struct(t) => Some(t.name),
            Self::Union(t) => Some(t.name),
            Self::Enum(t) => Some(t.name),
            Self::Alias(t) => Some(t.name),
            Self::FuncId(t) => Some(t.name),
            Self::StringId(t) => Some(t.name),
            _ => None,
        }
    }

    /// The display name, if this is a class, struct, union, or enum.
    pub fn udt_name(&self) -> Option<&'a BStr> {
        match self {
            Self::Struct(t) => Some(t.name),
            Self::Union(t) => Some(t.name),
            Self::Enum(t) => Some(t.name),
            _ => None,
        }
    }

    /// The decorated name, if this is a UDT that carries one.
    pub fn udt_unique_name(&self) -> Option<&'a BStr> {
        match self {
            Self::Struct(t) => t.unique_name,
            Self::Union(t) => t.unique_name,
            Self::Enum(t) => t.unique_name,
            _ => None,
        }
    }

    /// The `CV_prop_t` bits, if this is a UDT.
    pub fn udt_properties(&self) -> Option<UdtProperties> {
        match self {
            Self::Struct(t) => Some(t.fixed.property.get()),
            Self::Union(t) => Some(t.fixed.property.get()),
            Self::Enum(t) => Some(t.fixed.property.get()),
            _ => None,
        }
    }

    /// The field list of a UDT. Forward references have none.
    pub fn udt_field_list(&self) -> Option<TypeIndex> {
        let ti = match self {
            Self::Struct(t) => t.fixed.field_list.get(),
            Self::Union(t) => t.fixed.fields.get(),
            Self::Enum(t) => t.fixed.fields.get(),
            _ => return None,
        };
        if ti == TypeIndex::T_NOTYPE {
            None
        } else {
            Some(ti)
        }
    }

    /// True for a UDT record that only forward-declares its type.
    pub fn is_forward_ref(&self) -> bool {
        self.udt_properties().is_some_and(|p| p.fwdref())
    }
}
