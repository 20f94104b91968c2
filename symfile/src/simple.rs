//! Decoding of simple (built-in) type indices.
//!
//! Simple type indices never refer to a record. Everything about them is computed from the bits
//! of the index: the base kind, and whether the index names a pointer to that kind.

use ms_codeview::types::TypeIndex;
use ms_codeview::types::primitive::{SimpleTypeKind, SimpleTypeMode};

/// The built-in types that a type system must be able to provide.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(missing_docs)]
pub enum BasicType {
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    WChar,
    Char8,
    Char16,
    Char32,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Int128,
    UnsignedInt128,
    Half,
    Float,
    Double,
    LongDouble,
    FloatComplex,
    DoubleComplex,
    LongDoubleComplex,
    NullPtr,
}

/// Maps a simple kind to the built-in type that represents it.
pub fn basic_type_for_simple_kind(kind: SimpleTypeKind) -> Option<BasicType> {
    use BasicType as B;
    Some(match kind {
        SimpleTypeKind::BOOL8
        | SimpleTypeKind::BOOL16
        | SimpleTypeKind::BOOL32
        | SimpleTypeKind::BOOL64
        | SimpleTypeKind::BOOL128 => B::Bool,
        SimpleTypeKind::BYTE | SimpleTypeKind::UNSIGNED_CHAR => B::UnsignedChar,
        SimpleTypeKind::NARROW_CHAR => B::Char,
        SimpleTypeKind::SIGNED_CHAR | SimpleTypeKind::SBYTE => B::SignedChar,
        SimpleTypeKind::CHAR8 => B::Char8,
        SimpleTypeKind::CHAR16 => B::Char16,
        SimpleTypeKind::CHAR32 => B::Char32,
        SimpleTypeKind::WIDE_CHAR => B::WChar,
        SimpleTypeKind::COMPLEX80 => B::LongDoubleComplex,
        SimpleTypeKind::COMPLEX64 => B::DoubleComplex,
        SimpleTypeKind::COMPLEX32 => B::FloatComplex,
        SimpleTypeKind::FLOAT128 | SimpleTypeKind::FLOAT80 => B::LongDouble,
        SimpleTypeKind::FLOAT64 => B::Double,
        SimpleTypeKind::FLOAT32 => B::Float,
        SimpleTypeKind::FLOAT16 => B::Half,
        SimpleTypeKind::INT128 | SimpleTypeKind::INT128_OCT => B::Int128,
        SimpleTypeKind::UINT128 | SimpleTypeKind::UINT128_OCT => B::UnsignedInt128,
        SimpleTypeKind::INT64 | SimpleTypeKind::INT64_QUAD => B::LongLong,
        SimpleTypeKind::UINT64 | SimpleTypeKind::UINT64_QUAD => B::UnsignedLongLong,
        SimpleTypeKind::INT32 => B::Int,
        SimpleTypeKind::UINT32 | SimpleTypeKind::HRESULT => B::UnsignedInt,
        SimpleTypeKind::INT32_LONG => B::Long,
        SimpleTypeKind::UINT32_LONG => B::UnsignedLong,
        SimpleTypeKind::INT16 | SimpleTypeKind::INT16_SHORT => B::Short,
        SimpleTypeKind::UINT16 | SimpleTypeKind::UINT16_SHORT => B::UnsignedShort,
        SimpleTypeKind::VOID => B::Void,
        _ => return None,
    })
}

/// Returns `true` for simple kinds whose values are sign-extended. Floating-point kinds and the
/// plain `char` kind count as signed.
pub fn is_simple_kind_signed(kind: SimpleTypeKind) -> bool {
    matches!(
        kind,
        SimpleTypeKind::INT128
            | SimpleTypeKind::INT128_OCT
            | SimpleTypeKind::INT64
            | SimpleTypeKind::INT64_QUAD
            | SimpleTypeKind::INT32
            | SimpleTypeKind::INT32_LONG
            | SimpleTypeKind::INT16
            | SimpleTypeKind::INT16_SHORT
            | SimpleTypeKind::FLOAT128
            | SimpleTypeKind::FLOAT80
            | SimpleTypeKind::FLOAT64
            | SimpleTypeKind::FLOAT32
            | SimpleTypeKind::FLOAT16
            | SimpleTypeKind::NARROW_CHAR
            | SimpleTypeKind::SIGNED_CHAR
            | SimpleTypeKind::SBYTE
    )
}

/// The size in bytes of a value of a simple kind. `void` and unknown kinds have size 0.
pub fn simple_kind_size(kind: SimpleTypeKind) -> u32 {
    match kind {
        SimpleTypeKind::BOOL128
        | SimpleTypeKind::INT128
        | SimpleTypeKind::INT128_OCT
        | SimpleTypeKind::UINT128
        | SimpleTypeKind::UINT128_OCT
        | SimpleTypeKind::FLOAT128 => 16,
        SimpleTypeKind::COMPLEX80 | SimpleTypeKind::FLOAT80 => 10,
        SimpleTypeKind::BOOL64
        | SimpleTypeKind::COMPLEX64
        | SimpleTypeKind::UINT64
        | SimpleTypeKind::UINT64_QUAD
        | SimpleTypeKind::FLOAT64
        | SimpleTypeKind::INT64
        | SimpleTypeKind::INT64_QUAD => 8,
        SimpleTypeKind::BOOL32
        | SimpleTypeKind::CHAR32
        | SimpleTypeKind::COMPLEX32
        | SimpleTypeKind::FLOAT32
        | SimpleTypeKind::INT32
        | SimpleTypeKind::INT32_LONG
        | SimpleTypeKind::UINT32_LONG
        | SimpleTypeKind::HRESULT
        | SimpleTypeKind::UINT32 => 4,
        SimpleTypeKind::BOOL16
        | SimpleTypeKind::CHAR16
        | SimpleTypeKind::FLOAT16
        | SimpleTypeKind::INT16
        | SimpleTypeKind::INT16_SHORT
        | SimpleTypeKind::UINT16
        | SimpleTypeKind::UINT16_SHORT
        | SimpleTypeKind::WIDE_CHAR => 2,
        SimpleTypeKind::BOOL8
        | SimpleTypeKind::BYTE
        | SimpleTypeKind::UNSIGNED_CHAR
        | SimpleTypeKind::NARROW_CHAR
        | SimpleTypeKind::SIGNED_CHAR
        | SimpleTypeKind::SBYTE
        | SimpleTypeKind::CHAR8 => 1,
        _ => 0,
    }
}

/// The name of a simple kind, spelled the way MSVC spells it.
pub fn simple_kind_name(kind: SimpleTypeKind) -> &'static str {
    match kind {
        SimpleTypeKind::BOOL8
        | SimpleTypeKind::BOOL16
        | SimpleTypeKind::BOOL32
        | SimpleTypeKind::BOOL64
        | SimpleTypeKind::BOOL128 => "bool",
        SimpleTypeKind::BYTE | SimpleTypeKind::UNSIGNED_CHAR => "unsigned char",
        SimpleTypeKind::NARROW_CHAR => "char",
        SimpleTypeKind::SIGNED_CHAR | SimpleTypeKind::SBYTE => "signed char",
        SimpleTypeKind::CHAR8 => "char8_t",
        SimpleTypeKind::CHAR16 => "char16_t",
        SimpleTypeKind::CHAR32 => "char32_t",
        SimpleTypeKind::WIDE_CHAR => "wchar_t",
        SimpleTypeKind::COMPLEX80 | SimpleTypeKind::COMPLEX64 | SimpleTypeKind::COMPLEX32 => {
            "complex"
        }
        SimpleTypeKind::FLOAT128 | SimpleTypeKind::FLOAT80 => "long double",
        SimpleTypeKind::FLOAT64 => "double",
        SimpleTypeKind::FLOAT32 => "float",
        SimpleTypeKind::FLOAT16 => "__half",
        SimpleTypeKind::INT128 | SimpleTypeKind::INT128_OCT => "__int128",
        SimpleTypeKind::UINT128 | SimpleTypeKind::UINT128_OCT => "unsigned __int128",
        SimpleTypeKind::INT64 | SimpleTypeKind::INT64_QUAD => "__int64",
        SimpleTypeKind::UINT64 | SimpleTypeKind::UINT64_QUAD => "unsigned __int64",
        SimpleTypeKind::INT32 => "int",
        SimpleTypeKind::UINT32 => "unsigned int",
        SimpleTypeKind::HRESULT => "HRESULT",
        SimpleTypeKind::INT32_LONG => "long",
        SimpleTypeKind::UINT32_LONG => "unsigned long",
        SimpleTypeKind::INT16 | SimpleTypeKind::INT16_SHORT => "short",
        SimpleTypeKind::UINT16 | SimpleTypeKind::UINT16_SHORT => "unsigned short",
        SimpleTypeKind::VOID => "void",
        _ => "",
    }
}

/// The meaning of a simple type index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SimpleType {
    /// A built-in value type.
    Basic {
        #[allow(missing_docs)]
        basic_type: BasicType,
        #[allow(missing_docs)]
        size: u32,
        #[allow(missing_docs)]
        name: &'static str,
    },
    /// A pointer to another simple type.
    Pointer {
        /// The direct (non-pointer) form of the index.
        pointee: TypeIndex,
        /// 4 or 8
        size: u32,
    },
    /// `std::nullptr_t`
    NullPtr,
}

/// Decodes a simple type index. Returns `None` for kinds and pointer modes that have no
/// representation (`<not translated>`, 16-bit and 128-bit pointers, unknown kinds).
pub fn decode_simple_type(ti: TypeIndex) -> Option<SimpleType> {
    if ti == TypeIndex::T_NULLPTR {
        return Some(SimpleType::NullPtr);
    }

    let mode = ti.simple_mode();
    if mode != SimpleTypeMode::Direct {
        let size = mode.pointer_size()?;
        return Some(SimpleType::Pointer {
            pointee: ti.make_direct(),
            size,
        });
    }

    let kind = ti.simple_kind();
    if kind == SimpleTypeKind::NOT_TRANSLATED {
        return None;
    }

    let basic_type = basic_type_for_simple_kind(kind)?;
    Some(SimpleType::Basic {
        basic_type,
        size: simple_kind_size(kind),
        name: simple_kind_name(kind),
    })
}
