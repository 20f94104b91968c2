//! Simple (built-in) type indices
//!
//! Type indices below [`TypeIndex::MIN_BEGIN`] do not refer to records. Bits 0-7 hold a
//! [`SimpleTypeKind`] and bits 8-10 hold a [`SimpleTypeMode`], which says whether the index
//! names the type itself or a pointer to it.

use super::TypeIndex;

/// The base type named by a simple type index (bits 0-7).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SimpleTypeKind(pub u8);

macro_rules! simple_kinds {
    (
        $( $value:expr, $name:ident, $description:expr; )*
    ) => {
        #[allow(missing_docs)]
        impl SimpleTypeKind {
            $(
                #[doc = concat!("`", $description, "`")]
                pub const $name: SimpleTypeKind = SimpleTypeKind($value);
            )*
        }

        static SIMPLE_KIND_NAMES: &[(u8, &str)] = &[
            $( ($value, stringify!($name)), )*
        ];
    }
}

simple_kinds! {
    0x00, NONE, "<no type>";
    0x03, VOID, "void";
    0x07, NOT_TRANSLATED, "<not translated>";
    0x08, HRESULT, "HRESULT";

    0x10, SIGNED_CHAR, "signed char";
    0x20, UNSIGNED_CHAR, "unsigned char";
    0x70, NARROW_CHAR, "char";
    0x71, WIDE_CHAR, "wchar_t";
    0x7a, CHAR16, "char16_t";
    0x7b, CHAR32, "char32_t";
    0x7c, CHAR8, "char8_t";

    0x68, SBYTE, "int8_t";
    0x69, BYTE, "uint8_t";
    0x11, INT16_SHORT, "short";
    0x21, UINT16_SHORT, "unsigned short";
    0x72, INT16, "int16_t";
    0x73, UINT16, "uint16_t";
    0x12, INT32_LONG, "long";
    0x22, UINT32_LONG, "unsigned long";
    0x74, INT32, "int";
    0x75, UINT32, "unsigned int";
    0x13, INT64_QUAD, "int64_t";
    0x23, UINT64_QUAD, "uint64_t";
    0x76, INT64, "int64_t";
    0x77, UINT64, "uint64_t";
    0x14, INT128_OCT, "int128_t";
    0x24, UINT128_OCT, "uint128_t";
    0x78, INT128, "int128_t";
    0x79, UINT128, "uint128_t";

    0x46, FLOAT16, "half";
    0x40, FLOAT32, "float";
    0x45, FLOAT32_PARTIAL_PRECISION, "float";
    0x44, FLOAT48, "float48";
    0x41, FLOAT64, "double";
    0x42, FLOAT80, "long double";
    0x43, FLOAT128, "float128";

    0x56, COMPLEX16, "complex16";
    0x50, COMPLEX32, "complex32";
    0x55, COMPLEX32_PARTIAL_PRECISION, "complex32";
    0x54, COMPLEX48, "complex48";
    0x51, COMPLEX64, "complex64";
    0x52, COMPLEX80, "complex80";
    0x53, COMPLEX128, "complex128";

    0x30, BOOL8, "bool";
    0x31, BOOL16, "bool16";
    0x32, BOOL32, "bool32";
    0x33, BOOL64, "bool64";
    0x34, BOOL128, "bool128";
}

impl std::fmt::Debug for SimpleTypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match SIMPLE_KIND_NAMES.iter().find(|(v, _)| *v == self.0) {
            Some((_, name)) => f.write_str(name),
            None => write!(f, "SimpleTypeKind({:#04x})", self.0),
        }
    }
}

/// Pointer mode of a simple type index (bits 8-10).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum SimpleTypeMode {
    /// Not a pointer.
    Direct = 0,
    /// 16-bit near pointer.
    NearPointer = 1,
    /// 16:16 far pointer.
    FarPointer = 2,
    /// 16:16 huge pointer.
    HugePointer = 3,
    /// 32-bit near pointer.
    NearPointer32 = 4,
    /// 16:32 far pointer.
    FarPointer32 = 5,
    /// 64-bit near pointer.
    NearPointer64 = 6,
    /// 128-bit near pointer.
    NearPointer128 = 7,
}

impl SimpleTypeMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => Self::Direct,
            1 => Self::NearPointer,
            2 => Self::FarPointer,
            3 => Self::HugePointer,
            4 => Self::NearPointer32,
            5 => Self::FarPointer32,
            6 => Self::NearPointer64,
            _ => Self::NearPointer128,
        }
    }

    /// Size in bytes of a pointer in this mode, for the modes a 32/64-bit reader supports.
    pub fn pointer_size(self) -> Option<u32> {
        match self {
            Self::NearPointer32 | Self::FarPointer32 => Some(4),
            Self::NearPointer64 => Some(8),
            _ => None,
        }
    }
}

#[allow(missing_docs)]
impl TypeIndex {
    pub const T_NOTYPE: TypeIndex = TypeIndex(0x0000);
    pub const T_VOID: TypeIndex = TypeIndex(0x0003);
    pub const T_NULLPTR: TypeIndex = TypeIndex(0x0103);
    pub const T_CHAR: TypeIndex = TypeIndex(0x0010);
    pub const T_RCHAR: TypeIndex = TypeIndex(0x0070);
    pub const T_SHORT: TypeIndex = TypeIndex(0x0011);
    pub const T_LONG: TypeIndex = TypeIndex(0x0012);
    pub const T_ULONG: TypeIndex = TypeIndex(0x0022);
    pub const T_INT4: TypeIndex = TypeIndex(0x0074);
    pub const T_UINT4: TypeIndex = TypeIndex(0x0075);
    pub const T_INT8: TypeIndex = TypeIndex(0x0076);
    pub const T_UINT8: TypeIndex = TypeIndex(0x0077);
    pub const T_REAL32: TypeIndex = TypeIndex(0x0040);
    pub const T_REAL64: TypeIndex = TypeIndex(0x0041);
    pub const T_BOOL08: TypeIndex = TypeIndex(0x0030);
    pub const T_32PVOID: TypeIndex = TypeIndex(0x0403);
    pub const T_64PVOID: TypeIndex = TypeIndex(0x0603);
    pub const T_64PINT4: TypeIndex = TypeIndex(0x0674);

    /// True if this index names a built-in type rather than a record.
    pub fn is_simple(self) -> bool {
        self.0 < Self::MIN_BEGIN.0
    }

    /// The base kind of a simple type index.
    pub fn simple_kind(self) -> SimpleTypeKind {
        SimpleTypeKind((self.0 & 0xff) as u8)
    }

    /// The pointer mode of a simple type index.
    pub fn simple_mode(self) -> SimpleTypeMode {
        SimpleTypeMode::from_bits(self.0 >> 8)
    }

    /// Strips the pointer mode, giving the index of the pointed-to simple type.
    pub fn make_direct(self) -> TypeIndex {
        TypeIndex(self.0 & 0xff)
    }
}

/// Writes a short description of a simple type index, e.g. `int` or `int*64`.
pub fn dump_simple_type_index(f: &mut impl std::fmt::Write, ti: TypeIndex) -> std::fmt::Result {
    let kind = ti.simple_kind();
    match SIMPLE_KIND_NAMES.iter().find(|(v, _)| *v == kind.0) {
        Some((_, name)) => f.write_str(name)?,
        None => write!(f, "simple({:#04x})", kind.0)?,
    }
    match ti.simple_mode() {
        SimpleTypeMode::Direct => Ok(()),
        SimpleTypeMode::NearPointer32 | SimpleTypeMode::FarPointer32 => f.write_str("*32"),
        SimpleTypeMode::NearPointer64 => f.write_str("*64"),
        mode => write!(f, "*{mode:?}"),
    }
}

#[test]
fn decode_simple_indices() {
    let ti = TypeIndex::T_64PINT4;
    assert!(ti.is_simple());
    assert_eq!(ti.simple_kind(), SimpleTypeKind::INT32);
    assert_eq!(ti.simple_mode(), SimpleTypeMode::NearPointer64);
    assert_eq!(ti.simple_mode().pointer_size(), Some(8));
    assert_eq!(ti.make_direct(), TypeIndex::T_INT4);

    assert_eq!(TypeIndex::T_32PVOID.simple_mode().pointer_size(), Some(4));
    assert_eq!(TypeIndex::T_NULLPTR.simple_mode().pointer_size(), None);
    assert!(!TypeIndex(0x1000).is_simple());

    let mut s = String::new();
    dump_simple_type_index(&mut s, ti).unwrap();
    assert_eq!(s, "INT32*64");
}
