//! Type record kinds (`LF_*` leaves)

/// Identifies the kind of a type record, field-list member, or numeric leaf.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Leaf(pub u16);

macro_rules! leaf_kinds {
    (
        $( $code:expr, $name:ident; )*
    ) => {
        #[allow(missing_docs)]
        impl Leaf {
            $(
                pub const $name: Leaf = Leaf($code);
            )*
        }

        static LEAF_NAMES: &[(Leaf, &str)] = &[
            $(
                (Leaf($code), stringify!($name)),
            )*
        ];
    }
}

leaf_kinds! {
    0x000a, LF_VTSHAPE;
    0x1001, LF_MODIFIER;
    0x1002, LF_POINTER;
    0x1008, LF_PROCEDURE;
    0x1009, LF_MFUNCTION;
    0x1201, LF_ARGLIST;
    0x1203, LF_FIELDLIST;
    0x1205, LF_BITFIELD;
    0x1206, LF_METHODLIST;
    0x1400, LF_BCLASS;
    0x1401, LF_VBCLASS;
    0x1402, LF_IVBCLASS;
    0x1404, LF_INDEX;
    0x1409, LF_VFUNCTAB;
    0x140b, LF_FRIENDCLS;
    0x140c, LF_VFUNCOFF;
    0x1502, LF_ENUMERATE;
    0x1503, LF_ARRAY;
    0x1504, LF_CLASS;
    0x1505, LF_STRUCTURE;
    0x1506, LF_UNION;
    0x1507, LF_ENUM;
    0x150a, LF_ALIAS;
    0x150c, LF_FRIENDFCN;
    0x150d, LF_MEMBER;
    0x150e, LF_STMEMBER;
    0x150f, LF_METHOD;
    0x1510, LF_NESTEDTYPE;
    0x1511, LF_ONEMETHOD;
    0x1512, LF_NESTEDTYPEEX;
    0x1519, LF_INTERFACE;
    0x1601, LF_FUNC_ID;
    0x1602, LF_MFUNC_ID;
    0x1603, LF_BUILDINFO;
    0x1604, LF_SUBSTR_LIST;
    0x1605, LF_STRING_ID;
    0x1606, LF_UDT_SRC_LINE;
    0x1607, LF_UDT_MOD_SRC_LINE;

    // Numeric leaves
    0x8000, LF_CHAR;
    0x8001, LF_SHORT;
    0x8002, LF_USHORT;
    0x8003, LF_LONG;
    0x8004, LF_ULONG;
    0x8005, LF_REAL32;
    0x8006, LF_REAL64;
    0x8007, LF_REAL80;
    0x8008, LF_REAL128;
    0x8009, LF_QUADWORD;
    0x800a, LF_UQUADWORD;
    0x800b, LF_REAL48;
    0x800c, LF_COMPLEX32;
    0x800d, LF_COMPLEX64;
    0x800e, LF_COMPLEX80;
    0x800f, LF_COMPLEX128;
    0x8010, LF_VARSTRING;
    0x8017, LF_OCTWORD;
    0x8018, LF_UOCTWORD;
    0x8019, LF_DECIMAL;
    0x801a, LF_DATE;
    0x801b, LF_UTF8STRING;
    0x801c, LF_REAL16;
}

impl Leaf {
    /// Values below `LF_NUMERIC` are immediate numeric values, not leaf tags.
    pub const LF_NUMERIC: Leaf = Leaf(0x8000);

    /// True if this is a numeric value stored directly in the leaf field.
    pub fn is_immediate_numeric(self) -> bool {
        self.0 < Self::LF_NUMERIC.0
    }

    /// True for the class-like UDT kinds (`class`, `struct`, `interface`).
    pub fn is_class_like(self) -> bool {
        matches!(self, Leaf::LF_CLASS | Leaf::LF_STRUCTURE | Leaf::LF_INTERFACE)
    }

    /// True for any tag-type record kind.
    pub fn is_udt(self) -> bool {
        self.is_class_like() || matches!(self, Leaf::LF_UNION | Leaf::LF_ENUM)
    }
}

impl std::fmt::Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match LEAF_NAMES.iter().find(|(leaf, _)| leaf == self) {
            Some((_, name)) => f.write_str(name),
            None => write!(f, "LF_??({:#06x})", self.0),
        }
    }
}

#[test]
fn leaf_debug_names() {
    assert_eq!(format!("{:?}", Leaf::LF_STRUCTURE), "LF_STRUCTURE");
    assert_eq!(format!("{:?}", Leaf(0x7777)), "LF_??(0x7777)");
    assert!(Leaf(0x7fff).is_immediate_numeric());
    assert!(!Leaf::LF_CHAR.is_immediate_numeric());
}
