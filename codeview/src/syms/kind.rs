/// Identifies the kind of a symbol record.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SymKind(pub u16);

macro_rules! sym_kinds {
    (
        $( $code:expr, $name:ident ; )*
    ) => {
        #[allow(missing_docs)]
        impl SymKind {
            $(
                pub const $name: SymKind = SymKind($code);
            )*
        }

        static SYM_NAMES: &[(SymKind, &str)] = &[
            $(
                (SymKind($code), stringify!($name)),
            )*
        ];
    }
}

// Sorted by value; `Debug` relies on it.
sym_kinds! {
    0x0006, S_END;
    0x0007, S_SKIP;
    0x0402, S_ALIGN;
    0x1012, S_FRAMEPROC;
    0x1101, S_OBJNAME;
    0x1102, S_THUNK32;
    0x1103, S_BLOCK32;
    0x1105, S_LABEL32;
    0x1106, S_REGISTER;
    0x1107, S_CONSTANT;
    0x1108, S_UDT;
    0x110b, S_BPREL32;
    0x110c, S_LDATA32;
    0x110d, S_GDATA32;
    0x110e, S_PUB32;
    0x110f, S_LPROC32;
    0x1110, S_GPROC32;
    0x1111, S_REGREL32;
    0x1112, S_LTHREAD32;
    0x1113, S_GTHREAD32;
    0x1116, S_COMPILE2;
    0x1124, S_UNAMESPACE;
    0x1125, S_PROCREF;
    0x1126, S_DATAREF;
    0x1127, S_LPROCREF;
    0x1129, S_TRAMPOLINE;
    0x113c, S_COMPILE3;
    0x113d, S_ENVBLOCK;
    0x113e, S_LOCAL;
    0x1146, S_LPROC32_ID;
    0x1147, S_GPROC32_ID;
    0x114c, S_BUILDINFO;
    0x114d, S_INLINESITE;
    0x114e, S_INLINESITE_END;
    0x114f, S_PROC_ID_END;
}

impl SymKind {
    /// True if this record opens a scope that a later `S_END` (or `S_PROC_ID_END`) closes.
    pub fn starts_scope(self) -> bool {
        matches!(
            self,
            SymKind::S_GPROC32
                | SymKind::S_LPROC32
                | SymKind::S_GPROC32_ID
                | SymKind::S_LPROC32_ID
                | SymKind::S_BLOCK32
                | SymKind::S_THUNK32
                | SymKind::S_INLINESITE
        )
    }

    /// True if this record closes a scope.
    pub fn ends_scope(self) -> bool {
        matches!(
            self,
            SymKind::S_END | SymKind::S_PROC_ID_END | SymKind::S_INLINESITE_END
        )
    }
}

impl std::fmt::Debug for SymKind {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match SYM_NAMES.binary_search_by_key(self, |(kind, _)| *kind) {
            Ok(i) => fmt.write_str(SYM_NAMES[i].1),
            Err(_) => write!(fmt, "S_??({:#06x})", self.0),
        }
    }
}

#[test]
fn sym_names_are_sorted() {
    for w in SYM_NAMES.windows(2) {
        assert!(w[0].0 < w[1].0, "{} is out of order", w[1].1);
    }
    assert_eq!(format!("{:?}", SymKind::S_GDATA32), "S_GDATA32");
    assert_eq!(format!("{:?}", SymKind(0x9999)), "S_??(0x9999)");
}
