//! Opaque 64-bit identifiers
//!
//! A debugger refers to the entities of a symbol file by a single `u64`. [`PdbSymUid`] packs one
//! of several kinds of identifier into that space:
//!
//! bits  | `Compiland` | `CompilandSym` | `GlobalSym` | `Type`
//! ------|-------------|----------------|-------------|-------
//! 0-31  | module (0-15) | symbol offset | record offset | type index
//! 32-47 |             | module         | bit 32: public | bit 32: IPI
//! 61-63 | kind 0      | kind 1         | kind 2      | kind 3
//!
//! Packing and unpacking are exact inverses. Unpacking a value as the wrong kind, or one with
//! bits set outside its fields, is a bug in the caller and panics.

use ms_codeview::types::TypeIndex;
use std::fmt;

/// The kind of entity that a [`PdbSymUid`] identifies.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum PdbSymUidKind {
    /// A compile unit (DBI module).
    Compiland = 0,
    /// A symbol record within a module stream.
    CompilandSym = 1,
    /// A symbol record within the global symbol stream.
    GlobalSym = 2,
    /// A type record, or a simple type index.
    Type = 3,
}

/// Identifies a compile unit.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PdbCompilandId {
    /// Zero-based module index in the DBI.
    pub modi: u16,
}

/// Identifies a symbol record within a module stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PdbCompilandSymId {
    /// Zero-based module index in the DBI.
    pub modi: u16,
    /// Byte offset of the record within the module stream.
    pub offset: u32,
}

/// Identifies a symbol record within the global symbol stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PdbGlobalSymId {
    /// Byte offset of the record within the stream.
    pub offset: u32,
    /// The record is in the public symbol table.
    pub is_public: bool,
}

/// Identifies a type record (or simple type) in the TPI or IPI.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PdbTypeSymId {
    #[allow(missing_docs)]
    pub index: TypeIndex,
    /// The index is in the IPI, not the TPI.
    pub is_ipi: bool,
}

impl PdbTypeSymId {
    /// A type in the TPI.
    pub fn tpi(index: TypeIndex) -> Self {
        Self {
            index,
            is_ipi: false,
        }
    }

    /// An item in the IPI.
    pub fn ipi(index: TypeIndex) -> Self {
        Self {
            index,
            is_ipi: true,
        }
    }
}

/// The unpacked form of a [`PdbSymUid`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(missing_docs)]
pub enum PdbSymId {
    Compiland(PdbCompilandId),
    CompilandSym(PdbCompilandSymId),
    GlobalSym(PdbGlobalSymId),
    Type(PdbTypeSymId),
}

/// The packed, opaque form of an identifier.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct PdbSymUid(pub u64);

const KIND_SHIFT: u32 = 61;
const FIELD_BITS: u64 = (1 << KIND_SHIFT) - 1;

impl PdbSymUid {
    /// The kind of entity.
    pub fn kind(self) -> PdbSymUidKind {
        match self.0 >> KIND_SHIFT {
            0 => PdbSymUidKind::Compiland,
            1 => PdbSymUidKind::CompilandSym,
            2 => PdbSymUidKind::GlobalSym,
            3 => PdbSymUidKind::Type,
            k => panic!("PdbSymUid {:#x} has invalid kind {k}", self.0),
        }
    }

    fn tagged(kind: PdbSymUidKind, fields: u64) -> Self {
        Self(((kind as u64) << KIND_SHIFT) | fields)
    }

    fn assert_kind(self, expected: PdbSymUidKind) {
        let kind = self.kind();
        assert_eq!(
            kind, expected,
            "PdbSymUid {:#x} is a {kind:?}, not a {expected:?}",
            self.0
        );
    }

    fn assert_reserved_bits_clear(self, used_bits: u64) {
        let reserved = FIELD_BITS & !used_bits;
        assert_eq!(
            self.0 & reserved,
            0,
            "PdbSymUid {:#x} has reserved bits set",
            self.0
        );
    }

    /// Unpacks a `Compiland` identifier. Panics if this is a different kind.
    pub fn as_compiland(self) -> PdbCompilandId {
        self.assert_kind(PdbSymUidKind::Compiland);
        self.assert_reserved_bits_clear(0xffff);
        PdbCompilandId {
            modi: self.0 as u16,
        }
    }

    /// Unpacks a `CompilandSym` identifier. Panics if this is a different kind.
    pub fn as_compiland_sym(self) -> PdbCompilandSymId {
        self.assert_kind(PdbSymUidKind::CompilandSym);
        self.assert_reserved_bits_clear(0xffff_ffff_ffff);
        PdbCompilandSymId {
            offset: self.0 as u32,
            modi: (self.0 >> 32) as u16,
        }
    }

    /// Unpacks a `GlobalSym` identifier. Panics if this is a different kind.
    pub fn as_global_sym(self) -> PdbGlobalSymId {
        self.assert_kind(PdbSymUidKind::GlobalSym);
        self.assert_reserved_bits_clear(0x1_ffff_ffff);
        PdbGlobalSymId {
            offset: self.0 as u32,
            is_public: (self.0 >> 32) & 1 != 0,
        }
    }

    /// Unpacks a `Type` identifier. Panics if this is a different kind.
    pub fn as_type(self) -> PdbTypeSymId {
        self.assert_kind(PdbSymUidKind::Type);
        self.assert_reserved_bits_clear(0x1_ffff_ffff);
        PdbTypeSymId {
            index: TypeIndex(self.0 as u32),
            is_ipi: (self.0 >> 32) & 1 != 0,
        }
    }

    /// Unpacks any kind.
    pub fn unpack(self) -> PdbSymId {
        match self.kind() {
            PdbSymUidKind::Compiland => PdbSymId::Compiland(self.as_compiland()),
            PdbSymUidKind::CompilandSym => PdbSymId::CompilandSym(self.as_compiland_sym()),
            PdbSymUidKind::GlobalSym => PdbSymId::GlobalSym(self.as_global_sym()),
            PdbSymUidKind::Type => PdbSymId::Type(self.as_type()),
        }
    }
}

impl From<PdbCompilandId> for PdbSymUid {
    fn from(id: PdbCompilandId) -> Self {
        Self::tagged(PdbSymUidKind::Compiland, id.modi as u64)
    }
}

impl From<PdbCompilandSymId> for PdbSymUid {
    fn from(id: PdbCompilandSymId) -> Self {
        Self::tagged(
            PdbSymUidKind::CompilandSym,
            ((id.modi as u64) << 32) | id.offset as u64,
        )
    }
}

impl From<PdbGlobalSymId> for PdbSymUid {
    fn from(id: PdbGlobalSymId) -> Self {
        Self::tagged(
            PdbSymUidKind::GlobalSym,
            ((id.is_public as u64) << 32) | id.offset as u64,
        )
    }
}

impl From<PdbTypeSymId> for PdbSymUid {
    fn from(id: PdbTypeSymId) -> Self {
        Self::tagged(
            PdbSymUidKind::Type,
            ((id.is_ipi as u64) << 32) | id.index.0 as u64,
        )
    }
}

impl From<PdbSymId> for PdbSymUid {
    fn from(id: PdbSymId) -> Self {
        match id {
            PdbSymId::Compiland(id) => id.into(),
            PdbSymId::CompilandSym(id) => id.into(),
            PdbSymId::GlobalSym(id) => id.into(),
            PdbSymId::Type(id) => id.into(),
        }
    }
}

impl fmt::Debug for PdbSymUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 >> KIND_SHIFT {
            0..=3 => write!(f, "{:?}", self.unpack()),
            _ => write!(f, "PdbSymUid({:#x})", self.0),
        }
    }
}
