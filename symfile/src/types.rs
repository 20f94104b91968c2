//! Materialized types

use crate::uid::PdbSymUid;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Whether the members of a type have been supplied to the type system.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResolveState {
    /// A tag type whose members have not been added yet.
    Forward,
    /// Everything about the type is known.
    Full,
}

/// A type, decoded from a type record (or a simple type index) and converted to the type
/// system's representation.
///
/// Types refer to other types by UID (see [`Type::encoding_uid`]), never by owning them, so
/// cyclic type graphs need no special handling.
pub struct Type<CT> {
    /// The UID of the record this type was created from. For a forward reference that was
    /// redirected, this is the UID of the full declaration.
    pub uid: PdbSymUid,
    /// Display name. Empty for pointers, arrays, and function types.
    pub name: String,
    /// Size in bytes.
    pub byte_size: u64,
    /// The type that this type is built from, for arrays (the element type).
    pub encoding_uid: Option<PdbSymUid>,
    resolve_state: Cell<ResolveState>,
    /// The type system's handle for this type.
    pub compiler_type: CT,
}

/// Types are shared between the cache and every caller that asked for them.
pub type TypeRef<CT> = Rc<Type<CT>>;

impl<CT> Type<CT> {
    pub(crate) fn new(
        uid: PdbSymUid,
        name: String,
        byte_size: u64,
        resolve_state: ResolveState,
        compiler_type: CT,
    ) -> Self {
        Self {
            uid,
            name,
            byte_size,
            encoding_uid: None,
            resolve_state: Cell::new(resolve_state),
            compiler_type,
        }
    }

    /// Current resolve state. Only tag types start out as [`ResolveState::Forward`].
    pub fn resolve_state(&self) -> ResolveState {
        self.resolve_state.get()
    }

    pub(crate) fn set_resolved(&self) {
        self.resolve_state.set(ResolveState::Full);
    }
}

impl<CT: fmt::Debug> fmt::Debug for Type<CT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("byte_size", &self.byte_size)
            .field("resolve_state", &self.resolve_state.get())
            .field("compiler_type", &self.compiler_type)
            .finish()
    }
}
