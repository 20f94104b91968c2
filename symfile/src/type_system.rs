//! The interface to the debugger's type system.
//!
//! Materialized types are built by calling into a [`TypeSystem`]. The symbol file never looks
//! inside the values it gets back; it only passes them back into the type system and stores
//! them in [`Type`](crate::types::Type) objects.
//!
//! Tag types (classes, structs, unions, enums) are created as declarations marked as having
//! external storage. When the debugger needs the members of one, it calls
//! [`SymbolFile::complete_type`](crate::SymbolFile::complete_type), which adds the members and
//! then calls [`TypeSystem::complete_tag_declaration_definition`].

use crate::simple::BasicType;
use crate::uid::PdbSymUid;
use bitflags::bitflags;
use std::fmt::Debug;
use std::hash::Hash;

/// The kind of an ordinary (non-member) pointer type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PointerKind {
    /// `T*`
    Pointer,
    /// `T&`
    LValueReference,
    /// `T&&`
    RValueReference,
}

bitflags! {
    /// Type qualifiers.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
    pub struct Qualifiers: u8 {
        /// `const`
        const CONST = 1;
        /// `volatile`
        const VOLATILE = 2;
        /// `__restrict`
        const RESTRICT = 4;
    }
}

/// Calling conventions that a function type can have.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum CallingConv {
    C,
    X86StdCall,
    X86FastCall,
    X86ThisCall,
    X86VectorCall,
    X86Pascal,
}

/// Member access.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum AccessType {
    None,
    Public,
    Protected,
    Private,
}

/// The keyword that introduces a tag type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum TagKind {
    Class,
    Struct,
    Union,
    Interface,
}

/// The Microsoft inheritance model of a class. This determines the size of pointers to members.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum MsInheritance {
    Single,
    Multiple,
    Virtual,
}

/// Extra information attached to a record type when it is created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordMetadata {
    /// The UID of the type record that the record type was created from.
    pub uid: PdbSymUid,
    #[allow(missing_docs)]
    pub inheritance: MsInheritance,
}

/// Properties of a member function.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[allow(missing_docs)]
pub struct MethodAttributes {
    pub is_virtual: bool,
    pub is_static: bool,
    pub is_pure: bool,
    /// Compiler-generated.
    pub is_artificial: bool,
}

/// The layout of a completed record, as found in the type records.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecordLayout {
    /// Size of the record in bytes.
    pub byte_size: u64,
    /// Bit offset of each field, in the order that the fields were added.
    pub field_offsets: Vec<(String, u64)>,
    /// Byte offset of each non-virtual base class, by the UID of the base type.
    pub base_offsets: Vec<(PdbSymUid, u64)>,
}

/// The operations that the symbol file needs from the debugger's type system.
pub trait TypeSystem {
    /// A handle to a type.
    type CompilerType: Clone + Debug;
    /// A handle to a declaration context: the translation unit, a namespace, or a tag type.
    type DeclContext: Clone + Debug;
    /// A handle to the declaration of a tag type.
    type TagDecl: Clone + Eq + Hash + Debug;

    /// The global scope.
    fn translation_unit_decl(&mut self) -> Self::DeclContext;

    /// Returns the namespace called `name` within `parent`, creating it on first use.
    fn get_unique_namespace_declaration(
        &mut self,
        name: &str,
        parent: &Self::DeclContext,
    ) -> Self::DeclContext;

    /// Returns a built-in type. Returns `None` if the type system cannot represent it.
    fn basic_type(&mut self, basic_type: BasicType) -> Option<Self::CompilerType>;

    #[allow(missing_docs)]
    fn create_pointer_type(
        &mut self,
        pointee: &Self::CompilerType,
        kind: PointerKind,
    ) -> Self::CompilerType;

    #[allow(missing_docs)]
    fn add_qualifiers(&mut self, ty: &Self::CompilerType, qualifiers: Qualifiers)
    -> Self::CompilerType;

    /// `pointee class::*`
    fn create_member_pointer_type(
        &mut self,
        class: &Self::CompilerType,
        pointee: &Self::CompilerType,
    ) -> Self::CompilerType;

    #[allow(missing_docs)]
    fn create_array_type(&mut self, element: &Self::CompilerType, count: u64)
    -> Self::CompilerType;

    #[allow(missing_docs)]
    fn create_function_type(
        &mut self,
        return_type: &Self::CompilerType,
        args: &[Self::CompilerType],
        is_variadic: bool,
        calling_conv: CallingConv,
    ) -> Self::CompilerType;

    /// Creates the declaration of a class, struct, union, or interface.
    fn create_record_type(
        &mut self,
        decl_context: &Self::DeclContext,
        access: AccessType,
        name: &str,
        kind: TagKind,
        metadata: &RecordMetadata,
    ) -> Self::CompilerType;

    #[allow(missing_docs)]
    fn create_enumeration_type(
        &mut self,
        name: &str,
        decl_context: &Self::DeclContext,
        underlying: &Self::CompilerType,
        is_scoped: bool,
    ) -> Self::CompilerType;

    /// Begins the definition of a tag type. Members are added after this.
    fn start_tag_declaration_definition(&mut self, ty: &Self::CompilerType);

    /// Marks a tag type as having members that will be supplied later, on request.
    fn set_has_external_storage(&mut self, ty: &Self::CompilerType, has_external_storage: bool);

    /// Gets the declaration of a tag type. Returns `None` if `ty` is not a tag type.
    fn get_as_tag_decl(&self, ty: &Self::CompilerType) -> Option<Self::TagDecl>;

    /// The declaration context that a tag type introduces, for types nested within it.
    fn decl_context_for_tag(&self, tag: &Self::TagDecl) -> Self::DeclContext;

    /// Adds a data member. `bit_width` is set for bit fields.
    fn add_field_to_record(
        &mut self,
        record: &Self::CompilerType,
        name: &str,
        ty: &Self::CompilerType,
        access: AccessType,
        bit_width: Option<u32>,
    );

    #[allow(missing_docs)]
    fn add_base_class(
        &mut self,
        record: &Self::CompilerType,
        base: &Self::CompilerType,
        access: AccessType,
        is_virtual: bool,
    );

    #[allow(missing_docs)]
    fn add_static_member(
        &mut self,
        record: &Self::CompilerType,
        name: &str,
        ty: &Self::CompilerType,
        access: AccessType,
    );

    /// Adds a member function. `function_type` was built by [`Self::create_function_type`].
    fn add_method(
        &mut self,
        record: &Self::CompilerType,
        name: &str,
        function_type: &Self::CompilerType,
        access: AccessType,
        attributes: MethodAttributes,
    );

    /// Adds an enumerator. `value` has already been sign- or zero-extended according to the
    /// underlying type.
    fn add_enumerator(&mut self, enum_type: &Self::CompilerType, name: &str, value: i128);

    /// Declares a nested type alias or nested type named `name` inside `record`.
    fn add_nested_type(
        &mut self,
        record: &Self::CompilerType,
        name: &str,
        nested: &Self::CompilerType,
    );

    /// Ends the definition of a tag type.
    fn complete_tag_declaration_definition(
        &mut self,
        ty: &Self::CompilerType,
        layout: &RecordLayout,
    );
}
