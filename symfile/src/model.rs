//! A [`TypeSystem`] that records everything it is asked to do, for tests.

use crate::simple::BasicType;
use crate::type_system::{
    AccessType, CallingConv, MethodAttributes, MsInheritance, PointerKind, Qualifiers,
    RecordLayout, RecordMetadata, TagKind, TypeSystem,
};

/// Index into [`ModelTypeSystem::types`].
pub type TypeId = usize;
/// Index into [`ModelTypeSystem::tags`].
pub type TagId = usize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Context {
    TranslationUnit,
    Namespace(usize),
    Tag(TagId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelType {
    Basic(BasicType),
    Pointer(TypeId, PointerKind),
    Qualified(TypeId, Qualifiers),
    MemberPointer { class: TypeId, pointee: TypeId },
    Array { element: TypeId, count: u64 },
    Function {
        ret: TypeId,
        args: Vec<TypeId>,
        is_variadic: bool,
        calling_conv: CallingConv,
    },
    Tag(TagId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Namespace {
    pub name: String,
    pub parent: Context,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeId,
    pub access: AccessType,
    pub bit_width: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BaseDecl {
    pub ty: TypeId,
    pub access: AccessType,
    pub is_virtual: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub ty: TypeId,
    pub access: AccessType,
    pub attributes: MethodAttributes,
}

/// A record or enum declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct TagDeclModel {
    pub name: String,
    pub context: Context,
    /// `None` for enums.
    pub kind: Option<TagKind>,
    pub access: AccessType,
    pub inheritance: Option<MsInheritance>,
    pub enum_underlying: Option<TypeId>,
    pub is_scoped: bool,
    pub started: bool,
    pub has_external_storage: bool,
    pub times_completed: u32,
    pub fields: Vec<FieldDecl>,
    pub bases: Vec<BaseDecl>,
    pub static_members: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub enumerators: Vec<(String, i128)>,
    pub nested: Vec<(String, TypeId)>,
    pub layout: Option<RecordLayout>,
}

#[derive(Default, Debug)]
pub struct ModelTypeSystem {
    pub types: Vec<ModelType>,
    pub tags: Vec<TagDeclModel>,
    pub namespaces: Vec<Namespace>,
}

impl ModelTypeSystem {
    fn add(&mut self, t: ModelType) -> TypeId {
        self.types.push(t);
        self.types.len() - 1
    }

    pub fn tag(&self, ct: TypeId) -> &TagDeclModel {
        match self.get_as_tag_decl(&ct) {
            Some(tag) => &self.tags[tag],
            None => panic!("type {ct} is not a tag type: {:?}", self.types[ct]),
        }
    }

    fn tag_mut(&mut self, ct: TypeId) -> &mut TagDeclModel {
        match self.get_as_tag_decl(&ct) {
            Some(tag) => &mut self.tags[tag],
            None => panic!("type {ct} is not a tag type: {:?}", self.types[ct]),
        }
    }

    /// Renders a context as `ns1::ns2::Outer`, for assertions.
    pub fn context_path(&self, mut context: Context) -> String {
        let mut parts = Vec::new();
        loop {
            match context {
                Context::TranslationUnit => break,
                Context::Namespace(n) => {
                    parts.push(self.namespaces[n].name.clone());
                    context = self.namespaces[n].parent;
                }
                Context::Tag(t) => {
                    parts.push(self.tags[t].name.clone());
                    context = self.tags[t].context;
                }
            }
        }
        parts.reverse();
        parts.join("::")
    }
}

impl TypeSystem for ModelTypeSystem {
    type CompilerType = TypeId;
    type DeclContext = Context;
    type TagDecl = TagId;

    fn translation_unit_decl(&mut self) -> Context {
        Context::TranslationUnit
    }

    fn get_unique_namespace_declaration(&mut self, name: &str, parent: &Context) -> Context {
        if let Some(i) = self
            .namespaces
            .iter()
            .position(|n| n.name == name && n.parent == *parent)
        {
            return Context::Namespace(i);
        }
        self.namespaces.push(Namespace {
            name: name.to_string(),
            parent: *parent,
        });
        Context::Namespace(self.namespaces.len() - 1)
    }

    fn basic_type(&mut self, basic_type: BasicType) -> Option<TypeId> {
        Some(self.add(ModelType::Basic(basic_type)))
    }

    fn create_pointer_type(&mut self, pointee: &TypeId, kind: PointerKind) -> TypeId {
        self.add(ModelType::Pointer(*pointee, kind))
    }

    fn add_qualifiers(&mut self, ty: &TypeId, qualifiers: Qualifiers) -> TypeId {
        self.add(ModelType::Qualified(*ty, qualifiers))
    }

    fn create_member_pointer_type(&mut self, class: &TypeId, pointee: &TypeId) -> TypeId {
        self.add(ModelType::MemberPointer {
            class: *class,
            pointee: *pointee,
        })
    }

    fn create_array_type(&mut self, element: &TypeId, count: u64) -> TypeId {
        self.add(ModelType::Array {
            element: *element,
            count,
        })
    }

    fn create_function_type(
        &mut self,
        return_type: &TypeId,
        args: &[TypeId],
        is_variadic: bool,
        calling_conv: CallingConv,
    ) -> TypeId {
        self.add(ModelType::Function {
            ret: *return_type,
            args: args.to_vec(),
            is_variadic,
            calling_conv,
        })
    }

    fn create_record_type(
        &mut self,
        decl_context: &Context,
        access: AccessType,
        name: &str,
        kind: TagKind,
        metadata: &RecordMetadata,
    ) -> TypeId {
        self.tags.push(TagDeclModel {
            name: name.to_string(),
            context: *decl_context,
            kind: Some(kind),
            access,
            inheritance: Some(metadata.inheritance),
            enum_underlying: None,
            is_scoped: false,
            started: false,
            has_external_storage: false,
            times_completed: 0,
            fields: Vec::new(),
            bases: Vec::new(),
            static_members: Vec::new(),
            methods: Vec::new(),
            enumerators: Vec::new(),
            nested: Vec::new(),
            layout: None,
        });
        let tag = self.tags.len() - 1;
        self.add(ModelType::Tag(tag))
    }

    fn create_enumeration_type(
        &mut self,
        name: &str,
        decl_context: &Context,
        underlying: &TypeId,
        is_scoped: bool,
    ) -> TypeId {
        self.tags.push(TagDeclModel {
            name: name.to_string(),
            context: *decl_context,
            kind: None,
            access: AccessType::Public,
            inheritance: None,
            enum_underlying: Some(*underlying),
            is_scoped,
            started: false,
            has_external_storage: false,
            times_completed: 0,
            fields: Vec::new(),
            bases: Vec::new(),
            static_members: Vec::new(),
            methods: Vec::new(),
            enumerators: Vec::new(),
            nested: Vec::new(),
            layout: None,
        });
        let tag = self.tags.len() - 1;
        self.add(ModelType::Tag(tag))
    }

    fn start_tag_declaration_definition(&mut self, ty: &TypeId) {
        self.tag_mut(*ty).started = true;
    }

    fn set_has_external_storage(&mut self, ty: &TypeId, has_external_storage: bool) {
        self.tag_mut(*ty).has_external_storage = has_external_storage;
    }

    fn get_as_tag_decl(&self, ty: &TypeId) -> Option<TagId> {
        match self.types.get(*ty)? {
            ModelType::Tag(tag) => Some(*tag),
            ModelType::Qualified(inner, _) => self.get_as_tag_decl(inner),
            _ => None,
        }
    }

    fn decl_context_for_tag(&self, tag: &TagId) -> Context {
        Context::Tag(*tag)
    }

    fn add_field_to_record(
        &mut self,
        record: &TypeId,
        name: &str,
        ty: &TypeId,
        access: AccessType,
        bit_width: Option<u32>,
    ) {
        self.tag_mut(*record).fields.push(FieldDecl {
            name: name.to_string(),
            ty: *ty,
            access,
            bit_width,
        });
    }

    fn add_base_class(
        &mut self,
        record: &TypeId,
        base: &TypeId,
        access: AccessType,
        is_virtual: bool,
    ) {
        self.tag_mut(*record).bases.push(BaseDecl {
            ty: *base,
            access,
            is_virtual,
        });
    }

    fn add_static_member(&mut self, record: &TypeId, name: &str, ty: &TypeId, access: AccessType) {
        self.tag_mut(*record).static_members.push(FieldDecl {
            name: name.to_string(),
            ty: *ty,
            access,
            bit_width: None,
        });
    }

    fn add_method(
        &mut self,
        record: &TypeId,
        name: &str,
        function_type: &TypeId,
        access: AccessType,
        attributes: MethodAttributes,
    ) {
        self.tag_mut(*record).methods.push(MethodDecl {
            name: name.to_string(),
            ty: *function_type,
            access,
            attributes,
        });
    }

    fn add_enumerator(&mut self, enum_type: &TypeId, name: &str, value: i128) {
        self.tag_mut(*enum_type)
            .enumerators
            .push((name.to_string(), value));
    }

    fn add_nested_type(&mut self, record: &TypeId, name: &str, nested: &TypeId) {
        self.tag_mut(*record).nested.push((name.to_string(), *nested));
    }

    fn complete_tag_declaration_definition(&mut self, ty: &TypeId, layout: &RecordLayout) {
        let tag = self.tag_mut(*ty);
        tag.times_completed += 1;
        tag.layout = Some(layout.clone());
    }
}
