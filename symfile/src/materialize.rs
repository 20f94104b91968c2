//! Converts type records into types of a [`TypeSystem`].
//!
//! Types are created on demand and cached by UID. A forward reference to a UDT is redirected to
//! the record that fully defines the same type, and both UIDs are mapped to the one `Type`, so
//! the forward and full references are identical.
//!
//! Tag types are created as shells: the declaration exists (and is cached) before anything that
//! needs the members is looked at. Members are added later by the completer. This is what makes
//! cyclic type graphs terminate.

use crate::index::PdbIndex;
use crate::parent_index::ParentIndex;
use crate::simple::{BasicType, SimpleType, decode_simple_type};
use crate::tpi::TypeStream;
use crate::type_system::{
    AccessType, CallingConv, MsInheritance, PointerKind, Qualifiers, RecordMetadata, TagKind,
    TypeSystem,
};
use crate::types::{ResolveState, Type, TypeRef};
use crate::uid::{PdbSymUid, PdbTypeSymId};
use anyhow::{Context, bail};
use bstr::BStr;
use ms_codeview::types::fields::Field;
use ms_codeview::types::number::Number;
use ms_codeview::types::{
    CallingConvention, Leaf, Pointer, PointerMode, TypeData, TypeIndex, TypeModifier,
};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// The resolve state of a tag declaration, and the UID of the record it was created from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct DeclStatus {
    pub(crate) uid: PdbSymUid,
    pub(crate) state: ResolveState,
}

/// The types that have been created so far, and what is known about their declarations.
pub struct TypeCache<TS: TypeSystem> {
    pub(crate) types: HashMap<PdbSymUid, TypeRef<TS::CompilerType>>,
    pub(crate) decl_status: HashMap<TS::TagDecl, DeclStatus>,
    /// UIDs whose creation is under way. Reaching one of these again means the type graph has a
    /// cycle that does not pass through a tag type.
    pub(crate) in_progress: HashSet<PdbSymUid>,
    /// Tag types whose members are being added.
    pub(crate) completing: HashSet<PdbSymUid>,
}

impl<TS: TypeSystem> Default for TypeCache<TS> {
    fn default() -> Self {
        Self {
            types: HashMap::new(),
            decl_status: HashMap::new(),
            in_progress: HashSet::new(),
            completing: HashSet::new(),
        }
    }
}

impl<TS: TypeSystem> TypeCache<TS> {
    /// Gets a type that has already been created.
    pub fn get(&self, uid: PdbSymUid) -> Option<&TypeRef<TS::CompilerType>> {
        self.types.get(&uid)
    }

    /// The number of UIDs that map to a type. A forward reference and its full declaration
    /// count twice.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no types have been created.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Borrows everything that type creation needs, for the duration of one request.
pub(crate) struct Materializer<'s, 'a, TS: TypeSystem> {
    pub(crate) index: &'s PdbIndex<'a>,
    pub(crate) parents: &'s ParentIndex,
    pub(crate) ts: &'s mut TS,
    pub(crate) cache: &'s mut TypeCache<TS>,
}

type Created<CT> = anyhow::Result<Option<Type<CT>>>;

impl<'s, 'a, TS: TypeSystem> Materializer<'s, 'a, TS> {
    /// Gets the type for `id`, creating it if necessary. Returns `None` if the type cannot be
    /// represented; the reason is logged.
    pub(crate) fn get_or_create_type(
        &mut self,
        id: PdbTypeSymId,
    ) -> Option<TypeRef<TS::CompilerType>> {
        let uid = PdbSymUid::from(id);
        if let Some(t) = self.cache.types.get(&uid) {
            return Some(t.clone());
        }

        if id.index == TypeIndex::T_NOTYPE {
            return None;
        }

        if !self.cache.in_progress.insert(uid) {
            warn!(
                type_index = ?id.index,
                "type refers to itself without passing through a tag type"
            );
            return None;
        }
        let result = self.create_and_cache_type(id);
        self.cache.in_progress.remove(&uid);
        result
    }

    fn create_and_cache_type(&mut self, id: PdbTypeSymId) -> Option<TypeRef<TS::CompilerType>> {
        let index = self.index;
        let uid = PdbSymUid::from(id);

        let mut best = id;
        if !id.is_ipi && !id.index.is_simple() {
            let tpi = index.tpi();
            if tpi.get_type(id.index).is_ok_and(|t| t.is_forward_ref()) {
                let full = tpi.find_full_decl_for_forward_ref(id.index);
                if full != id.index {
                    let full_id = PdbTypeSymId::tpi(full);
                    if let Some(t) = self.cache.types.get(&PdbSymUid::from(full_id)).cloned() {
                        self.cache.types.insert(uid, t.clone());
                        return Some(t);
                    }
                    best = full_id;
                }
            }
        }

        let best_uid = PdbSymUid::from(best);
        let redirected = best_uid != uid;
        if redirected && !self.cache.in_progress.insert(best_uid) {
            warn!(type_index = ?best.index, "full declaration is already being created");
            return None;
        }
        let created = self.create_type(best);
        if redirected {
            self.cache.in_progress.remove(&best_uid);
        }

        let ty = match created {
            Ok(Some(t)) => Rc::new(t),
            Ok(None) => return None,
            Err(e) => {
                warn!(type_index = ?best.index, "failed to create type: {e:#}");
                return None;
            }
        };

        self.cache.types.insert(best_uid, ty.clone());
        if redirected {
            trace!(
                forward = ?id.index,
                full = ?best.index,
                "mapped forward reference to full declaration"
            );
            self.cache.types.insert(uid, ty.clone());
        }

        if ty.resolve_state() == ResolveState::Forward {
            match self.ts.get_as_tag_decl(&ty.compiler_type) {
                Some(tag) => {
                    self.cache.decl_status.insert(
                        tag,
                        DeclStatus {
                            uid: best_uid,
                            state: ResolveState::Forward,
                        },
                    );
                }
                None => warn!(type_index = ?best.index, "tag type has no tag declaration"),
            }
        }

        Some(ty)
    }

    fn create_type(&mut self, id: PdbTypeSymId) -> Created<TS::CompilerType> {
        if id.is_ipi {
            debug!(type_index = ?id.index, "IPI records do not describe types");
            return Ok(None);
        }
        if id.index.is_simple() {
            return Ok(self.create_simple_type(id.index));
        }

        let index = self.index;
        let tpi = index.tpi();
        let uid = PdbSymUid::from(id);
        let record = tpi.record(id.index)?;
        let kind = record.kind;
        let data = record
            .parse()
            .with_context(|| format!("Failed to decode {kind:?} record {:?}", id.index))?;

        match data {
            TypeData::Modifier(m) => self.create_modifier_type(uid, &m),
            TypeData::Pointer(p) => self.create_pointer_type(uid, &p),
            TypeData::Struct(s) => {
                let tag_kind = match kind {
                    Leaf::LF_CLASS => TagKind::Class,
                    Leaf::LF_INTERFACE => TagKind::Interface,
                    _ => TagKind::Struct,
                };
                let size = number_to_u64(&s.length).context("invalid struct size")?;
                let inheritance = self.ms_inheritance(s.fixed.field_list.get());
                Ok(Some(self.create_class_struct_union(
                    id.index,
                    s.name,
                    s.unique_name,
                    size,
                    tag_kind,
                    inheritance,
                )))
            }
            TypeData::Union(u) => {
                let size = number_to_u64(&u.length).context("invalid union size")?;
                Ok(Some(self.create_class_struct_union(
                    id.index,
                    u.name,
                    u.unique_name,
                    size,
                    TagKind::Union,
                    MsInheritance::Single,
                )))
            }
            TypeData::Enum(e) => {
                let (decl_context, name) =
                    self.create_decl_info_for_type(id.index, e.name, e.unique_name);
                let Some(underlying) =
                    self.get_or_create_type(PdbTypeSymId::tpi(e.fixed.underlying_type.get()))
                else {
                    return Ok(None);
                };
                let ct = self.ts.create_enumeration_type(
                    &name,
                    &decl_context,
                    &underlying.compiler_type,
                    e.fixed.property.get().scoped(),
                );
                self.ts.start_tag_declaration_definition(&ct);
                self.ts.set_has_external_storage(&ct, true);
                Ok(Some(Type::new(
                    uid,
                    name,
                    underlying.byte_size,
                    ResolveState::Forward,
                    ct,
                )))
            }
            TypeData::Array(a) => {
                let element_ti = a.fixed.element_type.get();
                let Some(element) = self.get_or_create_type(PdbTypeSymId::tpi(element_ti)) else {
                    return Ok(None);
                };
                let size = number_to_u64(&a.len).context("invalid array size")?;
                if element.byte_size == 0 {
                    bail!("Array element type {element_ti:?} has size 0");
                }
                if size % element.byte_size != 0 {
                    bail!(
                        "Array size {size} is not a multiple of the element size {}",
                        element.byte_size
                    );
                }
                let count = size / element.byte_size;
                let ct = self.ts.create_array_type(&element.compiler_type, count);
                let mut t = Type::new(uid, String::new(), size, ResolveState::Full, ct);
                t.encoding_uid = Some(element.uid);
                Ok(Some(t))
            }
            TypeData::Proc(p) => self.create_procedure_type(
                uid,
                p.return_value.get(),
                p.arg_list.get(),
                p.calling_convention(),
            ),
            TypeData::MemberFunc(mf) => self.create_procedure_type(
                uid,
                mf.return_value.get(),
                mf.arg_list.get(),
                mf.calling_convention(),
            ),
            _ => {
                debug!(type_index = ?id.index, ?kind, "record kind is not a type");
                Ok(None)
            }
        }
    }

    fn create_simple_type(&mut self, ti: TypeIndex) -> Option<Type<TS::CompilerType>> {
        let uid = PdbSymUid::from(PdbTypeSymId::tpi(ti));
        match decode_simple_type(ti) {
            Some(SimpleType::NullPtr) => {
                let ct = self.ts.basic_type(BasicType::NullPtr)?;
                Some(Type::new(uid, "std::nullptr_t".to_string(), 0, ResolveState::Full, ct))
            }
            Some(SimpleType::Pointer { pointee, size }) => {
                let direct = self.get_or_create_type(PdbTypeSymId::tpi(pointee))?;
                let ct = self
                    .ts
                    .create_pointer_type(&direct.compiler_type, PointerKind::Pointer);
                Some(Type::new(uid, String::new(), size as u64, ResolveState::Full, ct))
            }
            Some(SimpleType::Basic {
                basic_type,
                size,
                name,
            }) => {
                let Some(ct) = self.ts.basic_type(basic_type) else {
                    debug!(?basic_type, "type system has no representation for basic type");
                    return None;
                };
                Some(Type::new(uid, name.to_string(), size as u64, ResolveState::Full, ct))
            }
            None => {
                debug!(type_index = ?ti, "simple type cannot be represented");
                None
            }
        }
    }

    fn create_modifier_type(
        &mut self,
        uid: PdbSymUid,
        m: &TypeModifier,
    ) -> Created<TS::CompilerType> {
        let modified = m.underlying_type.get();
        let Some(t) = self.get_or_create_type(PdbTypeSymId::tpi(modified)) else {
            return Ok(None);
        };

        let mut q = Qualifiers::empty();
        q.set(Qualifiers::CONST, m.is_const());
        q.set(Qualifiers::VOLATILE, m.is_volatile());
        let ct = if q.is_empty() {
            t.compiler_type.clone()
        } else {
            self.ts.add_qualifiers(&t.compiler_type, q)
        };

        let name = type_name(self.index.tpi(), modified);
        Ok(Some(Type::new(uid, name, t.byte_size, ResolveState::Full, ct)))
    }

    fn create_pointer_type(
        &mut self,
        uid: PdbSymUid,
        p: &Pointer<'_>,
    ) -> Created<TS::CompilerType> {
        let Some(pointee) = self.get_or_create_type(PdbTypeSymId::tpi(p.fixed.ty.get())) else {
            return Ok(None);
        };
        let attr = p.fixed.attr();
        let size = attr.size() as u64;

        if let Some(class_ti) = p.containing_class()? {
            let Some(class) = self.get_or_create_type(PdbTypeSymId::tpi(class_ti)) else {
                return Ok(None);
            };
            // The class stays forward-declared here. Its definition may contain this very
            // member pointer, and it is completed on demand like any other tag.
            let ct = self
                .ts
                .create_member_pointer_type(&class.compiler_type, &pointee.compiler_type);
            return Ok(Some(Type::new(uid, String::new(), size, ResolveState::Full, ct)));
        }

        let kind = match p.mode() {
            Some(PointerMode::LValueReference) => PointerKind::LValueReference,
            Some(PointerMode::RValueReference) => PointerKind::RValueReference,
            _ => PointerKind::Pointer,
        };
        let mut ct = self.ts.create_pointer_type(&pointee.compiler_type, kind);

        let mut q = Qualifiers::empty();
        q.set(Qualifiers::CONST, attr.r#const());
        q.set(Qualifiers::VOLATILE, attr.volatile());
        q.set(Qualifiers::RESTRICT, attr.restrict());
        if !q.is_empty() {
            ct = self.ts.add_qualifiers(&ct, q);
        }

        Ok(Some(Type::new(uid, String::new(), size, ResolveState::Full, ct)))
    }

    fn create_procedure_type(
        &mut self,
        uid: PdbSymUid,
        return_type: TypeIndex,
        arg_list: TypeIndex,
        call: CallingConvention,
    ) -> Created<TS::CompilerType> {
        let index = self.index;
        let TypeData::ArgList(args) = index.tpi().get_type(arg_list)? else {
            bail!("Argument list {arg_list:?} is not an LF_ARGLIST record");
        };

        let mut arg_indexes: Vec<TypeIndex> = args.args.iter().map(|a| a.get()).collect();
        // A trailing T_NOTYPE marks a C-style variadic function.
        let is_variadic = arg_indexes.last() == Some(&TypeIndex::T_NOTYPE);
        if is_variadic {
            arg_indexes.pop();
        }

        let mut arg_types = Vec::with_capacity(arg_indexes.len());
        for ti in arg_indexes {
            let Some(t) = self.get_or_create_type(PdbTypeSymId::tpi(ti)) else {
                return Ok(None);
            };
            arg_types.push(t.compiler_type.clone());
        }

        let Some(ret) = self.get_or_create_type(PdbTypeSymId::tpi(return_type)) else {
            return Ok(None);
        };

        let Some(cc) = translate_calling_convention(call) else {
            debug!(call = call.0, "unsupported calling convention");
            return Ok(None);
        };

        let ct = self
            .ts
            .create_function_type(&ret.compiler_type, &arg_types, is_variadic, cc);
        Ok(Some(Type::new(uid, String::new(), 0, ResolveState::Full, ct)))
    }

    fn create_class_struct_union(
        &mut self,
        ti: TypeIndex,
        name: &BStr,
        unique_name: Option<&BStr>,
        size: u64,
        kind: TagKind,
        inheritance: MsInheritance,
    ) -> Type<TS::CompilerType> {
        let uid = PdbSymUid::from(PdbTypeSymId::tpi(ti));
        let (decl_context, uname) = self.create_decl_info_for_type(ti, name, unique_name);

        let access = if kind == TagKind::Class {
            AccessType::Private
        } else {
            AccessType::Public
        };
        let metadata = RecordMetadata { uid, inheritance };

        let ct = self
            .ts
            .create_record_type(&decl_context, access, &uname, kind, &metadata);
        self.ts.start_tag_declaration_definition(&ct);
        self.ts.set_has_external_storage(&ct, true);

        Type::new(uid, uname, size, ResolveState::Forward, ct)
    }

    /// Chooses the inheritance model from the base classes in the field list.
    fn ms_inheritance(&self, field_list: TypeIndex) -> MsInheritance {
        if field_list == TypeIndex::T_NOTYPE {
            return MsInheritance::Single;
        }

        let mut num_bases = 0;
        for field in self.index.tpi().iter_fields(field_list) {
            match field {
                Field::VirtualBaseClass(_) => return MsInheritance::Virtual,
                Field::BaseClass(_) => num_bases += 1,
                _ => {}
            }
        }

        if num_bases > 1 {
            MsInheritance::Multiple
        } else {
            MsInheritance::Single
        }
    }
}

/// Converts a non-negative numeric leaf to `u64`.
pub(crate) fn number_to_u64(n: &Number<'_>) -> Option<u64> {
    u64::try_from(n.as_i128()?).ok()
}

pub(crate) fn translate_calling_convention(call: CallingConvention) -> Option<CallingConv> {
    Some(match call {
        CallingConvention::NEAR_C | CallingConvention::FAR_C => CallingConv::C,
        CallingConvention::NEAR_PASCAL | CallingConvention::FAR_PASCAL => CallingConv::X86Pascal,
        CallingConvention::NEAR_FAST | CallingConvention::FAR_FAST => CallingConv::X86FastCall,
        CallingConvention::NEAR_STD | CallingConvention::FAR_STD => CallingConv::X86StdCall,
        CallingConvention::THISCALL => CallingConv::X86ThisCall,
        CallingConvention::NEAR_VECTOR => CallingConv::X86VectorCall,
        _ => return None,
    })
}

const MAX_TYPE_NAME_DEPTH: u32 = 32;

/// Renders a C++ spelling of a type, for the names of modified types.
pub(crate) fn type_name(tpi: &TypeStream<'_>, ti: TypeIndex) -> String {
    type_name_at_depth(tpi, ti, 0)
}

fn type_name_at_depth(tpi: &TypeStream<'_>, ti: TypeIndex, depth: u32) -> String {
    if depth > MAX_TYPE_NAME_DEPTH {
        return "<...>".to_string();
    }
    let recurse = |t: TypeIndex| type_name_at_depth(tpi, t, depth + 1);

    if ti.is_simple() {
        return match decode_simple_type(ti) {
            Some(SimpleType::Basic { name, .. }) => name.to_string(),
            Some(SimpleType::Pointer { pointee, .. }) => format!("{}*", recurse(pointee)),
            Some(SimpleType::NullPtr) => "std::nullptr_t".to_string(),
            None => "<unknown>".to_string(),
        };
    }

    let Ok(data) = tpi.get_type(ti) else {
        return "<unknown>".to_string();
    };

    match data {
        TypeData::Struct(_) | TypeData::Union(_) | TypeData::Enum(_) => data
            .udt_name()
            .map(|n| n.to_string())
            .unwrap_or_default(),
        TypeData::Modifier(m) => {
            let mut s = String::new();
            if m.is_const() {
                s.push_str("const ");
            }
            if m.is_volatile() {
                s.push_str("volatile ");
            }
            s.push_str(&recurse(m.underlying_type.get()));
            s
        }
        TypeData::Pointer(p) => {
            let pointee = recurse(p.fixed.ty.get());
            match p.mode() {
                Some(PointerMode::LValueReference) => format!("{pointee}&"),
                Some(PointerMode::RValueReference) => format!("{pointee}&&"),
                Some(PointerMode::PointerToDataMember | PointerMode::PointerToMemberFunction) => {
                    match p.containing_class() {
                        Ok(Some(class)) => format!("{pointee} {}::*", recurse(class)),
                        _ => format!("{pointee}::*"),
                    }
                }
                _ => format!("{pointee}*"),
            }
        }
        TypeData::Array(a) => format!("{}[]", recurse(a.fixed.element_type.get())),
        TypeData::Proc(p) => {
            let args = match tpi.get_type(p.arg_list.get()) {
                Ok(TypeData::ArgList(args)) => args
                    .args
                    .iter()
                    .map(|a| match a.get() {
                        TypeIndex::T_NOTYPE => "...".to_string(),
                        t => recurse(t),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => String::new(),
            };
            format!("{} ({args})", recurse(p.return_value.get()))
        }
        _ => "<unknown>".to_string(),
    }
}
