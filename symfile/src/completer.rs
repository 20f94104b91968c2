//! Adds the members of tag types.
//!
//! The materializer creates tag types as forward declarations. When the debugger needs the layout
//! of one, it asks for the type to be completed. Completion walks the field list of the full
//! record and registers each member with the type system.

use crate::materialize::{Materializer, number_to_u64};
use crate::type_system::{AccessType, MethodAttributes, RecordLayout, TypeSystem};
use crate::types::ResolveState;
use crate::uid::{PdbSymUid, PdbTypeSymId};
use crate::unique_name::nested_tag_matches;
use anyhow::bail;
use ms_codeview::types::fields::{Field, MemberAccess, MemberAttributes, MethodKind};
use ms_codeview::types::{Leaf, TypeData, TypeIndex};
use tracing::{debug, trace, warn};

/// The part of a tag record that the completer needs.
struct TagInfo<'t> {
    field_list: TypeIndex,
    byte_size: u64,
    default_access: AccessType,
    unique_name: Option<&'t bstr::BStr>,
    /// For enums, the size and signedness of the underlying type.
    enum_repr: Option<(u32, bool)>,
}

impl<'s, 'a, TS: TypeSystem> Materializer<'s, 'a, TS> {
    /// Completes the tag type `ct`. Returns `true` if the type is complete afterward.
    ///
    /// # Panics
    ///
    /// Panics if `ct` is a tag type that was not created by this materializer.
    pub(crate) fn complete_type(&mut self, ct: &TS::CompilerType) -> bool {
        let Some(tag) = self.ts.get_as_tag_decl(ct) else {
            debug!(?ct, "cannot complete a type that is not a tag type");
            return false;
        };

        let Some(status) = self.cache.decl_status.get(&tag).copied() else {
            panic!(
                "completion requested for a tag declaration that this symbol file did not create: {tag:?}"
            );
        };

        if status.state == ResolveState::Full {
            return true;
        }

        if !self.cache.completing.insert(status.uid) {
            trace!(uid = ?status.uid, "type is already being completed");
            return false;
        }

        self.ts.set_has_external_storage(ct, false);
        let result = self.complete_tag(status.uid, ct);
        self.cache.completing.remove(&status.uid);

        match result {
            Ok(true) => {
                if let Some(s) = self.cache.decl_status.get_mut(&tag) {
                    s.state = ResolveState::Full;
                }
                if let Some(t) = self.cache.types.get(&status.uid) {
                    t.set_resolved();
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(uid = ?status.uid, "failed to complete type: {e:#}");
                false
            }
        }
    }

    fn complete_tag(&mut self, uid: PdbSymUid, ct: &TS::CompilerType) -> anyhow::Result<bool> {
        let index = self.index;
        let tpi = index.tpi();

        let ti = uid.as_type().index;
        let data = tpi.get_type(ti)?;
        if data.is_forward_ref() {
            debug!(type_index = ?ti, "no full declaration for forward reference; cannot complete");
            return Ok(false);
        }

        let info = match &data {
            TypeData::Struct(s) => TagInfo {
                field_list: s.fixed.field_list.get(),
                byte_size: number_to_u64(&s.length).unwrap_or(0),
                default_access: if tpi.record_kind(ti) == Some(Leaf::LF_CLASS) {
                    AccessType::Private
                } else {
                    AccessType::Public
                },
                unique_name: s.unique_name,
                enum_repr: None,
            },
            TypeData::Union(u) => TagInfo {
                field_list: u.fixed.fields.get(),
                byte_size: number_to_u64(&u.length).unwrap_or(0),
                default_access: AccessType::Public,
                unique_name: u.unique_name,
                enum_repr: None,
            },
            TypeData::Enum(e) => TagInfo {
                field_list: e.fixed.fields.get(),
                byte_size: 0,
                default_access: AccessType::Public,
                unique_name: e.unique_name,
                enum_repr: Some(
                    tpi.integral_type_info(e.fixed.underlying_type.get())
                        .unwrap_or((4, true)),
                ),
            },
            _ => bail!("Type {ti:?} is not a tag type"),
        };

        if info.field_list != TypeIndex::T_NOTYPE
            && tpi.record_kind(info.field_list) != Some(Leaf::LF_FIELDLIST)
        {
            warn!(
                type_index = ?ti,
                field_list = ?info.field_list,
                "field list is not an LF_FIELDLIST record"
            );
            return Ok(false);
        }

        let mut layout = RecordLayout {
            byte_size: info.byte_size,
            ..RecordLayout::default()
        };

        let fields: Vec<Field<'_>> = if info.field_list == TypeIndex::T_NOTYPE {
            Vec::new()
        } else {
            tpi.iter_fields(info.field_list).collect()
        };
        trace!(type_index = ?ti, num_fields = fields.len(), "completing type");

        for field in &fields {
            self.add_member(ct, ti, &info, field, &mut layout);
        }

        self.ts.complete_tag_declaration_definition(ct, &layout);
        Ok(true)
    }

    fn add_member(
        &mut self,
        ct: &TS::CompilerType,
        record_ti: TypeIndex,
        info: &TagInfo<'_>,
        field: &Field<'_>,
        layout: &mut RecordLayout,
    ) {
        let index = self.index;
        let tpi = index.tpi();
        let access =
            |attr: u16| translate_access(MemberAttributes(attr).access(), info.default_access);

        match field {
            Field::Member(m) => {
                let name = m.name.to_string();
                let Some(byte_offset) = number_to_u64(&m.offset) else {
                    warn!(type_index = ?record_ti, %name, "member has an invalid offset");
                    return;
                };

                let (member_ti, bit_field) = match tpi.get_type(m.ty) {
                    Ok(TypeData::BitField(bf)) if !m.ty.is_simple() => {
                        (bf.underlying_type.get(), Some((bf.length, bf.position)))
                    }
                    _ => (m.ty, None),
                };

                let Some(member_type) = self.get_or_create_type(PdbTypeSymId::tpi(member_ti)) else {
                    warn!(type_index = ?record_ti, %name, "skipping member with unresolvable type");
                    return;
                };

                let bit_width = bit_field.map(|(length, _)| length as u32);
                let bit_offset =
                    byte_offset * 8 + bit_field.map_or(0, |(_, position)| position as u64);

                self.ts.add_field_to_record(
                    ct,
                    &name,
                    &member_type.compiler_type,
                    access(m.attr),
                    bit_width,
                );
                layout.field_offsets.push((name, bit_offset));
            }

            Field::BaseClass(b) => {
                let Some(base) = self.get_or_create_type(PdbTypeSymId::tpi(b.ty)) else {
                    warn!(
                        type_index = ?record_ti,
                        base = ?b.ty,
                        "skipping unresolvable base class"
                    );
                    return;
                };
                self.ts
                    .add_base_class(ct, &base.compiler_type, access(b.attr), false);
                layout
                    .base_offsets
                    .push((base.uid, number_to_u64(&b.offset).unwrap_or(0)));
            }

            Field::VirtualBaseClass(vb) => {
                let base_ti = vb.fixed.btype.get();
                let Some(base) = self.get_or_create_type(PdbTypeSymId::tpi(base_ti)) else {
                    warn!(
                        type_index = ?record_ti,
                        base = ?base_ti,
                        "skipping unresolvable virtual base class"
                    );
                    return;
                };
                self.ts.add_base_class(
                    ct,
                    &base.compiler_type,
                    access(vb.fixed.attr.get()),
                    true,
                );
            }

            Field::NestedType(n) | Field::NestedTypeEx(n) => {
                if self.is_nested_definition(record_ti, info, n.nested_ty, n.name) {
                    // The nested record is declared in this record's context already.
                    trace!(
                        type_index = ?record_ti,
                        nested = ?n.nested_ty,
                        "nested type is a definition"
                    );
                    return;
                }
                let Some(nested) = self.get_or_create_type(PdbTypeSymId::tpi(n.nested_ty)) else {
                    return;
                };
                self.ts
                    .add_nested_type(ct, &n.name.to_string(), &nested.compiler_type);
            }

            Field::StaticMember(sm) => {
                let Some(ty) = self.get_or_create_type(PdbTypeSymId::tpi(sm.ty)) else {
                    warn!(
                        type_index = ?record_ti,
                        name = %sm.name,
                        "skipping static member with unresolvable type"
                    );
                    return;
                };
                self.ts.add_static_member(
                    ct,
                    &sm.name.to_string(),
                    &ty.compiler_type,
                    access(sm.attr),
                );
            }

            Field::OneMethod(m) => {
                self.add_one_method(ct, &m.name.to_string(), m.attr, m.ty, info.default_access);
            }

            Field::Method(m) => {
                let name = m.name.to_string();
                let Ok(TypeData::MethodList(mut list)) = tpi.get_type(m.methods) else {
                    warn!(type_index = ?record_ti, %name, "method list is missing");
                    return;
                };
                loop {
                    match list.next() {
                        Ok(Some(item)) => {
                            self.add_one_method(ct, &name, item.attr, item.ty, info.default_access)
                        }
                        Ok(None) => break,
                        Err(_) => {
                            warn!(type_index = ?record_ti, %name, "malformed method list");
                            break;
                        }
                    }
                }
            }

            Field::Enumerate(e) => {
                let Some((size, signed)) = info.enum_repr else {
                    debug!(type_index = ?record_ti, "enumerator outside of an enum");
                    return;
                };
                let Some(bits) = e.value.bits() else {
                    warn!(
                        type_index = ?record_ti,
                        name = %e.name,
                        "enumerator value is not an integer"
                    );
                    return;
                };
                let value = truncate_to_size(bits.extended(bits.signed), size, signed);
                self.ts.add_enumerator(ct, &e.name.to_string(), value);
            }

            Field::VFuncTable(_)
            | Field::VFuncOffset(_)
            | Field::FriendFn(_)
            | Field::FriendClass(_)
            | Field::Index(_) => {}
        }
    }

    fn add_one_method(
        &mut self,
        ct: &TS::CompilerType,
        name: &str,
        attr: u16,
        method_ty: TypeIndex,
        default_access: AccessType,
    ) {
        let Some(fn_type) = self.get_or_create_type(PdbTypeSymId::tpi(method_ty)) else {
            debug!(name, ?method_ty, "skipping method with unresolvable type");
            return;
        };

        let attrs = MemberAttributes(attr);
        let kind = attrs.method_kind();
        let attributes = MethodAttributes {
            is_virtual: matches!(
                kind,
                MethodKind::Virtual
                    | MethodKind::IntroducingVirtual
                    | MethodKind::PureVirtual
                    | MethodKind::PureIntroducingVirtual
            ),
            is_static: kind == MethodKind::Static,
            is_pure: matches!(kind, MethodKind::PureVirtual | MethodKind::PureIntroducingVirtual),
            is_artificial: attrs.is_artificial(),
        };

        self.ts.add_method(
            ct,
            name,
            &fn_type.compiler_type,
            translate_access(attrs.access(), default_access),
            attributes,
        );
    }

    /// Decides whether an `LF_NESTTYPE` member declares the nested record itself (whose context
    /// is this record, via the parent index) rather than an alias of some other type.
    fn is_nested_definition(
        &self,
        record_ti: TypeIndex,
        info: &TagInfo<'_>,
        nested_ti: TypeIndex,
        nested_name: &[u8],
    ) -> bool {
        if nested_ti.is_simple() {
            return false;
        }
        let tpi = self.index.tpi();
        let full_ti = tpi.find_full_decl_for_forward_ref(nested_ti);
        let is_child = [nested_ti, full_ti]
            .iter()
            .any(|t| self.parents.get(t).is_some_and(|p| *p == record_ti));
        if !is_child {
            return false;
        }

        let (Some(parent_unique), Ok(child)) = (info.unique_name, tpi.get_type(nested_ti)) else {
            return true;
        };
        match child.udt_unique_name() {
            Some(child_unique) => nested_tag_matches(parent_unique, child_unique, nested_name),
            None => true,
        }
    }
}

fn translate_access(access: MemberAccess, default_access: AccessType) -> AccessType {
    match access {
        MemberAccess::Private => AccessType::Private,
        MemberAccess::Protected => AccessType::Protected,
        MemberAccess::Public => AccessType::Public,
        MemberAccess::None => default_access,
    }
}

/// Reinterprets the low `size` bytes of `value` as an integer of that size.
pub(crate) fn truncate_to_size(value: u128, size: u32, signed: bool) -> i128 {
    if size == 0 || size >= 16 {
        return value as i128;
    }
    let bits = size * 8;
    let low = value & ((1u128 << bits) - 1);
    if signed && (low >> (bits - 1)) & 1 != 0 {
        (low | (!0u128 << bits)) as i128
    } else {
        low as i128
    }
}
