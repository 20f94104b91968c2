//! Discovers which tag records are nested inside other tag records.
//!
//! The type stream has no parent links. A nested class shows up as an `LF_NESTEDTYPE` member of
//! its parent's field list, but so does a member type alias (`using C = B;`). The two are told
//! apart by comparing unique names, see [`nested_tag_matches`].

use crate::tpi::TypeStream;
use crate::unique_name::nested_tag_matches;
use ms_codeview::types::fields::Field;
use ms_codeview::types::{TypeData, TypeIndex};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Maps the index of a nested tag record to the index of the record that contains it.
pub type ParentIndex = HashMap<TypeIndex, TypeIndex>;

/// Scans every tag record in `tpi` and builds the nested-to-parent map.
///
/// When the nested record is a forward reference, its full declaration is mapped to the same
/// parent, so that lookups by either index succeed.
pub fn build_parent_index(tpi: &TypeStream<'_>) -> ParentIndex {
    let mut parents = ParentIndex::new();

    let mut next = tpi.first();
    while let Some(ti) = next {
        next = tpi.next(ti);

        let Ok(parent) = tpi.get_type(ti) else {
            continue;
        };
        let Some(props) = parent.udt_properties() else {
            continue;
        };

        // Forward references have no field list, and records without `cnested` have no
        // LF_NESTEDTYPE members.
        if props.fwdref() || !props.cnested() {
            continue;
        }
        let Some(field_list) = parent.udt_field_list() else {
            continue;
        };
        let Some(parent_unique_name) = parent.udt_unique_name() else {
            continue;
        };

        for field in tpi.iter_fields(field_list) {
            let nested = match &field {
                Field::NestedType(n) | Field::NestedTypeEx(n) => n,
                _ => continue,
            };

            if nested.nested_ty.is_simple() {
                continue;
            }

            let Ok(child) = tpi.get_type(nested.nested_ty) else {
                continue;
            };
            if !matches!(
                child,
                TypeData::Struct(_) | TypeData::Union(_) | TypeData::Enum(_)
            ) {
                continue;
            }
            let Some(child_unique_name) = child.udt_unique_name() else {
                continue;
            };

            if !nested_tag_matches(parent_unique_name, child_unique_name, nested.name) {
                trace!(
                    parent = ?ti,
                    nested = ?nested.nested_ty,
                    name = %nested.name,
                    "nested type is an alias"
                );
                continue;
            }

            parents.insert(nested.nested_ty, ti);

            if child.is_forward_ref() {
                let full = tpi.find_full_decl_for_forward_ref(nested.nested_ty);
                if full != nested.nested_ty {
                    parents.insert(full, ti);
                }
            }
        }
    }

    debug!(num_nested = parents.len(), "built parent type index");
    parents
}
