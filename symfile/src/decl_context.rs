//! Reconstruction of the declaration context of tag types.
//!
//! The type stream does not say where a type was declared. The context is recovered from two
//! sources: the parent index (for types nested in other tag types) and the scopes in the type's
//! unique name (for everything else, which is assumed to be namespaces).

use crate::materialize::Materializer;
use crate::type_system::TypeSystem;
use crate::uid::PdbTypeSymId;
use crate::unique_name::UniqueName;
use bstr::BStr;
use ms_codeview::types::TypeIndex;
use tracing::trace;

impl<'s, 'a, TS: TypeSystem> Materializer<'s, 'a, TS> {
    /// Finds the declaration context for the tag record `ti` and the name to declare it with.
    pub(crate) fn create_decl_info_for_type(
        &mut self,
        ti: TypeIndex,
        name: &BStr,
        unique_name: Option<&BStr>,
    ) -> (TS::DeclContext, String) {
        let parent = self.parents.get(&ti).copied();

        let Some(parsed) = unique_name.and_then(|u| UniqueName::parse(u)) else {
            return self.create_decl_info_for_undecorated_name(ti, parent, &name.to_string());
        };

        let uname = parsed.identifier().name.clone();

        if let Some(parent) = parent {
            return match self.parent_decl_context(parent) {
                Some(context) => (context, uname),
                None => (self.ts.translation_unit_decl(), uname),
            };
        }

        let scopes = parsed.scopes();
        if scopes.is_empty() {
            return (self.ts.translation_unit_decl(), uname);
        }

        // A templated scope may be a class template rather than a namespace. Declaring it as a
        // namespace could conflict with the real class, so the whole name is used instead.
        if parsed.any_scope_has_template_args() {
            trace!(
                type_index = ?ti,
                %name,
                "scope has template arguments; declaring at global scope"
            );
            return (self.ts.translation_unit_decl(), name.to_string());
        }

        let mut context = self.ts.translation_unit_decl();
        for scope in scopes {
            context = self.ts.get_unique_namespace_declaration(&scope.name, &context);
        }
        (context, uname)
    }

    /// Handles records without a usable unique name, by splitting the display name.
    fn create_decl_info_for_undecorated_name(
        &mut self,
        ti: TypeIndex,
        parent: Option<TypeIndex>,
        name: &str,
    ) -> (TS::DeclContext, String) {
        let components = split_qualified_name(name);
        let (identifier, scopes) = match components.split_last() {
            Some((last, scopes)) => (last.to_string(), scopes),
            None => (name.to_string(), &[][..]),
        };

        if let Some(parent) = parent {
            if let Some(context) = self.parent_decl_context(parent) {
                return (context, identifier);
            }
        }

        if scopes.is_empty() {
            return (self.ts.translation_unit_decl(), identifier);
        }
        if scopes.iter().any(|s| s.contains('<')) {
            trace!(
                type_index = ?ti,
                name,
                "scope has template arguments; declaring at global scope"
            );
            return (self.ts.translation_unit_decl(), name.to_string());
        }

        let mut context = self.ts.translation_unit_decl();
        for scope in scopes {
            context = self.ts.get_unique_namespace_declaration(scope, &context);
        }
        (context, identifier)
    }

    /// The context that a tag type provides for the types nested inside it.
    fn parent_decl_context(&mut self, parent: TypeIndex) -> Option<TS::DeclContext> {
        let t = self.get_or_create_type(PdbTypeSymId::tpi(parent))?;
        let tag = self.ts.get_as_tag_decl(&t.compiler_type)?;
        Some(self.ts.decl_context_for_tag(&tag))
    }
}

/// Splits `a::b<c::d>::e` into `["a", "b<c::d>", "e"]`. Separators inside template argument
/// lists do not split.
pub(crate) fn split_qualified_name(name: &str) -> Vec<&str> {
    let bytes = name.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth -= 1,
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                parts.push(&name[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&name[start..]);
    parts
}
