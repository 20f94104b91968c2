//! Parsing of the unique (decorated) names of UDT records.
//!
//! MSVC gives each class, struct, union, and enum a decorated name such as
//! `.?AUInner@Outer@@`. This is the same encoding the compiler uses for the type in an RTTI
//! type descriptor (`??_R0?AUInner@Outer@@@8`), so the name is handed to `msvc_demangler` in
//! that form and the resulting symbol is flattened into its name components.
//!
//! Names whose scopes are not plain identifiers, template instantiations, or anonymous
//! namespaces (function-local types, for example) are rejected. Callers fall back to the
//! display name in that case.

use msvc_demangler::{DemangleFlags, Name, NameSequence, Operator, ParseResult, Symbol, Type};
use tracing::trace;

/// MSVC replaces decorated names longer than this with an MD5 hash, so longer unique names
/// are not produced by the compiler.
const MAX_UNIQUE_NAME_LEN: usize = 4096;

/// Limit on the number of nesting constructs (template argument lists and pointer or
/// reference codes) in a unique name. The demangler recurses once per construct.
const MAX_NESTING: usize = 128;

/// The kind of tag encoded in a unique name.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum TagSpelling {
    Class,
    Struct,
    Union,
    Interface,
    Enum,
}

/// One component of a qualified name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NameComponent {
    /// The rendered component, including any template arguments.
    pub name: String,
    /// The component is a template instantiation.
    pub has_template_args: bool,
}

/// A parsed unique name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UniqueName {
    /// The kind of tag.
    pub tag: TagSpelling,
    /// The components of the qualified name, outermost first. Never empty.
    pub components: Vec<NameComponent>,
}

impl UniqueName {
    /// Parses a unique name, e.g. `.?AUInner@Outer@@`.
    pub fn parse(unique_name: &[u8]) -> Option<Self> {
        let result = parse_unique_name(unique_name);
        if result.is_none() {
            trace!(
                unique_name = %bstr::BStr::new(unique_name),
                "failed to parse unique name"
            );
        }
        result
    }

    /// The innermost component, which names the type itself.
    pub fn identifier(&self) -> &NameComponent {
        // `components` is never empty.
        &self.components[self.components.len() - 1]
    }

    /// The enclosing scopes, outermost first.
    pub fn scopes(&self) -> &[NameComponent] {
        &self.components[..self.components.len() - 1]
    }

    /// Returns `true` if any enclosing scope is a template instantiation.
    pub fn any_scope_has_template_args(&self) -> bool {
        self.scopes().iter().any(|c| c.has_template_args)
    }

    /// The fully qualified name, with components joined by `::`.
    pub fn qualified_name(&self) -> String {
        let mut s = String::new();
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                s.push_str("::");
            }
            s.push_str(&c.name);
        }
        s
    }
}

fn parse_unique_name(unique_name: &[u8]) -> Option<UniqueName> {
    if unique_name.len() > MAX_UNIQUE_NAME_LEN || nesting_estimate(unique_name) > MAX_NESTING {
        return None;
    }
    let rest = unique_name.strip_prefix(b".?A")?;
    let (&code, _) = rest.split_first()?;
    let tag = match code {
        b'T' => TagSpelling::Union,
        b'U' => TagSpelling::Struct,
        b'V' => TagSpelling::Class,
        b'Y' => TagSpelling::Interface,
        b'W' => TagSpelling::Enum,
        _ => return None,
    };
    let rest = std::str::from_utf8(&rest[1..]).ok()?;

    // The demangler has no interface type code; interfaces are structs for this purpose.
    let code = if code == b'Y' { 'U' } else { code as char };
    let mangled = format!("??_R0?A{code}{rest}@8");
    let parsed = msvc_demangler::parse(&mangled).ok()?;

    let symbol = rtti_type_symbol(&parsed, tag)?;
    let mut components = Vec::with_capacity(symbol.scope.names.len() + 1);
    for scope in symbol.scope.names.iter().rev() {
        components.push(name_component(scope)?);
    }
    components.push(name_component(&symbol.name)?);
    Some(UniqueName { tag, components })
}

/// Extracts the described type from an RTTI type descriptor symbol, checking that its kind
/// agrees with the tag code and that nothing follows the name.
fn rtti_type_symbol<'p, 'a>(
    parsed: &'p ParseResult<'a>,
    tag: TagSpelling,
) -> Option<&'p Symbol<'a>> {
    if !matches!(parsed.symbol_type, Type::RTTIType) || !parsed.symbol.scope.names.is_empty() {
        return None;
    }
    let Name::Operator(Operator::RTTITypeDescriptor(_, ty)) = &parsed.symbol.name else {
        return None;
    };
    match (ty.as_ref(), tag) {
        (Type::Union(s, _), TagSpelling::Union)
        | (Type::Struct(s, _), TagSpelling::Struct | TagSpelling::Interface)
        | (Type::Class(s, _), TagSpelling::Class)
        | (Type::Enum(s, _), TagSpelling::Enum) => Some(s),
        _ => None,
    }
}

fn name_component(name: &Name<'_>) -> Option<NameComponent> {
    match name {
        Name::NonTemplate(s) => Some(NameComponent {
            name: String::from_utf8_lossy(s).into_owned(),
            has_template_args: false,
        }),
        Name::AnonymousNamespace(_) => Some(NameComponent {
            name: "`anonymous namespace'".to_string(),
            has_template_args: false,
        }),
        Name::Template(..) => {
            let single = ParseResult {
                symbol: Symbol {
                    name: name.clone(),
                    scope: NameSequence { names: Vec::new() },
                },
                symbol_type: Type::None,
            };
            Some(NameComponent {
                name: msvc_demangler::serialize(
                    &single,
                    DemangleFlags::NAME_ONLY | DemangleFlags::NO_CLASS_TYPE,
                ),
                has_template_args: true,
            })
        }
        _ => None,
    }
}

/// Counts the constructs that make the demangler recurse: template argument lists (`?$`) and
/// pointer or reference codes followed by their qualifiers. Identifiers that happen to contain
/// the same letters are counted too, so this is an upper bound.
fn nesting_estimate(s: &[u8]) -> usize {
    let mut count = 0;
    for (i, &b) in s.iter().enumerate() {
        match b {
            b'?' if s.get(i + 1) == Some(&b'$') => count += 1,
            b'P' | b'Q' | b'R' | b'S' | b'A' | b'B' => {
                let mut j = i + 1;
                while matches!(s.get(j), Some(b'E' | b'I' | b'F')) {
                    j += 1;
                }
                if matches!(s.get(j), Some(b'A'..=b'D')) {
                    count += 1;
                }
            }
            _ => {}
        }
    }
    count
}

/// Decides whether an `LF_NESTTYPE` member named `nested_name`, found in the field list of a
/// record whose unique name is `parent_unique_name`, is the definition of the nested record
/// whose unique name is `child_unique_name`. If it is not, the member is only an alias (for
/// example `using C = B;` inside the parent).
///
/// The check splices `nested_name` into the parent's unique name, replacing the tag code with
/// the child's, and compares the result with the child's unique name.
pub fn nested_tag_matches(
    parent_unique_name: &[u8],
    child_unique_name: &[u8],
    nested_name: &[u8],
) -> bool {
    if parent_unique_name.len() < 4 || child_unique_name.len() < 4 {
        return false;
    }

    let mut qname: Vec<u8> = Vec::with_capacity(parent_unique_name.len() + nested_name.len() + 1);
    qname.extend_from_slice(&parent_unique_name[..3]);
    qname.push(child_unique_name[3]);
    qname.extend_from_slice(nested_name);
    qname.push(b'@');
    qname.extend_from_slice(&parent_unique_name[4..]);

    qname == child_unique_name
}
