//! Members of an `LF_FIELDLIST` record.
//!
//! Field-list members have no length prefix; the only way to find the next member is to decode
//! the current one. Members are padded to 4-byte alignment with `LF_PAD*` bytes (`0xf0..=0xff`).

use super::*;
use tracing::error;

/// The payload of an `LF_FIELDLIST` record.
#[derive(Clone)]
pub struct FieldList<'a> {
    #[allow(missing_docs)]
    pub bytes: &'a [u8],
}

impl<'a> FieldList<'a> {
    /// Iterates the members of the list.
    pub fn iter(&self) -> IterFields<'a> {
        IterFields { bytes: self.bytes }
    }
}

impl<'a> Debug for FieldList<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if f.alternate() {
            f.debug_list().entries(self.iter()).finish()
        } else {
            f.write_str("FieldList")
        }
    }
}

/// Iterator over the members of a field list. Stops at the first member it cannot decode.
pub struct IterFields<'a> {
    #[allow(missing_docs)]
    pub bytes: &'a [u8],
}

/// Member access (`CV_access_e`), bits 0-1 of the member attributes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MemberAccess {
    /// No access specified; the tag kind decides.
    None,
    #[allow(missing_docs)]
    Private,
    #[allow(missing_docs)]
    Protected,
    #[allow(missing_docs)]
    Public,
}

/// Method property (`CV_methodprop_e`), bits 2-4 of the member attributes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[allow(missing_docs)]
pub enum MethodKind {
    Vanilla,
    Virtual,
    Static,
    Friend,
    IntroducingVirtual,
    PureVirtual,
    PureIntroducingVirtual,
    Reserved,
}

/// The `attr` field common to most field-list members (`CV_fldattr_t`).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MemberAttributes(pub u16);

impl MemberAttributes {
    #[allow(missing_docs)]
    pub fn access(self) -> MemberAccess {
        match self.0 & 3 {
            0 => MemberAccess::None,
            1 => MemberAccess::Private,
            2 => MemberAccess::Protected,
            _ => MemberAccess::Public,
        }
    }

    #[allow(missing_docs)]
    pub fn method_kind(self) -> MethodKind {
        match (self.0 >> 2) & 7 {
            0 => MethodKind::Vanilla,
            1 => MethodKind::Virtual,
            2 => MethodKind::Static,
            3 => MethodKind::Friend,
            4 => MethodKind::IntroducingVirtual,
            5 => MethodKind::PureVirtual,
            6 => MethodKind::PureIntroducingVirtual,
            _ => MethodKind::Reserved,
        }
    }

    /// Compiler-generated member.
    pub fn is_artificial(self) -> bool {
        self.0 & (1 << 5) != 0
    }
}

/// One member of a field list.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Field<'a> {
    BaseClass(BaseClass<'a>),
    VirtualBaseClass(VirtualBaseClass<'a>),
    Enumerate(Enumerate<'a>),
    FriendFn(FriendFn<'a>),
    /// Continuation: the list goes on in another `LF_FIELDLIST` record.
    Index(TypeIndex),
    Member(Member<'a>),
    StaticMember(StaticMember<'a>),
    Method(Method<'a>),
    NestedType(NestedType<'a>),
    VFuncTable(TypeIndex),
    FriendClass(TypeIndex),
    OneMethod(OneMethod<'a>),
    VFuncOffset(VFuncOffset),
    NestedTypeEx(NestedType<'a>),
}

/// `LF_NESTEDTYPE` and `LF_NESTEDTYPEEX`
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct NestedType<'a> {
    pub attr: u16,
    pub nested_ty: TypeIndex,
    pub name: &'a BStr,
}

/// `LF_BCLASS`
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct BaseClass<'a> {
    pub attr: u16,
    pub ty: TypeIndex,
    pub offset: Number<'a>,
}

impl<'a> Parse<'a> for BaseClass<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(BaseClass {
            attr: p.u16()?,
            ty: p.type_index()?,
            offset: p.number()?,
        })
    }
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct VirtualBaseClassFixed {
    pub attr: U16<LE>,
    pub btype: TypeIndexLe,
    pub vbtype: TypeIndexLe,
}

/// `LF_VBCLASS` (direct) and `LF_IVBCLASS` (indirect)
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct VirtualBaseClass<'a> {
    pub indirect: bool,
    pub fixed: &'a VirtualBaseClassFixed,
    pub vbpoff: Number<'a>,
    pub vboff: Number<'a>,
}

impl<'a> VirtualBaseClass<'a> {
    fn parse(p: &mut Parser<'a>, indirect: bool) -> Result<Self, ParserError> {
        Ok(Self {
            indirect,
            fixed: p.get()?,
            vbpoff: p.number()?,
            vboff: p.number()?,
        })
    }
}

/// `LF_ENUMERATE`
#[allow(missing_docs)]
#[derive(Clone)]
pub struct Enumerate<'a> {
    pub attr: u16,
    pub value: Number<'a>,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Enumerate<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            attr: p.u16()?,
            value: p.number()?,
            name: p.strz()?,
        })
    }
}

impl<'a> Debug for Enumerate<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// `LF_FRIENDFCN`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct FriendFn<'a> {
    pub ty: TypeIndex,
    pub name: &'a BStr,
}

/// `LF_ONEMETHOD`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct OneMethod<'a> {
    pub attr: u16,
    pub ty: TypeIndex,
    pub vbaseoff: Option<u32>,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for OneMethod<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let attr = p.u16()?;
        let ty = p.type_index()?;
        let vbaseoff = if introduces_virtual(attr) {
            Some(p.u32()?)
        } else {
            None
        };
        let name = p.strz()?;
        Ok(OneMethod {
            attr,
            ty,
            vbaseoff,
            name,
        })
    }
}

/// `LF_VFUNCOFF`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct VFuncOffset {
    pub vtable_ty: TypeIndex,
    pub offset: u32,
}

/// `LF_MEMBER`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Member<'a> {
    pub attr: u16,
    pub ty: TypeIndex,
    pub offset: Number<'a>,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Member<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            attr: p.u16()?,
            ty: p.type_index()?,
            offset: p.number()?,
            name: p.strz()?,
        })
    }
}

/// `LF_STMEMBER`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct StaticMember<'a> {
    pub attr: u16,
    pub ty: TypeIndex,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for StaticMember<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            attr: p.u16()?,
            ty: p.type_index()?,
            name: p.strz()?,
        })
    }
}

/// `LF_METHOD`: an overload set, whose entries are in an `LF_METHODLIST`.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Method<'a> {
    pub count: u16,
    pub methods: TypeIndex,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Method<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            count: p.u16()?,
            methods: p.type_index()?,
            name: p.strz()?,
        })
    }
}

impl<'a> Iterator for IterFields<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let padding_len = self.bytes.iter().take_while(|&&b| b >= 0xf0).count();
        let mut p = Parser::new(&self.bytes[padding_len..]);
        if p.is_empty() {
            self.bytes = &[];
            return None;
        }

        match Field::parse(&mut p) {
            Ok(f) => {
                self.bytes = p.take_rest();
                Some(f)
            }
            Err(_) => None,
        }
    }
}

impl<'a> Field<'a> {
    /// Decodes one member, leaving `p` positioned at the next one (or at its padding).
    pub fn parse(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let item_kind = Leaf(p.u16()?);

        Ok(match item_kind {
            Leaf::LF_BCLASS => Self::BaseClass(p.parse()?),
            Leaf::LF_VBCLASS => Self::VirtualBaseClass(VirtualBaseClass::parse(p, false)?),
            Leaf::LF_IVBCLASS => Self::VirtualBaseClass(VirtualBaseClass::parse(p, true)?),
            Leaf::LF_ENUMERATE => Self::Enumerate(p.parse()?),

            Leaf::LF_FRIENDFCN => {
                p.skip(2)?;
                Self::FriendFn(FriendFn {
                    ty: p.type_index()?,
                    name: p.strz()?,
                })
            }

            Leaf::LF_INDEX => {
                p.skip(2)?;
                Self::Index(p.type_index()?)
            }

            Leaf::LF_MEMBER => Self::Member(p.parse()?),
            Leaf::LF_STMEMBER => Self::StaticMember(p.parse()?),
            Leaf::LF_METHOD => Self::Method(p.parse()?),

            Leaf::LF_NESTEDTYPE => {
                p.skip(2)?;
                Self::NestedType(NestedType {
                    attr: 0,
                    nested_ty: p.type_index()?,
                    name: p.strz()?,
                })
            }

            Leaf::LF_NESTEDTYPEEX => Self::NestedTypeEx(NestedType {
                attr: p.u16()?,
                nested_ty: p.type_index()?,
                name: p.strz()?,
            }),

            Leaf::LF_VFUNCTAB => {
                p.skip(2)?;
                Self::VFuncTable(p.type_index()?)
            }

            Leaf::LF_FRIENDCLS => {
                p.skip(2)?;
                Self::FriendClass(p.type_index()?)
            }

            Leaf::LF_ONEMETHOD => Self::OneMethod(p.parse()?),

            Leaf::LF_VFUNCOFF => {
                p.skip(2)?;
                Self::VFuncOffset(VFuncOffset {
                    vtable_ty: p.type_index()?,
                    offset: p.u32()?,
                })
            }

            unknown_item_kind => {
                error!(?unknown_item_kind, "unrecognized item within LF_FIELDLIST");
                return Err(ParserError::new());
            }
        })
    }
}
