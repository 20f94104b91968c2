//! Builders for the binary structures of a PDB, used to construct test inputs.
//!
//! Each builder produces the bytes of one stream (or substream). [`PdbBuilder`] assembles them
//! into a complete MSF image with the fixed stream numbers that real PDBs use.

use crate::dbi::optional_dbg::SectionHeader;
use crate::dbi::{DBI_STREAM_VERSION_V70, DbiStreamHeader, ModuleInfoFixed, SectionContribEntry};
use crate::dbi::SECTION_CONTRIBUTIONS_SUBSTREAM_VER60;
use crate::guid::GuidLe;
use crate::modi::CV_SIGNATURE_C13;
use crate::names::{NAMES_STREAM_NAME, NAMES_STREAM_SIGNATURE, NAMES_STREAM_VERSION_V1, NameIndex};
use crate::pdbi::PDBI_VERSION_VC70;
use crate::stream_index::StreamIndexU16;
use crate::tpi::{TPI_STREAM_HEADER_LEN, TYPE_STREAM_VERSION_2004, TypeStreamHeader};
use ms_codeview::syms::SymKind;
use ms_codeview::types::{Leaf, TypeIndex, introduces_virtual};
use ms_pdb_msf::test_image::MsfImageBuilder;
use ms_pdb_msf::{BlockMappedStream, MIN_PAGE_SIZE, Msf};
use std::collections::HashSet;
use uuid::Uuid;
use zerocopy::{FromZeros, I32, IntoBytes, LE, U16, U32};

/// Builds an image with the stream data in stream 1, stored in non-adjacent pages.
pub fn single_stream_image(data: Vec<u8>) -> Vec<u8> {
    let mut b = MsfImageBuilder::new(MIN_PAGE_SIZE);
    b.add_scattered_stream(&data);
    b.build()
}

/// Opens stream 1 of an image built by [`single_stream_image`].
pub fn open_test_stream(image: &[u8]) -> BlockMappedStream<'_> {
    Msf::parse(image).unwrap().open_stream(1).unwrap()
}

fn push_strz(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Appends an unsigned numeric leaf.
fn push_unsigned(buf: &mut Vec<u8>, value: u64) {
    if value < 0x8000 {
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= u32::MAX as u64 {
        buf.extend_from_slice(&Leaf::LF_ULONG.0.to_le_bytes());
        buf.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        buf.extend_from_slice(&Leaf::LF_UQUADWORD.0.to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

/// Appends a signed numeric leaf, using the narrowest encoding.
fn push_signed(buf: &mut Vec<u8>, value: i64) {
    if (0..0x8000).contains(&value) {
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if let Ok(v) = i8::try_from(value) {
        buf.extend_from_slice(&Leaf::LF_CHAR.0.to_le_bytes());
        buf.push(v as u8);
    } else if let Ok(v) = i16::try_from(value) {
        buf.extend_from_slice(&Leaf::LF_SHORT.0.to_le_bytes());
        buf.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = i32::try_from(value) {
        buf.extend_from_slice(&Leaf::LF_LONG.0.to_le_bytes());
        buf.extend_from_slice(&v.to_le_bytes());
    } else {
        buf.extend_from_slice(&Leaf::LF_QUADWORD.0.to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

/// Pads `buf` to a 4-byte boundary with `LF_PAD` bytes.
fn pad4(buf: &mut Vec<u8>) {
    match buf.len() & 3 {
        1 => buf.extend_from_slice(&[0xf3, 0xf2, 0xf1]),
        2 => buf.extend_from_slice(&[0xf2, 0xf1]),
        3 => buf.push(0xf1),
        _ => {}
    }
}

/// Builds the PDB Information Stream.
pub struct PdbiBuilder {
    guid: Uuid,
    age: u32,
    named_streams: Vec<(String, u32)>,
}

impl PdbiBuilder {
    #[allow(missing_docs)]
    pub fn new(guid: Uuid, age: u32) -> Self {
        Self {
            guid,
            age,
            named_streams: Vec::new(),
        }
    }

    /// Adds an entry to the named streams table.
    pub fn named_stream(mut self, name: &str, stream: u32) -> Self {
        self.named_streams.push((name.to_string(), stream));
        self
    }

    #[allow(missing_docs)]
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PDBI_VERSION_VC70.to_le_bytes());
        out.extend_from_slice(&0x5eed_5eedu32.to_le_bytes());
        out.extend_from_slice(&self.age.to_le_bytes());
        out.extend_from_slice(GuidLe::from(&self.guid).as_bytes());

        let mut names = Vec::new();
        let mut entries = Vec::new();
        for (name, stream) in &self.named_streams {
            entries.push((names.len() as u32, *stream));
            push_strz(&mut names, name);
        }

        let count = entries.len() as u32;
        out.extend_from_slice(&(names.len() as u32).to_le_bytes());
        out.extend_from_slice(&names);
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.max(1).to_le_bytes());

        // The present bits just need to agree with the count.
        let num_words = count.div_ceil(32);
        out.extend_from_slice(&num_words.to_le_bytes());
        for w in 0..num_words {
            let bits_in_word = (count - w * 32).min(32);
            let word = if bits_in_word == 32 {
                u32::MAX
            } else {
                (1u32 << bits_in_word) - 1
            };
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(&0u32.to_le_bytes());

        for (key, stream) in entries {
            out.extend_from_slice(&key.to_le_bytes());
            out.extend_from_slice(&stream.to_le_bytes());
        }

        // niMac
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }
}

/// Builds a `/names` stream.
pub struct NamesBuilder {
    strings: Vec<u8>,
    count: u32,
}

impl NamesBuilder {
    /// Starts with the empty string at offset 0.
    pub fn new() -> Self {
        Self {
            strings: vec![0],
            count: 0,
        }
    }

    /// Adds a string, returning its offset.
    pub fn add(&mut self, s: &str) -> NameIndex {
        let offset = self.strings.len() as u32;
        push_strz(&mut self.strings, s);
        self.count += 1;
        NameIndex(offset)
    }

    #[allow(missing_docs)]
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&NAMES_STREAM_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&NAMES_STREAM_VERSION_V1.to_le_bytes());
        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.strings);
        // One empty hash bucket. Readers here never consult the hash table.
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out
    }
}

/// Builds a TPI or IPI stream. Indexes are handed out in order, starting at `0x1000`.
pub struct TypeStreamBuilder {
    records: Vec<u8>,
    next: TypeIndex,
    /// Field lists that contain nested type members. Records that use them get `cnested`.
    nested_lists: HashSet<TypeIndex>,
}

impl TypeStreamBuilder {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next: TypeIndex::MIN_BEGIN,
            nested_lists: HashSet::new(),
        }
    }

    /// Appends a record with an arbitrary payload.
    pub fn raw(&mut self, kind: Leaf, payload: &[u8]) -> TypeIndex {
        let start = self.records.len();
        self.records.extend_from_slice(&[0, 0]);
        self.records.extend_from_slice(&kind.0.to_le_bytes());
        self.records.extend_from_slice(payload);
        pad4(&mut self.records);
        let len = (self.records.len() - start - 2) as u16;
        self.records[start..start + 2].copy_from_slice(&len.to_le_bytes());

        let ti = self.next;
        self.next = TypeIndex(ti.0 + 1);
        ti
    }

    fn udt_properties(&self, fwdref: bool, unique_name: Option<&str>, fields: TypeIndex) -> u16 {
        // cnested, fwdref, hasuniquename
        let mut p = 0;
        if self.nested_lists.contains(&fields) {
            p |= 1 << 4;
        }
        if fwdref {
            p |= 1 << 7;
        }
        if unique_name.is_some() {
            p |= 1 << 9;
        }
        p
    }

    fn push_names(payload: &mut Vec<u8>, name: &str, unique_name: Option<&str>) {
        push_strz(payload, name);
        if let Some(u) = unique_name {
            push_strz(payload, u);
        }
    }

    fn struct_record(
        &mut self,
        kind: Leaf,
        name: &str,
        unique_name: Option<&str>,
        field_list: TypeIndex,
        size: u64,
        fwdref: bool,
    ) -> TypeIndex {
        let props = self.udt_properties(fwdref, unique_name, field_list);
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&props.to_le_bytes());
        payload.extend_from_slice(&field_list.0.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        push_unsigned(&mut payload, size);
        Self::push_names(&mut payload, name, unique_name);
        self.raw(kind, &payload)
    }

    /// Adds a forward reference to a class, struct, or interface.
    pub fn struct_forward(
        &mut self,
        kind: Leaf,
        name: &str,
        unique_name: Option<&str>,
    ) -> TypeIndex {
        self.struct_record(kind, name, unique_name, TypeIndex::T_NOTYPE, 0, true)
    }

    /// Adds the full definition of a class, struct, or interface.
    pub fn struct_full(
        &mut self,
        kind: Leaf,
        name: &str,
        unique_name: Option<&str>,
        field_list: TypeIndex,
        size: u64,
    ) -> TypeIndex {
        self.struct_record(kind, name, unique_name, field_list, size, false)
    }

    fn union_record(
        &mut self,
        name: &str,
        unique_name: Option<&str>,
        field_list: TypeIndex,
        size: u64,
        fwdref: bool,
    ) -> TypeIndex {
        let props = self.udt_properties(fwdref, unique_name, field_list);
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&props.to_le_bytes());
        payload.extend_from_slice(&field_list.0.to_le_bytes());
        push_unsigned(&mut payload, size);
        Self::push_names(&mut payload, name, unique_name);
        self.raw(Leaf::LF_UNION, &payload)
    }

    #[allow(missing_docs)]
    pub fn union_forward(&mut self, name: &str, unique_name: Option<&str>) -> TypeIndex {
        self.union_record(name, unique_name, TypeIndex::T_NOTYPE, 0, true)
    }

    #[allow(missing_docs)]
    pub fn union_full(
        &mut self,
        name: &str,
        unique_name: Option<&str>,
        field_list: TypeIndex,
        size: u64,
    ) -> TypeIndex {
        self.union_record(name, unique_name, field_list, size, false)
    }

    fn enum_record(
        &mut self,
        name: &str,
        unique_name: Option<&str>,
        underlying: TypeIndex,
        field_list: TypeIndex,
        fwdref: bool,
    ) -> TypeIndex {
        let props = self.udt_properties(fwdref, unique_name, field_list);
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&props.to_le_bytes());
        payload.extend_from_slice(&underlying.0.to_le_bytes());
        payload.extend_from_slice(&field_list.0.to_le_bytes());
        Self::push_names(&mut payload, name, unique_name);
        self.raw(Leaf::LF_ENUM, &payload)
    }

    #[allow(missing_docs)]
    pub fn enum_forward(
        &mut self,
        name: &str,
        unique_name: Option<&str>,
        underlying: TypeIndex,
    ) -> TypeIndex {
        self.enum_record(name, unique_name, underlying, TypeIndex::T_NOTYPE, true)
    }

    #[allow(missing_docs)]
    pub fn enum_full(
        &mut self,
        name: &str,
        unique_name: Option<&str>,
        underlying: TypeIndex,
        field_list: TypeIndex,
    ) -> TypeIndex {
        self.enum_record(name, unique_name, underlying, field_list, false)
    }

    /// Adds an `LF_FIELDLIST`.
    pub fn field_list(&mut self, f: impl FnOnce(&mut FieldListBuilder)) -> TypeIndex {
        let mut fl = FieldListBuilder {
            bytes: Vec::new(),
            has_nested: false,
        };
        f(&mut fl);
        let ti = self.raw(Leaf::LF_FIELDLIST, &fl.bytes);
        if fl.has_nested {
            self.nested_lists.insert(ti);
        }
        ti
    }

    /// Adds an `LF_POINTER` with explicit attribute bits and mode-specific trailing data.
    pub fn pointer_with_attr(
        &mut self,
        pointee: TypeIndex,
        attr: u32,
        variant: &[u8],
    ) -> TypeIndex {
        let mut payload = Vec::new();
        payload.extend_from_slice(&pointee.0.to_le_bytes());
        payload.extend_from_slice(&attr.to_le_bytes());
        payload.extend_from_slice(variant);
        self.raw(Leaf::LF_POINTER, &payload)
    }

    /// Adds an ordinary pointer (`mode` 0), reference (1), or rvalue reference (4) of `size`
    /// bytes.
    pub fn pointer(&mut self, pointee: TypeIndex, mode: u32, size: u32) -> TypeIndex {
        // pointer kind 0x0c is a 64-bit pointer.
        let attr = 0x0c | (mode << 5) | (size << 13);
        self.pointer_with_attr(pointee, attr, &[])
    }

    /// Adds a pointer to a data member (`data` is true) or member function of `class`.
    pub fn member_pointer(
        &mut self,
        pointee: TypeIndex,
        class: TypeIndex,
        data: bool,
    ) -> TypeIndex {
        let mode: u32 = if data { 2 } else { 3 };
        let attr = 0x0c | (mode << 5) | (8 << 13);
        let mut variant = Vec::new();
        variant.extend_from_slice(&class.0.to_le_bytes());
        // pointer-to-member representation
        variant.extend_from_slice(&0u16.to_le_bytes());
        self.pointer_with_attr(pointee, attr, &variant)
    }

    #[allow(missing_docs)]
    pub fn modifier(&mut self, ty: TypeIndex, is_const: bool, is_volatile: bool) -> TypeIndex {
        let bits = (is_const as u16) | ((is_volatile as u16) << 1);
        let mut payload = Vec::new();
        payload.extend_from_slice(&ty.0.to_le_bytes());
        payload.extend_from_slice(&bits.to_le_bytes());
        self.raw(Leaf::LF_MODIFIER, &payload)
    }

    /// Adds an `LF_ARRAY`. `total_size` is in bytes.
    pub fn array(&mut self, element: TypeIndex, total_size: u64) -> TypeIndex {
        let mut payload = Vec::new();
        payload.extend_from_slice(&element.0.to_le_bytes());
        payload.extend_from_slice(&TypeIndex::T_UINT8.0.to_le_bytes());
        push_unsigned(&mut payload, total_size);
        push_strz(&mut payload, "");
        self.raw(Leaf::LF_ARRAY, &payload)
    }

    #[allow(missing_docs)]
    pub fn arg_list(&mut self, args: &[TypeIndex]) -> TypeIndex {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(args.len() as u32).to_le_bytes());
        for a in args {
            payload.extend_from_slice(&a.0.to_le_bytes());
        }
        self.raw(Leaf::LF_ARGLIST, &payload)
    }

    /// Adds an `LF_ARGLIST` and an `LF_PROCEDURE` that uses it.
    pub fn procedure(&mut self, ret: TypeIndex, call: u8, args: &[TypeIndex]) -> TypeIndex {
        let arg_list = self.arg_list(args);
        let mut payload = Vec::new();
        payload.extend_from_slice(&ret.0.to_le_bytes());
        payload.push(call);
        payload.push(0);
        payload.extend_from_slice(&(args.len() as u16).to_le_bytes());
        payload.extend_from_slice(&arg_list.0.to_le_bytes());
        self.raw(Leaf::LF_PROCEDURE, &payload)
    }

    /// Adds an `LF_ARGLIST` and an `LF_MFUNCTION` that uses it.
    pub fn member_function(
        &mut self,
        ret: TypeIndex,
        class: TypeIndex,
        this: TypeIndex,
        call: u8,
        args: &[TypeIndex],
    ) -> TypeIndex {
        let arg_list = self.arg_list(args);
        let mut payload = Vec::new();
        payload.extend_from_slice(&ret.0.to_le_bytes());
        payload.extend_from_slice(&class.0.to_le_bytes());
        payload.extend_from_slice(&this.0.to_le_bytes());
        payload.push(call);
        payload.push(0);
        payload.extend_from_slice(&(args.len() as u16).to_le_bytes());
        payload.extend_from_slice(&arg_list.0.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        self.raw(Leaf::LF_MFUNCTION, &payload)
    }

    #[allow(missing_docs)]
    pub fn bitfield(&mut self, underlying: TypeIndex, length: u8, position: u8) -> TypeIndex {
        let mut payload = Vec::new();
        payload.extend_from_slice(&underlying.0.to_le_bytes());
        payload.push(length);
        payload.push(position);
        self.raw(Leaf::LF_BITFIELD, &payload)
    }

    /// Adds an `LF_METHODLIST` from `(attr, function type)` pairs.
    pub fn method_list(&mut self, methods: &[(u16, TypeIndex)]) -> TypeIndex {
        let mut payload = Vec::new();
        for &(attr, ty) in methods {
            payload.extend_from_slice(&attr.to_le_bytes());
            payload.extend_from_slice(&0u16.to_le_bytes());
            payload.extend_from_slice(&ty.0.to_le_bytes());
            if introduces_virtual(attr) {
                payload.extend_from_slice(&0u32.to_le_bytes());
            }
        }
        self.raw(Leaf::LF_METHODLIST, &payload)
    }

    /// Adds an `LF_STRING_ID`. Belongs in the IPI.
    pub fn string_id(&mut self, s: &str) -> TypeIndex {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_le_bytes());
        push_strz(&mut payload, s);
        self.raw(Leaf::LF_STRING_ID, &payload)
    }

    /// Adds an `LF_BUILDINFO` whose arguments are `LF_STRING_ID` items. Belongs in the IPI.
    pub fn build_info(&mut self, args: &[TypeIndex]) -> TypeIndex {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(args.len() as u16).to_le_bytes());
        for a in args {
            payload.extend_from_slice(&a.0.to_le_bytes());
        }
        self.raw(Leaf::LF_BUILDINFO, &payload)
    }

    /// Produces the stream: header, then records.
    pub fn build(&self) -> Vec<u8> {
        let mut header = TypeStreamHeader::new_zeroed();
        header.version = U32::new(TYPE_STREAM_VERSION_2004);
        header.header_size = U32::new(TPI_STREAM_HEADER_LEN as u32);
        header.type_index_begin = TypeIndex::MIN_BEGIN.into();
        header.type_index_end = self.next.into();
        header.type_record_bytes = U32::new(self.records.len() as u32);
        header.hash_stream_index = StreamIndexU16::NIL;
        header.hash_aux_stream_index = StreamIndexU16::NIL;
        header.hash_key_size = U32::new(4);

        let mut out = header.as_bytes().to_vec();
        out.extend_from_slice(&self.records);
        out
    }
}

/// Builds the members of one `LF_FIELDLIST`.
pub struct FieldListBuilder {
    bytes: Vec<u8>,
    has_nested: bool,
}

/// Public access, as member attribute bits.
pub const ATTR_PUBLIC: u16 = 3;

impl FieldListBuilder {
    fn start(&mut self, kind: Leaf) {
        self.bytes.extend_from_slice(&kind.0.to_le_bytes());
    }

    fn finish(&mut self) {
        pad4(&mut self.bytes);
    }

    /// Adds a public data member.
    pub fn member(&mut self, ty: TypeIndex, offset: u64, name: &str) {
        self.member_with_attr(ATTR_PUBLIC, ty, offset, name);
    }

    #[allow(missing_docs)]
    pub fn member_with_attr(&mut self, attr: u16, ty: TypeIndex, offset: u64, name: &str) {
        self.start(Leaf::LF_MEMBER);
        self.bytes.extend_from_slice(&attr.to_le_bytes());
        self.bytes.extend_from_slice(&ty.0.to_le_bytes());
        push_unsigned(&mut self.bytes, offset);
        push_strz(&mut self.bytes, name);
        self.finish();
    }

    /// Continues the list in another `LF_FIELDLIST`.
    pub fn index(&mut self, continuation: TypeIndex) {
        self.start(Leaf::LF_INDEX);
        self.bytes.extend_from_slice(&0u16.to_le_bytes());
        self.bytes.extend_from_slice(&continuation.0.to_le_bytes());
        self.finish();
    }

    /// Adds an `LF_NESTEDTYPE`.
    pub fn nested_type(&mut self, ty: TypeIndex, name: &str) {
        self.has_nested = true;
        self.start(Leaf::LF_NESTEDTYPE);
        self.bytes.extend_from_slice(&0u16.to_le_bytes());
        self.bytes.extend_from_slice(&ty.0.to_le_bytes());
        push_strz(&mut self.bytes, name);
        self.finish();
    }

    #[allow(missing_docs)]
    pub fn enumerate(&mut self, value: i64, name: &str) {
        self.start(Leaf::LF_ENUMERATE);
        self.bytes.extend_from_slice(&ATTR_PUBLIC.to_le_bytes());
        push_signed(&mut self.bytes, value);
        push_strz(&mut self.bytes, name);
        self.finish();
    }

    /// Adds a public, non-virtual base class at `offset`.
    pub fn base_class(&mut self, ty: TypeIndex, offset: u64) {
        self.start(Leaf::LF_BCLASS);
        self.bytes.extend_from_slice(&ATTR_PUBLIC.to_le_bytes());
        self.bytes.extend_from_slice(&ty.0.to_le_bytes());
        push_unsigned(&mut self.bytes, offset);
        self.finish();
    }

    /// Adds a public, direct virtual base class.
    pub fn virtual_base_class(&mut self, ty: TypeIndex, vbptr: TypeIndex) {
        self.start(Leaf::LF_VBCLASS);
        self.bytes.extend_from_slice(&ATTR_PUBLIC.to_le_bytes());
        self.bytes.extend_from_slice(&ty.0.to_le_bytes());
        self.bytes.extend_from_slice(&vbptr.0.to_le_bytes());
        push_unsigned(&mut self.bytes, 0);
        push_unsigned(&mut self.bytes, 1);
        self.finish();
    }

    #[allow(missing_docs)]
    pub fn static_member(&mut self, ty: TypeIndex, name: &str) {
        self.start(Leaf::LF_STMEMBER);
        self.bytes.extend_from_slice(&ATTR_PUBLIC.to_le_bytes());
        self.bytes.extend_from_slice(&ty.0.to_le_bytes());
        push_strz(&mut self.bytes, name);
        self.finish();
    }

    /// Adds an `LF_ONEMETHOD`.
    pub fn one_method(&mut self, attr: u16, ty: TypeIndex, name: &str) {
        self.start(Leaf::LF_ONEMETHOD);
        self.bytes.extend_from_slice(&attr.to_le_bytes());
        self.bytes.extend_from_slice(&ty.0.to_le_bytes());
        if introduces_virtual(attr) {
            self.bytes.extend_from_slice(&0u32.to_le_bytes());
        }
        push_strz(&mut self.bytes, name);
        self.finish();
    }

    /// Adds an `LF_METHOD` that refers to an `LF_METHODLIST`.
    pub fn method(&mut self, count: u16, method_list: TypeIndex, name: &str) {
        self.start(Leaf::LF_METHOD);
        self.bytes.extend_from_slice(&count.to_le_bytes());
        self.bytes.extend_from_slice(&method_list.0.to_le_bytes());
        push_strz(&mut self.bytes, name);
        self.finish();
    }
}

/// Builds a stream of symbol records. Offsets returned by the record methods are the offsets
/// that other records use to refer to them.
pub struct SymbolsBuilder {
    buffer: Vec<u8>,
    record_start: usize,
    open_procs: Vec<usize>,
}

impl SymbolsBuilder {
    /// A global symbol stream. The first record is at offset 0.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            record_start: 0,
            open_procs: Vec::new(),
        }
    }

    /// The symbol substream of a module stream. The first record is at offset 4, after the
    /// signature.
    pub fn new_module() -> Self {
        let mut b = Self::new();
        b.buffer.extend_from_slice(&CV_SIGNATURE_C13.to_le_bytes());
        b
    }

    fn start_record(&mut self, kind: SymKind) -> u32 {
        self.record_start = self.buffer.len();
        self.buffer.extend_from_slice(&[0, 0]);
        self.buffer.extend_from_slice(&kind.0.to_le_bytes());
        self.record_start as u32
    }

    fn end_record(&mut self) {
        match self.buffer.len() & 3 {
            1 => self.buffer.extend_from_slice(&[0xf1, 0xf2, 0xf3]),
            2 => self.buffer.extend_from_slice(&[0xf1, 0xf2]),
            3 => self.buffer.push(0xf1),
            _ => {}
        }
        let record_len = (self.buffer.len() - self.record_start - 2) as u16;
        self.buffer[self.record_start..self.record_start + 2]
            .copy_from_slice(&record_len.to_le_bytes());
    }

    fn u16(&mut self, x: u16) {
        self.buffer.extend_from_slice(&x.to_le_bytes());
    }

    fn u32(&mut self, x: u32) {
        self.buffer.extend_from_slice(&x.to_le_bytes());
    }

    fn strz(&mut self, s: &str) {
        push_strz(&mut self.buffer, s);
    }

    fn data(&mut self, kind: SymKind, ty: TypeIndex, segment: u16, offset: u32, name: &str) -> u32 {
        let pos = self.start_record(kind);
        self.u32(ty.0);
        self.u32(offset);
        self.u16(segment);
        self.strz(name);
        self.end_record();
        pos
    }

    #[allow(missing_docs)]
    pub fn gdata32(&mut self, ty: TypeIndex, segment: u16, offset: u32, name: &str) -> u32 {
        self.data(SymKind::S_GDATA32, ty, segment, offset, name)
    }

    #[allow(missing_docs)]
    pub fn ldata32(&mut self, ty: TypeIndex, segment: u16, offset: u32, name: &str) -> u32 {
        self.data(SymKind::S_LDATA32, ty, segment, offset, name)
    }

    #[allow(missing_docs)]
    pub fn gthread32(&mut self, ty: TypeIndex, segment: u16, offset: u32, name: &str) -> u32 {
        self.data(SymKind::S_GTHREAD32, ty, segment, offset, name)
    }

    #[allow(missing_docs)]
    pub fn lthread32(&mut self, ty: TypeIndex, segment: u16, offset: u32, name: &str) -> u32 {
        self.data(SymKind::S_LTHREAD32, ty, segment, offset, name)
    }

    #[allow(missing_docs)]
    pub fn pub32(&mut self, segment: u16, offset: u32, name: &str) -> u32 {
        let pos = self.start_record(SymKind::S_PUB32);
        self.u32(0);
        self.u32(offset);
        self.u16(segment);
        self.strz(name);
        self.end_record();
        pos
    }

    #[allow(missing_docs)]
    pub fn constant(&mut self, ty: TypeIndex, value: i64, name: &str) -> u32 {
        let pos = self.start_record(SymKind::S_CONSTANT);
        self.u32(ty.0);
        push_signed(&mut self.buffer, value);
        self.strz(name);
        self.end_record();
        pos
    }

    /// Adds an `S_CONSTANT` whose value is an unsigned leaf.
    pub fn constant_unsigned(&mut self, ty: TypeIndex, value: u64, name: &str) -> u32 {
        let pos = self.start_record(SymKind::S_CONSTANT);
        self.u32(ty.0);
        push_unsigned(&mut self.buffer, value);
        self.strz(name);
        self.end_record();
        pos
    }

    fn refsym(&mut self, kind: SymKind, symbol_offset: u32, module_index: u16, name: &str) -> u32 {
        let pos = self.start_record(kind);
        self.u32(0);
        self.u32(symbol_offset);
        self.u16(module_index);
        self.strz(name);
        self.end_record();
        pos
    }

    /// Adds an `S_PROCREF`. `module_index` is 1-based.
    pub fn procref(&mut self, symbol_offset: u32, module_index: u16, name: &str) -> u32 {
        self.refsym(SymKind::S_PROCREF, symbol_offset, module_index, name)
    }

    /// Adds an `S_LPROCREF`. `module_index` is 1-based.
    pub fn lprocref(&mut self, symbol_offset: u32, module_index: u16, name: &str) -> u32 {
        self.refsym(SymKind::S_LPROCREF, symbol_offset, module_index, name)
    }

    #[allow(missing_docs)]
    pub fn objname(&mut self, name: &str) -> u32 {
        let pos = self.start_record(SymKind::S_OBJNAME);
        self.u32(0);
        self.strz(name);
        self.end_record();
        pos
    }

    /// Adds an `S_COMPILE3` with the given flags word (language in the low byte).
    pub fn compile3(&mut self, flags: u32, compiler: &str) -> u32 {
        let pos = self.start_record(SymKind::S_COMPILE3);
        self.u32(flags);
        // machine: x64
        self.u16(0xd0);
        for _ in 0..8 {
            self.u16(0);
        }
        self.strz(compiler);
        self.end_record();
        pos
    }

    /// Adds an `S_BUILDINFO` that refers to an `LF_BUILDINFO` in the IPI.
    pub fn buildinfo(&mut self, item: TypeIndex) -> u32 {
        let pos = self.start_record(SymKind::S_BUILDINFO);
        self.u32(item.0);
        self.end_record();
        pos
    }

    fn proc(
        &mut self,
        kind: SymKind,
        proc_type: TypeIndex,
        segment: u16,
        offset: u32,
        len: u32,
        name: &str,
    ) -> u32 {
        let pos = self.start_record(kind);
        let parent = self.open_procs.last().map(|&p| p as u32).unwrap_or(0);
        self.u32(parent);
        // p_end is patched by end().
        self.u32(0);
        self.u32(0);
        self.u32(len);
        self.u32(0);
        self.u32(len);
        self.u32(proc_type.0);
        self.u32(offset);
        self.u16(segment);
        self.buffer.push(0);
        self.strz(name);
        self.end_record();
        self.open_procs.push(pos as usize);
        pos
    }

    /// Opens an `S_GPROC32` scope. Close it with [`Self::end`].
    pub fn gproc32(
        &mut self,
        proc_type: TypeIndex,
        segment: u16,
        offset: u32,
        len: u32,
        name: &str,
    ) -> u32 {
        self.proc(SymKind::S_GPROC32, proc_type, segment, offset, len, name)
    }

    /// Opens an `S_LPROC32` scope. Close it with [`Self::end`].
    pub fn lproc32(
        &mut self,
        proc_type: TypeIndex,
        segment: u16,
        offset: u32,
        len: u32,
        name: &str,
    ) -> u32 {
        self.proc(SymKind::S_LPROC32, proc_type, segment, offset, len, name)
    }

    /// Adds an `S_END` that closes the innermost open procedure.
    pub fn end(&mut self) -> u32 {
        let pos = self.start_record(SymKind::S_END);
        self.end_record();
        if let Some(proc_start) = self.open_procs.pop() {
            let p_end = proc_start + 8;
            self.buffer[p_end..p_end + 4].copy_from_slice(&pos.to_le_bytes());
        }
        pos
    }

    #[allow(missing_docs)]
    pub fn build(&self) -> Vec<u8> {
        self.buffer.clone()
    }
}

/// Builds the C13 Line Data of a module.
pub struct LineDataBuilder {
    checksums: Vec<u8>,
    lines: Vec<Vec<u8>>,
}

/// Builds the blocks of one `LINES` subsection.
pub struct LineBlocksBuilder {
    bytes: Vec<u8>,
}

impl LineBlocksBuilder {
    /// Adds a block of `(offset, line)` rows for the file whose checksum record is at
    /// `file_index`. Every row is a statement.
    pub fn block(&mut self, file_index: u32, rows: &[(u32, u32)]) {
        let block_size = 12 + 8 * rows.len() as u32;
        self.bytes.extend_from_slice(&file_index.to_le_bytes());
        self.bytes.extend_from_slice(&(rows.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(&block_size.to_le_bytes());
        for &(offset, line) in rows {
            self.bytes.extend_from_slice(&offset.to_le_bytes());
            self.bytes.extend_from_slice(&(line | 0x8000_0000).to_le_bytes());
        }
    }
}

impl LineDataBuilder {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self {
            checksums: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Adds a file checksum record without checksum bytes. Returns the file index that blocks
    /// use to refer to it.
    pub fn file_checksum(&mut self, name: u32) -> u32 {
        let offset = self.checksums.len() as u32;
        self.checksums.extend_from_slice(&name.to_le_bytes());
        // checksum size, checksum kind, then alignment
        self.checksums.extend_from_slice(&[0, 0, 0, 0]);
        offset
    }

    /// Adds a `LINES` subsection for one contribution.
    pub fn lines(
        &mut self,
        segment: u16,
        offset: u32,
        size: u32,
        f: impl FnOnce(&mut LineBlocksBuilder),
    ) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&offset.to_le_bytes());
        bytes.extend_from_slice(&segment.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&size.to_le_bytes());
        let mut blocks = LineBlocksBuilder { bytes };
        f(&mut blocks);
        self.lines.push(blocks.bytes);
    }

    /// Produces the substream. `FILE_CHECKSUMS` comes first, if there are any files.
    pub fn build(&self) -> Vec<u8> {
        fn subsection(out: &mut Vec<u8>, kind: u32, data: &[u8]) {
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }

        let mut out = Vec::new();
        if !self.checksums.is_empty() {
            subsection(&mut out, 0xf4, &self.checksums);
        }
        for l in &self.lines {
            subsection(&mut out, 0xf2, l);
        }
        out
    }
}

/// Describes one module for [`DbiBuilder`].
pub struct ModuleDesc<'a> {
    #[allow(missing_docs)]
    pub name: &'a str,
    #[allow(missing_docs)]
    pub obj_file: &'a str,
    #[allow(missing_docs)]
    pub stream: Option<u32>,
    /// Includes the 4-byte signature.
    pub sym_byte_size: u32,
    #[allow(missing_docs)]
    pub c13_byte_size: u32,
}

/// Builds a DBI stream.
pub struct DbiBuilder {
    #[allow(missing_docs)]
    pub global_symbol_stream: Option<u32>,
    /// Stored in slot 5 of the optional debug header.
    pub section_headers_stream: Option<u32>,
    modules: Vec<u8>,
    contributions: Vec<SectionContribEntry>,
}

fn stream_index(s: Option<u32>) -> StreamIndexU16 {
    match s {
        Some(s) => StreamIndexU16(U16::new(s as u16)),
        None => StreamIndexU16::NIL,
    }
}

fn contribution_entry(
    section: u16,
    offset: i32,
    size: i32,
    module_index: u16,
) -> SectionContribEntry {
    let mut sc = SectionContribEntry::new_zeroed();
    sc.section = U16::new(section);
    sc.offset = I32::new(offset);
    sc.size = I32::new(size);
    // IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ
    sc.characteristics = U32::new(0x6000_0020);
    sc.module_index = U16::new(module_index);
    sc
}

impl DbiBuilder {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self {
            global_symbol_stream: None,
            section_headers_stream: None,
            modules: Vec::new(),
            contributions: Vec::new(),
        }
    }

    /// Appends a Module Info record.
    pub fn module(&mut self, desc: ModuleDesc<'_>) {
        let mut m = ModuleInfoFixed::new_zeroed();
        m.stream = stream_index(desc.stream);
        m.sym_byte_size = U32::new(desc.sym_byte_size);
        m.c13_byte_size = U32::new(desc.c13_byte_size);
        m.section_contrib = contribution_entry(0, 0, 0, 0);
        self.modules.extend_from_slice(m.as_bytes());
        push_strz(&mut self.modules, desc.name);
        push_strz(&mut self.modules, desc.obj_file);
        while self.modules.len() % 4 != 0 {
            self.modules.push(0);
        }
    }

    /// Appends a section contribution. `module_index` is 0-based.
    pub fn contribution(&mut self, section: u16, offset: i32, size: i32, module_index: u16) {
        self.contributions
            .push(contribution_entry(section, offset, size, module_index));
    }

    #[allow(missing_docs)]
    pub fn build(&self) -> Vec<u8> {
        let mut contribs = SECTION_CONTRIBUTIONS_SUBSTREAM_VER60.to_le_bytes().to_vec();
        for c in &self.contributions {
            contribs.extend_from_slice(c.as_bytes());
        }

        let mut optional_dbg = Vec::new();
        for i in 0..11 {
            let s = if i == 5 {
                stream_index(self.section_headers_stream)
            } else {
                StreamIndexU16::NIL
            };
            optional_dbg.extend_from_slice(s.as_bytes());
        }

        let mut header = DbiStreamHeader::new_zeroed();
        header.signature = I32::new(-1);
        header.version = U32::new(DBI_STREAM_VERSION_V70);
        header.age = U32::new(1);
        header.global_symbol_index_stream = StreamIndexU16::NIL;
        header.public_symbol_index_stream = StreamIndexU16::NIL;
        header.global_symbol_stream = stream_index(self.global_symbol_stream);
        header.mod_info_size = I32::new(self.modules.len() as i32);
        header.section_contribution_size = I32::new(contribs.len() as i32);
        header.optional_dbg_header_size = I32::new(optional_dbg.len() as i32);
        header.machine = U16::new(0x8664);

        let mut out = header.as_bytes().to_vec();
        out.extend_from_slice(&self.modules);
        out.extend_from_slice(&contribs);
        out.extend_from_slice(&optional_dbg);
        out
    }
}

/// A module added to a [`PdbBuilder`].
struct TestModule {
    name: String,
    symbols: Vec<u8>,
    lines: Vec<u8>,
}

/// Assembles a complete PDB image.
///
/// Stream layout: 1 PDBI, 2 TPI, 3 DBI, 4 IPI, 5 `/names`, 6 global symbols, 7 section headers,
/// then one stream per module. A `* Linker *` module without a stream is added after the
/// modules.
pub struct PdbBuilder {
    #[allow(missing_docs)]
    pub tpi: TypeStreamBuilder,
    #[allow(missing_docs)]
    pub ipi: TypeStreamBuilder,
    #[allow(missing_docs)]
    pub names: NamesBuilder,
    #[allow(missing_docs)]
    pub globals: SymbolsBuilder,
    #[allow(missing_docs)]
    pub guid: Uuid,
    #[allow(missing_docs)]
    pub age: u32,
    sections: Vec<SectionHeader>,
    modules: Vec<TestModule>,
    contributions: Vec<(u16, i32, i32, u16)>,
}

const NAMES_STREAM: u32 = 5;
const GLOBALS_STREAM: u32 = 6;
const SECTION_HEADERS_STREAM: u32 = 7;
const FIRST_MODULE_STREAM: u32 = 8;

impl PdbBuilder {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self {
            tpi: TypeStreamBuilder::new(),
            ipi: TypeStreamBuilder::new(),
            names: NamesBuilder::new(),
            globals: SymbolsBuilder::new(),
            guid: Uuid::from_u128(0x6b3f_0b8c_5a1e_4d2f_9c77_0123_4567_89ab),
            age: 1,
            sections: Vec::new(),
            modules: Vec::new(),
            contributions: Vec::new(),
        }
    }

    /// Adds a section header. Returns its 1-based section number.
    pub fn section(&mut self, name: &str, virtual_address: u32, virtual_size: u32) -> u16 {
        let mut h = SectionHeader::new_zeroed();
        let n = name.len().min(8);
        h.name[..n].copy_from_slice(&name.as_bytes()[..n]);
        h.virtual_address = U32::new(virtual_address);
        h.virtual_size = U32::new(virtual_size);
        self.sections.push(h);
        self.sections.len() as u16
    }

    /// Adds a module. `symbols` comes from [`SymbolsBuilder::new_module`]. Returns the 0-based
    /// module index.
    pub fn module(&mut self, name: &str, symbols: &SymbolsBuilder, lines: &LineDataBuilder) -> u16 {
        self.modules.push(TestModule {
            name: name.to_string(),
            symbols: symbols.build(),
            lines: lines.build(),
        });
        (self.modules.len() - 1) as u16
    }

    /// Adds a section contribution. `module_index` is 0-based.
    pub fn contribution(&mut self, section: u16, offset: i32, size: i32, module_index: u16) {
        self.contributions.push((section, offset, size, module_index));
    }

    #[allow(missing_docs)]
    pub fn build(&self) -> Vec<u8> {
        let mut msf = MsfImageBuilder::new(MIN_PAGE_SIZE);

        let pdbi = PdbiBuilder::new(self.guid, self.age)
            .named_stream(NAMES_STREAM_NAME, NAMES_STREAM)
            .build();

        let mut dbi = DbiBuilder::new();
        dbi.global_symbol_stream = Some(GLOBALS_STREAM);
        dbi.section_headers_stream = Some(SECTION_HEADERS_STREAM);
        for (i, m) in self.modules.iter().enumerate() {
            dbi.module(ModuleDesc {
                name: &m.name,
                obj_file: &m.name,
                stream: Some(FIRST_MODULE_STREAM + i as u32),
                sym_byte_size: m.symbols.len() as u32,
                c13_byte_size: m.lines.len() as u32,
            });
        }
        dbi.module(ModuleDesc {
            name: crate::dbi::LINKER_MODULE_NAME,
            obj_file: "",
            stream: None,
            sym_byte_size: 0,
            c13_byte_size: 0,
        });
        for &(section, offset, size, modi) in &self.contributions {
            dbi.contribution(section, offset, size, modi);
        }

        let mut section_headers = Vec::new();
        for h in &self.sections {
            section_headers.extend_from_slice(h.as_bytes());
        }

        msf.set_stream(1, &pdbi);
        msf.set_stream(2, &self.tpi.build());
        msf.set_stream(3, &dbi.build());
        // Scattered, so that IPI reads go through the copy path.
        msf.add_scattered_stream(&self.ipi.build());
        msf.set_stream(NAMES_STREAM, &self.names.build());
        msf.set_stream(GLOBALS_STREAM, &self.globals.build());
        msf.set_stream(SECTION_HEADERS_STREAM, &section_headers);
        for (i, m) in self.modules.iter().enumerate() {
            let mut data = m.symbols.clone();
            data.extend_from_slice(&m.lines);
            msf.set_stream(FIRST_MODULE_STREAM + i as u32, &data);
        }

        msf.build()
    }
}
