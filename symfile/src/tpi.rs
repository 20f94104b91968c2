//! Type Information Stream (TPI) and Id Stream (IPI)
//!
//! Layout of a Type Stream:
//!
//! * `TypeStreamHeader` - specifies lots of important parameters
//! * Type Record Data
//!
//! Records are addressed by [`TypeIndex`]. The first record has index `type_index_begin` and each
//! following record has the next index. Records do not carry their own index, so finding a record
//! requires a table of record offsets. That table is built on first use by a single scan that
//! reads only the 2-byte length prefix of each record.
//!
//! The stream is read through a [`BlockMappedStream`], so a record that lies within contiguous
//! pages is handed out without copying.

use crate::simple::{is_simple_kind_signed, simple_kind_size};
use crate::stream_index::StreamIndexU16;
use anyhow::{Context, bail};
use bstr::{BStr, BString};
use ms_codeview::types::fields::{Field, IterFields};
use ms_codeview::types::primitive::SimpleTypeMode;
use ms_codeview::types::{Leaf, TypeData, TypeIndex, TypeIndexLe, TypeRecord, TypesIter};
use ms_pdb_msf::BlockMappedStream;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::mem::size_of;
use tracing::{debug, trace, warn};
use zerocopy::{FromBytes, I32, Immutable, IntoBytes, KnownLayout, LE, U32, Unaligned};

/// The header of the TPI stream.
#[allow(missing_docs)]
#[derive(Clone, Eq, PartialEq, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
pub struct TypeStreamHeader {
    pub version: U32<LE>,
    pub header_size: U32<LE>,
    pub type_index_begin: TypeIndexLe,
    pub type_index_end: TypeIndexLe,
    /// The number of bytes of type record data following the `TypeStreamHeader`.
    pub type_record_bytes: U32<LE>,

    pub hash_stream_index: StreamIndexU16,
    pub hash_aux_stream_index: StreamIndexU16,

    /// The size of each hash key in the Hash Value Substream. For the current version of TPI,
    /// this value should always be 4.
    pub hash_key_size: U32<LE>,
    pub num_hash_buckets: U32<LE>,
    pub hash_value_buffer_offset: I32<LE>,
    pub hash_value_buffer_length: U32<LE>,

    pub index_offset_buffer_offset: I32<LE>,
    pub index_offset_buffer_length: U32<LE>,

    pub hash_adj_buffer_offset: I32<LE>,
    pub hash_adj_buffer_length: U32<LE>,
}

/// The size of the `TpiStreamHeader` structure.
pub const TPI_STREAM_HEADER_LEN: usize = size_of::<TypeStreamHeader>();
static_assertions::const_assert_eq!(TPI_STREAM_HEADER_LEN, 56);

/// The expected value of `TypeStreamHeader::version`.
pub const TYPE_STREAM_VERSION_2004: u32 = 20040203;

/// Limit on the chain of modifiers and enums followed by `integral_type_info`.
const MAX_INTEGRAL_TYPE_DEPTH: u32 = 16;

/// Distinguishes the TPI and IPI streams.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TypeStreamKind {
    /// The primary type stream
    TPI,
    /// The ID stream
    IPI,
}

/// Contains a TPI Stream or IPI Stream.
pub struct TypeStream<'a> {
    kind: TypeStreamKind,

    /// `None` if the PDB does not contain this stream, or the stream is empty.
    stream: Option<BlockMappedStream<'a>>,

    type_index_begin: TypeIndex,
    type_index_end: TypeIndex,

    /// Byte range within `stream` of the record data.
    records_start: u32,
    records_end: u32,

    /// Stream offset of each record. Built on demand.
    record_starts: OnceCell<Vec<u32>>,

    /// Maps UDT display names to the records that use them, in ascending index order.
    name_index: OnceCell<HashMap<BString, Vec<TypeIndex>>>,
}

impl<'a> TypeStream<'a> {
    /// A type stream that contains no records.
    pub fn empty(kind: TypeStreamKind) -> Self {
        Self {
            kind,
            stream: None,
            type_index_begin: TypeIndex::MIN_BEGIN,
            type_index_end: TypeIndex::MIN_BEGIN,
            records_start: 0,
            records_end: 0,
            record_starts: OnceCell::new(),
            name_index: OnceCell::new(),
        }
    }

    /// Parses the header of a Type Stream and validates it.
    pub fn parse(kind: TypeStreamKind, stream: BlockMappedStream<'a>) -> anyhow::Result<Self> {
        if stream.is_empty() {
            return Ok(Self::empty(kind));
        }

        let header: &TypeStreamHeader = stream
            .read_struct(0)
            .with_context(|| format!("{kind:?} stream is too small for its header"))?;

        let type_index_begin = header.type_index_begin.get();
        let type_index_end = header.type_index_end.get();
        if type_index_end < type_index_begin {
            bail!(
                "Type stream ({kind:?}) has invalid values in header.  \
                 The type_index_begin field is greater than the type_index_end field."
            );
        }

        if type_index_begin < TypeIndex::MIN_BEGIN {
            bail!(
                "The Type Stream has an invalid value for type_index_begin ({type_index_begin:?}). \
                 It is less than the minimum required value ({}).",
                TypeIndex::MIN_BEGIN.0
            );
        }

        let records_start = header.header_size.get();
        if records_start < TPI_STREAM_HEADER_LEN as u32 {
            bail!(
                "Type stream ({kind:?}) has invalid values in header.  \
                 The header_size field is smaller than the definition of the actual header."
            );
        }

        let Some(records_end) = records_start.checked_add(header.type_record_bytes.get()) else {
            bail!("Type stream ({kind:?}) has an invalid type_record_bytes field.");
        };
        if records_end > stream.len() {
            bail!(
                "Type stream ({kind:?}) has invalid values in header.  \
                   The header_size and type_record_bytes fields exceed the size of the stream."
            );
        }

        if header.version.get() != TYPE_STREAM_VERSION_2004 {
            debug!(version = header.version.get(), "type stream has an unusual version");
        }

        Ok(Self {
            kind,
            stream: Some(stream),
            type_index_begin,
            type_index_end,
            records_start,
            records_end,
            record_starts: OnceCell::new(),
            name_index: OnceCell::new(),
        })
    }

    /// Which stream this is.
    pub fn kind(&self) -> TypeStreamKind {
        self.kind
    }

    /// The type index of the first type record.
    pub fn type_index_begin(&self) -> TypeIndex {
        self.type_index_begin
    }

    /// The type index of the last type record, plus 1.
    pub fn type_index_end(&self) -> TypeIndex {
        self.type_index_end
    }

    /// The number of types defined in the type stream.
    pub fn num_types(&self) -> u32 {
        self.type_index_end.0 - self.type_index_begin.0
    }

    /// The underlying stream, if any. Exposed so callers can observe copy statistics.
    pub fn stream(&self) -> Option<&BlockMappedStream<'a>> {
        self.stream.as_ref()
    }

    /// Returns `true` if `type_index` refers to a primitive type.
    pub fn is_primitive(&self, type_index: TypeIndex) -> bool {
        type_index < self.type_index_begin
    }

    /// The first record of the stream, if the stream has any records.
    pub fn first(&self) -> Option<TypeIndex> {
        (self.type_index_begin < self.type_index_end).then_some(self.type_index_begin)
    }

    /// The record that follows `ti`, if any.
    pub fn next(&self, ti: TypeIndex) -> Option<TypeIndex> {
        let next = TypeIndex(ti.0.checked_add(1)?);
        (next >= self.type_index_begin && next < self.type_index_end).then_some(next)
    }

    /// Gets the stream offsets of the records, scanning the stream the first time.
    pub fn record_starts(&self) -> &[u32] {
        self.record_starts.get_or_init(|| self.scan_record_starts())
    }

    fn scan_record_starts(&self) -> Vec<u32> {
        let Some(stream) = &self.stream else {
            return Vec::new();
        };

        let num_types = self.num_types() as usize;
        let mut starts = Vec::with_capacity(num_types);
        let mut pos = self.records_start;
        let mut len_buf = [0u8; 2];

        while starts.len() < num_types && pos + 4 <= self.records_end {
            if stream.read_into(pos, &mut len_buf).is_err() {
                break;
            }
            let record_len = u16::from_le_bytes(len_buf) as u32;
            if record_len < 2 || pos + 2 + record_len > self.records_end {
                warn!(
                    offset = pos,
                    record_len, "type record has an invalid length; ignoring the rest of the stream"
                );
                break;
            }
            starts.push(pos);
            pos += 2 + record_len;
        }

        if starts.len() != num_types {
            warn!(
                expected = num_types,
                found = starts.len(),
                "type stream contains fewer records than its header says"
            );
        }

        trace!(kind = ?self.kind, num_records = starts.len(), "built type record offsets");
        starts
    }

    /// Retrieves the type record identified by `type_index`.
    ///
    /// This should only be used for non-primitive `TypeIndex` values. If this is called with a
    /// primitive `TypeIndex` then it will return `Err`.
    pub fn record(&self, type_index: TypeIndex) -> anyhow::Result<TypeRecord<'_>> {
        let Some(relative_type_index) = type_index.0.checked_sub(self.type_index_begin.0) else {
            bail!("The given TypeIndex is a primitive type index, not a type record.");
        };

        let Some(stream) = &self.stream else {
            bail!("The {:?} stream is empty; {type_index:?} does not exist", self.kind);
        };

        let starts = self.record_starts();
        let Some(&record_start) = starts.get(relative_type_index as usize) else {
            bail!(
                "The given TypeIndex {type_index:?} is out of bounds (exceeds maximum allowed TypeIndex)"
            );
        };

        let mut len_buf = [0u8; 2];
        stream.read_into(record_start, &mut len_buf)?;
        let record_len = u16::from_le_bytes(len_buf) as u32;
        let record_bytes = stream.read_bytes(record_start, record_len + 2)?;

        let mut iter = TypesIter::new(record_bytes);
        if let Some(record) = iter.next() {
            Ok(record)
        } else {
            bail!("Failed to decode type record {type_index:?}");
        }
    }

    /// Retrieves and decodes the type record identified by `type_index`.
    pub fn get_type(&self, type_index: TypeIndex) -> anyhow::Result<TypeData<'_>> {
        let record = self.record(type_index)?;
        record
            .parse()
            .with_context(|| format!("Failed to decode {:?} record {type_index:?}", record.kind))
    }

    /// Finds the records whose UDT display name is `name`, in ascending index order.
    ///
    /// The name index is built by the first call.
    pub fn find_records_by_name(&self, name: &str) -> &[TypeIndex] {
        let index = self.name_index.get_or_init(|| self.build_name_index());
        index
            .get(BStr::new(name))
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    fn build_name_index(&self) -> HashMap<BString, Vec<TypeIndex>> {
        let mut index: HashMap<BString, Vec<TypeIndex>> = HashMap::new();
        let mut next = self.first();
        while let Some(ti) = next {
            next = self.next(ti);
            let Ok(record) = self.record(ti) else {
                break;
            };
            if !record.kind.is_udt() {
                continue;
            }
            if let Ok(data) = record.parse() {
                if let Some(name) = data.udt_name() {
                    index.entry(name.to_owned()).or_default().push(ti);
                }
            }
        }
        debug!(kind = ?self.kind, num_names = index.len(), "built type name index");
        index
    }

    /// Given the index of a forward reference to a UDT, finds the record that fully defines the
    /// same type. Returns `ti` if `ti` is not a forward reference or if no definition is found.
    ///
    /// Candidates must have the same record kind. If the forward reference has a unique
    /// (decorated) name then the unique names must match; otherwise the display names must.
    /// When several records match, the first one wins.
    pub fn find_full_decl_for_forward_ref(&self, ti: TypeIndex) -> TypeIndex {
        if self.is_primitive(ti) {
            return ti;
        }

        let Ok(record) = self.record(ti) else {
            return ti;
        };
        let Ok(data) = record.parse() else {
            return ti;
        };
        if !data.is_forward_ref() {
            return ti;
        }
        let Some(name) = data.udt_name() else {
            return ti;
        };
        let unique_name = data.udt_unique_name();

        let Ok(name_str) = std::str::from_utf8(name) else {
            return ti;
        };

        for &candidate in self.find_records_by_name(name_str) {
            if candidate == ti {
                continue;
            }
            let Ok(c_record) = self.record(candidate) else {
                continue;
            };
            if c_record.kind != record.kind {
                continue;
            }
            let Ok(c_data) = c_record.parse() else {
                continue;
            };
            if c_data.is_forward_ref() {
                continue;
            }
            let matched = match unique_name {
                Some(u) => c_data.udt_unique_name() == Some(u),
                None => c_data.udt_name() == Some(name),
            };
            if matched {
                trace!(forward = ?ti, full = ?candidate, "resolved forward reference");
                return candidate;
            }
        }

        ti
    }

    /// Iterate the fields of an `LF_STRUCTURE`, `LF_CLASS`, `LF_ENUM`, etc. This correctly
    /// iterates across chains of `LF_FIELDLIST`.
    pub fn iter_fields(&self, field_list: TypeIndex) -> IterFieldChain<'_, 'a> {
        // `fields` starts empty so that the first call to next() loads `next_field_list`.
        IterFieldChain {
            type_stream: self,
            next_field_list: if field_list.0 != 0 {
                Some(field_list)
            } else {
                None
            },
            fields: IterFields { bytes: &[] },
        }
    }

    /// Returns the record kind of `ti`, or `None` for primitives and unreadable records.
    pub fn record_kind(&self, ti: TypeIndex) -> Option<Leaf> {
        if self.is_primitive(ti) {
            return None;
        }
        self.record(ti).ok().map(|r| r.kind)
    }

    /// Gets the size in bytes and the signedness of an integral type: a simple integer type,
    /// or a modifier, enum, or pointer that stores one. Returns `None` for anything else.
    pub fn integral_type_info(&self, ti: TypeIndex) -> Option<(u32, bool)> {
        self.integral_type_info_at_depth(ti, 0)
    }

    fn integral_type_info_at_depth(&self, ti: TypeIndex, depth: u32) -> Option<(u32, bool)> {
        if depth > MAX_INTEGRAL_TYPE_DEPTH {
            warn!(type_index = ?ti, "integral type refers to itself");
            return None;
        }

        if ti.is_simple() {
            let kind = ti.simple_kind();
            if ti.simple_mode() != SimpleTypeMode::Direct {
                return Some((ti.simple_mode().pointer_size()?, false));
            }
            return Some((simple_kind_size(kind), is_simple_kind_signed(kind)));
        }

        match self.get_type(ti).ok()? {
            TypeData::Modifier(m) => {
                self.integral_type_info_at_depth(m.underlying_type.get(), depth + 1)
            }
            TypeData::Enum(e) => {
                self.integral_type_info_at_depth(e.fixed.underlying_type.get(), depth + 1)
            }
            TypeData::Pointer(p) => Some((p.fixed.attr().size(), false)),
            _ => None,
        }
    }
}

/// Iterator state for `iter_fields`
pub struct IterFieldChain<'s, 'a> {
    /// The current `LF_FIELDLIST` record that we are decoding.
    fields: IterFields<'s>,

    /// Allows us to read `LF_FIELDLIST` records.
    type_stream: &'s TypeStream<'a>,

    /// The pointer to the next `LF_FIELDLIST` that we will decode.
    next_field_list: Option<TypeIndex>,
}

impl<'s, 'a> Iterator for IterFieldChain<'s, 'a> {
    type Item = Field<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(field) = self.fields.next() {
                if let Field::Index(index) = &field {
                    // The field list continues in another LF_FIELDLIST record.
                    self.next_field_list = Some(*index);
                    continue;
                }

                return Some(field);
            }

            let next_field_list = self.next_field_list.take()?;
            let next_record = self.type_stream.record(next_field_list).ok()?;
            match next_record.parse().ok()? {
                TypeData::FieldList(fl) => {
                    self.fields = fl.iter();
                }
                _ => {
                    warn!(?next_field_list, "field list continuation is not an LF_FIELDLIST");
                    return None;
                }
            }
        }
    }
}
