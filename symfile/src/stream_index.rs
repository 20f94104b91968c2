use std::fmt::Display;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U16, Unaligned};

/// Identifies a stream in a PDB/MSF file.
///
/// The value stored in `Stream` is never the NIL value (0xFFFF).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[repr(transparent)]
pub struct Stream(u16);

impl Stream {
    /// Fixed stream index 0 is the Previous MSF Stream Directory
    pub const OLD_STREAM_DIR: Stream = Stream(0);

    /// Index of the PDB Information Stream. It contains version information and the table of
    /// named streams.
    pub const PDB: Stream = Stream(1);

    /// Index of the Type Information Stream. It contains type records.
    pub const TPI: Stream = Stream(2);

    /// Debug Information Stream (DBI).
    pub const DBI: Stream = Stream(3);

    /// The Id Stream (IPI). It contains item records, such as `LF_FUNC_ID` and `LF_STRING_ID`.
    pub const IPI: Stream = Stream(4);

    /// Validates that `index` is non-NIL and converts it to a `Stream` value.
    pub fn new(index: u16) -> Option<Stream> {
        if index == NIL_STREAM_INDEX {
            None
        } else {
            Some(Stream(index))
        }
    }

    /// Returns the value of the stream index.
    pub fn value(self) -> u16 {
        self.0
    }
}

impl From<Stream> for u32 {
    fn from(value: Stream) -> Self {
        value.value() as u32
    }
}

impl Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A reserved stream index meaning "no stream at all", in `u16`.
pub const NIL_STREAM_INDEX: u16 = 0xffff;

/// Error type for `Stream::try_from` and [`StreamIndexU16::get_err`].
#[derive(Clone, Debug)]
pub struct StreamIndexIsNilError;

impl std::error::Error for StreamIndexIsNilError {}

impl Display for StreamIndexIsNilError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str("The given stream index is NIL.")
    }
}

impl TryFrom<u16> for Stream {
    type Error = StreamIndexIsNilError;

    fn try_from(i: u16) -> Result<Self, Self::Error> {
        Stream::new(i).ok_or(StreamIndexIsNilError)
    }
}

/// A 16-bit stream index, as embedded in on-disk structures. It may be NIL.
#[derive(
    Copy, Clone, Eq, PartialEq, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
#[repr(transparent)]
pub struct StreamIndexU16(pub U16<LE>);

impl StreamIndexU16 {
    /// The NIL stream index.
    pub const NIL: Self = Self(U16::from_bytes(NIL_STREAM_INDEX.to_le_bytes()));

    /// Gets the stream index, or `None` if it is NIL.
    pub fn get(self) -> Option<u32> {
        Stream::new(self.0.get()).map(u32::from)
    }

    /// Gets the stream index, or an error if it is NIL.
    pub fn get_err(self) -> Result<u32, StreamIndexIsNilError> {
        self.get().ok_or(StreamIndexIsNilError)
    }
}

#[test]
fn nil_stream_index() {
    assert_eq!(StreamIndexU16::NIL.get(), None);
    assert!(StreamIndexU16::NIL.get_err().is_err());
    assert_eq!(StreamIndexU16(U16::new(7)).get(), Some(7));
    assert_eq!(Stream::try_from(3u16).map(u32::from).ok(), Some(3));
    assert_eq!(Stream::DBI.to_string(), "3");
}
