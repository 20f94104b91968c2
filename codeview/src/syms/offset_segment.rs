use super::*;

/// A `offset:segment` address as embedded in symbol records. `segment` is a 1-based section
/// number.
#[repr(C)]
#[derive(
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
pub struct OffsetSegment {
    /// Byte offset within the section.
    pub offset: U32<LE>,
    /// 1-based section index.
    pub segment: U16<LE>,
}

impl OffsetSegment {
    #[allow(missing_docs)]
    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset.get()
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn segment(&self) -> u16 {
        self.segment.get()
    }
}

impl std::fmt::Display for OffsetSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:04x}:{:08x}]", self.segment(), self.offset())
    }
}

impl Debug for OffsetSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
