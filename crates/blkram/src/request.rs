use std::fmt;

/// Request operation code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    /// Not supported by a RAM disk; always rejected.
    Flush,
    /// Not supported by a RAM disk; always rejected.
    Discard,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Flush => "flush",
            Self::Discard => "discard",
        };
        f.write_str(name)
    }
}

/// One contiguous piece of a request, borrowing a caller-owned buffer.
#[derive(Debug)]
pub enum Segment<'a> {
    /// Filled by a read.
    Dest(&'a mut [u8]),
    /// Consumed by a write.
    Src(&'a [u8]),
}

impl Segment<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Dest(buf) => buf.len(),
            Self::Src(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single block request: an operation, a starting sector and an ordered list of segments.
///
/// Segments are laid out back to back starting at `start_sector * SECTOR_SIZE`.
#[derive(Debug)]
pub struct Request<'a> {
    pub op: Operation,
    pub start_sector: u64,
    pub segments: Vec<Segment<'a>>,
}

impl<'a> Request<'a> {
    pub fn new(op: Operation, start_sector: u64) -> Self {
        Self {
            op,
            start_sector,
            segments: Vec::new(),
        }
    }

    pub fn read<I>(start_sector: u64, bufs: I) -> Self
    where
        I: IntoIterator<Item = &'a mut [u8]>,
    {
        Self {
            op: Operation::Read,
            start_sector,
            segments: bufs.into_iter().map(Segment::Dest).collect(),
        }
    }

    pub fn write<I>(start_sector: u64, bufs: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        Self {
            op: Operation::Write,
            start_sector,
            segments: bufs.into_iter().map(Segment::Src).collect(),
        }
    }

    pub fn with_segment(mut self, segment: Segment<'a>) -> Self {
        self.segments.push(segment);
        self
    }

    /// Sum of all segment lengths, saturating on overflow.
    pub fn total_len(&self) -> u64 {
        self.segments
            .iter()
            .fold(0u64, |acc, seg| acc.saturating_add(seg.len() as u64))
    }
}
