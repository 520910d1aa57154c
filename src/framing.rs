//! Stream synchronization and frame segmentation
use log::{debug, trace};
use std::ops::Range;

use crate::{
    checksum::Checksum,
    codec::{Endianness, Fields},
    error::Error,
};

/// Encoding of a numeric header field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16Le,
    U16Be,
    U32Le,
    /// Two ASCII characters, first one being the most significant byte
    Ascii2,
    /// Three ASCII hexadecimal digits
    AsciiHex3,
}

impl FieldKind {
    pub const fn width(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16Le | Self::U16Be | Self::Ascii2 => 2,
            Self::AsciiHex3 => 3,
            Self::U32Le => 4,
        }
    }

    /// Reads this field at given offset
    pub fn read(&self, buf: &[u8], offset: usize) -> Result<usize, Error> {
        let le = Fields::le(buf);
        let be = Fields::be(buf);
        match self {
            Self::U8 => Ok(le.u8(offset)? as usize),
            Self::U16Le => Ok(le.u16(offset)? as usize),
            Self::U16Be | Self::Ascii2 => Ok(be.u16(offset)? as usize),
            Self::U32Le => Ok(le.u32(offset)? as usize),
            Self::AsciiHex3 => {
                let digits = le.slice(offset, 3)?;
                std::str::from_utf8(digits)
                    .ok()
                    .and_then(|s| usize::from_str_radix(s, 16).ok())
                    .ok_or(Error::Malformed("length field is not hexadecimal"))
            },
        }
    }
}

/// Frame start marker
#[derive(Debug, Clone, Copy)]
pub enum SyncPattern {
    /// Fixed byte sequence
    Bytes(&'static [u8]),
    /// Sliding window of `len` bytes accepted by `test`
    Predicate {
        len: usize,
        test: fn(&[u8]) -> bool,
    },
}

impl SyncPattern {
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Predicate { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn matches(&self, window: &[u8]) -> bool {
        match self {
            Self::Bytes(bytes) => window == *bytes,
            Self::Predicate { len, test } => window.len() == *len && test(window),
        }
    }
}

/// Header length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLen {
    Fixed(usize),
    /// Single byte field, at given offset
    Field(usize),
}

/// Integrity check of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRule {
    pub checksum: Checksum,
    /// First byte covered by the checksum
    pub start: usize,
    /// Bytes between the checksum value and the end of frame,
    /// checksum value included. The covered range ends
    /// where the checksum value starts.
    pub tail: usize,
    /// Byte order of the checksum value
    pub endianness: Endianness,
}

/// Wire format of one receiver family
#[derive(Debug, Clone, Copy)]
pub struct FrameLayout {
    pub sync: SyncPattern,
    /// Number of bytes needed to determine the frame length
    pub prefix: usize,
    pub header: HeaderLen,
    /// Length field, counting the body that follows the header
    pub length: (usize, FieldKind),
    /// Bytes following the counted body
    pub trailer: usize,
    /// Message type field
    pub code: (usize, FieldKind),
    /// Maximal frame length
    pub max_len: usize,
    pub checksum: ChecksumRule,
}

impl FrameLayout {
    fn header_len(&self, head: &[u8]) -> Result<usize, Error> {
        match self.header {
            HeaderLen::Fixed(len) => Ok(len),
            HeaderLen::Field(offset) => Ok(FieldKind::U8.read(head, offset)?),
        }
    }

    /// Determines total frame length, from its first [Self::prefix] bytes.
    pub fn frame_len(&self, head: &[u8]) -> Result<usize, Error> {
        let (offset, kind) = self.length;
        let body = kind.read(head, offset)?;
        if body == 0 {
            return Err(Error::FrameLength(0));
        }
        let header = self.header_len(head)?;
        if header < self.prefix {
            return Err(Error::FrameLength(header));
        }
        let total = header + body + self.trailer;
        if total > self.max_len || total < header + self.checksum.tail {
            return Err(Error::FrameLength(total));
        }
        Ok(total)
    }

    fn checksum_range(&self, frame: &[u8]) -> Result<(Range<usize>, Range<usize>), Error> {
        let rule = &self.checksum;
        let value = frame.len().checked_sub(rule.tail).ok_or(Error::FrameLength(frame.len()))?;
        let end = value + rule.checksum.width();
        if rule.start > value || end > frame.len() {
            return Err(Error::FrameLength(frame.len()));
        }
        Ok((rule.start..value, value..end))
    }

    fn read_checksum(&self, bytes: &[u8]) -> u32 {
        bytes.iter().enumerate().fold(0u32, |acc, (i, b)| {
            match self.checksum.endianness {
                Endianness::Little => acc | (*b as u32) << (8 * i),
                Endianness::Big => (acc << 8) | *b as u32,
            }
        })
    }

    /// Verifies the integrity of a complete frame
    pub fn verify(&self, frame: &[u8]) -> Result<(), Error> {
        let (covered, value) = self.checksum_range(frame)?;
        let computed = self.checksum.checksum.compute(&frame[covered]);
        let expected = self.read_checksum(&frame[value]);
        if computed != expected {
            return Err(Error::Checksum { expected, computed });
        }
        Ok(())
    }

    /// Computes and writes the checksum of an outgoing frame,
    /// which must be allocated to its final length.
    pub fn seal(&self, frame: &mut [u8]) -> Result<(), Error> {
        let (covered, value) = self.checksum_range(frame)?;
        let computed = self.checksum.checksum.compute(&frame[covered]);
        let width = value.len();
        for (i, byte) in frame[value].iter_mut().enumerate() {
            let shift = match self.checksum.endianness {
                Endianness::Little => 8 * i,
                Endianness::Big => 8 * (width - 1 - i),
            };
            *byte = (computed >> shift) as u8;
        }
        Ok(())
    }

    /// Validates a segmented frame and exposes it as a [Frame]
    pub fn validate(&self, bytes: Vec<u8>) -> Result<Frame, Error> {
        self.verify(&bytes)?;
        let (offset, kind) = self.code;
        let code = kind.read(&bytes, offset)? as u16;
        let header = self.header_len(&bytes)?;
        let payload = header..bytes.len() - self.checksum.tail;
        Ok(Frame {
            code,
            bytes,
            payload,
        })
    }
}

/// Validated message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    code: u16,
    bytes: Vec<u8>,
    payload: Range<usize>,
}

impl Frame {
    /// Message type
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Complete frame
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Header
    pub fn header(&self) -> &[u8] {
        &self.bytes[..self.payload.start]
    }

    /// Message body, header and checksum excluded
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.payload.clone()]
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Little endian view of the payload
    pub fn le(&self) -> Fields<'_> {
        Fields::le(self.payload())
    }

    /// Big endian view of the payload
    pub fn be(&self) -> Fields<'_> {
        Fields::be(self.payload())
    }
}

/// Segmentation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Waiting for the sync pattern
    #[default]
    Seeking,
    /// Waiting for the frame length to be known
    ReadingHeader,
    /// Accumulating until total length is reached
    ReadingPayload { total: usize },
}

/// Locates frames in a byte stream
#[derive(Debug, Clone)]
pub struct Synchronizer {
    layout: FrameLayout,
    state: State,
    buf: Vec<u8>,
}

impl Synchronizer {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            state: State::default(),
            buf: Vec::with_capacity(layout.prefix),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Bytes currently held
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drops the frame in flight
    pub fn reset(&mut self) {
        self.state = State::Seeking;
        self.buf.clear();
    }

    /// Feeds one byte. Returns the complete (not yet validated) frame,
    /// once its last byte was received. Illegal lengths reset the synchronizer.
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>, Error> {
        match self.state {
            State::Seeking => self.seek(byte),
            State::ReadingHeader => {
                self.buf.push(byte);
                self.header()
            },
            State::ReadingPayload { total } => {
                self.buf.push(byte);
                if self.buf.len() == total {
                    Ok(Some(self.take()))
                } else {
                    Ok(None)
                }
            },
        }
    }

    fn seek(&mut self, byte: u8) -> Result<Option<Vec<u8>>, Error> {
        let len = self.layout.sync.len();
        if self.buf.len() == len {
            self.buf.remove(0);
        }
        self.buf.push(byte);
        if self.buf.len() == len && self.layout.sync.matches(&self.buf) {
            trace!("sync found");
            self.state = State::ReadingHeader;
            return self.header();
        }
        Ok(None)
    }

    fn header(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if self.buf.len() < self.layout.prefix {
            return Ok(None);
        }
        match self.layout.frame_len(&self.buf) {
            Ok(total) if total <= self.buf.len() => Ok(Some(self.take())),
            Ok(total) => {
                self.buf.reserve_exact(total - self.buf.len());
                self.state = State::ReadingPayload { total };
                Ok(None)
            },
            Err(e) => {
                debug!("dropping frame: {}", e);
                self.reset();
                Err(e)
            },
        }
    }

    fn take(&mut self) -> Vec<u8> {
        self.state = State::Seeking;
        std::mem::take(&mut self.buf)
    }
}
