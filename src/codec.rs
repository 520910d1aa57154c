//! Bounds checked field extraction from frame payloads
use num_traits::FromBytes;

use crate::error::Error;

/// Byte order of multi byte fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Read only view over a byte window, decoding fields
/// at byte offsets in a fixed [Endianness].
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    buf: &'a [u8],
    endianness: Endianness,
}

impl<'a> Fields<'a> {
    pub fn new(buf: &'a [u8], endianness: Endianness) -> Self {
        Self { buf, endianness }
    }

    /// Little endian view
    pub fn le(buf: &'a [u8]) -> Self {
        Self::new(buf, Endianness::Little)
    }

    /// Big endian view
    pub fn be(buf: &'a [u8]) -> Self {
        Self::new(buf, Endianness::Big)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Sub view starting at offset, same byte order
    pub fn offset(&self, offset: usize) -> Result<Self, Error> {
        let len = self.buf.len().checked_sub(offset).ok_or(Error::OutOfBounds {
            offset,
            width: 0,
            len: self.buf.len(),
        })?;
        Ok(Self::new(self.slice(offset, len)?, self.endianness))
    }

    pub fn slice(&self, offset: usize, width: usize) -> Result<&'a [u8], Error> {
        offset
            .checked_add(width)
            .and_then(|end| self.buf.get(offset..end))
            .ok_or(Error::OutOfBounds {
                offset,
                width,
                len: self.buf.len(),
            })
    }

    fn read<T>(&self, offset: usize) -> Result<T, Error>
    where
        T: FromBytes,
        T::Bytes: Default,
    {
        let mut bytes = T::Bytes::default();
        let width = AsRef::<[u8]>::as_ref(&bytes).len();
        AsMut::<[u8]>::as_mut(&mut bytes).copy_from_slice(self.slice(offset, width)?);
        Ok(match self.endianness {
            Endianness::Little => T::from_le_bytes(&bytes),
            Endianness::Big => T::from_be_bytes(&bytes),
        })
    }

    pub fn u8(&self, offset: usize) -> Result<u8, Error> {
        self.read(offset)
    }

    pub fn i8(&self, offset: usize) -> Result<i8, Error> {
        self.read(offset)
    }

    pub fn u16(&self, offset: usize) -> Result<u16, Error> {
        self.read(offset)
    }

    pub fn i16(&self, offset: usize) -> Result<i16, Error> {
        self.read(offset)
    }

    /// Unsigned 24 bit integer
    pub fn u24(&self, offset: usize) -> Result<u32, Error> {
        let b = self.slice(offset, 3)?;
        Ok(match self.endianness {
            Endianness::Little => u32::from_le_bytes([b[0], b[1], b[2], 0]),
            Endianness::Big => u32::from_be_bytes([0, b[0], b[1], b[2]]),
        })
    }

    /// Signed 24 bit integer, sign extended
    pub fn i24(&self, offset: usize) -> Result<i32, Error> {
        let raw = self.u24(offset)?;
        Ok(((raw << 8) as i32) >> 8)
    }

    pub fn u32(&self, offset: usize) -> Result<u32, Error> {
        self.read(offset)
    }

    pub fn i32(&self, offset: usize) -> Result<i32, Error> {
        self.read(offset)
    }

    pub fn u64(&self, offset: usize) -> Result<u64, Error> {
        self.read(offset)
    }

    pub fn f32(&self, offset: usize) -> Result<f32, Error> {
        self.read(offset)
    }

    pub fn f64(&self, offset: usize) -> Result<f64, Error> {
        self.read(offset)
    }

    /// Single precision value, NaN being reported as missing
    pub fn real4(&self, offset: usize) -> Result<Option<f32>, Error> {
        let value = self.f32(offset)?;
        Ok(if value.is_nan() { None } else { Some(value) })
    }

    /// Double precision value, NaN being reported as missing
    pub fn real8(&self, offset: usize) -> Result<Option<f64>, Error> {
        let value = self.f64(offset)?;
        Ok(if value.is_nan() { None } else { Some(value) })
    }
}

/// Reads `len` (<= 32) bits starting at bit `pos`, MSB first.
pub fn getbitu(buf: &[u8], pos: usize, len: usize) -> Result<u32, Error> {
    if len > 32 || pos + len > buf.len() * 8 {
        return Err(Error::OutOfBounds {
            offset: pos / 8,
            width: len.div_ceil(8),
            len: buf.len(),
        });
    }
    let mut bits = 0u32;
    for i in pos..pos + len {
        bits = (bits << 1) | ((buf[i / 8] >> (7 - i % 8)) & 1) as u32;
    }
    Ok(bits)
}

/// Reads `len` bits as a two's complement signed integer.
pub fn getbits(buf: &[u8], pos: usize, len: usize) -> Result<i32, Error> {
    let bits = getbitu(buf, pos, len)?;
    if len == 0 || len >= 32 {
        return Ok(bits as i32);
    }
    if bits & (1 << (len - 1)) == 0 {
        Ok(bits as i32)
    } else {
        Ok((bits | (!0u32 << len)) as i32)
    }
}

/// Writes the `len` least significant bits of `value` at bit `pos`, MSB first.
pub fn setbitu(buf: &mut [u8], pos: usize, len: usize, value: u32) -> Result<(), Error> {
    if len > 32 || pos + len > buf.len() * 8 {
        return Err(Error::OutOfBounds {
            offset: pos / 8,
            width: len.div_ceil(8),
            len: buf.len(),
        });
    }
    for (k, i) in (pos..pos + len).enumerate() {
        let mask = 1u8 << (7 - i % 8);
        if value & (1 << (len - 1 - k)) != 0 {
            buf[i / 8] |= mask;
        } else {
            buf[i / 8] &= !mask;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(Endianness::Little, 0x0201)]
    #[case(Endianness::Big, 0x0102)]
    fn byte_order(#[case] endianness: Endianness, #[case] expected: u16) {
        let buf = [0x01, 0x02, 0x03];
        let fields = Fields::new(&buf, endianness);
        assert_eq!(fields.u16(0).unwrap(), expected);
    }

    #[test]
    fn signed_fields() {
        let buf = [0xFE, 0xFF, 0xFF, 0xFF];
        let le = Fields::le(&buf);
        assert_eq!(le.i8(0).unwrap(), -2);
        assert_eq!(le.i16(0).unwrap(), -2);
        assert_eq!(le.i24(0).unwrap(), -2);
        assert_eq!(le.i32(0).unwrap(), -2);
        assert_eq!(le.u24(0).unwrap(), 0xFFFFFE);

        let be = Fields::be(&[0x7F, 0xFF, 0xFF]);
        assert_eq!(be.i24(0).unwrap(), 0x7FFFFF);
    }

    #[test]
    fn floats() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1.5_f64.to_be_bytes());
        buf.extend_from_slice(&f64::NAN.to_be_bytes());
        buf.extend_from_slice(&(-0.25_f32).to_be_bytes());
        let fields = Fields::be(&buf);
        assert_eq!(fields.f64(0).unwrap(), 1.5);
        assert_eq!(fields.real8(0).unwrap(), Some(1.5));
        assert_eq!(fields.real8(8).unwrap(), None);
        assert_eq!(fields.real4(16).unwrap(), Some(-0.25));
    }

    #[test]
    fn truncated() {
        let buf = [0u8; 6];
        let fields = Fields::le(&buf);
        assert!(fields.u32(2).is_ok());
        match fields.u32(3) {
            Err(Error::OutOfBounds { offset, width, len }) => {
                assert_eq!((offset, width, len), (3, 4, 6));
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(fields.f64(0).is_err());
        assert!(fields.slice(usize::MAX, 2).is_err());
        assert_eq!(fields.offset(4).unwrap().len(), 2);
        assert!(fields.offset(7).is_err());
    }

    #[test]
    fn bit_fields() {
        let mut buf = [0u8; 8];
        setbitu(&mut buf, 3, 17, 0x1ABCD).unwrap();
        assert_eq!(getbitu(&buf, 3, 17).unwrap(), 0x1ABCD);
        setbitu(&mut buf, 30, 6, 0b101010).unwrap();
        assert_eq!(getbitu(&buf, 30, 6).unwrap(), 0b101010);
        assert_eq!(getbits(&buf, 30, 6).unwrap(), -22);
        assert_eq!(getbitu(&buf, 3, 17).unwrap(), 0x1ABCD);

        setbitu(&mut buf, 32, 32, 0xDEADBEEF).unwrap();
        assert_eq!(getbitu(&buf, 32, 32).unwrap(), 0xDEADBEEF);
        assert!(getbitu(&buf, 60, 8).is_err());
        assert!(setbitu(&mut buf, 60, 8, 0).is_err());
    }
}
