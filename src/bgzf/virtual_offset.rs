use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

/// A packed (compressed-offset, uncompressed-offset) pair used to address
/// a byte inside a BGZF stream.
///
/// The upper 48 bits are the byte offset of the start of a BGZF block in
/// the compressed stream; the lower 16 bits are the byte offset of a
/// position inside that block's decompressed payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub const MAX_COFFSET: u64 = (1 << 48) - 1;

    pub fn new(coffset: u64, uoffset: u16) -> Self {
        assert!(coffset <= Self::MAX_COFFSET, "coffset exceeds 48 bits");
        VirtualOffset((coffset << 16) | u64::from(uoffset))
    }

    pub fn from_raw(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        VirtualOffset(LittleEndian::read_u64(bytes))
    }

    pub fn coffset(&self) -> u64 {
        self.0 >> 16
    }

    pub fn uoffset(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn to_raw(&self) -> u64 {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, self.0);
        buf
    }
}

impl From<u64> for VirtualOffset {
    fn from(raw: u64) -> Self {
        VirtualOffset(raw)
    }
}

impl From<VirtualOffset> for u64 {
    fn from(vo: VirtualOffset) -> Self {
        vo.0
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.coffset(), self.uoffset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_bytes() {
        let vo = VirtualOffset::new(123_456_789, 4_200);
        let bytes = vo.to_bytes();
        assert_eq!(VirtualOffset::from_bytes(&bytes), vo);
    }

    #[test]
    fn packs_with_or_not_and() {
        // coffset and uoffset must not overlap bit ranges; a non-zero
        // uoffset should never be swallowed by the coffset shift.
        let vo = VirtualOffset::new(1, 0xFFFF);
        assert_eq!(vo.to_raw(), (1u64 << 16) | 0xFFFF);
        assert_eq!(vo.uoffset(), 0xFFFF);
        assert_eq!(vo.coffset(), 1);
    }

    #[test]
    fn ordering_is_natural_u64_order() {
        let a = VirtualOffset::new(10, 5);
        let b = VirtualOffset::new(10, 6);
        let c = VirtualOffset::new(11, 0);
        assert!(a < b);
        assert!(b < c);
    }
}
