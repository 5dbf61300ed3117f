//! CIGAR string ↔ packed 32-bit operation sequence.
//!
//! Operations are kept as a packed `u32` newtype rather than an
//! enum-per-op, so every op in `MIDNSHP=XB` (including `B`, "back") has a
//! representation and the packed form round-trips bit-exactly.

use std::fmt;

use thiserror::Error;

const OP_CHARS: &[u8; 10] = b"MIDNSHP=XB";
const MAX_OP_LEN: u32 = (1 << 28) - 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unrecognized CIGAR operation character '{0}'")]
    UnknownOp(char),
    #[error("malformed CIGAR string at byte offset {0}")]
    MalformedString(usize),
    #[error("CIGAR operation length {0} exceeds the maximum of {max}", max = MAX_OP_LEN)]
    LengthTooLarge(u32),
    #[error("CIGAR buffer length {0} is not a multiple of 4")]
    BadBufferLength(usize),
}

/// A single packed CIGAR operation: `(length << 4) | op`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Op(u32);

impl Op {
    pub fn new(op_code: u8, len: u32) -> Result<Self, Error> {
        if op_code as usize >= OP_CHARS.len() {
            return Err(Error::UnknownOp(op_code as char));
        }
        if len > MAX_OP_LEN {
            return Err(Error::LengthTooLarge(len));
        }
        Ok(Op((len << 4) | op_code as u32))
    }

    pub fn from_packed(packed: u32) -> Self {
        Op(packed)
    }

    pub fn packed(&self) -> u32 {
        self.0
    }

    pub fn len(&self) -> u32 {
        self.0 >> 4
    }

    pub fn op_code(&self) -> u8 {
        (self.0 & 0xF) as u8
    }

    pub fn char(&self) -> char {
        OP_CHARS[self.op_code() as usize] as char
    }

    /// True for M, D, N, =, X — operations that consume reference bases.
    pub fn consumes_reference(&self) -> bool {
        matches!(self.op_code(), 0 | 2 | 3 | 7 | 8)
    }

    /// True for M, I, S, =, X — operations that consume query bases.
    pub fn consumes_query(&self) -> bool {
        matches!(self.op_code(), 0 | 1 | 4 | 7 | 8)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len(), self.char())
    }
}

/// A CIGAR string: an ordered sequence of packed operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cigar(Vec<Op>);

impl Cigar {
    pub fn new(ops: Vec<Op>) -> Self {
        Cigar(ops)
    }

    pub fn ops(&self) -> &[Op] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Parses a CIGAR string such as `"4M3X"` into its packed operations.
    pub fn from_string(s: &str) -> Result<Self, Error> {
        let bytes = s.as_bytes();
        let mut ops = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i == start {
                return Err(Error::MalformedString(start));
            }
            let len: u32 = std::str::from_utf8(&bytes[start..i])
                .unwrap()
                .parse()
                .map_err(|_| Error::MalformedString(start))?;
            if i >= bytes.len() {
                return Err(Error::MalformedString(start));
            }
            let op_char = bytes[i] as char;
            i += 1;
            let op_code = OP_CHARS
                .iter()
                .position(|&c| c as char == op_char)
                .ok_or(Error::UnknownOp(op_char))? as u8;
            ops.push(Op::new(op_code, len)?);
        }
        Ok(Cigar(ops))
    }

    /// Renders the CIGAR back to its string form, e.g. `"4M3X"`.
    pub fn to_string_repr(&self) -> String {
        self.0.iter().map(|op| op.to_string()).collect()
    }

    /// Parses a byte buffer of packed little-endian `u32` operations.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() % 4 != 0 {
            return Err(Error::BadBufferLength(bytes.len()));
        }
        let ops = bytes
            .chunks_exact(4)
            .map(|chunk| Op::from_packed(u32::from_le_bytes(chunk.try_into().unwrap())))
            .collect();
        Ok(Cigar(ops))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for op in &self.0 {
            out.extend_from_slice(&op.packed().to_le_bytes());
        }
        out
    }

    /// The reference span covered by the consuming-reference operations.
    pub fn reference_span(&self) -> u32 {
        self.0
            .iter()
            .filter(|op| op.consumes_reference())
            .map(Op::len)
            .sum()
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.to_string_repr())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_cigar_round_trips() {
        let text = "1M20I300D4000N50000S600000H7000000P80000000=268435435X9B";
        let cigar = Cigar::from_string(text).unwrap();
        assert_eq!(cigar.len(), 10);
        assert_eq!(cigar.to_string_repr(), text);
    }

    #[test]
    fn packed_form_matches_length_shift_or_op() {
        for (i, &c) in OP_CHARS.iter().enumerate() {
            let cigar = Cigar::from_string(&format!("7{}", c as char)).unwrap();
            assert_eq!(cigar.ops()[0].packed(), (7u32 << 4) | i as u32);
        }
    }

    #[test]
    fn rejects_unknown_op() {
        assert_eq!(Cigar::from_string("4Q").unwrap_err(), Error::UnknownOp('Q'));
    }

    #[test]
    fn rejects_zero_length_as_legal_but_preserves_it() {
        let cigar = Cigar::from_string("0M5I").unwrap();
        assert_eq!(cigar.ops()[0].len(), 0);
    }

    #[test]
    fn buffer_length_must_be_multiple_of_four() {
        assert_eq!(
            Cigar::from_bytes(&[0, 0, 0]).unwrap_err(),
            Error::BadBufferLength(3)
        );
    }

    #[test]
    fn bytes_round_trip() {
        let cigar = Cigar::from_string("4M3X").unwrap();
        let bytes = cigar.to_bytes();
        assert_eq!(Cigar::from_bytes(&bytes).unwrap(), cigar);
    }

    #[test]
    fn equality_compares_packed_sequence() {
        let a = Cigar::from_string("4M3X").unwrap();
        let b = Cigar::new(vec![Op::new(0, 4).unwrap(), Op::new(8, 3).unwrap()]);
        assert_eq!(a, b);
    }
}
