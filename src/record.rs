//! BAM alignment record: parse, mutate in place, and re-serialize.
//!
//! The record is kept as a single packed byte buffer with lazy field
//! accessors rather than eagerly decoded into owned `String`/`Vec`
//! storage, so a record can be read, mutated, and written back out
//! without a separate re-encode step.

use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::cigar::Cigar;
use crate::tag::{self, Value};

pub const DESCRIPTOR_LEN: usize = 32;
const IUPAC_ALPHABET: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("record is shorter than the fixed descriptor")]
    Truncated,
    #[error("declared block_size {declared} does not match payload length {actual}")]
    SizeMismatch { declared: i64, actual: usize },
    #[error("Not a IUPAC character: {0}")]
    NotIupac(char),
    #[error("quality string length {got} does not match sequence length {expected}")]
    QualLengthMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Tag(#[from] tag::Error),
    #[error(transparent)]
    Cigar(#[from] crate::cigar::Error),
}

/// A self-contained BAM record: a 4-byte `block_size` prefix, the fixed
/// 32-byte descriptor, and the variable-length payload sections, exactly
/// as they appear on the wire. There is no back-pointer to a containing
/// block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    buf: Vec<u8>,
}

macro_rules! field_accessors {
    ($($name:ident: $ty:ty => $offset:expr, $set:ident);* $(;)?) => {
        $(
            pub fn $name(&self) -> $ty {
                field_get(&self.buf, $offset)
            }

            pub fn $set(&mut self, v: $ty) {
                field_set(&mut self.buf, $offset, v);
            }
        )*
    };
}

trait Field: Sized {
    fn read(buf: &[u8], offset: usize) -> Self;
    fn write(buf: &mut [u8], offset: usize, v: Self);
}

macro_rules! impl_field {
    ($ty:ty, $read:ident, $write:ident) => {
        impl Field for $ty {
            fn read(buf: &[u8], offset: usize) -> Self {
                LittleEndian::$read(&buf[offset..])
            }
            fn write(buf: &mut [u8], offset: usize, v: Self) {
                LittleEndian::$write(&mut buf[offset..], v)
            }
        }
    };
}

impl_field!(i32, read_i32, write_i32);
impl_field!(u16, read_u16, write_u16);

impl Field for u8 {
    fn read(buf: &[u8], offset: usize) -> Self {
        buf[offset]
    }
    fn write(buf: &mut [u8], offset: usize, v: Self) {
        buf[offset] = v;
    }
}

fn field_get<T: Field>(buf: &[u8], offset: usize) -> T {
    T::read(buf, offset)
}

fn field_set<T: Field>(buf: &mut [u8], offset: usize, v: T) {
    T::write(buf, offset, v)
}

// Descriptor field byte offsets, relative to the start of the record
// (i.e. including the 4-byte block_size prefix).
const OFF_BLOCK_SIZE: usize = 0;
const OFF_REF_ID: usize = 4;
const OFF_POS: usize = 8;
const OFF_L_READ_NAME: usize = 12;
const OFF_MAPQ: usize = 13;
const OFF_BIN: usize = 14;
const OFF_N_CIGAR_OP: usize = 16;
const OFF_FLAG: usize = 18;
const OFF_L_SEQ: usize = 20;
const OFF_NEXT_REF_ID: usize = 24;
const OFF_NEXT_POS: usize = 28;
const OFF_TLEN: usize = 32;
const PAYLOAD_START: usize = 4 + DESCRIPTOR_LEN;

impl Record {
    /// Builds an empty, otherwise-zeroed record: unmapped, no read name,
    /// no CIGAR, no sequence, no tags.
    pub fn new() -> Self {
        let mut buf = vec![0u8; PAYLOAD_START];
        field_set::<i32>(&mut buf, OFF_REF_ID, -1);
        field_set::<i32>(&mut buf, OFF_POS, -1);
        field_set::<i32>(&mut buf, OFF_NEXT_REF_ID, -1);
        field_set::<i32>(&mut buf, OFF_NEXT_POS, -1);
        let mut record = Record { buf };
        record.sync_block_size();
        record
    }

    /// Parses a record from `input`, which must begin exactly at the
    /// `block_size` field and contain at least `block_size + 4` bytes.
    /// Returns the record and the number of bytes consumed.
    pub fn parse(input: &[u8]) -> Result<(Self, usize), Error> {
        if input.len() < 4 {
            return Err(Error::Truncated);
        }
        let block_size = LittleEndian::read_i32(input) as i64;
        let total = 4 + block_size as usize;
        if block_size < DESCRIPTOR_LEN as i64 || input.len() < total {
            return Err(Error::Truncated);
        }
        let record = Record {
            buf: input[..total].to_vec(),
        };
        record.validate_block_size()?;
        Ok((record, total))
    }

    fn validate_block_size(&self) -> Result<(), Error> {
        let declared = self.block_size() as i64;
        let actual = self.buf.len() - 4;
        if declared as usize != actual {
            return Err(Error::SizeMismatch { declared, actual });
        }
        Ok(())
    }

    /// Recomputes `block_size` from the buffer's current length. Every
    /// mutation that resizes a payload section must call this.
    fn sync_block_size(&mut self) {
        let size = (self.buf.len() - 4) as i32;
        field_set::<i32>(&mut self.buf, OFF_BLOCK_SIZE, size);
    }

    /// The record's wire bytes, `block_size` prefix included.
    pub fn to_bytes(&self) -> &[u8] {
        &self.buf
    }

    field_accessors! {
        block_size: i32 => OFF_BLOCK_SIZE, set_block_size_raw;
        ref_id: i32 => OFF_REF_ID, set_ref_id;
        pos: i32 => OFF_POS, set_pos;
        bin: u16 => OFF_BIN, set_bin;
        n_cigar_op: u16 => OFF_N_CIGAR_OP, set_n_cigar_op_raw;
        flag: u16 => OFF_FLAG, set_flag;
        next_ref_id: i32 => OFF_NEXT_REF_ID, set_next_ref_id;
        next_pos: i32 => OFF_NEXT_POS, set_next_pos;
        tlen: i32 => OFF_TLEN, set_tlen;
    }

    pub fn l_read_name(&self) -> u8 {
        field_get(&self.buf, OFF_L_READ_NAME)
    }

    pub fn mapq(&self) -> u8 {
        field_get(&self.buf, OFF_MAPQ)
    }

    pub fn set_mapq(&mut self, v: u8) {
        field_set(&mut self.buf, OFF_MAPQ, v);
    }

    pub fn l_seq(&self) -> i32 {
        field_get(&self.buf, OFF_L_SEQ)
    }

    fn read_name_range(&self) -> Range<usize> {
        PAYLOAD_START..PAYLOAD_START + self.l_read_name() as usize
    }

    fn cigar_range(&self) -> Range<usize> {
        let start = self.read_name_range().end;
        start..start + 4 * self.n_cigar_op() as usize
    }

    fn seq_len_bytes(&self) -> usize {
        (self.l_seq() as usize + 1) / 2
    }

    fn seq_range(&self) -> Range<usize> {
        let start = self.cigar_range().end;
        start..start + self.seq_len_bytes()
    }

    fn qual_range(&self) -> Range<usize> {
        let start = self.seq_range().end;
        start..start + self.l_seq() as usize
    }

    fn tags_range(&self) -> Range<usize> {
        self.qual_range().end..self.buf.len()
    }

    /// The read name with its trailing NUL stripped.
    pub fn read_name(&self) -> &str {
        let range = self.read_name_range();
        let bytes = &self.buf[range];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end]).unwrap_or("")
    }

    pub fn set_read_name(&mut self, name: &str) {
        let mut bytes = name.as_bytes().to_vec();
        bytes.push(0);
        let range = self.read_name_range();
        self.buf.splice(range, bytes.iter().copied());
        let len = bytes.len() as u8;
        field_set::<u8>(&mut self.buf, OFF_L_READ_NAME, len);
        self.sync_block_size();
    }

    pub fn cigar(&self) -> Cigar {
        Cigar::from_bytes(&self.buf[self.cigar_range()]).expect("cigar range is 4-byte aligned")
    }

    pub fn set_cigar(&mut self, cigar: &Cigar) {
        let bytes = cigar.to_bytes();
        let range = self.cigar_range();
        self.buf.splice(range, bytes);
        field_set::<u16>(&mut self.buf, OFF_N_CIGAR_OP, cigar.len() as u16);
        self.sync_block_size();
    }

    /// Decodes the packed 4-bit nucleotide sequence through the IUPAC
    /// alphabet `"=ACMGRSVTWYHKDBN"`.
    pub fn sequence(&self) -> String {
        let l_seq = self.l_seq() as usize;
        let bytes = &self.buf[self.seq_range()];
        let mut s = String::with_capacity(l_seq);
        for (i, &byte) in bytes.iter().enumerate() {
            let hi = (byte >> 4) as usize;
            s.push(IUPAC_ALPHABET[hi] as char);
            if i * 2 + 1 < l_seq {
                let lo = (byte & 0x0F) as usize;
                s.push(IUPAC_ALPHABET[lo] as char);
            }
        }
        s
    }

    /// Raw quality bytes, or `None` if every byte is `0xFF` ("missing").
    pub fn qualities(&self) -> Option<&[u8]> {
        let bytes = &self.buf[self.qual_range()];
        if !bytes.is_empty() && bytes.iter().all(|&b| b == 0xFF) {
            None
        } else {
            Some(bytes)
        }
    }

    /// Replaces the sequence (and, optionally, the quality string).
    /// `qual`, if given, must be exactly `seq.chars().count()` bytes long;
    /// otherwise quality is filled with `0xFF` ("missing").
    pub fn set_sequence(&mut self, seq: &str, qual: Option<&[u8]>) -> Result<(), Error> {
        let bases: Vec<u8> = seq.chars().map(encode_iupac).collect::<Result<_, _>>()?;
        if let Some(q) = qual {
            if q.len() != bases.len() {
                return Err(Error::QualLengthMismatch {
                    expected: bases.len(),
                    got: q.len(),
                });
            }
        }

        let mut packed = Vec::with_capacity((bases.len() + 1) / 2);
        for pair in bases.chunks(2) {
            let hi = pair[0];
            let lo = pair.get(1).copied().unwrap_or(0);
            packed.push((hi << 4) | lo);
        }
        let qual_bytes: Vec<u8> = match qual {
            Some(q) => q.to_vec(),
            None => vec![0xFFu8; bases.len()],
        };

        let qual_range = self.qual_range();
        self.buf.splice(qual_range, qual_bytes);
        let seq_range = self.seq_range();
        self.buf.splice(seq_range, packed);

        field_set::<i32>(&mut self.buf, OFF_L_SEQ, bases.len() as i32);
        self.sync_block_size();
        Ok(())
    }

    pub fn tags(&self) -> impl Iterator<Item = Result<tag::Entry, tag::Error>> + '_ {
        tag::iter_entries(&self.buf[self.tags_range()])
    }

    pub fn get_tag(&self, name: [u8; 2]) -> Result<Option<Value>, Error> {
        Ok(tag::find(&self.buf[self.tags_range()], name)?.map(|(entry, _)| entry.value))
    }

    pub fn set_tag(&mut self, name: [u8; 2], value: Value) -> Result<(), Error> {
        let range = self.tags_range();
        let mut stream = self.buf[range.clone()].to_vec();
        tag::set(&mut stream, name, &value)?;
        self.buf.splice(range, stream);
        self.sync_block_size();
        Ok(())
    }

    pub fn delete_tag(&mut self, name: [u8; 2]) -> Result<bool, Error> {
        let range = self.tags_range();
        let mut stream = self.buf[range.clone()].to_vec();
        let removed = tag::delete(&mut stream, name)?;
        if removed {
            self.buf.splice(range, stream);
            self.sync_block_size();
        }
        Ok(removed)
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_iupac(c: char) -> Result<u8, Error> {
    IUPAC_ALPHABET
        .iter()
        .position(|&b| b as char == c.to_ascii_uppercase())
        .map(|i| i as u8)
        .ok_or(Error::NotIupac(c))
}

/// Splits a contiguous buffer of decompressed BAM body bytes into
/// records, starting at an arbitrary record boundary. Record boundaries
/// are independent of BGZF block boundaries.
pub fn iter_records(mut input: &[u8]) -> impl Iterator<Item = Result<Record, Error>> + '_ {
    std::iter::from_fn(move || {
        if input.is_empty() {
            return None;
        }
        match Record::parse(input) {
            Ok((record, consumed)) => {
                input = &input[consumed..];
                Some(Ok(record))
            }
            Err(e) => {
                input = &[];
                Some(Err(e))
            }
        }
    })
}
