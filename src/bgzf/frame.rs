//! Byte-level parsing of the fixed portion of a BGZF block header: one
//! small `nom` parser per fixed-width field, composed with `tuple`.

use nom::{bytes::streaming::tag, number::streaming, sequence::tuple, IResult};

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const DEFLATE_METHOD: u8 = 8;
const FEXTRA_FLAG: u8 = 0x04;
const BC_SI1: u8 = 0x42;
const BC_SI2: u8 = 0x43;

#[derive(Debug, Clone, Copy)]
pub struct FixedHeader {
    pub method: u8,
    pub flags: u8,
    pub xlen: u16,
}

/// Parses the 12 fixed bytes of a gzip/BGZF block header: magic, method,
/// flags, mtime, xfl, os, xlen. The magic bytes are consumed but not
/// returned.
pub fn fixed_header(input: &[u8]) -> IResult<&[u8], FixedHeader> {
    let (i, (_magic, method, flags, _mtime, _xfl, _os, xlen)) = tuple((
        tag(GZIP_MAGIC),
        streaming::le_u8,
        streaming::le_u8,
        streaming::le_u32,
        streaming::le_u8,
        streaming::le_u8,
        streaming::le_u16,
    ))(input)?;
    Ok((
        i,
        FixedHeader {
            method,
            flags,
            xlen,
        },
    ))
}

pub fn is_deflate_method(method: u8) -> bool {
    method == DEFLATE_METHOD
}

pub fn has_fextra(flags: u8) -> bool {
    flags & FEXTRA_FLAG != 0
}

/// Scans the XLEN-byte extra field for the BGZF "BC" subfield and returns
/// its `BSIZE` payload.
///
/// A gzip extra field is a sequence of `(SI1, SI2, SLEN, payload[SLEN])`
/// subfields; BGZF always emits exactly one, the two-byte `BSIZE`, but a
/// conforming reader must still be able to skip past any others.
pub fn find_bsize(mut extra: &[u8]) -> Option<u16> {
    while extra.len() >= 4 {
        let si1 = extra[0];
        let si2 = extra[1];
        let slen = u16::from_le_bytes([extra[2], extra[3]]) as usize;
        let payload_start = 4;
        let payload_end = payload_start + slen;
        if extra.len() < payload_end {
            return None;
        }
        if si1 == BC_SI1 && si2 == BC_SI2 && slen == 2 {
            return Some(u16::from_le_bytes([
                extra[payload_start],
                extra[payload_start + 1],
            ]));
        }
        extra = &extra[payload_end..];
    }
    None
}
