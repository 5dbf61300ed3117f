//! Auxiliary tag stream: walk, get, set, delete.
//!
//! Decoded values collapse into a single language-neutral `Value` enum
//! with narrowest-fit auto-typing, since the wire format is dynamically
//! typed and a Rust consumer shouldn't have to match on eleven integer
//! width variants to ask "is this tag an integer."

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("truncated tag stream")]
    Truncated,
    #[error("unknown tag type code '{0}'")]
    UnknownType(char),
    #[error("tag name must be ASCII")]
    NonAsciiName,
    #[error("tag name must be exactly 2 bytes, got {0}")]
    BadNameLength(usize),
    #[error("tag type code must be ASCII")]
    NonAsciiType,
    #[error("array buffer length {len} is not a multiple of subtype size {subtype_size}")]
    BadArrayLength { len: usize, subtype_size: usize },
    #[error("value {0} is out of range for the declared type")]
    OutOfRange(i64),
    #[error("tag '{0}' not found")]
    NotFound(String),
}

/// A decoded tag value. One variant per wire "class"; integers of every
/// declared width decode into `Int` or `UInt` rather than a separate
/// variant per byte width.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Char(u8),
    Int(i64),
    UInt(u64),
    Float(f32),
    Text(String),
    Hex(String),
    IntArray(IntArrayType, Vec<i64>),
    FloatArray(Vec<f32>),
}

/// The declared subtype of a `B` array tag, needed to re-encode losslessly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntArrayType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

impl IntArrayType {
    fn type_char(self) -> u8 {
        match self {
            IntArrayType::I8 => b'c',
            IntArrayType::U8 => b'C',
            IntArrayType::I16 => b's',
            IntArrayType::U16 => b'S',
            IntArrayType::I32 => b'i',
            IntArrayType::U32 => b'I',
        }
    }

    fn size(self) -> usize {
        match self {
            IntArrayType::I8 | IntArrayType::U8 => 1,
            IntArrayType::I16 | IntArrayType::U16 => 2,
            IntArrayType::I32 | IntArrayType::U32 => 4,
        }
    }

    fn from_type_char(c: u8) -> Option<Self> {
        Some(match c {
            b'c' => IntArrayType::I8,
            b'C' => IntArrayType::U8,
            b's' => IntArrayType::I16,
            b'S' => IntArrayType::U16,
            b'i' => IntArrayType::I32,
            b'I' => IntArrayType::U32,
            _ => return None,
        })
    }
}

impl Value {
    /// Picks the narrowest signed/unsigned integer type from `{c,C,s,S,i,I}`
    /// that fits `v`, preferring unsigned for non-negative values.
    pub fn from_i64(v: i64) -> Value {
        Value::Int(v)
    }

    fn narrowest_int_type(v: i64) -> Result<u8, Error> {
        if v >= 0 {
            Value::narrowest_uint_type(v as u64)
        } else if v >= i8::MIN as i64 {
            Ok(b'c')
        } else if v >= i16::MIN as i64 {
            Ok(b's')
        } else if v >= i32::MIN as i64 {
            Ok(b'i')
        } else {
            Err(Error::OutOfRange(v))
        }
    }

    fn narrowest_uint_type(v: u64) -> Result<u8, Error> {
        if v <= u8::MAX as u64 {
            Ok(b'C')
        } else if v <= u16::MAX as u64 {
            Ok(b'S')
        } else if v <= u32::MAX as u64 {
            Ok(b'I')
        } else {
            Err(Error::OutOfRange(v as i64))
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Char(c) => write!(f, "A:{}", *c as char),
            Value::Int(v) => write!(f, "i:{v}"),
            Value::UInt(v) => write!(f, "i:{v}"),
            Value::Float(v) => write!(f, "f:{v}"),
            Value::Text(s) => write!(f, "Z:{s}"),
            Value::Hex(s) => write!(f, "H:{s}"),
            Value::IntArray(ty, vals) => {
                write!(f, "B:{}", ty.type_char() as char)?;
                for v in vals {
                    write!(f, ",{v}")?;
                }
                Ok(())
            }
            Value::FloatArray(vals) => {
                write!(f, "B:f")?;
                for v in vals {
                    write!(f, ",{v}")?;
                }
                Ok(())
            }
        }
    }
}

/// One decoded entry from the tag stream: its two-byte name, one-byte
/// type code, and value.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub name: [u8; 2],
    pub type_code: u8,
    pub value: Value,
}

/// Walks the tag stream starting at `input`, decoding one entry and
/// returning it along with the unconsumed remainder.
pub fn read_entry(input: &[u8]) -> Result<(Entry, &[u8]), Error> {
    if input.len() < 3 {
        return Err(Error::Truncated);
    }
    let name = [input[0], input[1]];
    let type_code = input[2];
    let rest = &input[3..];

    let (value, rest) = match type_code {
        b'A' => {
            require(rest, 1)?;
            (Value::Char(rest[0]), &rest[1..])
        }
        b'c' => {
            require(rest, 1)?;
            (Value::Int(rest[0] as i8 as i64), &rest[1..])
        }
        b'C' => {
            require(rest, 1)?;
            (Value::UInt(rest[0] as u64), &rest[1..])
        }
        b's' => {
            require(rest, 2)?;
            (Value::Int(LittleEndian::read_i16(rest) as i64), &rest[2..])
        }
        b'S' => {
            require(rest, 2)?;
            (Value::UInt(LittleEndian::read_u16(rest) as u64), &rest[2..])
        }
        b'i' => {
            require(rest, 4)?;
            (Value::Int(LittleEndian::read_i32(rest) as i64), &rest[4..])
        }
        b'I' => {
            require(rest, 4)?;
            (Value::UInt(LittleEndian::read_u32(rest) as u64), &rest[4..])
        }
        b'f' => {
            require(rest, 4)?;
            (Value::Float(LittleEndian::read_f32(rest)), &rest[4..])
        }
        b'Z' => {
            let nul = find_nul(rest)?;
            let text = String::from_utf8_lossy(&rest[..nul]).into_owned();
            (Value::Text(text), &rest[nul + 1..])
        }
        b'H' => {
            let nul = find_nul(rest)?;
            let text = String::from_utf8_lossy(&rest[..nul]).into_owned();
            (Value::Hex(text), &rest[nul + 1..])
        }
        b'B' => read_array(rest)?,
        other => return Err(Error::UnknownType(other as char)),
    };

    Ok((
        Entry {
            name,
            type_code,
            value,
        },
        rest,
    ))
}

fn read_array(input: &[u8]) -> Result<(Value, &[u8]), Error> {
    require(input, 5)?;
    let subtype_char = input[0];
    let count = LittleEndian::read_u32(&input[1..5]) as usize;
    let mut rest = &input[5..];
    if subtype_char == b'f' {
        require(rest, count * 4)?;
        let mut vals = Vec::with_capacity(count);
        for chunk in rest[..count * 4].chunks_exact(4) {
            vals.push(LittleEndian::read_f32(chunk));
        }
        return Ok((Value::FloatArray(vals), &rest[count * 4..]));
    }
    let ty = IntArrayType::from_type_char(subtype_char)
        .ok_or(Error::UnknownType(subtype_char as char))?;
    let size = ty.size();
    require(rest, count * size)?;
    let mut vals = Vec::with_capacity(count);
    for chunk in rest[..count * size].chunks_exact(size) {
        vals.push(match ty {
            IntArrayType::I8 => chunk[0] as i8 as i64,
            IntArrayType::U8 => chunk[0] as i64,
            IntArrayType::I16 => LittleEndian::read_i16(chunk) as i64,
            IntArrayType::U16 => LittleEndian::read_u16(chunk) as i64,
            IntArrayType::I32 => LittleEndian::read_i32(chunk) as i64,
            IntArrayType::U32 => LittleEndian::read_u32(chunk) as i64,
        });
    }
    rest = &rest[count * size..];
    Ok((Value::IntArray(ty, vals), rest))
}

fn require(input: &[u8], n: usize) -> Result<(), Error> {
    if input.len() < n {
        Err(Error::Truncated)
    } else {
        Ok(())
    }
}

fn find_nul(input: &[u8]) -> Result<usize, Error> {
    input.iter().position(|&b| b == 0).ok_or(Error::Truncated)
}

/// Iterates every entry in a tag stream in order.
pub fn iter_entries(mut input: &[u8]) -> impl Iterator<Item = Result<Entry, Error>> + '_ {
    std::iter::from_fn(move || {
        if input.is_empty() {
            return None;
        }
        match read_entry(input) {
            Ok((entry, rest)) => {
                input = rest;
                Some(Ok(entry))
            }
            Err(e) => {
                input = &[];
                Some(Err(e))
            }
        }
    })
}

/// Encodes a single entry back to wire form.
pub fn encode_entry(name: [u8; 2], value: &Value) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    out.extend_from_slice(&name);
    match value {
        Value::Char(c) => {
            out.push(b'A');
            out.push(*c);
        }
        Value::Int(v) => {
            let ty = Value::narrowest_int_type(*v)?;
            out.push(ty);
            encode_int_payload(&mut out, ty, *v);
        }
        Value::UInt(v) => {
            let ty = Value::narrowest_uint_type(*v)?;
            out.push(ty);
            encode_int_payload(&mut out, ty, *v as i64);
        }
        Value::Float(v) => {
            out.push(b'f');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Text(s) => {
            out.push(b'Z');
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        Value::Hex(s) => {
            out.push(b'H');
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        Value::IntArray(ty, vals) => {
            out.push(b'B');
            out.push(ty.type_char());
            out.extend_from_slice(&(vals.len() as u32).to_le_bytes());
            for v in vals {
                encode_array_elem(&mut out, *ty, *v);
            }
        }
        Value::FloatArray(vals) => {
            out.push(b'B');
            out.push(b'f');
            out.extend_from_slice(&(vals.len() as u32).to_le_bytes());
            for v in vals {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    Ok(out)
}

fn encode_int_payload(out: &mut Vec<u8>, ty: u8, v: i64) {
    match ty {
        b'c' => out.push(v as i8 as u8),
        b'C' => out.push(v as u8),
        b's' => out.extend_from_slice(&(v as i16).to_le_bytes()),
        b'S' => out.extend_from_slice(&(v as u16).to_le_bytes()),
        b'i' => out.extend_from_slice(&(v as i32).to_le_bytes()),
        b'I' => out.extend_from_slice(&(v as u32).to_le_bytes()),
        _ => unreachable!(),
    }
}

fn encode_array_elem(out: &mut Vec<u8>, ty: IntArrayType, v: i64) {
    match ty {
        IntArrayType::I8 => out.push(v as i8 as u8),
        IntArrayType::U8 => out.push(v as u8),
        IntArrayType::I16 => out.extend_from_slice(&(v as i16).to_le_bytes()),
        IntArrayType::U16 => out.extend_from_slice(&(v as u16).to_le_bytes()),
        IntArrayType::I32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
        IntArrayType::U32 => out.extend_from_slice(&(v as u32).to_le_bytes()),
    }
}

/// Finds `name`'s entry within the tag stream, returning its decoded
/// value along with its byte span (for splicing by `set`/`delete`).
pub fn find(input: &[u8], name: [u8; 2]) -> Result<Option<(Entry, std::ops::Range<usize>)>, Error> {
    let mut offset = 0;
    let mut cursor = input;
    while !cursor.is_empty() {
        let (entry, rest) = read_entry(cursor)?;
        let consumed = cursor.len() - rest.len();
        if entry.name == name {
            return Ok(Some((entry, offset..offset + consumed)));
        }
        offset += consumed;
        cursor = rest;
    }
    Ok(None)
}

/// Splices `name: value` into the tag stream, replacing an existing
/// entry of the same name or appending a new one.
pub fn set(stream: &mut Vec<u8>, name: [u8; 2], value: &Value) -> Result<(), Error> {
    let encoded = encode_entry(name, value)?;
    match find(stream, name)? {
        Some((_, range)) => {
            stream.splice(range, encoded);
        }
        None => stream.extend_from_slice(&encoded),
    }
    Ok(())
}

/// Removes `name`'s entry from the tag stream, if present.
pub fn delete(stream: &mut Vec<u8>, name: [u8; 2]) -> Result<bool, Error> {
    match find(stream, name)? {
        Some((_, range)) => {
            stream.splice(range, std::iter::empty());
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip_with_explicit_type() {
        let mut stream = Vec::new();
        set(&mut stream, *b"RG", &Value::Text("MySample".to_string())).unwrap();
        let (entry, _) = find(&stream, *b"RG").unwrap().unwrap();
        assert_eq!(entry.value, Value::Text("MySample".to_string()));
    }

    #[test]
    fn auto_type_picks_narrowest_unsigned() {
        let mut stream = Vec::new();
        set(&mut stream, *b"XX", &Value::Int(170)).unwrap();
        assert_eq!(stream[2], b'C');
    }

    #[test]
    fn auto_type_picks_signed_for_negative() {
        let mut stream = Vec::new();
        set(&mut stream, *b"XX", &Value::Int(-5)).unwrap();
        assert_eq!(stream[2], b'c');
    }

    #[test]
    fn last_write_wins_among_siblings() {
        let mut stream = Vec::new();
        set(&mut stream, *b"XX", &Value::Int(1)).unwrap();
        set(&mut stream, *b"XY", &Value::UInt(170)).unwrap();
        set(&mut stream, *b"XZ", &Value::Int(2)).unwrap();
        set(&mut stream, *b"XY", &Value::UInt(1)).unwrap();
        set(&mut stream, *b"XY", &Value::UInt(99)).unwrap();

        let (xx, _) = find(&stream, *b"XX").unwrap().unwrap();
        let (xy, _) = find(&stream, *b"XY").unwrap().unwrap();
        let (xz, _) = find(&stream, *b"XZ").unwrap().unwrap();
        assert_eq!(xx.value, Value::Int(1));
        assert_eq!(xy.value, Value::UInt(99));
        assert_eq!(xz.value, Value::Int(2));
    }

    #[test]
    fn delete_removes_entry_and_leaves_others() {
        let mut stream = Vec::new();
        set(&mut stream, *b"XX", &Value::Int(1)).unwrap();
        set(&mut stream, *b"XY", &Value::Int(2)).unwrap();
        assert!(delete(&mut stream, *b"XX").unwrap());
        assert!(find(&stream, *b"XX").unwrap().is_none());
        assert_eq!(
            find(&stream, *b"XY").unwrap().unwrap().0.value,
            Value::Int(2)
        );
    }

    #[test]
    fn array_tag_round_trips() {
        let mut stream = Vec::new();
        set(
            &mut stream,
            *b"BI",
            &Value::IntArray(IntArrayType::I32, vec![1, 2, 3]),
        )
        .unwrap();
        let (entry, _) = find(&stream, *b"BI").unwrap().unwrap();
        assert_eq!(
            entry.value,
            Value::IntArray(IntArrayType::I32, vec![1, 2, 3])
        );
    }

    #[test]
    fn value_beyond_32_bits_is_rejected_instead_of_truncated() {
        let mut stream = Vec::new();
        let err = set(&mut stream, *b"XX", &Value::Int(10_000_000_000)).unwrap_err();
        assert_eq!(err, Error::OutOfRange(10_000_000_000));
        assert!(stream.is_empty());

        let mut stream = Vec::new();
        let err = set(&mut stream, *b"XX", &Value::UInt(10_000_000_000)).unwrap_err();
        assert_eq!(err, Error::OutOfRange(10_000_000_000));
    }

    #[test]
    fn truncated_stream_is_an_error() {
        assert_eq!(read_entry(&[b'X', b'X']).unwrap_err(), Error::Truncated);
        assert_eq!(
            read_entry(&[b'X', b'X', b'i', 0, 0]).unwrap_err(),
            Error::Truncated
        );
    }
}
