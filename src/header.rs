//! BAM header: binary magic/text/reference-list framing, plus the SAM
//! tag-line structure of the embedded header text.
//!
//! Tag lines are ordered `(name, value)` pairs throughout, so a tag's
//! original position in the line is preserved across a parse/emit
//! round trip.

use byteorder::{ByteOrder, LittleEndian};
use nom::bytes::streaming::tag;
use nom::multi::length_data;
use nom::number::streaming::le_u32;
use nom::sequence::preceded;
use nom::IResult;
use thiserror::Error;

pub const BAM_MAGIC: [u8; 4] = *b"BAM\x01";

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("missing BAM magic string")]
    MissingMagic,
    #[error("@HD must be the first line in the header")]
    HdNotFirst,
    #[error("invalid record type in header: '{0}'")]
    InvalidRecordType(String),
    #[error("tag line is missing a record type")]
    EmptyTagLine,
    #[error("malformed tag '{0}' (expected NAME:VALUE)")]
    MalformedTag(String),
    #[error("'{tag}' is a mandatory tag on an @{record_type} line")]
    MissingMandatoryTag { record_type: &'static str, tag: &'static str },
}

/// An ordered set of `NAME:VALUE` pairs from one header line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagLine(pub Vec<(String, String)>);

impl TagLine {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_line(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("\t")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BamReference {
    pub name: String,
    pub length: u32,
}

impl BamReference {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.name.len() + 1);
        let name_with_nul_len = self.name.len() as u32 + 1;
        out.extend_from_slice(&name_with_nul_len.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        out.extend_from_slice(&self.length.to_le_bytes());
        out
    }
}

fn reference(input: &[u8]) -> IResult<&[u8], BamReference> {
    let (input, name_bytes) = length_data(le_u32)(input)?;
    let (input, length) = le_u32(input)?;
    let name = String::from_utf8_lossy(name_bytes)
        .trim_end_matches('\0')
        .to_string();
    Ok((input, BamReference { name, length }))
}

/// The structured BAM header: parsed `@HD`/`@SQ`/`@RG`/`@PG`/`@CO` lines
/// and the binary reference list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BamHeader {
    pub hd: TagLine,
    pub sq: Vec<TagLine>,
    pub rg: Vec<TagLine>,
    pub pg: Vec<TagLine>,
    pub co: Vec<String>,
    pub references: Vec<BamReference>,
}

impl BamHeader {
    pub fn new(references: Vec<BamReference>) -> Self {
        BamHeader {
            references,
            ..Default::default()
        }
    }

    /// Parses SAM-format header text into structured tag lines. Does not
    /// touch `references`, which come from the binary reference list.
    pub fn parse_text(text: &str) -> Result<Self, Error> {
        let mut header = BamHeader::default();
        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return Ok(header);
        }

        let mut start_at = 0;
        if lines[0].starts_with("@HD\t") || lines[0] == "@HD" {
            let (_, tags) = parse_tag_line(lines[0])?;
            check_mandatory(&tags, "HD", "VN")?;
            header.hd = tags;
            start_at = 1;
        }

        for line in &lines[start_at..] {
            if line.starts_with("@CO") {
                let comment = line.splitn(2, '\t').nth(1).unwrap_or("").to_string();
                header.co.push(comment);
                continue;
            }
            let (record_type, tags) = parse_tag_line(line)?;
            match record_type.as_str() {
                "SQ" => {
                    check_mandatory(&tags, "SQ", "SN")?;
                    check_mandatory(&tags, "SQ", "LN")?;
                    header.sq.push(tags);
                }
                "RG" => {
                    check_mandatory(&tags, "RG", "ID")?;
                    header.rg.push(tags);
                }
                "PG" => {
                    check_mandatory(&tags, "PG", "ID")?;
                    header.pg.push(tags);
                }
                "HD" => return Err(Error::HdNotFirst),
                other => return Err(Error::InvalidRecordType(other.to_string())),
            }
        }
        Ok(header)
    }

    /// Renders the structured tag lines back to SAM header text.
    pub fn to_sam_text(&self) -> String {
        let mut out = String::new();
        if !self.hd.is_empty() {
            out.push_str("@HD\t");
            out.push_str(&self.hd.to_line());
            out.push('\n');
        }
        for tags in &self.sq {
            out.push_str("@SQ\t");
            out.push_str(&tags.to_line());
            out.push('\n');
        }
        for tags in &self.rg {
            out.push_str("@RG\t");
            out.push_str(&tags.to_line());
            out.push('\n');
        }
        for tags in &self.pg {
            out.push_str("@PG\t");
            out.push_str(&tags.to_line());
            out.push('\n');
        }
        for comment in &self.co {
            out.push_str("@CO\t");
            out.push_str(comment);
            out.push('\n');
        }
        out
    }

    /// Parses a complete binary BAM header frame: magic, length-prefixed
    /// SAM text, reference count, and the reference list itself.
    pub fn parse(input: &[u8]) -> Result<(Self, &[u8]), Error> {
        match binary_frame(input) {
            Ok((rest, (text_bytes, refs))) => {
                let text = String::from_utf8_lossy(text_bytes).into_owned();
                let mut header = BamHeader::parse_text(&text)?;
                header.references = refs;
                Ok((header, rest))
            }
            Err(_) => Err(Error::MissingMagic),
        }
    }

    /// Serializes to the on-wire binary header frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let text = self.to_sam_text();
        let mut out = Vec::new();
        out.extend_from_slice(&BAM_MAGIC);
        out.extend_from_slice(&(text.len() as u32).to_le_bytes());
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(&(self.references.len() as u32).to_le_bytes());
        for r in &self.references {
            out.extend_from_slice(&r.to_bytes());
        }
        out
    }
}

fn binary_frame(input: &[u8]) -> IResult<&[u8], (&[u8], Vec<BamReference>)> {
    let (input, text_bytes) = preceded(tag(BAM_MAGIC), length_data(le_u32))(input)?;
    let (input, n_ref) = le_u32(input)?;
    let mut refs = Vec::with_capacity(n_ref as usize);
    let mut rest = input;
    for _ in 0..n_ref {
        let (r, reference) = reference(rest)?;
        refs.push(reference);
        rest = r;
    }
    Ok((rest, (text_bytes, refs)))
}

fn parse_tag_line(line: &str) -> Result<(String, TagLine), Error> {
    let mut fields = line.split('\t');
    let record_type = fields
        .next()
        .ok_or(Error::EmptyTagLine)?
        .trim_start_matches('@')
        .to_string();
    let mut tags = TagLine::default();
    for field in fields {
        let (name, value) = field
            .split_once(':')
            .ok_or_else(|| Error::MalformedTag(field.to_string()))?;
        tags.insert(name, value);
    }
    Ok((record_type, tags))
}

fn check_mandatory(tags: &TagLine, record_type: &'static str, tag: &'static str) -> Result<(), Error> {
    if tags.get(tag).is_some() {
        Ok(())
    } else {
        Err(Error::MissingMandatoryTag { record_type, tag })
    }
}

/// Parses just the fixed reference-count prefix, used by readers that
/// stream the reference list incrementally.
pub fn read_n_ref(input: &[u8]) -> u32 {
    LittleEndian::read_u32(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BamHeader {
        let mut h = BamHeader::new(vec![
            BamReference { name: "chr1".into(), length: 248_956_422 },
            BamReference { name: "chr2".into(), length: 242_193_529 },
        ]);
        h.hd.insert("VN", "1.6");
        h.hd.insert("SO", "coordinate");
        let mut sq = TagLine::default();
        sq.insert("SN", "chr1");
        sq.insert("LN", "248956422");
        h.sq.push(sq);
        h.co.push("generated for testing".into());
        h
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let h = sample();
        let bytes = h.to_bytes();
        let (parsed, rest) = BamHeader::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.hd.get("VN").unwrap(), "1.6");
        assert_eq!(parsed.references.len(), 2);
        assert_eq!(parsed.references[1].name, "chr2");
        assert_eq!(parsed.co, vec!["generated for testing".to_string()]);
    }

    #[test]
    fn hd_tag_order_is_preserved() {
        let h = sample();
        assert_eq!(h.hd.0, vec![
            ("VN".to_string(), "1.6".to_string()),
            ("SO".to_string(), "coordinate".to_string()),
        ]);
    }

    #[test]
    fn hd_must_be_first() {
        let text = "@SQ\tSN:chr1\tLN:100\n@HD\tVN:1.6\n";
        assert_eq!(
            BamHeader::parse_text(text).unwrap_err(),
            Error::HdNotFirst
        );
    }

    #[test]
    fn sq_requires_sn_and_ln() {
        let text = "@SQ\tSN:chr1\n";
        assert_eq!(
            BamHeader::parse_text(text).unwrap_err(),
            Error::MissingMandatoryTag { record_type: "SQ", tag: "LN" }
        );
    }

    #[test]
    fn missing_magic_is_an_error() {
        assert_eq!(BamHeader::parse(b"nope").unwrap_err(), Error::MissingMagic);
    }

    #[test]
    fn tag_value_may_contain_colons() {
        let (_, tags) = parse_tag_line("@PG\tID:bwa\tCL:bwa mem -R '@RG\\tID:1' ref.fa").unwrap();
        assert_eq!(tags.get("CL").unwrap(), "bwa mem -R '@RG\\tID:1' ref.fa");
    }

    #[test]
    fn comment_lines_preserve_tabs_after_the_marker() {
        let text = "@CO\tthis\thas\ttabs\n";
        let h = BamHeader::parse_text(text).unwrap();
        assert_eq!(h.co, vec!["this\thas\ttabs".to_string()]);
    }
}
