//! A BAM (Binary Alignment/Map) reader and writer: BGZF framing, the BAM
//! record codec, CIGAR and auxiliary-tag codecs, SAM-header parsing, and
//! the BAI index format.

pub mod bai;
pub mod bgzf;
pub mod cigar;
pub mod error;
pub mod header;
pub mod record;
pub mod tag;

pub use bai::{BamIndex, ContigIndex};
pub use bgzf::VirtualOffset;
pub use cigar::{Cigar, Op as CigarOp};
pub use error::{Error, Result};
pub use header::{BamHeader, BamReference};
pub use record::Record;
pub use tag::Value as TagValue;

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

/// Default DEFLATE compression level used when none is given.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 1;

/// A BAM file reader: owns a [`bgzf::Reader`] over the compressed stream
/// and the [`BamHeader`] read during construction. Implements [`Iterator`]
/// over [`Record`]s in file order.
#[derive(Debug)]
pub struct BamReader<R: Read> {
    inner: bgzf::Reader<R>,
    header: BamHeader,
}

impl<R: Read> BamReader<R> {
    /// Opens `source`, immediately reading the mandatory BAM header.
    pub fn new(source: R) -> Result<Self> {
        let mut inner = bgzf::Reader::new(source);
        let header = read_header(&mut inner)?;
        debug!(n_ref = header.references.len(), "bam::reader opened");
        Ok(BamReader { inner, header })
    }

    pub fn header(&self) -> &BamHeader {
        &self.header
    }

    /// The virtual offset of the next byte this reader will yield,
    /// suitable for recording in a BAI linear index.
    pub fn virtual_offset(&self) -> VirtualOffset {
        self.inner.virtual_offset()
    }
}

impl<R: Read> Iterator for BamReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        read_one_record(&mut self.inner).transpose()
    }
}

fn read_header<R: Read>(source: &mut bgzf::Reader<R>) -> Result<BamHeader> {
    let mut magic = [0u8; 4];
    source.read_exact(&mut magic)?;
    if magic != header::BAM_MAGIC {
        return Err(header::Error::MissingMagic.into());
    }
    let mut len_buf = [0u8; 4];
    source.read_exact(&mut len_buf)?;
    let text_len = LittleEndian::read_u32(&len_buf) as usize;
    let mut text_bytes = vec![0u8; text_len];
    source.read_exact(&mut text_bytes)?;
    let text = String::from_utf8_lossy(&text_bytes).into_owned();
    let mut header = BamHeader::parse_text(&text)?;

    let mut n_ref_buf = [0u8; 4];
    source.read_exact(&mut n_ref_buf)?;
    let n_ref = LittleEndian::read_u32(&n_ref_buf);
    let mut references = Vec::with_capacity(n_ref as usize);
    for _ in 0..n_ref {
        let mut name_len_buf = [0u8; 4];
        source.read_exact(&mut name_len_buf)?;
        let name_len = LittleEndian::read_u32(&name_len_buf) as usize;
        let mut name_buf = vec![0u8; name_len];
        source.read_exact(&mut name_buf)?;
        let name = String::from_utf8_lossy(&name_buf)
            .trim_end_matches('\0')
            .to_string();
        let mut length_buf = [0u8; 4];
        source.read_exact(&mut length_buf)?;
        let length = LittleEndian::read_u32(&length_buf);
        references.push(BamReference { name, length });
    }
    header.references = references;
    Ok(header)
}

fn read_one_record<R: Read>(source: &mut bgzf::Reader<R>) -> Result<Option<Record>> {
    let mut size_buf = [0u8; 4];
    match read_exact_or_eof(source, &mut size_buf)? {
        false => return Ok(None),
        true => {}
    }
    let block_size = LittleEndian::read_i32(&size_buf);
    let mut rest = vec![0u8; block_size.max(0) as usize];
    source.read_exact(&mut rest)?;

    let mut full = Vec::with_capacity(4 + rest.len());
    full.extend_from_slice(&size_buf);
    full.extend_from_slice(&rest);
    let (record, _) = Record::parse(&full)?;
    Ok(Some(record))
}

/// Like [`Read::read_exact`], but returns `Ok(false)` instead of an error
/// when the source is exhausted before a single byte is read (a clean
/// EOF at a record boundary), and an error for any other short read.
fn read_exact_or_eof<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            return if filled == 0 {
                Ok(false)
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "truncated BAM record",
                )
                .into())
            };
        }
        filled += n;
    }
    Ok(true)
}

/// A BAM file writer: owns a [`bgzf::Writer`] over the compressed sink.
/// The header is written once at construction, before any records.
pub struct BamWriter<W: Write> {
    inner: bgzf::Writer<W>,
}

impl<W: Write> BamWriter<W> {
    pub fn new(sink: W, header: &BamHeader, level: u32) -> Result<Self> {
        let mut inner = bgzf::Writer::new(sink, level);
        inner.write_all(&header.to_bytes())?;
        // The header occupies its own BGZF block so its end lands on a
        // block boundary.
        inner.flush_bgzf()?;
        Ok(BamWriter { inner })
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.inner.write_all(record.to_bytes())?;
        Ok(())
    }

    /// Flushes any buffered bytes and writes the terminal EOF block.
    /// Idempotent; writing after close is an error.
    pub fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Value;

    fn header_with_one_ref() -> BamHeader {
        let mut h = BamHeader::new(vec![BamReference {
            name: "chr1".to_string(),
            length: 1000,
        }]);
        h.hd.insert("VN".to_string(), "1.6".to_string());
        h
    }

    #[test]
    fn reader_writer_round_trip_preserves_header_and_records() {
        let header = header_with_one_ref();
        let mut bytes = Vec::new();
        {
            let mut w = BamWriter::new(&mut bytes, &header, 6).unwrap();
            let mut r = Record::new();
            r.set_ref_id(0);
            r.set_pos(42);
            r.set_read_name("read_one");
            r.set_sequence("ACGT", None).unwrap();
            r.set_tag(*b"NM", Value::UInt(0)).unwrap();
            w.write_record(&r).unwrap();
            w.close().unwrap();
        }

        let reader = BamReader::new(bytes.as_slice()).unwrap();
        assert_eq!(reader.header().hd.get("VN").unwrap(), "1.6");
        assert_eq!(reader.header().references.len(), 1);
        assert_eq!(reader.header().references[0].name, "chr1");

        let records: Vec<Record> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].read_name(), "read_one");
        assert_eq!(records[0].sequence(), "ACGT");
    }

    #[test]
    fn empty_bam_stream_has_no_records() {
        let header = header_with_one_ref();
        let mut bytes = Vec::new();
        {
            let mut w = BamWriter::new(&mut bytes, &header, 1).unwrap();
            w.close().unwrap();
        }
        let reader = BamReader::new(bytes.as_slice()).unwrap();
        let records: Vec<Record> = reader.collect::<Result<_>>().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn double_close_on_writer_is_a_no_op() {
        let header = header_with_one_ref();
        let mut bytes = Vec::new();
        let mut w = BamWriter::new(&mut bytes, &header, 1).unwrap();
        w.close().unwrap();
        w.close().unwrap();
    }
}
