//! Exercises one failure mode per error-kind family through the public
//! API, rather than just the module-internal unit tests.

use bam_rs::bai::BamIndex;
use bam_rs::bgzf;
use bam_rs::cigar::Cigar;
use bam_rs::header::BamHeader;
use bam_rs::record::Record;
use bam_rs::tag;
use bam_rs::{BamReader, Error};

#[test]
fn truncated_bgzf_stream_is_a_bgzf_error() {
    let mut out = Vec::new();
    {
        let mut w = bgzf::Writer::new(&mut out, 1);
        std::io::Write::write_all(&mut w, b"hello").unwrap();
        w.close().unwrap();
    }
    out.truncate(out.len() - 10); // lop off the EOF block and some trailer
    let mut r = bgzf::Reader::new(out.as_slice());
    let mut buf = Vec::new();
    let err = std::io::Read::read_to_end(&mut r, &mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Other);
}

#[test]
fn opening_a_stream_without_bam_magic_is_a_header_error() {
    // A well-formed BGZF stream whose decompressed payload just isn't a
    // BAM header, so the failure is in header parsing, not BGZF framing.
    let mut bytes = Vec::new();
    {
        let mut w = bgzf::Writer::new(&mut bytes, 1);
        std::io::Write::write_all(&mut w, b"not a bam file at all").unwrap();
        w.close().unwrap();
    }
    let err = BamReader::new(bytes.as_slice()).unwrap_err();
    assert!(matches!(err, Error::BamHeader(bam_rs::header::Error::MissingMagic)));
}

#[test]
fn header_with_hd_not_first_is_rejected() {
    let err = BamHeader::parse_text("@SQ\tSN:chr1\tLN:10\n@HD\tVN:1.6\n").unwrap_err();
    assert_eq!(err, bam_rs::header::Error::HdNotFirst);
}

#[test]
fn bai_with_bad_magic_is_a_bai_error() {
    let err = BamIndex::parse(b"NOPE\x00\x00\x00\x00").unwrap_err();
    assert_eq!(err, bam_rs::bai::Error::MissingMagic);
}

#[test]
fn cigar_op_length_over_the_28_bit_limit_is_rejected() {
    let err = Cigar::from_string("300000000M").unwrap_err();
    assert!(matches!(err, bam_rs::cigar::Error::LengthTooLarge(_)));
}

#[test]
fn tag_stream_with_an_unknown_type_code_is_rejected() {
    // name "XX", bogus type code '?'
    let bytes = [b'X', b'X', b'?'];
    let err = tag::read_entry(&bytes).unwrap_err();
    assert!(matches!(err, tag::Error::UnknownType('?')));
}

#[test]
fn record_with_a_mismatched_block_size_is_rejected() {
    let mut r = Record::new();
    r.set_read_name("x");
    let mut bytes = r.to_bytes().to_vec();
    // Corrupt the declared block_size to not match the actual payload.
    bytes[0] = 0xFF;
    let err = Record::parse(&bytes).unwrap_err();
    assert!(matches!(err, bam_rs::record::Error::Truncated | bam_rs::record::Error::SizeMismatch { .. }));
}

#[test]
fn setting_a_non_iupac_base_is_rejected() {
    let mut r = Record::new();
    let err = r.set_sequence("ACGTZ", None).unwrap_err();
    assert!(matches!(err, bam_rs::record::Error::NotIupac('Z')));
}
