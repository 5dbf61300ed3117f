//! End-to-end reader/writer round trips over multiple records and
//! multiple BGZF blocks.

use bam_rs::cigar::Cigar;
use bam_rs::tag::Value;
use bam_rs::{BamHeader, BamReader, BamReference, BamWriter, Record};

fn reference_set() -> Vec<BamReference> {
    vec![
        BamReference { name: "chr1".to_string(), length: 248_956_422 },
        BamReference { name: "chr2".to_string(), length: 242_193_529 },
    ]
}

fn header() -> BamHeader {
    let mut h = BamHeader::new(reference_set());
    h.hd.insert("VN", "1.6");
    h.hd.insert("SO", "coordinate");
    let mut sq1 = bam_rs::header::TagLine::default();
    sq1.insert("SN", "chr1");
    sq1.insert("LN", "248956422");
    h.sq.push(sq1);
    h
}

fn make_record(name: &str, ref_id: i32, pos: i32, seq: &str) -> Record {
    let mut r = Record::new();
    r.set_ref_id(ref_id);
    r.set_pos(pos);
    r.set_mapq(60);
    r.set_flag(0);
    r.set_read_name(name);
    r.set_cigar(&Cigar::from_string(&format!("{}M", seq.len())).unwrap());
    r.set_sequence(seq, None).unwrap();
    r.set_tag(*b"NM", Value::UInt(0)).unwrap();
    r
}

#[test]
fn many_records_across_multiple_bgzf_blocks_round_trip_in_order() {
    let h = header();
    let mut bytes = Vec::new();
    let records: Vec<Record> = (0..500)
        .map(|i| make_record(&format!("read_{i}"), 0, i, "ACGTACGTACGT"))
        .collect();

    {
        let mut w = BamWriter::new(&mut bytes, &h, 6).unwrap();
        for r in &records {
            w.write_record(r).unwrap();
        }
        w.close().unwrap();
    }

    let reader = BamReader::new(bytes.as_slice()).unwrap();
    assert_eq!(reader.header().references.len(), 2);
    let read_back: Vec<Record> = reader.collect::<bam_rs::Result<_>>().unwrap();
    assert_eq!(read_back.len(), records.len());
    for (original, decoded) in records.iter().zip(read_back.iter()) {
        assert_eq!(original.read_name(), decoded.read_name());
        assert_eq!(original.pos(), decoded.pos());
        assert_eq!(original.sequence(), decoded.sequence());
    }
}

#[test]
fn header_tag_order_and_mandatory_fields_survive_a_round_trip() {
    let h = header();
    let bytes = h.to_bytes();
    let (parsed, rest) = BamHeader::parse(&bytes).unwrap();
    assert!(rest.is_empty());
    assert_eq!(
        parsed.hd.0,
        vec![
            ("VN".to_string(), "1.6".to_string()),
            ("SO".to_string(), "coordinate".to_string()),
        ]
    );
    assert_eq!(parsed.sq[0].get("SN").unwrap(), "chr1");
}

#[test]
fn mutating_a_record_after_reading_it_back_preserves_the_block_size_invariant() {
    let h = header();
    let mut bytes = Vec::new();
    {
        let mut w = BamWriter::new(&mut bytes, &h, 1).unwrap();
        w.write_record(&make_record("before", 0, 5, "ACGT")).unwrap();
        w.close().unwrap();
    }

    let mut records: Vec<Record> = BamReader::new(bytes.as_slice())
        .unwrap()
        .collect::<bam_rs::Result<_>>()
        .unwrap();
    let r = &mut records[0];
    r.set_read_name("after_a_much_longer_name");
    r.set_sequence("ACGTACGTACGTACGT", Some(&[30u8; 16])).unwrap();
    r.set_tag(*b"XX", Value::Text("extra".to_string())).unwrap();

    let reparsed = Record::parse(r.to_bytes()).unwrap().0;
    assert_eq!(reparsed.read_name(), "after_a_much_longer_name");
    assert_eq!(reparsed.sequence(), "ACGTACGTACGTACGT");
    assert_eq!(
        reparsed.get_tag(*b"XX").unwrap(),
        Some(Value::Text("extra".to_string()))
    );
}

#[test]
fn an_empty_stream_after_the_header_yields_no_records() {
    let h = header();
    let mut bytes = Vec::new();
    {
        let mut w = BamWriter::new(&mut bytes, &h, 1).unwrap();
        w.close().unwrap();
    }
    let reader = BamReader::new(bytes.as_slice()).unwrap();
    let records: Vec<Record> = reader.collect::<bam_rs::Result<_>>().unwrap();
    assert!(records.is_empty());
}
