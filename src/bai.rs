//! BAI binary index: per-reference binning index, linear index, and the
//! reserved pseudo-bin (`37450`) summary statistics.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::bgzf::VirtualOffset;

pub const BAI_MAGIC: [u8; 4] = *b"BAI\x01";
const PSEUDO_BIN: u32 = 37450;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("missing BAI magic string")]
    MissingMagic,
    #[error("truncated BAI index")]
    Truncated,
    #[error("pseudo-bin {0} must have exactly 2 chunks, found {1}")]
    MalformedPseudoBin(u32, usize),
}

/// A single `(begin, end)` virtual-offset chunk referenced by a bin.
pub type Chunk = (VirtualOffset, VirtualOffset);

/// The index for one reference sequence: a binning index mapping bin id
/// to its chunk list, a linear index of per-16kbp-window virtual offsets,
/// and (if the reserved pseudo-bin was present) coverage statistics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContigIndex {
    pub binning_index: BTreeMap<u32, Vec<Chunk>>,
    pub linear_index: Vec<VirtualOffset>,
    pub reference_begin: Option<VirtualOffset>,
    pub reference_end: Option<VirtualOffset>,
    pub mapped_read_count: Option<u64>,
    pub unmapped_read_count: Option<u64>,
}

impl ContigIndex {
    pub fn parse(input: &[u8]) -> Result<(Self, &[u8]), Error> {
        let mut reader = ByteCursor::new(input);
        let n_bin = reader.read_u32()?;
        let mut binning_index = BTreeMap::new();
        for _ in 0..n_bin {
            let bin = reader.read_u32()?;
            let n_chunk = reader.read_u32()?;
            let mut chunks = Vec::with_capacity(n_chunk as usize);
            for _ in 0..n_chunk {
                let begin = VirtualOffset::from_raw(reader.read_u64()?);
                let end = VirtualOffset::from_raw(reader.read_u64()?);
                chunks.push((begin, end));
            }
            binning_index.insert(bin, chunks);
        }
        let n_intv = reader.read_u32()?;
        let mut linear_index = Vec::with_capacity(n_intv as usize);
        for _ in 0..n_intv {
            linear_index.push(VirtualOffset::from_raw(reader.read_u64()?));
        }

        let mut index = ContigIndex {
            binning_index,
            linear_index,
            ..Default::default()
        };

        if let Some(pseudo) = index.binning_index.remove(&PSEUDO_BIN) {
            if pseudo.len() != 2 {
                return Err(Error::MalformedPseudoBin(PSEUDO_BIN, pseudo.len()));
            }
            let (reference_begin, reference_end) = pseudo[0];
            let (mapped, unmapped) = pseudo[1];
            index.reference_begin = Some(reference_begin);
            index.reference_end = Some(reference_end);
            index.mapped_read_count = Some(mapped.to_raw());
            index.unmapped_read_count = Some(unmapped.to_raw());
        }

        Ok((index, reader.remainder()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut bins = self.binning_index.clone();
        if let (Some(begin), Some(end), Some(mapped), Some(unmapped)) = (
            self.reference_begin,
            self.reference_end,
            self.mapped_read_count,
            self.unmapped_read_count,
        ) {
            bins.insert(
                PSEUDO_BIN,
                vec![
                    (begin, end),
                    (VirtualOffset::from_raw(mapped), VirtualOffset::from_raw(unmapped)),
                ],
            );
        }
        out.extend_from_slice(&(bins.len() as u32).to_le_bytes());
        for (bin, chunks) in &bins {
            out.extend_from_slice(&bin.to_le_bytes());
            out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
            for (begin, end) in chunks {
                out.extend_from_slice(&begin.to_raw().to_le_bytes());
                out.extend_from_slice(&end.to_raw().to_le_bytes());
            }
        }
        out.extend_from_slice(&(self.linear_index.len() as u32).to_le_bytes());
        for offset in &self.linear_index {
            out.extend_from_slice(&offset.to_raw().to_le_bytes());
        }
        out
    }
}

/// The complete BAI index for a BAM file: one [`ContigIndex`] per
/// reference, plus the optional trailing count of unplaced unmapped reads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BamIndex {
    pub contigs: Vec<ContigIndex>,
    pub unplaced_unmapped_count: Option<u64>,
}

impl BamIndex {
    pub fn parse(input: &[u8]) -> Result<Self, Error> {
        if input.len() < 8 || input[..4] != BAI_MAGIC {
            return Err(Error::MissingMagic);
        }
        let n_ref = LittleEndian::read_u32(&input[4..8]);
        let mut rest = &input[8..];
        let mut contigs = Vec::with_capacity(n_ref as usize);
        for _ in 0..n_ref {
            let (contig, r) = ContigIndex::parse(rest)?;
            contigs.push(contig);
            rest = r;
        }
        let unplaced_unmapped_count = if rest.len() >= 8 {
            Some(LittleEndian::read_u64(rest))
        } else {
            None
        };
        Ok(BamIndex {
            contigs,
            unplaced_unmapped_count,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&BAI_MAGIC);
        out.extend_from_slice(&(self.contigs.len() as u32).to_le_bytes());
        for contig in &self.contigs {
            out.extend_from_slice(&contig.to_bytes());
        }
        if let Some(n) = self.unplaced_unmapped_count {
            out.extend_from_slice(&n.to_le_bytes());
        }
        out
    }
}

/// A minimal big-endian-free cursor over a byte slice, local to this
/// module: BAI fields are all fixed-width little-endian integers, so a
/// full `nom` parser combinator chain would only add ceremony.
struct ByteCursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        ByteCursor { input, pos: 0 }
    }

    fn require(&self, n: usize) -> Result<(), Error> {
        if self.input.len() - self.pos < n {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        self.require(4)?;
        let v = LittleEndian::read_u32(&self.input[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    fn read_u64(&mut self) -> Result<u64, Error> {
        self.require(8)?;
        let v = LittleEndian::read_u64(&self.input[self.pos..]);
        self.pos += 8;
        Ok(v)
    }

    fn remainder(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }
}
