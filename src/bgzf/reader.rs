use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use super::backend::{DeflateBackend, Flate2Backend};
use super::error::Error;
use super::frame::{self, FixedHeader};
use super::virtual_offset::VirtualOffset;

const FIXED_HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 8;
pub const BGZF_BLOCK_SIZE: usize = 0xff00;
const DECOMPRESS_BUFSIZE: usize = 65_536;

/// A streaming BGZF block reader.
///
/// Wraps any [`Read`] source and yields decompressed block payloads, each
/// at most [`BGZF_BLOCK_SIZE`] bytes. Also implements [`Read`] itself,
/// concatenating block payloads transparently for callers that just want
/// a byte stream (e.g. the BAM record iterator).
#[derive(Debug)]
pub struct Reader<R> {
    inner: R,
    backend: Box<dyn DeflateBackend + Send + Sync>,
    compressed_pos: u64,
    current_block_coffset: u64,
    buf: Vec<u8>,
    buf_pos: usize,
    at_eof: bool,
    /// A single byte read past an empty block's trailer while probing for
    /// true stream-end, not yet consumed by a block read.
    pushback: Option<u8>,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_backend(inner, Box::new(Flate2Backend))
    }

    pub fn with_backend(inner: R, backend: Box<dyn DeflateBackend + Send + Sync>) -> Self {
        Reader {
            inner,
            backend,
            compressed_pos: 0,
            current_block_coffset: 0,
            buf: Vec::new(),
            buf_pos: 0,
            at_eof: false,
            pushback: None,
        }
    }

    /// The virtual offset of the next byte this reader will yield.
    pub fn virtual_offset(&self) -> VirtualOffset {
        VirtualOffset::new(self.current_block_coffset, self.buf_pos as u16)
    }

    /// Reads from the pushback byte (if any) then the underlying source.
    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.pushback.take() {
            buf[0] = b;
            return Ok(1);
        }
        self.inner.read(buf)
    }

    fn read_exact_tracked(&mut self, buf: &mut [u8], detail: &'static str) -> Result<(), Error> {
        let offset = self.compressed_pos;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .read_raw(&mut buf[filled..])
                .map_err(Error::Io)?;
            if n == 0 {
                return Err(Error::Truncated { offset, detail });
            }
            filled += n;
        }
        self.compressed_pos += buf.len() as u64;
        Ok(())
    }

    /// Reads and decodes a single BGZF block.
    ///
    /// Returns `Ok(None)` once the canonical EOF block has been consumed
    /// and no further bytes remain. Returns `Ok(Some(bytes))` for both
    /// real payload blocks and intermediate empty blocks so callers that
    /// need to distinguish can; [`Reader::fill_buf`] and
    /// [`Reader::read_until_next_block`] silently skip the latter.
    fn read_block(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let block_offset = self.compressed_pos;

        let mut first = [0u8; 1];
        match self.read_raw(&mut first) {
            Ok(0) => return Err(Error::MissingEofBlock),
            Ok(_) => {}
            Err(e) => return Err(Error::Io(e)),
        }
        self.compressed_pos += 1;

        let mut rest = [0u8; FIXED_HEADER_LEN - 1];
        self.read_exact_tracked(&mut rest, "gzip header")?;
        let mut fixed = [0u8; FIXED_HEADER_LEN];
        fixed[0] = first[0];
        fixed[1..].copy_from_slice(&rest);

        let FixedHeader { method, flags, xlen } = match frame::fixed_header(&fixed) {
            Ok((_, h)) => h,
            Err(_) => return Err(Error::BadMagic { offset: block_offset }),
        };
        if !frame::is_deflate_method(method) {
            return Err(Error::UnsupportedMethod {
                method,
                offset: block_offset as u8,
            });
        }
        if !frame::has_fextra(flags) {
            return Err(Error::MissingFextra { offset: block_offset });
        }
        if xlen < 6 {
            return Err(Error::XlenTooSmall { xlen, offset: block_offset });
        }

        let mut extra = vec![0u8; xlen as usize];
        self.read_exact_tracked(&mut extra, "gzip extra field")?;
        let bsize =
            frame::find_bsize(&extra).ok_or(Error::MissingBcSubfield { offset: block_offset })?;

        let deflate_len = (bsize as i64) - (xlen as i64) - 19;
        if deflate_len < 0 {
            return Err(Error::CorruptStoredBlock { offset: block_offset });
        }
        let deflate_len = deflate_len as usize;

        let mut body = vec![0u8; deflate_len];
        self.read_exact_tracked(&mut body, "deflate body")?;

        let decompressed = if deflate_len > 0 && body[0] & 0x07 == 0x01 {
            decode_stored_block(&body, block_offset)?
        } else if deflate_len == 0 {
            Vec::new()
        } else {
            self.backend
                .decompress(&body, DECOMPRESS_BUFSIZE)
                .map_err(|_| Error::CorruptStoredBlock { offset: block_offset })?
        };

        let mut trailer = [0u8; TRAILER_LEN];
        self.read_exact_tracked(&mut trailer, "block trailer")?;
        let expected_crc = LittleEndian::read_u32(&trailer[0..4]);
        let expected_isize = LittleEndian::read_u32(&trailer[4..8]);

        let actual_crc = self.backend.crc32(&decompressed);
        if actual_crc != expected_crc {
            return Err(Error::ChecksumMismatch {
                offset: block_offset,
                expected: expected_crc,
                actual: actual_crc,
            });
        }
        if decompressed.len() as u32 != expected_isize {
            return Err(Error::SizeMismatch {
                offset: block_offset,
                expected: expected_isize,
                actual: decompressed.len(),
            });
        }

        trace!(block_offset, len = decompressed.len(), "bgzf::read_block");

        if decompressed.is_empty() {
            // This may be the canonical EOF block. Probe one more byte: if
            // the stream truly ends here, stop cleanly; otherwise stash
            // the probed byte and keep going, since BGZF permits empty
            // non-terminal blocks.
            let mut probe = [0u8; 1];
            match self.read_raw(&mut probe) {
                Ok(0) => {
                    self.at_eof = true;
                    return Ok(None);
                }
                Ok(_) => {
                    self.pushback = Some(probe[0]);
                    return Ok(Some(Vec::new()));
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Ok(Some(decompressed))
    }

    /// Returns the remainder of the currently buffered block without
    /// crossing into the next one. If already at a block boundary, reads
    /// and returns exactly the next non-empty block (silently skipping
    /// any empty intermediate blocks).
    pub fn read_until_next_block(&mut self) -> Result<Vec<u8>, Error> {
        if self.buf_pos < self.buf.len() {
            let rest = self.buf[self.buf_pos..].to_vec();
            self.buf_pos = self.buf.len();
            return Ok(rest);
        }
        if self.at_eof {
            return Ok(Vec::new());
        }
        loop {
            self.current_block_coffset = self.compressed_pos;
            match self.read_block()? {
                None => return Ok(Vec::new()),
                Some(block) if block.is_empty() => continue,
                Some(block) => return Ok(block),
            }
        }
    }

    fn fill_buf(&mut self) -> Result<bool, Error> {
        if self.buf_pos < self.buf.len() {
            return Ok(true);
        }
        if self.at_eof {
            return Ok(false);
        }
        loop {
            self.current_block_coffset = self.compressed_pos;
            match self.read_block()? {
                None => return Ok(false),
                Some(block) if block.is_empty() => continue,
                Some(block) => {
                    self.buf = block;
                    self.buf_pos = 0;
                    return Ok(true);
                }
            }
        }
    }
}

/// Decodes a raw-DEFLATE "stored" (uncompressed) block by hand: header
/// byte (`BFINAL|BTYPE=00`), `LEN`, `~LEN`, then `LEN` literal bytes.
fn decode_stored_block(body: &[u8], block_offset: u64) -> Result<Vec<u8>, Error> {
    if body.len() < 5 {
        return Err(Error::CorruptStoredBlock { offset: block_offset });
    }
    let len = LittleEndian::read_u16(&body[1..3]);
    let nlen = LittleEndian::read_u16(&body[3..5]);
    if len != !nlen {
        return Err(Error::CorruptStoredBlock { offset: block_offset });
    }
    let len = len as usize;
    if body.len() < 5 + len {
        return Err(Error::CorruptStoredBlock { offset: block_offset });
    }
    Ok(body[5..5 + len].to_vec())
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let have = self
            .fill_buf()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if !have {
            return Ok(0);
        }
        let avail = &self.buf[self.buf_pos..];
        let n = avail.len().min(out.len());
        out[..n].copy_from_slice(&avail[..n]);
        self.buf_pos += n;
        Ok(n)
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<Vec<u8>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.current_block_coffset = self.compressed_pos;
            match self.read_block() {
                Ok(None) => return None,
                Ok(Some(block)) if block.is_empty() => continue,
                Ok(Some(block)) => return Some(Ok(block)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
