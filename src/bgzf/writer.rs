use std::io::{self, Write};

use tracing::trace;

use super::backend::{DeflateBackend, Flate2Backend};
use super::error::Error;
use super::reader::BGZF_BLOCK_SIZE;

/// Fixed bytes common to every BGZF block: gzip header with FEXTRA set,
/// the `BC` extra subfield header (`SI1 SI2 SLEN`), leaving only the
/// `BSIZE` payload to be filled in per block.
const BASE_HEADER: [u8; 16] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
];

/// The canonical 28-byte empty BGZF block that terminates a well-formed
/// stream.
pub const EOF_BLOCK: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Buffers uncompressed bytes and flushes them as BGZF blocks.
pub struct Writer<W: Write> {
    inner: Option<W>,
    backend: Box<dyn DeflateBackend + Send + Sync>,
    level: u32,
    buf: Vec<u8>,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W, level: u32) -> Self {
        Self::with_backend(inner, level, Box::new(Flate2Backend))
    }

    pub fn with_backend(inner: W, level: u32, backend: Box<dyn DeflateBackend + Send + Sync>) -> Self {
        Writer {
            inner: Some(inner),
            backend,
            level,
            buf: Vec::with_capacity(BGZF_BLOCK_SIZE),
        }
    }

    fn inner_mut(&mut self) -> Result<&mut W, Error> {
        self.inner.as_mut().ok_or(Error::WriterClosed)
    }

    /// Writes an externally provided buffer (at most [`BGZF_BLOCK_SIZE`]
    /// bytes) as a single block immediately, bypassing the internal
    /// buffer.
    pub fn write_block(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > BGZF_BLOCK_SIZE {
            return Err(Error::PayloadTooLarge { len: data.len() });
        }
        let crc = self.backend.crc32(data);
        let (body, deflate_header_extra) = if self.level == 0 {
            (encode_stored_block(data), 0)
        } else {
            (self.backend.compress(data, self.level)?, 0)
        };
        let _ = deflate_header_extra;

        let bsize = (body.len() as u64) + 25;
        if bsize > u16::MAX as u64 {
            return Err(Error::PayloadTooLarge { len: data.len() });
        }

        let out = self.inner_mut()?;
        out.write_all(&BASE_HEADER)?;
        out.write_all(&(bsize as u16).to_le_bytes())?;
        out.write_all(&body)?;
        out.write_all(&crc.to_le_bytes())?;
        out.write_all(&(data.len() as u32).to_le_bytes())?;
        trace!(len = data.len(), compressed = body.len(), "bgzf::flush");
        Ok(())
    }

    /// Buffers `data`, flushing whenever the buffer reaches
    /// [`BGZF_BLOCK_SIZE`]. Data larger than a single block is fragmented
    /// across as many blocks as needed.
    pub fn write_buffered(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let space = BGZF_BLOCK_SIZE - self.buf.len();
            let take = space.min(remaining.len());
            self.buf.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            if self.buf.len() == BGZF_BLOCK_SIZE {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<(), Error> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.buf);
        self.write_block(&data)?;
        self.buf = Vec::with_capacity(BGZF_BLOCK_SIZE);
        Ok(())
    }

    pub fn flush_bgzf(&mut self) -> Result<(), Error> {
        self.flush_block()
    }

    /// Flushes any pending bytes and writes the terminal EOF block,
    /// releasing the underlying writer.
    pub fn close(&mut self) -> Result<(), Error> {
        self.flush_block()?;
        if let Some(mut inner) = self.inner.take() {
            inner.write_all(&EOF_BLOCK)?;
            inner.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_buffered(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Hand-rolls a raw-DEFLATE stored block: header byte with BFINAL=1 and
/// BTYPE=00, `LEN`, `~LEN`, then the literal bytes. Used at compression
/// level 0, since not every backend's "no compression" mode emits this
/// exact framing.
fn encode_stored_block(data: &[u8]) -> Vec<u8> {
    let len = data.len() as u16;
    let mut out = Vec::with_capacity(5 + data.len());
    out.push(0x01); // BFINAL=1, BTYPE=00
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&(!len).to_le_bytes());
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::reader::Reader;
    use std::io::Read;

    #[test]
    fn ends_with_canonical_eof_block() {
        let mut out = Vec::new();
        {
            let mut w = Writer::new(&mut out, 1);
            w.write_all(b"abc").unwrap();
            w.close().unwrap();
        }
        assert_eq!(&out[out.len() - 28..], &EOF_BLOCK[..]);
    }

    #[test]
    fn large_payload_fragments_across_blocks() {
        let data = vec![7u8; BGZF_BLOCK_SIZE * 3 + 123];
        let mut out = Vec::new();
        {
            let mut w = Writer::new(&mut out, 6);
            w.write_all(&data).unwrap();
            w.close().unwrap();
        }
        let mut r = Reader::new(out.as_slice());
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn double_close_is_a_no_op() {
        let mut out = Vec::new();
        let mut w = Writer::new(&mut out, 1);
        w.write_all(b"x").unwrap();
        w.close().unwrap();
        w.close().unwrap();
    }
}
