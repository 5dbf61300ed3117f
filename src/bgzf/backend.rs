//! Injectable DEFLATE/CRC backend.
//!
//! The BGZF codec depends on a byte-in/byte-out compress/decompress/crc32
//! interface rather than a concrete DEFLATE implementation, so alternate
//! backends (e.g. a SIMD DEFLATE) can be swapped in without touching the
//! framing logic. The default backend wraps `flate2`.

use flate2::{Compression, Crc};

use super::error::Error;

/// Compress/decompress/checksum primitives used by the BGZF codec.
///
/// All operations work on raw DEFLATE streams (`wbits = -15`, i.e. no
/// zlib or gzip wrapper) since the gzip framing is handled by the BGZF
/// layer itself.
pub trait DeflateBackend: std::fmt::Debug {
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, Error>;
    fn decompress(&self, data: &[u8], size_hint: usize) -> Result<Vec<u8>, Error>;
    fn crc32(&self, data: &[u8]) -> u32;
}

/// Default backend, built on `flate2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Flate2Backend;

impl DeflateBackend for Flate2Backend {
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, Error> {
        let mut compress =
            flate2::Compress::new(Compression::new(level), false);
        // Worst-case DEFLATE expansion for incompressible input, plus slack
        // for the stream terminator. `compress_vec` only ever writes into
        // the vec's existing spare capacity, so undersizing this silently
        // truncates the output instead of erroring.
        let mut out = Vec::with_capacity(data.len() + data.len() / 1000 + 64);
        loop {
            let consumed = compress.total_in() as usize;
            let status = compress
                .compress_vec(&data[consumed..], &mut out, flate2::FlushCompress::Finish)
                .map_err(|e| Error::Deflate(e.to_string()))?;
            if status == flate2::Status::StreamEnd {
                break;
            }
            out.reserve(out.capacity().max(4096));
        }
        Ok(out)
    }

    fn decompress(&self, data: &[u8], size_hint: usize) -> Result<Vec<u8>, Error> {
        let mut decompress = flate2::Decompress::new(false);
        let mut out = Vec::with_capacity(size_hint.max(64));
        loop {
            let consumed = decompress.total_in() as usize;
            let status = decompress
                .decompress_vec(&data[consumed..], &mut out, flate2::FlushDecompress::Finish)
                .map_err(|e| Error::Inflate(e.to_string()))?;
            if status == flate2::Status::StreamEnd {
                break;
            }
            out.reserve(out.capacity().max(4096));
        }
        Ok(out)
    }

    fn crc32(&self, data: &[u8]) -> u32 {
        let mut crc = Crc::new();
        crc.update(data);
        crc.sum()
    }
}
