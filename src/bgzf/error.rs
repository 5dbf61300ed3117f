use thiserror::Error;

/// Errors produced by the BGZF block codec.
///
/// Split into format violations (a block that is present but malformed)
/// and truncation (a block that ends, or the stream that ends, before the
/// framing promised it would).
#[derive(Error, Debug)]
pub enum Error {
    #[error("bad gzip magic bytes at offset {offset}")]
    BadMagic { offset: u64 },
    #[error("unsupported compression method {method} at offset {offset}")]
    UnsupportedMethod { method: u8, offset: u8 },
    #[error("gzip FEXTRA flag not set at offset {offset}")]
    MissingFextra { offset: u64 },
    #[error("missing BC subfield in extra field at offset {offset}")]
    MissingBcSubfield { offset: u64 },
    #[error("XLEN too small ({xlen}) at offset {offset}")]
    XlenTooSmall { xlen: u16, offset: u64 },
    #[error("corrupt stored (non-compressed) DEFLATE block at offset {offset}")]
    CorruptStoredBlock { offset: u64 },
    #[error("CRC32 mismatch in block at offset {offset}: expected {expected:x}, got {actual:x}")]
    ChecksumMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },
    #[error("ISIZE mismatch in block at offset {offset}: header said {expected}, got {actual}")]
    SizeMismatch {
        offset: u64,
        expected: u32,
        actual: usize,
    },
    #[error("uncompressed payload of {len} bytes exceeds BGZF block limit")]
    PayloadTooLarge { len: usize },
    #[error("truncated BGZF stream at offset {offset}: {detail}")]
    Truncated { offset: u64, detail: &'static str },
    #[error("BGZF stream is missing its terminal EOF block")]
    MissingEofBlock,
    #[error("writer is closed")]
    WriterClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("DEFLATE decompression failed: {0}")]
    Inflate(String),
    #[error("DEFLATE compression failed: {0}")]
    Deflate(String),
}
