//! Block-framed DEFLATE with per-block compressed-size metadata (BGZF).

mod backend;
mod error;
mod frame;
mod reader;
mod virtual_offset;
mod writer;

pub use backend::{DeflateBackend, Flate2Backend};
pub use error::Error;
pub use reader::{Reader, BGZF_BLOCK_SIZE};
pub use virtual_offset::VirtualOffset;
pub use writer::{Writer, EOF_BLOCK};
