//! The crate-wide error type, unifying every module's error enum behind
//! one pattern-matchable enum.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    BgzfFormat(#[from] crate::bgzf::Error),
    #[error(transparent)]
    BamFormat(#[from] crate::record::Error),
    #[error(transparent)]
    BamHeader(#[from] crate::header::Error),
    #[error(transparent)]
    BaiFormat(#[from] crate::bai::Error),
    #[error(transparent)]
    CigarFormat(#[from] crate::cigar::Error),
    #[error(transparent)]
    TagFormat(#[from] crate::tag::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
