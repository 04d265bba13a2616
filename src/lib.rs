pub mod tools;
pub mod tree_huff;

type DYNERR = Box<dyn std::error::Error>;

/// Compression Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("file format mismatch")]
    FileFormatMismatch,
    #[error("file too large")]
    FileTooLarge,
    #[error("stream too short for header")]
    MissingHeader,
    #[error("illegal header starts with {0:#010x}")]
    BadHeader(u32),
    #[error("failed to read bits of the tree")]
    TruncatedTree,
    #[error("tree nesting exceeds any possible alphabet")]
    TreeTooDeep,
    #[error("symbol {0} is out of range")]
    BadSymbol(u16),
    #[error("bad input, no end of stream symbol")]
    TruncatedBody,
    #[error("no code for symbol {0}")]
    MissingCode(u16),
    #[error("no symbols to build a tree from")]
    NoSymbols
}

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// starting position in the input file
    pub in_offset: u64,
    /// starting position in the output file
    pub out_offset: u64,
    /// return error if file is larger
    pub max_file_size: u64
}

pub const STD_OPTIONS: Options = Options {
    in_offset: 0,
    out_offset: 0,
    max_file_size: u32::MAX as u64
};
