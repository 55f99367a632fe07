use thiserror::Error;

/// Errors raised by the byte-level primitives.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("variable-length integer wider than 8 bytes")]
    VintTooWide,

    #[error("value {0} does not fit in a variable-length integer")]
    VintOverflow(u64),

    #[error("{0:#x} is not a canonically encoded EBML element id")]
    InvalidElementId(u64),
}
