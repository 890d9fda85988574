// error.rs - The single diagnostic error type surfaced to callers.

use thiserror::Error;

/// Everything that can go fatally wrong while loading or running a program.
///
/// Every variant carries enough context for a one-line diagnostic (§7 of the
/// spec); none of it is meant to be pattern-matched by callers beyond the
/// top-level `main`, which only needs `Display` and an exit code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid character at position {pos}")]
    InvalidByte { pos: u32 },

    #[error("not a valid Malbolge program")]
    TooFewBytes,

    #[error("error: invalid instruction in step {step}")]
    InvalidInstruction { step: u64 },

    #[error("cannot apply xlat2")]
    Xlat2OutOfRange,

    #[error("maximal supported rotation width exceeded")]
    RotationWidthOverflow,

    #[error("invalid unicode codepoint")]
    InvalidCodepoint,

    #[error("invalid utf-8 encoding while reading from stdin")]
    InvalidUtf8,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
