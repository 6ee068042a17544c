//! Protocol error types.

use crate::frame::Verb;
use thiserror::Error;

/// Errors raised while encoding or decoding XRAP frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unexpected message signature {0:04X}")]
    InvalidSignature(u16),

    #[error("unexpected response code {command} for {verb} method")]
    UnknownResponseCode { verb: Verb, command: u8 },

    #[error("unknown command code {0}")]
    UnknownCommand(u8),

    #[error("malformed frame: need {needed} bytes, {remaining} remaining")]
    MalformedFrame { needed: usize, remaining: usize },

    #[error("negative length field: {0}")]
    NegativeLength(i32),

    #[error("string too long for short-string field: {len} bytes (max {max})")]
    StringTooLong { len: usize, max: usize },

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("{0} trailing bytes after request")]
    TrailingBytes(usize),
}
