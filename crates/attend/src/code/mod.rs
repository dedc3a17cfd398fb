//! Rotating check-in code protocol
//!
//! A check-in code packs a truncated HMAC-SHA1 tag together with the session
//! id and the epoch counter it was derived for:
//!
//! ```text
//! ┌────────────────────────┬───────────────────┬──────────────────┐
//! │  HMAC-SHA1(counter)    │  varint(session)  │  varint(counter) │
//! │  (truncate_len bytes)  │  (1-5 bytes)      │  (1-5 bytes)     │
//! └────────────────────────┴───────────────────┴──────────────────┘
//! ```
//!
//! The bytes are rendered as unpadded base64url so the result can go straight
//! into a URL or a QR symbol. Codes are self-describing: a verifier only needs
//! the shared secret and `truncate_len` to check one.

mod codec;
mod verify;

pub use codec::{encode, encode_bytes, Secret};
pub use verify::{parse, CodeVerifier, ParsedCode, VerifyError};

use thiserror::Error;

/// Default number of HMAC bytes kept in a code
pub const DEFAULT_TRUNCATE_LEN: usize = 4;

/// HMAC-SHA1 output size, the upper bound for `truncate_len`
pub const MAX_TRUNCATE_LEN: usize = 20;

/// Longest encoded code accepted by the parser
pub const MAX_CODE_LEN: usize = 64;

/// Configuration and wire-format errors for check-in codes.
///
/// Secret and truncation errors are configuration faults and are never
/// retried.
#[derive(Debug, Error)]
pub enum CodeError {
    #[error("invalid secret: {0}")]
    InvalidSecret(String),
    #[error("truncate length {0} outside 1..=20")]
    TruncateLength(usize),
    #[error("code too long: {0} > 64 characters")]
    TooLong(usize),
    #[error("code is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("code truncated: {0}")]
    Truncated(&'static str),
    #[error("{0} does not fit in 32 bits")]
    Overflow(&'static str),
    #[error("{0} trailing bytes after counter")]
    TrailingBytes(usize),
}

pub(crate) fn check_truncate_len(truncate_len: usize) -> Result<(), CodeError> {
    if (1..=MAX_TRUNCATE_LEN).contains(&truncate_len) {
        Ok(())
    } else {
        Err(CodeError::TruncateLength(truncate_len))
    }
}
