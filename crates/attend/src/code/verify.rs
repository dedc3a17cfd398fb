//! Check-in code parsing and verification
//!
//! Verification needs no per-code state: the counter and session id travel in
//! the code itself, so the verifier recomputes the tag for the embedded
//! counter and checks that the submission time falls inside the epoch during
//! which a rotation displays that counter, widened by a jitter window on both
//! sides.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use integer_encoding::VarInt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

use super::{check_truncate_len, CodeError, Secret, MAX_CODE_LEN};

const CODE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Fields recovered from a check-in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCode {
    /// Truncated HMAC tag, `truncate_len` bytes
    pub digest: Vec<u8>,
    pub session_id: u32,
    pub counter: u32,
}

/// Split a code into its tag, session id and counter.
///
/// `truncate_len` is the deployment-wide tag length; the varints are decoded
/// from the position right after the tag.
pub fn parse(code: &str, truncate_len: usize) -> Result<ParsedCode, CodeError> {
    check_truncate_len(truncate_len)?;
    if code.len() > MAX_CODE_LEN {
        return Err(CodeError::TooLong(code.len()));
    }

    let bytes = CODE_ENGINE.decode(code)?;
    if bytes.len() < truncate_len {
        return Err(CodeError::Truncated("digest"));
    }
    let (digest, rest) = bytes.split_at(truncate_len);

    let (session_id, used) = read_u32(rest, "session id")?;
    let rest = &rest[used..];
    let (counter, used) = read_u32(rest, "counter")?;
    let rest = &rest[used..];

    if !rest.is_empty() {
        return Err(CodeError::TrailingBytes(rest.len()));
    }

    Ok(ParsedCode {
        digest: digest.to_vec(),
        session_id,
        counter,
    })
}

fn read_u32(buf: &[u8], field: &'static str) -> Result<(u32, usize), CodeError> {
    let (value, used) = u64::decode_var(buf).ok_or(CodeError::Truncated(field))?;
    let value = u32::try_from(value).map_err(|_| CodeError::Overflow(field))?;
    Ok((value, used))
}

/// Reasons a submitted code is refused.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed code: {0}")]
    Malformed(#[from] CodeError),
    #[error("digest mismatch for counter {counter}")]
    DigestMismatch { counter: u32 },
    #[error(
        "code out of time window ({} ms > jitter window, {} ms)",
        .distance.as_millis(),
        .jitter_window.as_millis()
    )]
    OutOfWindow {
        distance: Duration,
        jitter_window: Duration,
    },
}

/// Checks codes for one session secret.
#[derive(Debug, Clone)]
pub struct CodeVerifier {
    secret: Secret,
    truncate_len: usize,
    t0: SystemTime,
    tx: Duration,
    jitter_window: Duration,
}

impl CodeVerifier {
    pub fn new(
        secret: Secret,
        truncate_len: usize,
        t0: SystemTime,
        tx: Duration,
        jitter_window: Duration,
    ) -> Result<Self, CodeError> {
        check_truncate_len(truncate_len)?;
        Ok(Self {
            secret,
            truncate_len,
            t0,
            tx,
            jitter_window,
        })
    }

    /// Verify `code` as submitted at `submitted_at`.
    ///
    /// Returns the parsed fields on success so the caller can resolve the
    /// session id.
    pub fn verify(&self, code: &str, submitted_at: SystemTime) -> Result<ParsedCode, VerifyError> {
        let parsed = parse(code, self.truncate_len)?;

        let tag = self.secret.tag(parsed.counter)?;
        let expected = &tag[..self.truncate_len];
        if !bool::from(expected.ct_eq(parsed.digest.as_slice())) {
            debug!(counter = parsed.counter, "check-in code digest mismatch");
            return Err(VerifyError::DigestMismatch {
                counter: parsed.counter,
            });
        }

        let distance = self.window_distance(parsed.counter, submitted_at);
        if distance > self.jitter_window {
            return Err(VerifyError::OutOfWindow {
                distance,
                jitter_window: self.jitter_window,
            });
        }

        Ok(parsed)
    }

    /// How far `at` lies outside the display period of `counter`.
    ///
    /// A rotation emits code `counter` on the boundary that opens epoch
    /// `counter - 1` and replaces it one epoch later, so the period is
    /// `[t0 + (counter-1)*tx, t0 + counter*tx]`. Zero inside it; saturates to
    /// `Duration::MAX` when the period is not representable.
    fn window_distance(&self, counter: u32, at: SystemTime) -> Duration {
        let end = self
            .tx
            .checked_mul(counter)
            .and_then(|offset| self.t0.checked_add(offset));
        let start = end.and_then(|end| end.checked_sub(self.tx));

        let (Some(start), Some(end)) = (start, end) else {
            return Duration::MAX;
        };

        if at < start {
            start.duration_since(at).unwrap_or_default()
        } else if at > end {
            at.duration_since(end).unwrap_or_default()
        } else {
            Duration::ZERO
        }
    }
}
