//! Check-in code encoder
//!
//! Pure and synchronous: the same `(session_id, counter, secret, truncate_len)`
//! always yields the same string, so any number of rotations can encode
//! concurrently without sharing state.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hmac::{Hmac, Mac};
use integer_encoding::VarInt;
use sha1::Sha1;
use std::fmt;

use super::{check_truncate_len, CodeError};

type HmacSha1 = Hmac<Sha1>;

/// Standard alphabet, padding optional. Secrets in URL-safe form are
/// normalized to this alphabet before decoding.
const SECRET_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Shared HMAC key for a session.
///
/// Debug output never shows the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Decode a base64 secret as handed out by the session service.
    ///
    /// Accepts the standard and URL-safe alphabets, with or without padding.
    pub fn from_base64(encoded: &str) -> Result<Self, CodeError> {
        let normalized = encoded.trim().replace('-', "+").replace('_', "/");
        let bytes = SECRET_ENGINE
            .decode(normalized)
            .map_err(|e| CodeError::InvalidSecret(e.to_string()))?;
        Ok(Self::from_bytes(bytes))
    }

    /// Wrap raw key bytes. Any length is a valid HMAC key, including zero.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Full HMAC-SHA1 tag for an epoch counter.
    ///
    /// The message is the counter's 4-byte little-endian form; deployed
    /// verifiers compute the tag over exactly these bytes.
    pub(crate) fn tag(&self, counter: u32) -> Result<[u8; 20], CodeError> {
        let mut mac = HmacSha1::new_from_slice(&self.0)
            .map_err(|e| CodeError::InvalidSecret(e.to_string()))?;
        mac.update(&counter.to_le_bytes());
        let mut tag = [0u8; 20];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***, {} bytes)", self.0.len())
    }
}

/// Build the raw code bytes: `tag[..truncate_len] || varint(session_id) || varint(counter)`.
pub fn encode_bytes(
    session_id: u32,
    counter: u32,
    secret: &Secret,
    truncate_len: usize,
) -> Result<Vec<u8>, CodeError> {
    check_truncate_len(truncate_len)?;

    let tag = secret.tag(counter)?;
    let mut out = Vec::with_capacity(truncate_len + 2 * 5);
    out.extend_from_slice(&tag[..truncate_len]);
    out.extend_from_slice(&session_id.encode_var_vec());
    out.extend_from_slice(&counter.encode_var_vec());
    Ok(out)
}

/// Encode a check-in code as an unpadded base64url string.
pub fn encode(
    session_id: u32,
    counter: u32,
    secret: &Secret,
    truncate_len: usize,
) -> Result<String, CodeError> {
    let bytes = encode_bytes(session_id, counter, secret, truncate_len)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
