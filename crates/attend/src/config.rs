//! Session configuration
//!
//! Values normally come from the session service. Binaries load them from
//! environment variables via [`RotationConfig::from_env`]; both structs are
//! also serde-deserializable for callers that carry their own config source.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::code::{Secret, DEFAULT_TRUNCATE_LEN, MAX_TRUNCATE_LEN};

/// Default epoch length
pub const DEFAULT_TX: Duration = Duration::from_secs(1);

/// Default tolerance around an epoch when verifying
pub const DEFAULT_JITTER_WINDOW: Duration = Duration::from_millis(300);

/// A string wrapper that redacts its contents in Debug output.
///
/// Serializes/deserializes transparently as a plain string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedactedString(pub String);

impl fmt::Debug for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"***\"")
    }
}

impl From<&str> for RedactedString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Parameters of one presenter-side code rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Base64 session secret
    pub secret: RedactedString,
    pub session_id: u32,
    /// Reference instant epochs are counted from
    pub t0: SystemTime,
    /// Epoch length
    pub tx: Duration,
    /// HMAC bytes kept per code, 1..=20
    #[serde(default = "default_truncate_len")]
    pub truncate_len: usize,
}

fn default_truncate_len() -> usize {
    DEFAULT_TRUNCATE_LEN
}

impl RotationConfig {
    pub fn new(secret: &str, session_id: u32, t0: SystemTime, tx: Duration) -> Self {
        Self {
            secret: secret.into(),
            session_id,
            t0,
            tx,
            truncate_len: DEFAULT_TRUNCATE_LEN,
        }
    }

    /// Load from `ATTEND_*` environment variables.
    ///
    /// - `ATTEND_SECRET` (required): base64 session secret
    /// - `ATTEND_SESSION_ID` (required)
    /// - `ATTEND_T0_MS`: reference instant, unix milliseconds (default: now)
    /// - `ATTEND_TX_MS`: epoch length in milliseconds (default: 1000)
    /// - `ATTEND_TRUNCATE_LEN`: HMAC bytes per code (default: 4)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source using the `ATTEND_*` names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("ATTEND_SECRET").context("ATTEND_SECRET not set")?;
        let session_id = lookup("ATTEND_SESSION_ID").context("ATTEND_SESSION_ID not set")?;
        let session_id = parse_value::<u32>("ATTEND_SESSION_ID", &session_id)?;

        let t0 = match lookup("ATTEND_T0_MS") {
            Some(ms) => UNIX_EPOCH + Duration::from_millis(parse_value("ATTEND_T0_MS", &ms)?),
            None => SystemTime::now(),
        };

        let tx = match lookup("ATTEND_TX_MS") {
            Some(ms) => Duration::from_millis(parse_value("ATTEND_TX_MS", &ms)?),
            None => DEFAULT_TX,
        };

        let truncate_len = match lookup("ATTEND_TRUNCATE_LEN") {
            Some(n) => parse_value("ATTEND_TRUNCATE_LEN", &n)?,
            None => DEFAULT_TRUNCATE_LEN,
        };

        let config = Self {
            secret: RedactedString(secret),
            session_id,
            t0,
            tx,
            truncate_len,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values no rotation can run with.
    pub fn validate(&self) -> Result<()> {
        if self.tx.is_zero() {
            bail!("Epoch length must be positive");
        }
        if !(1..=MAX_TRUNCATE_LEN).contains(&self.truncate_len) {
            bail!(
                "Truncate length {} outside 1..={}",
                self.truncate_len,
                MAX_TRUNCATE_LEN
            );
        }
        Ok(())
    }

    /// Decode the session secret.
    pub fn secret(&self) -> Result<Secret> {
        Secret::from_base64(&self.secret.0).context("Invalid session secret")
    }
}

/// Verifier-side tolerance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// How far outside its epoch a code is still accepted
    pub jitter_window: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            jitter_window: DEFAULT_JITTER_WINDOW,
        }
    }
}

impl VerifierConfig {
    /// Load from the environment: `ATTEND_JITTER_MS` (default: 300).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jitter_window = match lookup("ATTEND_JITTER_MS") {
            Some(ms) => Duration::from_millis(parse_value("ATTEND_JITTER_MS", &ms)?),
            None => DEFAULT_JITTER_WINDOW,
        };
        Ok(Self { jitter_window })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid {} value {:?}", key, raw))
}
