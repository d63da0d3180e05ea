//! Core identity and call-context types shared by the kernel and every module.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed-point denominator for the supply index (`1.0 == SCALE`).
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator (`10_000 bp == 100%`).
pub const BASIS_POINTS: u32 = 10_000;

/// Seconds in one calendar day, used for the mint window.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Token decimals applied to whole-token configuration values.
pub const DECIMALS: u32 = 18;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Opaque identity of an account, module or policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap a raw identity string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the underlying identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty address never identifies a real party.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ---------------------------------------------------------------------------
// Keycode
// ---------------------------------------------------------------------------

/// Rejected keycode literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid keycode {raw:?}: must be exactly 5 ASCII upper-case letters")]
pub struct KeycodeError {
    /// The rejected input.
    pub raw: String,
}

/// Stable five-letter name of a module's logical role (e.g. `MINTR`).
///
/// Survives upgrades; the implementation address behind it does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Keycode([u8; 5]);

impl Keycode {
    /// Compile-time keycode for the crate's module constants.
    ///
    /// Only used to build `const` items, where an invalid literal fails the
    /// build instead of panicking. Runtime input goes through [`Keycode::new`].
    pub(crate) const fn literal(code: &[u8; 5]) -> Self {
        let valid = code[0].is_ascii_uppercase()
            && code[1].is_ascii_uppercase()
            && code[2].is_ascii_uppercase()
            && code[3].is_ascii_uppercase()
            && code[4].is_ascii_uppercase();
        assert!(valid, "keycode must be five ASCII upper-case letters");
        Self(*code)
    }

    /// Parse a keycode literal.
    ///
    /// # Errors
    ///
    /// Returns [`KeycodeError`] unless `raw` is exactly five ASCII upper-case letters.
    pub fn new(raw: &str) -> Result<Self, KeycodeError> {
        let bytes = raw.as_bytes();
        let code: [u8; 5] = bytes.try_into().map_err(|_| KeycodeError {
            raw: raw.to_owned(),
        })?;
        if !code.iter().all(u8::is_ascii_uppercase) {
            return Err(KeycodeError {
                raw: raw.to_owned(),
            });
        }
        Ok(Self(code))
    }

    /// Keycode as a string slice.
    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII upper-case bytes.
        std::str::from_utf8(&self.0).unwrap_or("?????")
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Keycode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Keycode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Keycode::new(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Name of a guarded module operation (e.g. `mint`, `debase`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(String);

impl Operation {
    /// Wrap an operation name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Operation name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Operation {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ---------------------------------------------------------------------------
// Call context
// ---------------------------------------------------------------------------

/// Who is calling and at what time.
///
/// The host supplies `now`; nothing in the crate reads the wall clock, so
/// rate windows and cooldowns are evaluated against this value only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Immediate caller of the operation.
    pub caller: Address,
    /// Host-supplied current time.
    pub now: DateTime<Utc>,
}

impl CallContext {
    /// Build a context for `caller` at `now`.
    pub fn new(caller: Address, now: DateTime<Utc>) -> Self {
        Self { caller, now }
    }

    /// Same time, different caller. Used when a policy or module forwards a call.
    pub fn forwarded_by(&self, caller: &Address) -> Self {
        Self {
            caller: caller.clone(),
            now: self.now,
        }
    }

    /// Absolute day index: `floor(unix_seconds / 86400)`.
    pub fn day_index(&self) -> i64 {
        self.now.timestamp().div_euclid(SECONDS_PER_DAY)
    }
}

/// Convert a whole-token amount into base units (`whole * 10^18`).
pub fn whole_tokens(whole: u64) -> Option<u128> {
    10_u128
        .checked_pow(DECIMALS)
        .and_then(|unit| u128::from(whole).checked_mul(unit))
}
