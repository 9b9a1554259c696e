//! Token fingerprints
//!
//! Provides [`TokenFingerprint`], a 32-byte Blake3 digest of a bearer token.
//! Caches and logs carry the fingerprint, never the token itself.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte Blake3 digest of a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenFingerprint([u8; 32]);

impl TokenFingerprint {
    /// Create from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint a token
    #[inline]
    #[must_use]
    pub fn compute(token: &str) -> Self {
        Self(*blake3::hash(token.as_bytes()).as_bytes())
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars), safe for logs
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for TokenFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for TokenFingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(FingerprintError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Fingerprint parse errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FingerprintError {
    /// Wrong digest length
    #[error("invalid fingerprint length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Not hex
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_token_same_fingerprint() {
        assert_eq!(
            TokenFingerprint::compute("abc.def.ghi"),
            TokenFingerprint::compute("abc.def.ghi")
        );
        assert_ne!(
            TokenFingerprint::compute("abc.def.ghi"),
            TokenFingerprint::compute("abc.def.ghj")
        );
    }

    #[test]
    fn display_does_not_leak_token() {
        let fp = TokenFingerprint::compute("secret-token");
        assert!(!fp.to_string().contains("secret"));
        assert_eq!(fp.to_string().len(), 64);
        assert_eq!(fp.short().len(), 16);
    }

    #[test]
    fn parse_hex() {
        let fp = TokenFingerprint::compute("t");
        assert_eq!(fp.to_string().parse::<TokenFingerprint>().unwrap(), fp);
        assert!(matches!(
            "abcd".parse::<TokenFingerprint>(),
            Err(FingerprintError::InvalidLength { .. })
        ));
        assert!(matches!(
            "zz".parse::<TokenFingerprint>(),
            Err(FingerprintError::InvalidHex(_))
        ));
    }

    #[test]
    fn parse_errors_compare_and_clone() {
        let err = "abc".parse::<TokenFingerprint>().unwrap_err();
        assert_eq!(err.clone(), FingerprintError::InvalidHex(hex::FromHexError::OddLength));
        assert_ne!(
            err,
            FingerprintError::InvalidLength {
                expected: 32,
                actual: 1
            }
        );
    }
}
