//! bcrypt parameters: version, cost and salt.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::BcryptError;

/// Salt length required by bcrypt.
pub const SALT_BYTES: usize = 16;

/// Capacity of the guest output region. Enough for any encoded hash.
pub const OUTPUT_BYTES: usize = 100;

/// Size of the region the guest writes the output length into.
pub const OUTPUT_LEN_BYTES: usize = 8;

/// Size of the region the guest writes the match flag into.
pub const MATCHES_BYTES: usize = 4;

/// Work factor used when none is given.
pub const DEFAULT_COST: u32 = 12;

/// bcrypt hash format versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BcryptVersion {
    /// `$2a$`
    #[serde(rename = "2a")]
    TwoA,
    /// `$2x$`
    #[serde(rename = "2x")]
    TwoX,
    /// `$2y$`
    #[serde(rename = "2y")]
    TwoY,
    /// `$2b$`
    #[default]
    #[serde(rename = "2b")]
    TwoB,
}

impl BcryptVersion {
    /// All versions.
    pub const ALL: [BcryptVersion; 4] = [
        BcryptVersion::TwoA,
        BcryptVersion::TwoX,
        BcryptVersion::TwoY,
        BcryptVersion::TwoB,
    ];

    /// The ASCII letter the guest receives for this version.
    pub fn tag(&self) -> u8 {
        match self {
            BcryptVersion::TwoA => b'a',
            BcryptVersion::TwoX => b'x',
            BcryptVersion::TwoY => b'y',
            BcryptVersion::TwoB => b'b',
        }
    }

    /// Version string as it appears in an encoded hash.
    pub fn as_str(&self) -> &'static str {
        match self {
            BcryptVersion::TwoA => "2a",
            BcryptVersion::TwoX => "2x",
            BcryptVersion::TwoY => "2y",
            BcryptVersion::TwoB => "2b",
        }
    }
}

impl fmt::Display for BcryptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BcryptVersion {
    type Err = BcryptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BcryptVersion::ALL
            .into_iter()
            .find(|version| version.as_str() == s)
            .ok_or_else(|| BcryptError::InvalidVersion(s.to_string()))
    }
}

/// Parameters for a single hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BcryptParams {
    /// Hash format version.
    pub version: BcryptVersion,
    /// Work factor. Passed to the guest as-is; the guest enforces its range.
    pub cost: u32,
}

impl Default for BcryptParams {
    fn default() -> Self {
        Self {
            version: BcryptVersion::TwoB,
            cost: DEFAULT_COST,
        }
    }
}

impl BcryptParams {
    /// Create parameters with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the work factor.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: BcryptVersion) -> Self {
        self.version = version;
        self
    }
}

/// A 16-byte bcrypt salt.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_BYTES]);

impl Salt {
    /// Draw a salt from the operating system's CSPRNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The raw salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_BYTES] {
        &self.0
    }
}

impl From<[u8; SALT_BYTES]> for Salt {
    fn from(bytes: [u8; SALT_BYTES]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Salt {
    type Error = BcryptError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SALT_BYTES] =
            bytes
                .try_into()
                .map_err(|_| BcryptError::InvalidSaltLength {
                    expected: SALT_BYTES,
                    actual: bytes.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_tags() {
        let tags: Vec<u8> = BcryptVersion::ALL.iter().map(|v| v.tag()).collect();
        assert_eq!(tags, b"axyb");
        assert_eq!(BcryptVersion::default(), BcryptVersion::TwoB);
    }

    #[test]
    fn test_version_parse() {
        for version in BcryptVersion::ALL {
            assert_eq!(version.to_string().parse::<BcryptVersion>().unwrap(), version);
        }
        assert!(matches!(
            "2c".parse::<BcryptVersion>(),
            Err(BcryptError::InvalidVersion(v)) if v == "2c"
        ));
    }

    #[test]
    fn test_version_serde() {
        let json = serde_json::to_string(&BcryptVersion::TwoY).unwrap();
        assert_eq!(json, "\"2y\"");
        let params: BcryptParams = serde_json::from_str(r#"{"cost": 10}"#).unwrap();
        assert_eq!(params, BcryptParams::new().with_cost(10));
    }

    #[test]
    fn test_default_params() {
        let params = BcryptParams::default();
        assert_eq!(params.version, BcryptVersion::TwoB);
        assert_eq!(params.cost, DEFAULT_COST);
    }

    #[test]
    fn test_salt_length_checked() {
        assert!(Salt::try_from(&b"saltsaltsaltsalt"[..]).is_ok());
        for len in [0, 15, 17, 64] {
            let bytes = vec![0u8; len];
            assert!(matches!(
                Salt::try_from(bytes.as_slice()),
                Err(BcryptError::InvalidSaltLength { expected: 16, actual }) if actual == len
            ));
        }
    }

    #[test]
    fn test_random_salts_differ() {
        assert_ne!(Salt::random(), Salt::random());
        assert_eq!(format!("{:?}", Salt::random()), "Salt(..)");
    }
}
