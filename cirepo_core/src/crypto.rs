//! Hash algorithm selection and digest formatting.

use crate::error::{Error, Result};
use sha2::Digest as _;
use std::io::{self, Read};

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    #[default]
    Blake3,
    /// SHA-256.
    Sha256,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
            Algorithm::Sha256 => "sha256",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" | "blake3" => Ok(Algorithm::Blake3),
            "sha256" | "sha-256" => Ok(Algorithm::Sha256),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }

    /// Length of the full digest in hex characters.
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Blake3 | Algorithm::Sha256 => 64,
        }
    }
}

/// An incremental hasher for one of the supported algorithms.
///
/// Implements `io::Write` so content can be copied straight into it.
pub enum Hasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(sha2::Sha256),
}

impl Hasher {
    /// Create a fresh hasher for the algorithm.
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
            Algorithm::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
        }
    }

    /// Feed bytes into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Blake3(h) => {
                h.update(data);
            }
            Hasher::Sha256(h) => h.update(data),
        }
    }

    /// Consume the hasher and return the raw digest.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Blake3(h) => h.finalize().as_bytes().to_vec(),
            Hasher::Sha256(h) => h.finalize().to_vec(),
        }
    }
}

impl io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Produces hash algorithm instances and formats digests for one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoHelper {
    algorithm: Algorithm,
    hash_length: Option<usize>,
}

impl CryptoHelper {
    /// Create a helper; `hash_length` truncates hex output to that many characters.
    pub fn new(algorithm: Algorithm, hash_length: Option<usize>) -> Self {
        Self {
            algorithm,
            hash_length,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn hash_length(&self) -> Option<usize> {
        self.hash_length
    }

    /// Create a new hash algorithm instance.
    pub fn hasher(&self) -> Hasher {
        Hasher::new(self.algorithm)
    }

    /// Convert digest bytes to lowercase hex, truncated to the configured length.
    pub fn to_hex(&self, digest: &[u8]) -> String {
        to_hex(digest, self.hash_length)
    }

    /// Hash raw bytes and return the formatted digest.
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        self.to_hex(&hasher.finalize())
    }

    /// Hash data from a reader and return the formatted digest.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> Result<String> {
        let mut hasher = self.hasher();
        io::copy(&mut reader, &mut hasher)?;
        Ok(self.to_hex(&hasher.finalize()))
    }
}

impl Default for CryptoHelper {
    fn default() -> Self {
        Self::new(Algorithm::default(), None)
    }
}

/// Convert digest bytes to lowercase hex, optionally truncated to `length` characters.
pub fn to_hex(digest: &[u8], length: Option<usize>) -> String {
    let mut hex = hex::encode(digest);
    if let Some(length) = length
        && length < hex.len()
    {
        hex.truncate(length);
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hello_world_blake3() {
        let helper = CryptoHelper::new(Algorithm::Blake3, None);
        assert_eq!(
            helper.hash_bytes(b"hello world"),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_hash_hello_world_sha256() {
        let helper = CryptoHelper::new(Algorithm::Sha256, None);
        assert_eq!(
            helper.hash_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_truncated_hex() {
        let helper = CryptoHelper::new(Algorithm::Blake3, Some(10));
        assert_eq!(helper.hash_bytes(b"hello world"), "d74981efa7");
    }

    #[test]
    fn test_truncation_longer_than_digest_is_ignored() {
        assert_eq!(to_hex(&[0xab, 0xcd], Some(10)), "abcd");
        assert_eq!(to_hex(&[0xab, 0xcd], None), "abcd");
        assert_eq!(to_hex(&[0xab, 0xcd], Some(0)), "");
    }

    #[test]
    fn test_hash_reader_matches_hash_bytes() {
        let helper = CryptoHelper::default();
        let data = b"streamed content".to_vec();
        let from_reader = helper.hash_reader(&data[..]).unwrap();
        assert_eq!(from_reader, helper.hash_bytes(&data));
    }

    #[test]
    fn test_algorithm_conversions() {
        assert_eq!(Algorithm::parse("blake3-256").unwrap(), Algorithm::Blake3);
        assert_eq!(Algorithm::parse("sha256").unwrap(), Algorithm::Sha256);
        assert_eq!(Algorithm::Blake3.as_str(), "blake3-256");
        assert_eq!(Algorithm::Sha256.as_str(), "sha256");
        assert!(Algorithm::parse("md5").is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Hashing the same data always produces the same hash.
        #[test]
        fn prop_hash_deterministic(data: Vec<u8>) {
            let helper = CryptoHelper::default();
            prop_assert_eq!(helper.hash_bytes(&data), helper.hash_bytes(&data));
        }

        /// Chunked updates produce the same digest as a single update.
        #[test]
        fn prop_incremental_equals_oneshot(data: Vec<u8>, split in 0usize..512) {
            for algorithm in [Algorithm::Blake3, Algorithm::Sha256] {
                let helper = CryptoHelper::new(algorithm, None);
                let split = split.min(data.len());
                let mut hasher = helper.hasher();
                hasher.update(&data[..split]);
                hasher.update(&data[split..]);
                prop_assert_eq!(helper.to_hex(&hasher.finalize()), helper.hash_bytes(&data));
            }
        }

        /// Truncated hashes are prefixes of the full hash.
        #[test]
        fn prop_truncated_is_prefix(data: Vec<u8>, len in 0usize..80) {
            let full = CryptoHelper::new(Algorithm::Blake3, None).hash_bytes(&data);
            let short = CryptoHelper::new(Algorithm::Blake3, Some(len)).hash_bytes(&data);
            prop_assert!(full.starts_with(&short));
            prop_assert_eq!(short.len(), len.min(64));
        }
    }
}
