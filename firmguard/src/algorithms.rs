// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors
use openssl::hash::{hash, MessageDigest};
use std::fmt;

/// Digests recorded in a firmware baseline.
///
/// MD5 and SHA-1 are only kept as secondary whole-image digests so that
/// baselines can be matched against older tooling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Length in characters of the hex encoding of a digest
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        };
        write!(f, "{value}")
    }
}

impl From<HashAlgorithm> for MessageDigest {
    fn from(hash_algorithm: HashAlgorithm) -> Self {
        match hash_algorithm {
            HashAlgorithm::Md5 => MessageDigest::md5(),
            HashAlgorithm::Sha1 => MessageDigest::sha1(),
            HashAlgorithm::Sha256 => MessageDigest::sha256(),
        }
    }
}

/// Hash `data` and return the digest as bare lowercase hex
pub fn hash_hex(
    algorithm: HashAlgorithm,
    data: &[u8],
) -> Result<String, openssl::error::ErrorStack> {
    let digest = hash(algorithm.into(), data)?;
    Ok(hex::encode(digest))
}

/// Shorthand for the SHA-256 hex digest used throughout baselines
pub fn sha256_hex(data: &[u8]) -> Result<String, openssl::error::ErrorStack> {
    hash_hex(HashAlgorithm::Sha256, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_algorithm_display() {
        assert_eq!(HashAlgorithm::Sha1.to_string(), "sha1");
        assert_eq!(HashAlgorithm::Sha256.to_string(), "sha256");
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            sha256_hex(b"").unwrap(), //#[allow_ci]
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_hex(HashAlgorithm::Sha1, b"test").unwrap(), //#[allow_ci]
            "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"
        );
        assert_eq!(
            hash_hex(HashAlgorithm::Md5, b"").unwrap(), //#[allow_ci]
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_hex_len_matches_digest() {
        for alg in
            [HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256]
        {
            let digest = hash_hex(alg, b"firmware").unwrap(); //#[allow_ci]
            assert_eq!(digest.len(), alg.hex_len());
        }
    }
}
