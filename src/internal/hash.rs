//! Multi-algorithm digests
//!
//! A [`MultiDigest`] feeds every buffer to all requested algorithms at once,
//! so one pass over a download yields every digest a publisher might list.

use crate::core::error::{CacheError, Result};
use sha2::Digest;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Chunk size for reading files during hashing (1MB)
const CHUNK_SIZE: usize = 1024 * 1024;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    Md2,
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 6] = [
        Self::Md2,
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md2 => "MD2",
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Attribute name used for literal digests in requests (`sha256`, `md5`, ...)
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::Md2 => "md2",
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex form of a digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md2 | Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.attribute() == folded)
            .ok_or_else(|| CacheError::Configuration(format!("unknown digest algorithm '{s}'")))
    }
}

enum Hasher {
    Md2(md2::Md2),
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md2 => Self::Md2(md2::Md2::new()),
            DigestAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            DigestAlgorithm::Sha1 => Self::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha384 => Self::Sha384(sha2::Sha384::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md2(h) => h.update(data),
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md2(h) => hex::encode(h.finalize()),
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha384(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Several digests computed over the same byte stream.
pub struct MultiDigest {
    hashers: Vec<(DigestAlgorithm, Hasher)>,
}

impl MultiDigest {
    /// Duplicate algorithms are computed once.
    pub fn new(algorithms: impl IntoIterator<Item = DigestAlgorithm>) -> Self {
        let mut hashers: Vec<(DigestAlgorithm, Hasher)> = Vec::new();
        for algorithm in algorithms {
            if !hashers.iter().any(|(a, _)| *a == algorithm) {
                hashers.push((algorithm, Hasher::new(algorithm)));
            }
        }
        Self { hashers }
    }

    pub fn update(&mut self, data: &[u8]) {
        for (_, hasher) in &mut self.hashers {
            hasher.update(data);
        }
    }

    pub fn finalize(self) -> Digests {
        Digests(
            self.hashers
                .into_iter()
                .map(|(a, h)| (a, h.finalize_hex()))
                .collect(),
        )
    }
}

/// Lower-case hex digests keyed by algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digests(BTreeMap<DigestAlgorithm, String>);

impl Digests {
    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        self.0.get(&algorithm).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DigestAlgorithm, &str)> {
        self.0.iter().map(|(a, h)| (*a, h.as_str()))
    }
}

/// Hash a file on disk with every requested algorithm.
pub fn digest_file(
    path: &Path,
    algorithms: impl IntoIterator<Item = DigestAlgorithm>,
) -> Result<Digests> {
    let mut file = std::fs::File::open(path).map_err(|e| CacheError::io(path, e))?;
    let mut digest = MultiDigest::new(algorithms);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer).map_err(|e| CacheError::io(path, e))?;
        if n == 0 {
            break;
        }
        digest.update(&buffer[..n]);
    }
    Ok(digest.finalize())
}
