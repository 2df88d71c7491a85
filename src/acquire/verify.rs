//! Checksum verification
//!
//! Publishers format digests inconsistently (trailing file names, mixed case,
//! separators), so both sides are reduced to upper-case alphanumerics before
//! comparing. A mismatch is always fatal.

use super::http::{HttpClient, MIME_ALL};
use crate::core::error::{CacheError, Result};
use crate::core::output;
use crate::internal::hash::{DigestAlgorithm, Digests};
use std::path::Path;

/// Where to fetch an expected digest from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumUrl {
    pub url: String,
    pub algorithm: DigestAlgorithm,
    /// For listings with one `<digest> <file>` line per file, the file to pick.
    /// `None` takes the leading digest of the body.
    pub entry: Option<String>,
    /// A required digest that cannot be fetched fails the acquisition.
    pub required: bool,
}

/// Outcome of verification, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Every listed algorithm matched.
    Verified(Vec<DigestAlgorithm>),
    /// No expected digest was available from any source.
    Unverified,
    /// Verification was turned off by the request.
    Skipped,
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Upper-case alphanumerics only.
pub fn normalize_checksum(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn checksums_match(expected: &str, computed: &str) -> bool {
    normalize_checksum(expected) == normalize_checksum(computed)
}

/// The leading alphanumeric run of a sidecar body, e.g. `abc123  file.tar.gz`.
pub fn leading_digest(text: &str) -> Option<String> {
    let digest: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!digest.is_empty()).then_some(digest)
}

/// Pick the digest listed for `entry` in a `sha1sum`-style listing.
pub fn digest_for_entry(listing: &str, entry: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let digest = fields.next()?;
        let name = fields.next()?;
        // `*` marks binary mode; some listings carry a path prefix.
        let name = name.trim_start_matches('*');
        let base = name.rsplit('/').next().unwrap_or(name);
        (base == entry).then(|| digest.to_owned())
    })
}

/// Fetch and extract the expected digest. `Ok(None)` means an optional
/// source was unavailable.
pub fn fetch_expected_digest(client: &HttpClient, source: &ChecksumUrl) -> Result<Option<String>> {
    let text = match client.get_text(&source.url, &[MIME_ALL.to_owned()]) {
        Ok(text) => text,
        Err(e) if !source.required && !matches!(e, CacheError::Cancelled) => {
            output::warning(&format!(
                "cannot load {} checksum from {}: {e}",
                source.algorithm, source.url
            ));
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let digest = match &source.entry {
        Some(entry) => digest_for_entry(&text, entry),
        None => leading_digest(&text),
    };
    match digest {
        Some(d) => {
            tracing::debug!(url = %source.url, algorithm = %source.algorithm, digest = %d, "loaded checksum");
            Ok(Some(d))
        }
        None if source.required => Err(CacheError::transport(
            &source.url,
            format!(
                "no {} checksum found{}",
                source.algorithm,
                source
                    .entry
                    .as_ref()
                    .map(|e| format!(" for {e}"))
                    .unwrap_or_default()
            ),
        )),
        None => {
            output::warning(&format!("no usable checksum in {}", source.url));
            Ok(None)
        }
    }
}

/// Compare every expected digest against the computed ones.
pub fn verify_digests(
    path: &Path,
    expected: &[(DigestAlgorithm, String)],
    computed: &Digests,
) -> Result<Verification> {
    if expected.is_empty() {
        return Ok(Verification::Unverified);
    }
    let mut checked = Vec::new();
    for (algorithm, value) in expected {
        let actual = computed.get(*algorithm).ok_or_else(|| CacheError::Integrity {
            algorithm: algorithm.name().to_owned(),
            expected: normalize_checksum(value),
            computed: "<not computed>".to_owned(),
            path: path.to_path_buf(),
        })?;
        if !checksums_match(value, actual) {
            return Err(CacheError::Integrity {
                algorithm: algorithm.name().to_owned(),
                expected: normalize_checksum(value),
                computed: normalize_checksum(actual),
                path: path.to_path_buf(),
            });
        }
        if !checked.contains(algorithm) {
            checked.push(*algorithm);
        }
    }
    Ok(Verification::Verified(checked))
}

/// MD5 carried by an ETag such as `"9b2cf535f27731c974343645a3985328"`.
pub fn etag_md5(etag: &str) -> Option<&str> {
    let etag = etag.trim();
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    let etag = etag.strip_prefix('"').unwrap_or(etag);
    let candidate = etag.get(..32)?;
    candidate
        .chars()
        .all(|c| c.is_ascii_hexdigit())
        .then_some(candidate)
}

/// Result of comparing an ETag with the computed MD5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtagCheck {
    Matched,
    Mismatched,
    NotApplicable,
}

/// Cross-check an ETag against the MD5. Only ever a diagnostic: multipart
/// uploads produce ETags that are not the object's MD5.
pub fn check_etag(etag: Option<&str>, computed: &Digests) -> EtagCheck {
    let (Some(tag), Some(md5)) = (etag.and_then(etag_md5), computed.get(DigestAlgorithm::Md5))
    else {
        return EtagCheck::NotApplicable;
    };
    if checksums_match(tag, md5) {
        tracing::debug!(etag = tag, "ETag matches MD5");
        EtagCheck::Matched
    } else {
        output::warning(&format!("ETag {tag} differs from downloaded MD5 {md5}"));
        EtagCheck::Mismatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::hash::MultiDigest;
    use std::path::PathBuf;

    fn digests_of(data: &[u8]) -> Digests {
        let mut d = MultiDigest::new(DigestAlgorithm::ALL);
        d.update(data);
        d.finalize()
    }

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    #[test]
    fn test_normalize_strips_formatting() {
        assert_eq!(normalize_checksum(" ab:cd-EF\n"), "ABCDEF");
        assert!(checksums_match("AB CD", "abcd"));
        assert!(!checksums_match("abcd", "abce"));
    }

    #[test]
    fn test_leading_digest() {
        assert_eq!(
            leading_digest("  deadbeef  OpenJDK.tar.gz\n").as_deref(),
            Some("deadbeef")
        );
        assert_eq!(leading_digest("   \n"), None);
    }

    #[test]
    fn test_digest_for_entry() {
        let listing = "\
aaa111  bellsoft-jdk17-linux-amd64.tar.gz
bbb222 *bellsoft-jdk17-linux-aarch64.tar.gz
ccc333  dir/bellsoft-jdk17-windows-amd64.zip
";
        assert_eq!(
            digest_for_entry(listing, "bellsoft-jdk17-linux-aarch64.tar.gz").as_deref(),
            Some("bbb222")
        );
        assert_eq!(
            digest_for_entry(listing, "bellsoft-jdk17-windows-amd64.zip").as_deref(),
            Some("ccc333")
        );
        assert_eq!(digest_for_entry(listing, "missing.zip"), None);
    }

    #[test]
    fn test_verify_success_reports_algorithms() {
        let computed = digests_of(b"hello world");
        let expected = vec![
            (DigestAlgorithm::Sha256, HELLO_SHA256.to_uppercase()),
            (DigestAlgorithm::Md5, format!("{HELLO_MD5}  file.bin")),
        ];
        let result = verify_digests(Path::new("f"), &expected, &computed);
        // The file name suffix makes the MD5 differ after normalization.
        assert!(result.is_err());

        let expected = vec![
            (DigestAlgorithm::Sha256, HELLO_SHA256.to_uppercase()),
            (DigestAlgorithm::Md5, HELLO_MD5.to_owned()),
        ];
        let result = verify_digests(Path::new("f"), &expected, &computed).unwrap();
        assert_eq!(
            result,
            Verification::Verified(vec![DigestAlgorithm::Sha256, DigestAlgorithm::Md5])
        );
    }

    #[test]
    fn test_single_character_difference_fails() {
        let computed = digests_of(b"hello world");
        let mut wrong = HELLO_SHA256.to_owned();
        wrong.replace_range(0..1, "c");
        let err = verify_digests(
            &PathBuf::from("/tmp/x.tar.gz"),
            &[(DigestAlgorithm::Sha256, wrong)],
            &computed,
        )
        .unwrap_err();
        match err {
            CacheError::Integrity {
                algorithm,
                expected,
                computed,
                ..
            } => {
                assert_eq!(algorithm, "SHA-256");
                assert!(expected.starts_with('C'));
                assert_eq!(computed, HELLO_SHA256.to_uppercase());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nothing_expected_is_unverified() {
        let computed = digests_of(b"x");
        assert_eq!(
            verify_digests(Path::new("f"), &[], &computed).unwrap(),
            Verification::Unverified
        );
    }

    #[test]
    fn test_etag_md5_extraction() {
        assert_eq!(etag_md5(&format!("\"{HELLO_MD5}\"")), Some(HELLO_MD5));
        assert_eq!(etag_md5(&format!("W/\"{HELLO_MD5}\"")), Some(HELLO_MD5));
        // Multipart ETag keeps its leading hex run.
        assert_eq!(etag_md5(&format!("\"{HELLO_MD5}-12\"")), Some(HELLO_MD5));
        assert_eq!(etag_md5("\"short\""), None);
    }

    #[test]
    fn test_check_etag() {
        let computed = digests_of(b"hello world");
        let tag = format!("\"{HELLO_MD5}\"");
        assert_eq!(check_etag(Some(&tag), &computed), EtagCheck::Matched);
        let other = format!("\"{}\"", "0".repeat(32));
        assert_eq!(check_etag(Some(&other), &computed), EtagCheck::Mismatched);
        assert_eq!(check_etag(None, &computed), EtagCheck::NotApplicable);
    }
}
