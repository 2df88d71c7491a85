//! Streaming download with inline digests
//!
//! Bytes go from the response straight to the destination file while every
//! digest the verification step may need is updated from the same buffer.
//! A failed or cancelled download never leaves a partial file behind.

use super::http::HttpClient;
use super::verify::{self, ChecksumUrl, Verification};
use crate::core::error::{CacheError, Result};
use crate::core::output;
use crate::internal::fs_utils;
use crate::internal::hash::{DigestAlgorithm, Digests, MultiDigest};
use crate::internal::progress::{self, ProgressGuard};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Read buffer size for downloads
const BUFFER_SIZE: usize = 64 * 1024;

/// A resolved artifact ready to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSpec {
    pub url: String,
    /// Name the archive is stored under (also used for format detection).
    pub file_name: String,
    pub accepted_content_types: Vec<String>,
    /// Digests known up front, e.g. supplied by the caller.
    pub expected_digests: Vec<(DigestAlgorithm, String)>,
    /// Side channel to fetch a digest from after the download.
    pub checksum_url: Option<ChecksumUrl>,
    /// Compare the response ETag with the MD5 (diagnostic only).
    pub check_etag: bool,
    /// Size announced by the catalog, if any.
    pub size: Option<u64>,
}

impl DownloadSpec {
    pub fn new(url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file_name: file_name.into(),
            accepted_content_types: Vec::new(),
            expected_digests: Vec::new(),
            checksum_url: None,
            check_etag: false,
            size: None,
        }
    }

    pub fn accept<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_content_types
            .extend(types.into_iter().map(Into::into));
        self
    }

    pub fn expect_digest(mut self, algorithm: DigestAlgorithm, value: impl Into<String>) -> Self {
        self.expected_digests.push((algorithm, value.into()));
        self
    }

    pub fn checksum_url(mut self, source: ChecksumUrl) -> Self {
        self.checksum_url = Some(source);
        self
    }

    pub fn with_etag_check(mut self) -> Self {
        self.check_etag = true;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Every algorithm the verification step could ask for.
    pub fn algorithms(&self) -> Vec<DigestAlgorithm> {
        let mut algorithms: Vec<DigestAlgorithm> =
            self.expected_digests.iter().map(|(a, _)| *a).collect();
        if let Some(source) = &self.checksum_url {
            algorithms.push(source.algorithm);
        }
        if self.check_etag {
            algorithms.push(DigestAlgorithm::Md5);
        }
        algorithms.sort();
        algorithms.dedup();
        algorithms
    }
}

/// A file written by [`download_to_file`].
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes: u64,
    pub digests: Digests,
    pub etag: Option<String>,
}

/// Stream `spec.url` into `dest`, computing `spec.algorithms()` on the way.
pub fn download_to_file(
    client: &HttpClient,
    spec: &DownloadSpec,
    dest: &Path,
    show_progress: bool,
) -> Result<Downloaded> {
    fs_utils::ensure_parent_dir(dest)?;
    let result = stream_into(client, spec, dest, show_progress);
    if result.is_err() {
        let _ = fs_utils::remove_file_if_exists(dest);
    }
    result
}

fn stream_into(
    client: &HttpClient,
    spec: &DownloadSpec,
    dest: &Path,
    show_progress: bool,
) -> Result<Downloaded> {
    let pb = progress::create_spinner(&format!("downloading {}", spec.file_name), show_progress);
    let _guard = ProgressGuard::new(&pb);

    let mut body = client.open(&spec.url, &spec.accepted_content_types, true)?;

    if let Some(len) = body.content_length {
        progress::upgrade_to_bytes(&pb, len);
        if let Some(parent) = dest.parent()
            && let Some(free) = fs_utils::available_space(parent)
            && free < len
        {
            output::warning(&format!(
                "{} needs {len} bytes but only {free} are free in {}",
                spec.file_name,
                parent.display()
            ));
        }
    }

    let mut file = std::fs::File::create(dest).map_err(|e| CacheError::io(dest, e))?;
    let mut digest = MultiDigest::new(spec.algorithms());
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total_bytes = 0u64;
    let cancel = client.cancel_token().clone();

    loop {
        cancel.check()?;
        let n = body
            .reader()
            .read(&mut buffer)
            .map_err(|e| CacheError::transport(&spec.url, format!("read error: {e}")))?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])
            .map_err(|e| CacheError::io(dest, e))?;
        digest.update(&buffer[..n]);
        total_bytes += n as u64;
        pb.set_position(total_bytes);
    }
    file.flush().map_err(|e| CacheError::io(dest, e))?;

    for (label, expected) in [("Content-Length", body.content_length), ("catalog size", spec.size)] {
        if let Some(expected) = expected
            && expected != total_bytes
        {
            return Err(CacheError::transport(
                &spec.url,
                format!("received {total_bytes} bytes but {label} announced {expected}"),
            ));
        }
    }

    tracing::debug!(url = %spec.url, bytes = total_bytes, "download complete");
    Ok(Downloaded {
        path: dest.to_path_buf(),
        bytes: total_bytes,
        digests: digest.finalize(),
        etag: body.etag.clone(),
    })
}

/// Collect expected digests from the download and its checksum side channel.
pub fn expected_digests(
    client: &HttpClient,
    spec: &DownloadSpec,
) -> Result<Vec<(DigestAlgorithm, String)>> {
    let mut expected = spec.expected_digests.clone();
    if let Some(source) = &spec.checksum_url
        && let Some(value) = verify::fetch_expected_digest(client, source)?
    {
        expected.push((source.algorithm, value));
    }
    Ok(expected)
}

/// Download and verify. On an integrity failure the file is deleted.
///
/// With `check` false the digests are not compared and the result is
/// [`Verification::Skipped`].
pub fn fetch_verified(
    client: &HttpClient,
    spec: &DownloadSpec,
    dest: &Path,
    check: bool,
    show_progress: bool,
) -> Result<(Downloaded, Verification)> {
    let downloaded = download_to_file(client, spec, dest, show_progress)?;
    output::detail(&format!(
        "downloaded {} ({} bytes)",
        spec.file_name, downloaded.bytes
    ));

    if spec.check_etag {
        verify::check_etag(downloaded.etag.as_deref(), &downloaded.digests);
    }

    if !check {
        output::warning(&format!("checksum verification skipped for {}", spec.file_name));
        return Ok((downloaded, Verification::Skipped));
    }

    let verification = expected_digests(client, spec).and_then(|expected| {
        verify::verify_digests(&downloaded.path, &expected, &downloaded.digests)
    });
    match verification {
        Ok(Verification::Unverified) => {
            output::warning(&format!(
                "no checksum available for {}, continuing unverified",
                spec.file_name
            ));
            Ok((downloaded, Verification::Unverified))
        }
        Ok(v) => Ok((downloaded, v)),
        Err(e) => {
            let _ = fs_utils::remove_file_if_exists(&downloaded.path);
            Err(e)
        }
    }
}

/// Verify an archive kept from an earlier acquisition before reusing it.
pub fn verify_existing(
    client: &HttpClient,
    spec: &DownloadSpec,
    path: &Path,
) -> Result<Verification> {
    let expected = expected_digests(client, spec)?;
    let digests = crate::internal::hash::digest_file(path, expected.iter().map(|(a, _)| *a))?;
    verify::verify_digests(path, &expected, &digests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancelToken;
    use crate::core::config::CacheConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn client() -> HttpClient {
        HttpClient::new(&CacheConfig::with_root(std::env::temp_dir()), CancelToken::new()).unwrap()
    }

    fn archive_response(body: &[u8]) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/octet-stream")
            .set_body_bytes(body.to_vec())
    }

    #[test]
    fn test_algorithms_collects_all_sources() {
        let spec = DownloadSpec::new("http://x/a.zip", "a.zip")
            .expect_digest(DigestAlgorithm::Sha256, "aa")
            .checksum_url(ChecksumUrl {
                url: "http://x/a.zip.sha1".into(),
                algorithm: DigestAlgorithm::Sha1,
                entry: None,
                required: true,
            })
            .with_etag_check();
        assert_eq!(
            spec.algorithms(),
            vec![
                DigestAlgorithm::Md5,
                DigestAlgorithm::Sha1,
                DigestAlgorithm::Sha256
            ]
        );
    }

    #[tokio::test]
    async fn test_download_computes_digest() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.tar.gz"))
            .respond_with(archive_response(b"hello world"))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jdk.tar.gz");
        let spec = DownloadSpec::new(format!("{}/jdk.tar.gz", mock_server.uri()), "jdk.tar.gz")
            .expect_digest(DigestAlgorithm::Sha256, HELLO_SHA256);

        let (downloaded, verification) = fetch_verified(&client(), &spec, &dest, true, false).unwrap();
        assert_eq!(downloaded.bytes, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert_eq!(
            verification,
            Verification::Verified(vec![DigestAlgorithm::Sha256])
        );
    }

    #[tokio::test]
    async fn test_mismatch_deletes_file() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.zip"))
            .respond_with(archive_response(b"hello world"))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jdk.zip");
        let spec = DownloadSpec::new(format!("{}/jdk.zip", mock_server.uri()), "jdk.zip")
            .expect_digest(DigestAlgorithm::Sha256, "0".repeat(64));

        let err = fetch_verified(&client(), &spec, &dest, true, false).unwrap_err();
        assert!(matches!(err, CacheError::Integrity { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_sidecar_checksum_used() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.zip"))
            .respond_with(archive_response(b"hello world"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jdk.zip.sha256.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("{HELLO_SHA256}  jdk.zip\n")),
            )
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jdk.zip");
        let spec = DownloadSpec::new(format!("{}/jdk.zip", mock_server.uri()), "jdk.zip")
            .checksum_url(ChecksumUrl {
                url: format!("{}/jdk.zip.sha256.txt", mock_server.uri()),
                algorithm: DigestAlgorithm::Sha256,
                entry: None,
                required: true,
            });

        let (_, verification) = fetch_verified(&client(), &spec, &dest, true, false).unwrap();
        assert!(verification.is_verified());
    }

    #[tokio::test]
    async fn test_missing_optional_sidecar_is_unverified() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.zip"))
            .respond_with(archive_response(b"hello world"))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jdk.zip");
        let spec = DownloadSpec::new(format!("{}/jdk.zip", mock_server.uri()), "jdk.zip")
            .checksum_url(ChecksumUrl {
                url: format!("{}/missing.sha256", mock_server.uri()),
                algorithm: DigestAlgorithm::Sha256,
                entry: None,
                required: false,
            });

        let (_, verification) = fetch_verified(&client(), &spec, &dest, true, false).unwrap();
        assert_eq!(verification, Verification::Unverified);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_missing_required_sidecar_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.zip"))
            .respond_with(archive_response(b"hello world"))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jdk.zip");
        let spec = DownloadSpec::new(format!("{}/jdk.zip", mock_server.uri()), "jdk.zip")
            .checksum_url(ChecksumUrl {
                url: format!("{}/missing.sha256", mock_server.uri()),
                algorithm: DigestAlgorithm::Sha256,
                entry: None,
                required: true,
            });

        let err = fetch_verified(&client(), &spec, &dest, true, false).unwrap_err();
        assert!(matches!(err, CacheError::HttpStatus { status: 404, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_cancelled_download_leaves_nothing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.zip"))
            .respond_with(archive_response(b"hello world"))
            .mount(&mock_server)
            .await;

        let cancel = CancelToken::new();
        cancel.cancel();
        let client =
            HttpClient::new(&CacheConfig::with_root(std::env::temp_dir()), cancel).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jdk.zip");
        let spec = DownloadSpec::new(format!("{}/jdk.zip", mock_server.uri()), "jdk.zip");
        let err = download_to_file(&client, &spec, &dest, false).unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_catalog_size_mismatch_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.zip"))
            .respond_with(archive_response(b"hello world"))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jdk.zip");
        let spec =
            DownloadSpec::new(format!("{}/jdk.zip", mock_server.uri()), "jdk.zip").with_size(99);
        let err = download_to_file(&client(), &spec, &dest, false).unwrap_err();
        assert!(err.to_string().contains("announced 99"));
        assert!(!dest.exists());
    }
}
