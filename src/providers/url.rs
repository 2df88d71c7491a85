//! Caller-supplied archive links

use super::{ProviderId, ReleaseRequest, ReleaseResolver, Resolution};
use crate::acquire::download::DownloadSpec;
use crate::acquire::http::HttpClient;
use crate::core::error::{CacheError, Result};
use crate::internal::cache_key::CacheKeyBuilder;

const MAX_ID_CHARS: usize = 96;

/// Checks an `id`: letters, digits, `-_.+` and spaces, at most 96 chars.
pub fn validate_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CacheError::Configuration("URL id is empty".to_owned()));
    }
    if id.chars().count() > MAX_ID_CHARS {
        return Err(CacheError::Configuration(format!(
            "URL id is longer than {MAX_ID_CHARS} chars: {id}"
        )));
    }
    if let Some(bad) = id.chars().find(|c| {
        !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '+') || *c == ' ')
    }) {
        return Err(CacheError::Configuration(format!(
            "URL id contains '{}': {id}",
            bad.escape_default()
        )));
    }
    Ok(id)
}

/// Name the archive is stored under: the link's own name when it looks like
/// an archive, otherwise one derived from the id.
fn archive_name(id: &str, url: &str) -> String {
    match super::file_name_of(url) {
        Some(name)
            if [".zip", ".tar.gz", ".tgz"]
                .iter()
                .any(|ext| name.to_ascii_lowercase().ends_with(ext)) =>
        {
            name.to_owned()
        }
        _ => format!("{}.archive", id.replace(' ', "_")),
    }
}

#[derive(Default)]
pub struct UrlLink;

impl UrlLink {
    pub fn new() -> Self {
        Self
    }
}

impl ReleaseResolver for UrlLink {
    fn id(&self) -> ProviderId {
        ProviderId::Url
    }

    fn cache_key(&self, request: &ReleaseRequest) -> Result<String> {
        let id = validate_id(request.require(self.id(), "id")?)?;
        request.require(self.id(), "url")?;
        CacheKeyBuilder::new(self.id().name())
            .required("id", Some(id))
            .optional("folders", request.folders_key().as_deref())
            .build()
    }

    fn resolve(&self, request: &ReleaseRequest, _client: &HttpClient) -> Result<Resolution> {
        let id = validate_id(request.require(self.id(), "id")?)?;
        let url = request.require(self.id(), "url")?;

        let mut spec =
            DownloadSpec::new(url, archive_name(id, url)).accept(super::accepted_mimes(request));
        for (algorithm, value) in super::literal_digests(request) {
            spec = spec.expect_digest(algorithm, value);
        }
        if spec.expected_digests.is_empty() {
            tracing::debug!(%id, "no literal digest given");
        }
        Ok(Resolution::Download(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancelToken;
    use crate::core::config::CacheConfig;
    use crate::internal::hash::DigestAlgorithm;

    #[test]
    fn test_validate_id() {
        assert_eq!(validate_id(" jdk-21+35 custom ").unwrap(), "jdk-21+35 custom");
        assert!(validate_id("").is_err());
        assert!(validate_id("../escape").is_err());
        assert!(validate_id("a\tb").is_err());
        assert!(validate_id(&"x".repeat(96)).is_ok());
        assert!(validate_id(&"x".repeat(97)).is_err());
    }

    #[test]
    fn test_missing_url() {
        let err = UrlLink::new()
            .cache_key(&ReleaseRequest::new().with("id", "mine"))
            .unwrap_err();
        assert!(matches!(err, CacheError::MissingAttribute { ref attribute, .. } if attribute == "url"));
    }

    #[test]
    fn test_resolve_collects_literals_and_mimes() {
        let client = HttpClient::new(&CacheConfig::with_root(std::env::temp_dir()), CancelToken::new())
            .unwrap();
        let request = ReleaseRequest::new()
            .with("id", "my jdk")
            .with("url", "https://example.com/get?build=7")
            .with("sha512", "FF00")
            .with("md5", "aa")
            .with("mime", "application/zip");
        let Resolution::Download(spec) = UrlLink::new().resolve(&request, &client).unwrap() else {
            panic!("expected a download");
        };
        assert_eq!(spec.file_name, "my_jdk.archive");
        assert_eq!(spec.accepted_content_types, vec!["application/zip".to_owned()]);
        assert_eq!(
            spec.expected_digests,
            vec![
                (DigestAlgorithm::Md5, "aa".to_owned()),
                (DigestAlgorithm::Sha512, "FF00".to_owned())
            ]
        );
    }

    #[test]
    fn test_archive_name_from_link() {
        assert_eq!(archive_name("x", "https://h/jdk-17.tar.gz"), "jdk-17.tar.gz");
        assert_eq!(archive_name("x", "https://h/download"), "x.archive");
    }
}
