//! GraalVM Community builds from the `graalvm/graalvm-ce-builds` releases

use super::catalog::{self, CatalogQuery, GithubRelease, ReleaseCandidate};
use super::{ProviderId, ReleaseRequest, ReleaseResolver, Resolution};
use crate::acquire::http::HttpClient;
use crate::acquire::verify::ChecksumUrl;
use crate::core::error::Result;
use crate::internal::cache_key::CacheKeyBuilder;
use crate::internal::hash::DigestAlgorithm;
use crate::internal::wildcard::WildcardMatcher;
use regex::Regex;
use std::sync::OnceLock;

const REPOSITORY: &str = "graalvm/graalvm-ce-builds";

/// `graalvm-ce-<type>-<os>-<arch>-<version>.<ext>`, e.g. `graalvm-ce-java11-linux-amd64-20.1.0.tar.gz`
const FILE_NAME_GRAMMAR: &str =
    r"(?i)^graalvm-ce-([a-z.0-9+]+)-([a-z]+)-([a-z\d]+)-([\d.]+\d)\.([\D.]+)$";

static GRAMMAR: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

pub fn parse_file_name(name: &str) -> Result<Option<ReleaseCandidate>> {
    let re = super::compiled(&GRAMMAR, FILE_NAME_GRAMMAR)?;
    Ok(re.captures(name).map(|c| ReleaseCandidate {
        image_type: c[1].to_owned(),
        os: c[2].to_owned(),
        arch: c[3].to_owned(),
        version: c[4].to_owned(),
        extension: c[5].to_owned(),
        file_name: name.to_owned(),
        ..Default::default()
    }))
}

struct Settings<'a> {
    image_type: &'a str,
    version: &'a str,
    arch: &'a str,
    os: String,
}

impl<'a> Settings<'a> {
    fn from_request(request: &'a ReleaseRequest) -> Result<Self> {
        let id = ProviderId::GraalVmCe;
        Ok(Self {
            image_type: request.require(id, "type")?,
            version: request.require(id, "version")?,
            arch: request.require(id, "arch")?,
            os: super::requested_os(request, "darwin"),
        })
    }

    fn accepts(&self, c: &ReleaseCandidate, version: &WildcardMatcher) -> bool {
        c.image_type.eq_ignore_ascii_case(self.image_type)
            && c.os.eq_ignore_ascii_case(&self.os)
            && c.arch.eq_ignore_ascii_case(self.arch)
            && version.matches(&c.version)
    }
}

pub struct GraalVmCe {
    api_base: String,
}

impl GraalVmCe {
    pub fn new() -> Self {
        Self::with_base(catalog::GITHUB_API)
    }

    pub fn with_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for GraalVmCe {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseResolver for GraalVmCe {
    fn id(&self) -> ProviderId {
        ProviderId::GraalVmCe
    }

    fn cache_key(&self, request: &ReleaseRequest) -> Result<String> {
        let s = Settings::from_request(request)?;
        CacheKeyBuilder::new(self.id().name())
            .required("type", Some(s.image_type))
            .required("version", Some(s.version))
            .required("os", Some(&s.os))
            .required("arch", Some(s.arch))
            .optional("folders", request.folders_key().as_deref())
            .build()
    }

    fn resolve(&self, request: &ReleaseRequest, client: &HttpClient) -> Result<Resolution> {
        let s = Settings::from_request(request)?;
        let query = CatalogQuery {
            repository: REPOSITORY.to_owned(),
            per_page: catalog::per_page(request.get("perPage"))?,
            include_prereleases: false,
        };
        let version = WildcardMatcher::new(s.version, true);

        let chosen = catalog::find_release(
            client,
            &self.api_base,
            self.id().name(),
            &query,
            &[
                ("type", s.image_type),
                ("version", s.version),
                ("os", &s.os),
                ("arch", s.arch),
            ],
            |release: &GithubRelease| {
                let mut found = Vec::new();
                for asset in release.assets.iter().filter(|a| a.is_archive()) {
                    match parse_file_name(&asset.name)? {
                        Some(c) if s.accepts(&c, &version) => found.push(c.with_asset(asset)),
                        Some(_) => {}
                        None => tracing::debug!(asset = %asset.name, "incompatible file name"),
                    }
                }
                Ok(found)
            },
        )?;

        // The sidecar holds the bare digest, possibly followed by the file name.
        let checksum = ChecksumUrl {
            url: format!("{}.sha256", chosen.link),
            algorithm: DigestAlgorithm::Sha256,
            entry: None,
            required: true,
        };
        Ok(Resolution::Download(
            catalog::download_spec(&chosen, request).checksum_url(checksum),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancelToken;
    use crate::core::config::CacheConfig;
    use crate::core::error::CacheError;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_file_name_grammar() {
        let c = parse_file_name("graalvm-ce-java11-linux-amd64-20.1.0.tar.gz")
            .unwrap()
            .unwrap();
        assert_eq!(c.image_type, "java11");
        assert_eq!(c.os, "linux");
        assert_eq!(c.arch, "amd64");
        assert_eq!(c.version, "20.1.0");
        assert_eq!(c.extension, "tar.gz");

        let c = parse_file_name("graalvm-ce-java8-windows-amd64-19.3.1.zip")
            .unwrap()
            .unwrap();
        assert_eq!(c.image_type, "java8");
        assert_eq!(c.os, "windows");
        assert_eq!(c.extension, "zip");

        let c = parse_file_name("graalvm-ce-java17-darwin-aarch64-22.3.0.tar.gz")
            .unwrap()
            .unwrap();
        assert_eq!(c.os, "darwin");
        assert_eq!(c.arch, "aarch64");

        assert!(parse_file_name("native-image-installable-svm-java11-linux-amd64-20.1.0.jar")
            .unwrap()
            .is_none());
        assert!(parse_file_name("graalvm-community-jdk-21_linux-x64_bin.tar.gz")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_cache_key_layout() {
        let request = ReleaseRequest::new()
            .with("type", "Java11")
            .with("version", "20.1*")
            .with("os", "linux")
            .with("arch", "amd64");
        let key = GraalVmCe::new().cache_key(&request).unwrap();
        assert!(key.starts_with("GRAALVMCE_java11_20.1._linux_amd64_"), "{key}");

        let err = GraalVmCe::new()
            .cache_key(&ReleaseRequest::new().with("type", "java11").with("arch", "amd64"))
            .unwrap_err();
        assert!(matches!(err, CacheError::MissingAttribute { ref attribute, .. } if attribute == "version"));
    }

    fn asset(uri: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "browser_download_url": format!("{uri}/download/vm-20.1.0/{name}"),
            "content_type": "application/gzip",
            "size": 4096
        })
    }

    #[tokio::test]
    async fn test_resolve_prefers_tar_gz_and_skips_prereleases() {
        let mock_server = MockServer::start().await;
        let uri = mock_server.uri();
        Mock::given(method("GET"))
            .and(path("/repos/graalvm/graalvm-ce-builds/releases"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"tag_name": "vm-20.2.0-dev", "prerelease": true, "assets": [
                    asset(&uri, "graalvm-ce-java11-linux-amd64-20.2.0.tar.gz")
                ]},
                {"tag_name": "vm-20.1.0", "assets": [
                    asset(&uri, "graalvm-ce-java11-linux-amd64-20.1.0.zip"),
                    asset(&uri, "graalvm-ce-java11-linux-amd64-20.1.0.tar.gz"),
                    asset(&uri, "graalvm-ce-java11-linux-amd64-20.1.0.tar.gz.sha256"),
                    asset(&uri, "graalvm-ce-java8-linux-amd64-20.1.0.tar.gz")
                ]}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&CacheConfig::with_root(std::env::temp_dir()), CancelToken::new())
            .unwrap();
        let request = ReleaseRequest::new()
            .with("type", "java11")
            .with("version", "20.*")
            .with("os", "linux")
            .with("arch", "amd64");
        let Resolution::Download(spec) = GraalVmCe::with_base(&uri).resolve(&request, &client).unwrap()
        else {
            panic!("expected a download");
        };
        assert_eq!(spec.file_name, "graalvm-ce-java11-linux-amd64-20.1.0.tar.gz");
        assert_eq!(spec.size, Some(4096));
        let checksum = spec.checksum_url.unwrap();
        assert_eq!(checksum.url, format!("{}.sha256", spec.url));
        assert_eq!(checksum.algorithm, DigestAlgorithm::Sha256);
        assert!(checksum.required);
    }
}
