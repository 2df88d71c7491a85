//! Eclipse Temurin builds from the `adoptium/temurin<N>-binaries` releases

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

/// `OpenJDK<version>-<type>_<arch>_<os>_<impl>_<build>.<ext>`
const FILE_NAME_GRAMMAR: &str = r"(?i)^OpenJDK([\da-z]*)-([a-z]+)_([0-9a-z\-]+)_([0-9a-z\-]+)_([a-z0-9]+)_([\-a-z0-9]+|\d[\d._]*\d)\.([.a-z0-9]+)$";

static GRAMMAR: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

/// Parse an asset name; names outside the grammar give `None`.
pub fn parse_file_name(name: &str) -> Result<Option<ReleaseCandidate>> {
    let re = super::compiled(&GRAMMAR, FILE_NAME_GRAMMAR)?;
    Ok(re.captures(name).map(|c| ReleaseCandidate {
        version: c[1].to_owned(),
        image_type: c[2].to_owned(),
        arch: c[3].to_owned(),
        os: c[4].to_owned(),
        implementation: Some(c[5].to_owned()),
        build: Some(c[6].to_owned()),
        extension: c[7].to_owned(),
        file_name: name.to_owned(),
        ..Default::default()
    }))
}

/// Leading digits of a version such as `17U`.
fn feature_number(version: &str) -> &str {
    let end = version
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(version.len());
    &version[..end]
}

struct Settings {
    version: String,
    image_type: String,
    arch: String,
    os: String,
    implementation: String,
    build: String,
    repository: String,
}

impl Settings {
    fn from_request(request: &ReleaseRequest) -> Result<Self> {
        let version = request
            .require(ProviderId::Adoptium, "version")?
            .to_ascii_uppercase();
        let repository = request
            .get("repositoryName")
            .map(str::to_owned)
            .unwrap_or_else(|| format!("temurin{}-binaries", feature_number(&version)));
        Ok(Self {
            image_type: request.get_or("type", "jdk").to_owned(),
            arch: request.get_or("arch", "x64").to_owned(),
            os: super::requested_os(request, "mac"),
            implementation: request.get_or("impl", "hotspot").to_owned(),
            build: request.get_or("build", "*").to_owned(),
            version,
            repository: format!("adoptium/{repository}"),
        })
    }

    fn accepts(&self, c: &ReleaseCandidate, build: &WildcardMatcher) -> bool {
        c.version.eq_ignore_ascii_case(&self.version)
            && c.image_type.eq_ignore_ascii_case(&self.image_type)
            && c.arch.eq_ignore_ascii_case(&self.arch)
            && c.os.eq_ignore_ascii_case(&self.os)
            && c.implementation
                .as_deref()
                .is_some_and(|i| i.eq_ignore_ascii_case(&self.implementation))
            && c.build.as_deref().is_some_and(|b| build.matches(b))
    }
}

/// Temurin release catalog on GitHub.
pub struct Adoptium {
    api_base: String,
}

impl Adoptium {
    pub fn new() -> Self {
        Self::with_base(catalog::GITHUB_API)
    }

    /// Use another GitHub API root (tests, mirrors).
    pub fn with_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for Adoptium {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseResolver for Adoptium {
    fn id(&self) -> ProviderId {
        ProviderId::Adoptium
    }

    fn cache_key(&self, request: &ReleaseRequest) -> Result<String> {
        let s = Settings::from_request(request)?;
        CacheKeyBuilder::new(self.id().name())
            .required("version", Some(&s.version))
            .required("type", Some(&s.image_type))
            .required("build", Some(&s.build))
            .required("os", Some(&s.os))
            .required("arch", Some(&s.arch))
            .required("impl", Some(&s.implementation))
            .optional("folders", request.folders_key().as_deref())
            .build()
    }

    fn resolve(&self, request: &ReleaseRequest, client: &HttpClient) -> Result<Resolution> {
        let s = Settings::from_request(request)?;
        let query = CatalogQuery {
            repository: s.repository.clone(),
            per_page: catalog::per_page(request.get("perPage"))?,
            include_prereleases: true,
        };
        let build = WildcardMatcher::new(&s.build, true);

        let select = |release: &GithubRelease| -> Result<Vec<ReleaseCandidate>> {
            let mut found = Vec::new();
            for asset in release.assets.iter().filter(|a| a.is_archive()) {
                match parse_file_name(&asset.name)? {
                    Some(c) if s.accepts(&c, &build) => found.push(c.with_asset(asset)),
                    Some(_) => {}
                    None => tracing::debug!(asset = %asset.name, "ignoring non-standard asset name"),
                }
            }
            Ok(found)
        };

        let chosen = catalog::find_release(
            client,
            &self.api_base,
            self.id().name(),
            &query,
            &[
                ("version", &s.version),
                ("type", &s.image_type),
                ("os", &s.os),
                ("arch", &s.arch),
                ("impl", &s.implementation),
                ("build", &s.build),
            ],
            select,
        )?;

        let checksum = ChecksumUrl {
            url: format!("{}.sha256.txt", chosen.link),
            algorithm: DigestAlgorithm::Sha256,
            entry: None,
            required: true,
        };
        Ok(Resolution::Download(
            catalog::download_spec(&chosen, request).checksum_url(checksum),
        ))
    }
}
