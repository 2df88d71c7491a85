//! BellSoft Liberica builds from the `bell-sw/Liberica` releases

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

const REPOSITORY: &str = "bell-sw/Liberica";

/// Liberica publishes one digest list per release.
const CHECKSUM_FILE: &str = "sha1sum.txt";

/// `bellsoft-<type><version>-<os>-<arch>.<ext>`
const FILE_NAME_GRAMMAR: &str = r"(?i)^bellsoft-([a-z]+)([.a-z0-9+]+)-([a-z]+)-([^.]+)\.(.+)$";

static GRAMMAR: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

pub fn parse_file_name(name: &str) -> Result<Option<ReleaseCandidate>> {
    let re = super::compiled(&GRAMMAR, FILE_NAME_GRAMMAR)?;
    Ok(re.captures(name).map(|c| ReleaseCandidate {
        image_type: c[1].to_owned(),
        version: c[2].to_owned(),
        os: c[3].to_owned(),
        arch: c[4].to_owned(),
        extension: c[5].to_owned(),
        file_name: name.to_owned(),
        ..Default::default()
    }))
}

/// Replace the last path segment of `url`, keeping any query.
pub fn replace_file_in_url(url: &str, file_name: &str) -> String {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    let dir = match path.rfind('/') {
        Some(slash) => &path[..=slash],
        None => "",
    };
    match query {
        Some(q) => format!("{dir}{file_name}?{q}"),
        None => format!("{dir}{file_name}"),
    }
}

struct Settings<'a> {
    image_type: &'a str,
    version: &'a str,
    arch: &'a str,
    os: String,
}

impl<'a> Settings<'a> {
    fn from_request(request: &'a ReleaseRequest) -> Result<Self> {
        let id = ProviderId::Liberica;
        Ok(Self {
            image_type: request.require(id, "type")?,
            version: request.require(id, "version")?,
            arch: request.require(id, "arch")?,
            os: super::requested_os(request, "macos"),
        })
    }

    fn accepts(&self, c: &ReleaseCandidate, version: &WildcardMatcher) -> bool {
        c.image_type.eq_ignore_ascii_case(self.image_type)
            && c.os.eq_ignore_ascii_case(&self.os)
            && c.arch.eq_ignore_ascii_case(self.arch)
            && version.matches(&c.version)
    }
}

pub struct Liberica {
    api_base: String,
}

impl Liberica {
    pub fn new() -> Self {
        Self::with_base(catalog::GITHUB_API)
    }

    pub fn with_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for Liberica {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseResolver for Liberica {
    fn id(&self) -> ProviderId {
        ProviderId::Liberica
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
                    if let Some(c) = parse_file_name(&asset.name)?
                        && s.accepts(&c, &version)
                    {
                        found.push(c.with_asset(asset));
                    }
                }
                Ok(found)
            },
        )?;

        let checksum = ChecksumUrl {
            url: replace_file_in_url(&chosen.link, CHECKSUM_FILE),
            algorithm: DigestAlgorithm::Sha1,
            entry: Some(chosen.file_name.clone()),
            required: true,
        };
        Ok(Resolution::Download(
            catalog::download_spec(&chosen, request).checksum_url(checksum),
        ))
    }
}
