//! SapMachine builds from the `SAP/SapMachine` releases

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

const REPOSITORY: &str = "SAP/SapMachine";

/// `sapmachine-<type>-<version>_<os>-<arch>_bin.<ext>`
const FILE_NAME_GRAMMAR: &str =
    r"(?i)^sapmachine-(jdk|jre)-([a-z\-0-9.+]+)_([a-z]+)-([a-z0-9\-]+)_bin\.(.+)$";

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

/// Swap the archive extension of `url` for `extension`.
pub fn replace_extension(url: &str, extension: &str) -> String {
    if url.to_ascii_lowercase().ends_with(".tar.gz") {
        format!("{}{extension}", &url[..url.len() - "tar.gz".len()])
    } else {
        match url.rfind('.') {
            Some(dot) => format!("{}{extension}", &url[..=dot]),
            None => format!("{url}.{extension}"),
        }
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
        let id = ProviderId::SapMachine;
        Ok(Self {
            image_type: request.require(id, "type")?,
            version: request.require(id, "version")?,
            arch: request.require(id, "arch")?,
            os: super::requested_os(request, "macos"),
        })
    }
}

pub struct SapMachine {
    api_base: String,
}

impl SapMachine {
    pub fn new() -> Self {
        Self::with_base(catalog::GITHUB_API)
    }

    pub fn with_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for SapMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseResolver for SapMachine {
    fn id(&self) -> ProviderId {
        ProviderId::SapMachine
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
                    let Some(c) = parse_file_name(&asset.name)? else {
                        continue;
                    };
                    if c.image_type.eq_ignore_ascii_case(s.image_type)
                        && c.os.eq_ignore_ascii_case(&s.os)
                        && c.arch.eq_ignore_ascii_case(s.arch)
                        && version.matches(&c.version)
                    {
                        found.push(c.with_asset(asset));
                    }
                }
                Ok(found)
            },
        )?;

        let checksum = ChecksumUrl {
            url: replace_extension(&chosen.link, "sha256.txt"),
            algorithm: DigestAlgorithm::Sha256,
            entry: None,
            required: true,
        };
        let spec = catalog::download_spec(&chosen, request)
            .checksum_url(checksum)
            .with_etag_check();
        Ok(Resolution::Download(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_grammar() {
        let c = parse_file_name("sapmachine-jdk-17.0.4_linux-x64_bin.tar.gz")
            .unwrap()
            .unwrap();
        assert_eq!(c.image_type, "jdk");
        assert_eq!(c.version, "17.0.4");
        assert_eq!(c.os, "linux");
        assert_eq!(c.arch, "x64");
        assert_eq!(c.extension, "tar.gz");

        let c = parse_file_name("sapmachine-jre-21.0.1+12_windows-x64-musl_bin.zip")
            .unwrap()
            .unwrap();
        assert_eq!(c.version, "21.0.1+12");
        assert_eq!(c.arch, "x64-musl");

        assert!(parse_file_name("sapmachine-jdk-17.0.4_linux-x64_bin.tar.gz.sha256.txt")
            .unwrap()
            .is_some_and(|c| c.extension == "tar.gz.sha256.txt"));
        assert!(parse_file_name("sapmachine-jdk-17.0.4.msi").unwrap().is_none());
    }

    #[test]
    fn test_replace_extension() {
        assert_eq!(
            replace_extension("https://h/a/sapmachine-jdk-17_linux-x64_bin.tar.gz", "sha256.txt"),
            "https://h/a/sapmachine-jdk-17_linux-x64_bin.sha256.txt"
        );
        assert_eq!(replace_extension("https://h/a/x.zip", "sha256.txt"), "https://h/a/x.sha256.txt");
    }

    #[test]
    fn test_required_attributes() {
        let err = SapMachine::new()
            .cache_key(&ReleaseRequest::new().with("type", "jdk").with("version", "17*"))
            .unwrap_err();
        assert!(err.to_string().contains("'arch'"));
    }
}
