//! Amazon Corretto "latest" links

use super::{ProviderId, ReleaseRequest, ReleaseResolver, Resolution};
use crate::acquire::download::DownloadSpec;
use crate::acquire::http::HttpClient;
use crate::acquire::verify::ChecksumUrl;
use crate::core::error::Result;
use crate::internal::cache_key::CacheKeyBuilder;
use crate::internal::hash::DigestAlgorithm;

pub const DOWNLOAD_BASE: &str = "https://corretto.aws/downloads";

struct Settings<'a> {
    version: &'a str,
    arch: &'a str,
    os: String,
    image_type: &'a str,
    extension: String,
    file: Option<&'a str>,
}

impl<'a> Settings<'a> {
    fn from_request(request: &'a ReleaseRequest) -> Self {
        Self {
            version: request
                .get("version")
                .or_else(|| request.get("featureVersion"))
                .unwrap_or("17"),
            arch: request.get_or("arch", "x64"),
            os: super::requested_os(request, "macos"),
            image_type: request
                .get("type")
                .or_else(|| request.get("imageType"))
                .unwrap_or("jdk"),
            extension: super::requested_extension(request),
            file: request.get("file"),
        }
    }

    /// `amazon-corretto-<version>-<arch>-<os>-<type>.<ext>` unless `file` names one.
    fn file_name(&self) -> String {
        let base = match self.file {
            Some(file) => file.to_owned(),
            None => format!(
                "amazon-corretto-{}-{}-{}-{}",
                self.version, self.arch, self.os, self.image_type
            ),
        };
        format!("{base}.{}", self.extension)
    }
}

pub struct Corretto {
    base: String,
}

impl Corretto {
    pub fn new() -> Self {
        Self::with_base(DOWNLOAD_BASE)
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl Default for Corretto {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseResolver for Corretto {
    fn id(&self) -> ProviderId {
        ProviderId::Corretto
    }

    fn cache_key(&self, request: &ReleaseRequest) -> Result<String> {
        let s = Settings::from_request(request);
        CacheKeyBuilder::new(self.id().name())
            .required("version", Some(s.version))
            .required("arch", Some(s.arch))
            .required("os", Some(&s.os))
            .required("type", Some(s.image_type))
            .required("extension", Some(&s.extension))
            .optional("file", s.file)
            .optional("folders", request.folders_key().as_deref())
            .build()
    }

    fn resolve(&self, request: &ReleaseRequest, _client: &HttpClient) -> Result<Resolution> {
        let s = Settings::from_request(request);
        let file_name = s.file_name();
        let base = self.base.trim_end_matches('/');
        let mut spec = DownloadSpec::new(format!("{base}/latest/{file_name}"), &file_name)
            .accept(super::accepted_mimes(request));

        match request.get(DigestAlgorithm::Sha256.attribute()) {
            Some(literal) => spec = spec.expect_digest(DigestAlgorithm::Sha256, literal),
            None => {
                spec = spec.checksum_url(ChecksumUrl {
                    url: format!("{base}/latest_sha256/{file_name}"),
                    algorithm: DigestAlgorithm::Sha256,
                    entry: None,
                    required: false,
                })
            }
        }
        Ok(Resolution::Download(spec))
    }
}
