//! Microsoft Build of OpenJDK (`aka.ms/download-jdk`)

use super::{ProviderId, ReleaseRequest, ReleaseResolver, Resolution};
use crate::acquire::download::DownloadSpec;
use crate::acquire::http::HttpClient;
use crate::acquire::verify::ChecksumUrl;
use crate::core::error::Result;
use crate::internal::cache_key::CacheKeyBuilder;
use crate::internal::hash::DigestAlgorithm;

pub const DOWNLOAD_BASE: &str = "https://aka.ms/download-jdk";

const DEFAULT_VERSION: &str = "17.0.4.1";

struct Settings<'a> {
    image_type: &'a str,
    version: &'a str,
    os: String,
    arch: &'a str,
    extension: String,
    file: Option<&'a str>,
    checksum_file: Option<&'a str>,
}

impl<'a> Settings<'a> {
    fn from_request(request: &'a ReleaseRequest) -> Self {
        Self {
            image_type: request.get_or("type", "jdk"),
            version: request.get_or("version", DEFAULT_VERSION),
            os: super::requested_os(request, "macOS"),
            arch: request.get_or("arch", "x64"),
            extension: super::requested_extension(request),
            file: request.get("file"),
            checksum_file: request.get("fileSha256"),
        }
    }

    fn file_name(&self) -> String {
        let base = match self.file {
            Some(file) => file.to_owned(),
            None => format!(
                "microsoft-{}-{}-{}-{}",
                self.image_type, self.version, self.os, self.arch
            ),
        };
        format!("{base}.{}", self.extension)
    }
}

pub struct Microsoft {
    base: String,
}

impl Microsoft {
    pub fn new() -> Self {
        Self::with_base(DOWNLOAD_BASE)
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl Default for Microsoft {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseResolver for Microsoft {
    fn id(&self) -> ProviderId {
        ProviderId::Microsoft
    }

    fn cache_key(&self, request: &ReleaseRequest) -> Result<String> {
        let s = Settings::from_request(request);
        CacheKeyBuilder::new(self.id().name())
            .required("type", Some(s.image_type))
            .required("version", Some(s.version))
            .required("os", Some(&s.os))
            .required("arch", Some(s.arch))
            .required("extension", Some(&s.extension))
            .optional("file", s.file)
            .optional("folders", request.folders_key().as_deref())
            .build()
    }

    fn resolve(&self, request: &ReleaseRequest, _client: &HttpClient) -> Result<Resolution> {
        let s = Settings::from_request(request);
        let file_name = s.file_name();
        let base = self.base.trim_end_matches('/');
        let spec = DownloadSpec::new(format!("{base}/{file_name}"), &file_name)
            .accept(super::accepted_mimes(request));

        let spec = match request.get(DigestAlgorithm::Sha256.attribute()) {
            Some(literal) => spec.expect_digest(DigestAlgorithm::Sha256, literal),
            None => {
                let checksum_file = s
                    .checksum_file
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{file_name}.sha256sum.txt"));
                spec.checksum_url(ChecksumUrl {
                    url: format!("{base}/{checksum_file}"),
                    algorithm: DigestAlgorithm::Sha256,
                    entry: None,
                    required: true,
                })
            }
        };
        Ok(Resolution::Download(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancelToken;
    use crate::core::config::CacheConfig;

    #[test]
    fn test_link_with_required_checksum() {
        let client = HttpClient::new(&CacheConfig::with_root(std::env::temp_dir()), CancelToken::new())
            .unwrap();
        let request = ReleaseRequest::new()
            .with("version", "21.0.4")
            .with("os", "linux")
            .with("extension", "tar.gz");
        let Resolution::Download(spec) = Microsoft::new().resolve(&request, &client).unwrap() else {
            panic!("expected a download");
        };
        assert_eq!(
            spec.url,
            "https://aka.ms/download-jdk/microsoft-jdk-21.0.4-linux-x64.tar.gz"
        );
        let checksum = spec.checksum_url.unwrap();
        assert_eq!(
            checksum.url,
            "https://aka.ms/download-jdk/microsoft-jdk-21.0.4-linux-x64.tar.gz.sha256sum.txt"
        );
        assert!(checksum.required);
        assert_eq!(checksum.algorithm, DigestAlgorithm::Sha256);
    }

    #[test]
    fn test_key_uses_defaults() {
        let request = ReleaseRequest::new().with("os", "windows").with("extension", "zip");
        let key = Microsoft::new().cache_key(&request).unwrap();
        assert!(key.starts_with("MICROSOFT_jdk_17.0.4.1_windows_x64_zip_"), "{key}");
    }
}
