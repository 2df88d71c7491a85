//! Adoptium binary API (`https://api.adoptium.net/v3/`)
//!
//! The API answers with a redirect to the archive itself, so the download
//! name is synthesized from the request and the format is probed after the
//! download.

use super::{ProviderId, ReleaseRequest, ReleaseResolver, Resolution};
use crate::acquire::download::DownloadSpec;
use crate::acquire::http::{self, HttpClient, MIME_ALL};
use crate::core::error::{CacheError, Result};
use crate::internal::cache_key::CacheKeyBuilder;

pub const API_BASE: &str = "https://api.adoptium.net/v3/";

struct Settings<'a> {
    api_url: String,
    feature_version: Option<&'a str>,
    release_name: Option<&'a str>,
    release_type: &'a str,
    arch: &'a str,
    heap_size: &'a str,
    image_type: &'a str,
    jvm_impl: &'a str,
    os: String,
    vendor: &'a str,
    c_lib: Option<&'a str>,
    project: Option<&'a str>,
}

impl<'a> Settings<'a> {
    fn from_request(request: &'a ReleaseRequest, default_api: &str) -> Result<Self> {
        let feature_version = request.get("featureVersion");
        let release_name = request.get("releaseName");
        if feature_version.is_none() && release_name.is_none() {
            return Err(CacheError::MissingAttribute {
                provider: ProviderId::AdoptiumApi.name().to_owned(),
                attribute: "featureVersion".to_owned(),
            });
        }
        Ok(Self {
            api_url: request.get_or("apiUrl", default_api).to_owned(),
            feature_version,
            release_name,
            release_type: request.get_or("releaseType", "ga"),
            arch: request.get_or("arch", "x64"),
            heap_size: request.get_or("heapSize", "normal"),
            image_type: request.get_or("imageType", "jdk"),
            jvm_impl: request.get_or("jvmImpl", "hotspot"),
            os: super::requested_os(request, "mac"),
            vendor: request.get_or("vendor", "eclipse"),
            c_lib: request.get("cLib"),
            project: request.get("project"),
        })
    }

    /// `binary/version/<release>` wins over `binary/latest/<feature>/<type>`.
    fn url(&self) -> String {
        let mut url = self.api_url.clone();
        if !url.ends_with('/') {
            url.push('/');
        }
        match (self.release_name, self.feature_version) {
            (Some(release), _) => url.push_str(&format!("binary/version/{release}")),
            (None, Some(feature)) => {
                url.push_str(&format!("binary/latest/{feature}/{}", self.release_type))
            }
            (None, None) => {}
        }
        for segment in [
            self.os.as_str(),
            self.arch,
            self.image_type,
            self.jvm_impl,
            self.heap_size,
            self.vendor,
        ] {
            url.push('/');
            url.push_str(segment);
        }

        let query: Vec<String> = [("c_lib", self.c_lib), ("project", self.project)]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| format!("{name}={v}")))
            .collect();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    fn file_name(&self, extension: &str) -> String {
        let release = self
            .release_name
            .or(self.feature_version)
            .unwrap_or("latest");
        format!(
            "adoptium-{release}-{}-{}-{}-{}.{extension}",
            self.image_type, self.os, self.arch, self.jvm_impl
        )
        .replace(['/', '\\', ' '], "_")
    }
}

/// Direct links built from the Adoptium binary API.
pub struct AdoptiumApi {
    api_base: String,
}

impl AdoptiumApi {
    pub fn new() -> Self {
        Self::with_base(API_BASE)
    }

    /// Default for `apiUrl` when the request does not set one.
    pub fn with_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for AdoptiumApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseResolver for AdoptiumApi {
    fn id(&self) -> ProviderId {
        ProviderId::AdoptiumApi
    }

    fn cache_key(&self, request: &ReleaseRequest) -> Result<String> {
        let s = Settings::from_request(request, &self.api_base)?;
        CacheKeyBuilder::new(self.id().name())
            .optional("api", http::host_of(&s.api_url))
            .optional("featureVersion", s.feature_version)
            .optional("releaseName", s.release_name)
            .optional(
                "releaseType",
                s.feature_version.is_some().then_some(s.release_type),
            )
            .required("arch", Some(s.arch))
            .required("heapSize", Some(s.heap_size))
            .required("imageType", Some(s.image_type))
            .required("jvmImpl", Some(s.jvm_impl))
            .required("os", Some(&s.os))
            .required("vendor", Some(s.vendor))
            .optional("cLib", s.c_lib)
            .optional("project", s.project)
            .optional("folders", request.folders_key().as_deref())
            .build()
    }

    fn resolve(&self, request: &ReleaseRequest, _client: &HttpClient) -> Result<Resolution> {
        let s = Settings::from_request(request, &self.api_base)?;
        let url = s.url();
        tracing::debug!(%url, "adoptium api link");
        let spec = DownloadSpec::new(url, s.file_name(&super::requested_extension(request)))
            .accept([MIME_ALL])
            .with_etag_check();
        Ok(Resolution::Download(spec))
    }
}
