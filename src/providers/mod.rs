//! Release resolvers
//!
//! A resolver turns a flat attribute map into either a concrete download or
//! a local toolchain path. Every vendor gets one resolver; the registry maps
//! a [`ProviderId`] to its resolver and is the only dispatch point.

pub mod adoptium;
pub mod adoptium_api;
pub mod catalog;
pub mod corretto;
pub mod graalvm;
pub mod liberica;
pub mod local;
pub mod microsoft;
pub mod sapmachine;
pub mod url;

use crate::acquire::http::HttpClient;
use crate::core::error::{CacheError, Result};
use crate::internal::hash::DigestAlgorithm;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

pub use crate::acquire::download::DownloadSpec;
pub use catalog::ReleaseCandidate;

/// Content types accepted for archive downloads unless a request overrides them.
pub const DEFAULT_ARCHIVE_MIMES: [&str; 11] = [
    "application/zip",
    "application/octet-stream",
    "application/x-zip-compressed",
    "application/x-gzip",
    "application/x-gtar",
    "application/x-tar",
    "application/tar",
    "application/x-compress",
    "application/x-compressed",
    "application/x-tgz",
    "application/tar+gzip",
];

/// The closed set of built-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    Adoptium,
    SapMachine,
    Liberica,
    GraalVmCe,
    AdoptiumApi,
    Corretto,
    Microsoft,
    Url,
    Local,
}

impl ProviderId {
    pub const ALL: [ProviderId; 9] = [
        Self::Adoptium,
        Self::SapMachine,
        Self::Liberica,
        Self::GraalVmCe,
        Self::AdoptiumApi,
        Self::Corretto,
        Self::Microsoft,
        Self::Url,
        Self::Local,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Adoptium => "ADOPTIUM",
            Self::SapMachine => "SAPMACHINE",
            Self::Liberica => "LIBERICA",
            Self::GraalVmCe => "GRAALVMCE",
            Self::AdoptiumApi => "ADOPTIUM_API",
            Self::Corretto => "CORRETTO",
            Self::Microsoft => "MICROSOFT",
            Self::Url => "URL",
            Self::Local => "LOCAL",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderId {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|id| id.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|id| id.name()).collect();
                CacheError::Configuration(format!(
                    "unknown provider '{s}', expected one of {}",
                    known.join(", ")
                ))
            })
    }
}

/// Flat, string-keyed attributes of one acquisition.
///
/// Names are case-sensitive (`keepArchive`, `perPage`); blank values count
/// as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseRequest {
    attributes: BTreeMap<String, String>,
}

impl ReleaseRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.attributes.insert(name.to_owned(), value.to_owned());
    }

    /// Parse `name=value` pairs as given on a command line.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut request = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                CacheError::Configuration(format!("attribute '{pair}' is not name=value"))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CacheError::Configuration(format!(
                    "attribute '{pair}' has an empty name"
                )));
            }
            request.set(name, value.trim());
        }
        Ok(request)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    pub fn require(&self, provider: ProviderId, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| CacheError::MissingAttribute {
            provider: provider.name().to_owned(),
            attribute: name.to_owned(),
        })
    }

    /// Boolean attribute; only `true` and `false` (any case) are accepted.
    pub fn flag(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(CacheError::Configuration(format!(
                "attribute '{name}' must be true or false, got '{v}'"
            ))),
        }
    }

    /// Verify checksums (`check`, default true).
    pub fn check(&self) -> Result<bool> {
        self.flag("check", true)
    }

    /// Keep the downloaded archive in the cache root (`keepArchive`, default false).
    pub fn keep_archive(&self) -> Result<bool> {
        self.flag("keepArchive", false)
    }

    /// Sub-folders to extract (`folders`, comma separated); empty means all.
    pub fn folders(&self) -> Vec<String> {
        self.get("folders")
            .map(|v| {
                v.split(',')
                    .map(|f| f.trim().trim_matches('/').to_owned())
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `folders` as a key attribute: sorted, deduplicated, comma joined.
    pub fn folders_key(&self) -> Option<String> {
        let mut folders = self.folders();
        folders.sort();
        folders.dedup();
        (!folders.is_empty()).then(|| folders.join(","))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// What a resolver produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Download(DownloadSpec),
    /// An installed toolchain; bypasses the cache.
    Local(PathBuf),
}

/// Turns a request into something the orchestrator can install.
pub trait ReleaseResolver: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Key of the cache entry this request maps to. Must not touch the network.
    fn cache_key(&self, request: &ReleaseRequest) -> Result<String>;

    fn resolve(&self, request: &ReleaseRequest, client: &HttpClient) -> Result<Resolution>;

    /// Local resolvers never use the cache or the lock.
    fn is_local(&self) -> bool {
        false
    }
}

/// Maps provider ids to resolvers.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    resolvers: HashMap<ProviderId, Arc<dyn ReleaseResolver>>,
}

impl ProviderRegistry {
    /// Registry holding every built-in provider.
    pub fn with_builtin() -> Self {
        let mut registry = Self::default();
        registry.register(adoptium::Adoptium::new());
        registry.register(sapmachine::SapMachine::new());
        registry.register(liberica::Liberica::new());
        registry.register(graalvm::GraalVmCe::new());
        registry.register(adoptium_api::AdoptiumApi::new());
        registry.register(corretto::Corretto::new());
        registry.register(microsoft::Microsoft::new());
        registry.register(url::UrlLink::new());
        registry.register(local::Local::new());
        registry
    }

    /// Add or replace the resolver for its id.
    pub fn register(&mut self, resolver: impl ReleaseResolver + 'static) {
        self.resolvers.insert(resolver.id(), Arc::new(resolver));
    }

    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn ReleaseResolver>> {
        self.resolvers
            .get(&id)
            .cloned()
            .ok_or_else(|| CacheError::Configuration(format!("no resolver registered for {id}")))
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.resolvers.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Operating system family of the running host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    Mac,
    Linux,
    Other(&'static str),
}

impl HostOs {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Self::Windows,
            "macos" => Self::Mac,
            "linux" => Self::Linux,
            other => Self::Other(other),
        }
    }

    /// Vendor id of this OS; vendors disagree on what to call macOS.
    pub fn id(&self, mac_id: &'static str) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Mac => mac_id,
            Self::Linux => "linux",
            Self::Other(name) => *name,
        }
    }

    /// Archive extension the vendors publish for this OS.
    pub fn archive_extension(&self) -> &'static str {
        match self {
            Self::Windows => "zip",
            _ => "tar.gz",
        }
    }
}

/// `os` attribute, or the host OS under the vendor's naming.
pub(crate) fn requested_os(request: &ReleaseRequest, mac_id: &'static str) -> String {
    request
        .get("os")
        .map(str::to_owned)
        .unwrap_or_else(|| HostOs::current().id(mac_id).to_owned())
}

/// `extension` attribute, or the host's usual archive extension.
pub(crate) fn requested_extension(request: &ReleaseRequest) -> String {
    request
        .get("extension")
        .map(|e| e.trim_start_matches('.').to_owned())
        .unwrap_or_else(|| HostOs::current().archive_extension().to_owned())
}

/// Compile a vendor grammar once; a bad pattern is reported, not panicked on.
pub(crate) fn compiled(
    cell: &'static OnceLock<std::result::Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| CacheError::Configuration(format!("invalid file name grammar: {e}")))
}

/// Default archive content types, or the request's comma-separated `mime` list.
pub(crate) fn accepted_mimes(request: &ReleaseRequest) -> Vec<String> {
    match request.get("mime") {
        Some(list) => list
            .split(',')
            .map(|m| m.trim().to_owned())
            .filter(|m| !m.is_empty())
            .collect(),
        None => DEFAULT_ARCHIVE_MIMES.iter().map(|m| m.to_string()).collect(),
    }
}

/// Literal digests given as `sha256=...`, `md5=...` and the like.
pub(crate) fn literal_digests(request: &ReleaseRequest) -> Vec<(DigestAlgorithm, String)> {
    DigestAlgorithm::ALL
        .into_iter()
        .filter_map(|alg| request.get(alg.attribute()).map(|v| (alg, v.to_owned())))
        .collect()
}

/// Last path segment of a URL, without query or fragment.
pub(crate) fn file_name_of(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}
