//! Paginated GitHub release catalogs
//!
//! Vendors publishing builds as GitHub release assets share one search loop:
//! pages are fetched in ascending order and each vendor's grammar turns asset
//! names into candidates. The loop stops at the first page with a match, or
//! at the first empty page.

use super::ReleaseRequest;
use crate::acquire::download::DownloadSpec;
use crate::acquire::http::{HttpClient, MIME_GITHUB_JSON};
use crate::core::error::{CacheError, Result};
use crate::core::output;
use serde::Deserialize;

pub const GITHUB_API: &str = "https://api.github.com";

pub const DEFAULT_PER_PAGE: u32 = 40;
const MAX_PER_PAGE: u32 = 100;

/// Archive extensions in order of preference.
pub const EXTENSION_PREFERENCE: [&str; 2] = ["tar.gz", "zip"];

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl GithubAsset {
    /// Only `.zip` and `.tar.gz` assets are candidates.
    pub fn is_archive(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        name.ends_with(".zip") || name.ends_with(".tar.gz")
    }
}

/// One downloadable asset, parsed from its file name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseCandidate {
    pub version: String,
    pub image_type: String,
    pub arch: String,
    pub os: String,
    pub implementation: Option<String>,
    pub build: Option<String>,
    pub extension: String,
    pub file_name: String,
    pub link: String,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

impl ReleaseCandidate {
    /// Fill the asset-level fields from the catalog entry.
    pub fn with_asset(mut self, asset: &GithubAsset) -> Self {
        self.file_name = asset.name.clone();
        self.link = asset.browser_download_url.clone();
        self.content_type = asset.content_type.clone();
        self.size = asset.size.filter(|s| *s > 0);
        self
    }
}

/// Which repository to search and how.
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub repository: String,
    pub per_page: u32,
    pub include_prereleases: bool,
}

/// `perPage` attribute clamped to 1..=100.
pub fn per_page(raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_PER_PAGE);
    };
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| CacheError::Configuration(format!("perPage must be a number, got '{raw}'")))?;
    Ok(value.clamp(1, MAX_PER_PAGE as i64) as u32)
}

/// Search the catalog page by page with `select` picking candidates from a
/// release. Returns every match of the first page that has any.
pub fn search<F>(
    client: &HttpClient,
    api_base: &str,
    query: &CatalogQuery,
    mut select: F,
) -> Result<Vec<ReleaseCandidate>>
where
    F: FnMut(&GithubRelease) -> Result<Vec<ReleaseCandidate>>,
{
    let accept = [MIME_GITHUB_JSON.to_owned()];
    let mut page = 1u32;
    loop {
        client.cancel_token().check()?;
        let url = format!(
            "{}/repos/{}/releases?per_page={}&page={page}",
            api_base.trim_end_matches('/'),
            query.repository,
            query.per_page
        );
        let json = client.get_json(&url, &accept)?;
        let releases: Vec<GithubRelease> = serde_json::from_value(json)
            .map_err(|e| CacheError::transport(&url, format!("unexpected release list: {e}")))?;
        if releases.is_empty() {
            tracing::debug!(page, repository = %query.repository, "catalog exhausted");
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for release in &releases {
            if release.draft || (release.prerelease && !query.include_prereleases) {
                continue;
            }
            matches.extend(select(release)?);
        }
        tracing::debug!(page, releases = releases.len(), matches = matches.len(), "catalog page");
        if !matches.is_empty() {
            return Ok(matches);
        }
        page += 1;
    }
}

/// Pick one candidate by extension preference, then catalog order.
pub fn choose(candidates: Vec<ReleaseCandidate>) -> Option<ReleaseCandidate> {
    for ext in EXTENSION_PREFERENCE {
        if let Some(pos) = candidates
            .iter()
            .position(|c| c.extension.eq_ignore_ascii_case(ext))
        {
            return candidates.into_iter().nth(pos);
        }
    }
    candidates.into_iter().next()
}

/// `name='value'` list describing a search, for failure messages.
pub fn describe(attributes: &[(&str, &str)]) -> String {
    attributes
        .iter()
        .map(|(k, v)| format!("{k}='{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Search, then choose; nothing found is a resolution failure.
pub fn find_release<F>(
    client: &HttpClient,
    api_base: &str,
    provider: &str,
    query: &CatalogQuery,
    searched: &[(&str, &str)],
    select: F,
) -> Result<ReleaseCandidate>
where
    F: FnMut(&GithubRelease) -> Result<Vec<ReleaseCandidate>>,
{
    output::detail(&format!("searching {} releases", query.repository));
    let found = search(client, api_base, query, select)?;
    let chosen = choose(found).ok_or_else(|| CacheError::ResolutionFailure {
        provider: provider.to_owned(),
        searched: describe(searched),
    })?;
    output::detail(&format!("selected {}", chosen.file_name));
    Ok(chosen)
}

/// Download spec for a catalog candidate.
pub fn download_spec(chosen: &ReleaseCandidate, request: &ReleaseRequest) -> DownloadSpec {
    let mut accepted = super::accepted_mimes(request);
    if let Some(ct) = &chosen.content_type
        && !accepted.iter().any(|a| a.eq_ignore_ascii_case(ct))
    {
        accepted.insert(0, ct.clone());
    }
    let spec = DownloadSpec::new(&chosen.link, &chosen.file_name).accept(accepted);
    match chosen.size {
        Some(size) => spec.with_size(size),
        None => spec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(ext: &str, name: &str) -> ReleaseCandidate {
        ReleaseCandidate {
            extension: ext.to_owned(),
            file_name: name.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_per_page_clamped() {
        assert_eq!(per_page(None).unwrap(), 40);
        assert_eq!(per_page(Some("0")).unwrap(), 1);
        assert_eq!(per_page(Some("500")).unwrap(), 100);
        assert_eq!(per_page(Some(" 25 ")).unwrap(), 25);
        assert!(per_page(Some("many")).is_err());
    }

    #[test]
    fn test_choose_prefers_tar_gz() {
        let chosen = choose(vec![
            candidate("zip", "a.zip"),
            candidate("tar.gz", "a.tar.gz"),
            candidate("tar.gz", "b.tar.gz"),
        ])
        .unwrap();
        assert_eq!(chosen.file_name, "a.tar.gz");

        let chosen = choose(vec![candidate("zip", "only.zip")]).unwrap();
        assert_eq!(chosen.file_name, "only.zip");
        assert!(choose(Vec::new()).is_none());
    }

    #[test]
    fn test_asset_filter() {
        let asset = |name: &str| GithubAsset {
            name: name.to_owned(),
            browser_download_url: String::new(),
            content_type: None,
            size: None,
        };
        assert!(asset("x.tar.gz").is_archive());
        assert!(asset("x.ZIP").is_archive());
        assert!(!asset("x.tar.gz.sha256.txt").is_archive());
        assert!(!asset("x.msi").is_archive());
    }

    #[test]
    fn test_release_json_tolerates_missing_fields() {
        let json = r#"[{"tag_name":"v1","assets":[{"name":"a.zip","browser_download_url":"u"}]},{"draft":true}]"#;
        let releases: Vec<GithubRelease> = serde_json::from_str(json).unwrap();
        assert_eq!(releases.len(), 2);
        assert!(releases[1].draft);
        assert!(releases[1].assets.is_empty());
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(&[("version", "17*"), ("os", "linux")]),
            "version='17*', os='linux'"
        );
    }
}
