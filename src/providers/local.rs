//! Already-installed toolchains

use super::{ProviderId, ReleaseRequest, ReleaseResolver, Resolution};
use crate::acquire::http::HttpClient;
use crate::core::error::{CacheError, Result};
use crate::internal::cache_key::CacheKeyBuilder;
use std::path::{Path, PathBuf};

/// Compiler whose presence marks a JDK home.
pub fn javac_path(home: &Path) -> PathBuf {
    let name = if cfg!(windows) { "javac.exe" } else { "javac" };
    home.join("bin").join(name)
}

/// Resolves `path` (or `JAVA_HOME`) to a JDK home without touching the cache.
#[derive(Default)]
pub struct Local {
    java_home: Option<PathBuf>,
}

impl Local {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `home` instead of the `JAVA_HOME` environment variable.
    pub fn with_java_home(home: impl Into<PathBuf>) -> Self {
        Self {
            java_home: Some(home.into()),
        }
    }

    fn home(&self, request: &ReleaseRequest) -> Result<PathBuf> {
        if let Some(path) = request.get("path") {
            return Ok(PathBuf::from(path));
        }
        self.java_home
            .clone()
            .or_else(|| {
                std::env::var_os("JAVA_HOME")
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .ok_or_else(|| CacheError::MissingAttribute {
                provider: ProviderId::Local.name().to_owned(),
                attribute: "path".to_owned(),
            })
    }
}

impl ReleaseResolver for Local {
    fn id(&self) -> ProviderId {
        ProviderId::Local
    }

    fn cache_key(&self, request: &ReleaseRequest) -> Result<String> {
        let home = self.home(request)?;
        CacheKeyBuilder::new(self.id().name())
            .required("path", Some(&home.to_string_lossy()))
            .build()
    }

    fn resolve(&self, request: &ReleaseRequest, _client: &HttpClient) -> Result<Resolution> {
        let home = self.home(request)?;
        let javac = javac_path(&home);
        if !javac.is_file() {
            return Err(CacheError::ResolutionFailure {
                provider: self.id().name().to_owned(),
                searched: format!("path='{}' (no {})", home.display(), javac.display()),
            });
        }
        tracing::debug!(home = %home.display(), "using installed JDK");
        Ok(Resolution::Local(home))
    }

    fn is_local(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancelToken;
    use crate::core::config::CacheConfig;
    use tempfile::TempDir;

    fn client() -> HttpClient {
        HttpClient::new(&CacheConfig::with_root(std::env::temp_dir()), CancelToken::new()).unwrap()
    }

    fn fake_jdk() -> TempDir {
        let dir = TempDir::new().unwrap();
        let javac = javac_path(dir.path());
        std::fs::create_dir_all(javac.parent().unwrap()).unwrap();
        std::fs::write(&javac, b"").unwrap();
        dir
    }

    #[test]
    fn test_path_attribute_wins() {
        let jdk = fake_jdk();
        let request = ReleaseRequest::new().with("path", &jdk.path().to_string_lossy());
        let resolution = Local::with_java_home("/nonexistent").resolve(&request, &client()).unwrap();
        assert_eq!(resolution, Resolution::Local(jdk.path().to_path_buf()));
    }

    #[test]
    fn test_java_home_fallback() {
        let jdk = fake_jdk();
        let resolution = Local::with_java_home(jdk.path())
            .resolve(&ReleaseRequest::new(), &client())
            .unwrap();
        assert_eq!(resolution, Resolution::Local(jdk.path().to_path_buf()));
    }

    #[test]
    fn test_directory_without_javac_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = Local::with_java_home(dir.path())
            .resolve(&ReleaseRequest::new(), &client())
            .unwrap_err();
        assert!(matches!(err, CacheError::ResolutionFailure { .. }));
    }

    #[test]
    fn test_is_local() {
        assert!(Local::new().is_local());
    }
}
