//! Acquisition orchestration
//!
//! One call to [`JdkCache::acquire`] walks the same states every time:
//!
//! 1. key the request (no network)
//! 2. return a cached entry if one exists
//! 3. refuse to go further when offline
//! 4. take the per-key lock and look again
//! 5. resolve, download and verify into `<root>/.~<key>`
//! 6. extract into `<root>/.~<key>/unpacked`
//! 7. rename the extracted tree to `<root>/<key>`
//!
//! The final entry appears in a single rename, so readers never see a
//! partially extracted JDK.

use crate::acquire::download::{self, DownloadSpec};
use crate::acquire::http::HttpClient;
use crate::acquire::verify::Verification;
use crate::archive;
use crate::core::cancel::CancelToken;
use crate::core::config::CacheConfig;
use crate::core::error::{CacheError, ErrorKind, Result};
use crate::core::lock::acquire_cache_lock;
use crate::core::output;
use crate::internal::fs_utils;
use crate::providers::{ProviderId, ProviderRegistry, ReleaseRequest, ReleaseResolver, Resolution};
use std::path::{Path, PathBuf};

/// Prefix of per-key work directories
pub const WORK_PREFIX: &str = ".~";

/// Sub-directory of the work directory that archives are extracted into
const UNPACKED_DIR: &str = "unpacked";

/// How an [`Acquired`] path came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Cached,
    Downloaded {
        verification: Verification,
        file_name: String,
    },
    Local,
}

/// Result of one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub path: PathBuf,
    /// Cache key; empty for local toolchains.
    pub key: String,
    pub origin: Origin,
}

/// The cache root plus the providers that can fill it.
pub struct JdkCache {
    config: CacheConfig,
    registry: ProviderRegistry,
}

impl JdkCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_registry(config, ProviderRegistry::with_builtin())
    }

    pub fn with_registry(config: CacheConfig, registry: ProviderRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.config.cache_root.join(key)
    }

    pub fn work_dir(&self, key: &str) -> PathBuf {
        self.config.cache_root.join(format!("{WORK_PREFIX}{key}"))
    }

    /// Key of the entry `request` maps to. Never touches the network.
    pub fn cache_key(&self, provider: ProviderId, request: &ReleaseRequest) -> Result<String> {
        self.registry.get(provider)?.cache_key(request)
    }

    pub fn acquire(&self, provider: ProviderId, request: &ReleaseRequest) -> Result<Acquired> {
        self.acquire_with_cancel(provider, request, &CancelToken::new())
    }

    /// Like [`JdkCache::acquire`]; `cancel` aborts waits and transfers.
    pub fn acquire_with_cancel(
        &self,
        provider: ProviderId,
        request: &ReleaseRequest,
        cancel: &CancelToken,
    ) -> Result<Acquired> {
        let resolver = self.registry.get(provider)?;

        if resolver.is_local() {
            let client = HttpClient::new(&self.config, cancel.clone())?;
            return match resolver.resolve(request, &client)? {
                Resolution::Local(path) => {
                    output::info(&format!("using local JDK {}", path.display()));
                    Ok(Acquired {
                        path,
                        key: String::new(),
                        origin: Origin::Local,
                    })
                }
                Resolution::Download(spec) => Err(CacheError::Configuration(format!(
                    "local provider {provider} resolved to a download of {}",
                    spec.url
                ))),
            };
        }

        let key = resolver.cache_key(request)?;
        // Reject malformed flags before any waiting or downloading.
        request.check()?;
        request.keep_archive()?;

        let entry = self.entry_path(&key);
        tracing::debug!(%provider, %key, entry = %entry.display(), "acquire");
        if entry.is_dir() {
            output::skip(&format!("found cached {key}"));
            return Ok(cached(entry, key));
        }
        if self.config.offline {
            return Err(CacheError::OfflineViolation { key });
        }

        let lock = acquire_cache_lock(&self.config.cache_root, &key, &self.config.lock, cancel)?;
        if entry.is_dir() {
            lock.release()?;
            output::skip(&format!("{key} was installed while waiting for the lock"));
            return Ok(cached(entry, key));
        }

        let result = self.populate(resolver.as_ref(), request, &key, cancel);
        let released = lock.release();
        let acquired = result?;
        released?;
        Ok(acquired)
    }

    /// Fill the entry for `key`. Runs with the key's lock held.
    fn populate(
        &self,
        resolver: &dyn ReleaseResolver,
        request: &ReleaseRequest,
        key: &str,
        cancel: &CancelToken,
    ) -> Result<Acquired> {
        let work = self.work_dir(key);
        if work.exists() {
            output::warning(&format!("removing stale work directory {}", work.display()));
            fs_utils::remove_dir_if_exists(&work)?;
        }

        let result = self.populate_in(resolver, request, key, &work, cancel);
        if let Err(e) = fs_utils::remove_dir_if_exists(&work) {
            tracing::warn!(work = %work.display(), error = %e, "could not remove work directory");
        }
        result
    }

    fn populate_in(
        &self,
        resolver: &dyn ReleaseResolver,
        request: &ReleaseRequest,
        key: &str,
        work: &Path,
        cancel: &CancelToken,
    ) -> Result<Acquired> {
        let client = HttpClient::new(&self.config, cancel.clone())?;
        output::action(&format!("acquiring {key} from {}", resolver.id()));

        let spec = match resolver.resolve(request, &client)? {
            Resolution::Download(spec) => spec,
            Resolution::Local(path) => {
                return Ok(Acquired {
                    path,
                    key: key.to_owned(),
                    origin: Origin::Local,
                });
            }
        };
        check_file_name(&spec)?;
        std::fs::create_dir_all(work).map_err(|e| CacheError::io(work, e))?;

        let check = request.check()?;
        let keep_archive = request.keep_archive()?;
        let kept = self.config.cache_root.join(&spec.file_name);

        let (archive_path, verification, reused) = match self.reuse_kept(&client, &spec, &kept, check)? {
            Some(verification) => (kept.clone(), verification, true),
            None => {
                let dest = work.join(&spec.file_name);
                let (downloaded, verification) =
                    download::fetch_verified(&client, &spec, &dest, check, self.config.show_progress)?;
                (downloaded.path, verification, false)
            }
        };

        let unpacked = work.join(UNPACKED_DIR);
        archive::unpack_jdk(
            &archive_path,
            &unpacked,
            &request.folders(),
            self.config.show_progress,
            cancel,
        )?;
        cancel.check()?;

        let entry = self.entry_path(key);
        std::fs::rename(&unpacked, &entry).map_err(|source| CacheError::Install {
            from: unpacked.clone(),
            to: entry.clone(),
            source,
        })?;
        output::success(&format!("installed {key}"));

        if keep_archive && !reused {
            match std::fs::rename(&archive_path, &kept) {
                Ok(()) => output::detail(&format!("kept archive {}", kept.display())),
                Err(e) => output::warning(&format!(
                    "could not keep archive as {}: {e}",
                    kept.display()
                )),
            }
        }

        Ok(Acquired {
            path: entry,
            key: key.to_owned(),
            origin: Origin::Downloaded {
                verification,
                file_name: spec.file_name,
            },
        })
    }

    /// Verification result for a kept archive at `kept`, or `None` when it
    /// is missing or fails verification (it is then deleted).
    fn reuse_kept(
        &self,
        client: &HttpClient,
        spec: &DownloadSpec,
        kept: &Path,
        check: bool,
    ) -> Result<Option<Verification>> {
        if !kept.is_file() {
            return Ok(None);
        }
        if !check {
            output::detail(&format!("reusing kept archive {}", kept.display()));
            return Ok(Some(Verification::Skipped));
        }
        match download::verify_existing(client, spec, kept) {
            Ok(verification) => {
                output::detail(&format!("reusing kept archive {}", kept.display()));
                Ok(Some(verification))
            }
            Err(e) if e.kind() == ErrorKind::Integrity => {
                output::warning(&format!("kept archive {} is damaged: {e}", kept.display()));
                fs_utils::remove_file_if_exists(kept)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn cached(path: PathBuf, key: String) -> Acquired {
    Acquired {
        path,
        key,
        origin: Origin::Cached,
    }
}

/// Archive names become paths under the cache root; they must be one plain segment.
fn check_file_name(spec: &DownloadSpec) -> Result<()> {
    let name = spec.file_name.as_str();
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with(crate::core::lock::LOCK_PREFIX)
        && !name.starts_with(WORK_PREFIX);
    if plain {
        Ok(())
    } else {
        Err(CacheError::Configuration(format!(
            "archive name '{name}' from {} is not a plain file name",
            spec.url
        )))
    }
}
