//! Acquire, verify and cache JDK distributions
//!
//! A request names a provider and a flat set of attributes. The cache turns
//! it into a directory under the cache root holding an unpacked JDK,
//! downloading and verifying the archive only when no entry exists yet.
//!
//! # Example
//!
//! ```no_run
//! use jdk_cache::{CacheConfig, JdkCache, ProviderId, ReleaseRequest};
//!
//! let cache = JdkCache::new(CacheConfig::load()?);
//! let request = ReleaseRequest::new()
//!     .with("type", "jdk")
//!     .with("version", "17*")
//!     .with("arch", "x64");
//! let acquired = cache.acquire(ProviderId::SapMachine, &request)?;
//! println!("{}", acquired.path.display());
//! # Ok::<(), jdk_cache::CacheError>(())
//! ```
//!
//! # Cache layout
//!
//! - `<root>/<key>` - unpacked JDK
//! - `<root>/.#<key>` - lock marker while an acquisition is running
//! - `<root>/.~<key>` - work directory for the download and extraction
//! - `<root>/<archive>` - archives kept with `keepArchive=true`
//!
//! # Providers
//!
//! - `ADOPTIUM`, `SAPMACHINE`, `LIBERICA`, `GRAALVMCE` - GitHub release catalogs
//! - `ADOPTIUM_API`, `CORRETTO`, `MICROSOFT` - vendor download links
//! - `URL` - any archive link, keyed by a caller-chosen `id`
//! - `LOCAL` - an installed JDK (`path` or `JAVA_HOME`), never cached

pub mod acquire;
pub mod archive;
pub mod cache;
pub mod core;
pub mod internal;
pub mod providers;

pub use crate::cache::{Acquired, JdkCache, Origin};
pub use crate::core::cancel::CancelToken;
pub use crate::core::config::{CacheConfig, ProxyConfig};
pub use crate::core::error::{CacheError, ErrorKind, Result};
pub use crate::core::lock::LockPolicy;
pub use crate::acquire::verify::Verification;
pub use crate::providers::{ProviderId, ProviderRegistry, ReleaseRequest, ReleaseResolver, Resolution};
