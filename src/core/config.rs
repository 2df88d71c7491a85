//! Layered configuration
//!
//! Lowest to highest precedence: built-in defaults, TOML files
//! (`$XDG_CONFIG_DIRS/jdk-cache/config.toml` then
//! `$XDG_CONFIG_HOME/jdk-cache/config.toml`), `JDK_CACHE_*` environment
//! variables. The CLI applies its flags on top of the result.

use super::error::{CacheError, Result};
use super::lock::LockPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the home directory used when no cache root is configured
pub const DEFAULT_CACHE_DIR_NAME: &str = ".jdkCache";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_GATEWAY_RETRY_SECS: u64 = 10;

/// Proxy the HTTP transport should tunnel through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Host patterns (`*`, `?` wildcards) reached without the proxy.
    pub non_proxy_hosts: Vec<String>,
}

impl ProxyConfig {
    /// Parse `[protocol://][user[:password]@]host:port`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (protocol, rest) = match raw.split_once("://") {
            Some((p, rest)) => (p.to_ascii_lowercase(), rest),
            None => ("http".to_owned(), raw),
        };
        let rest = rest.trim_end_matches('/');

        let (credentials, address) = match rest.rsplit_once('@') {
            Some((c, a)) => (Some(c), a),
            None => (None, rest),
        };
        let (username, password) = match credentials {
            Some(c) => match c.split_once(':') {
                Some((u, p)) => (Some(u.to_owned()), Some(p.to_owned())),
                None => (Some(c.to_owned()), None),
            },
            None => (None, None),
        };

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| CacheError::Configuration(format!("proxy '{raw}' has no port")))?;
        if host.is_empty() {
            return Err(CacheError::Configuration(format!("proxy '{raw}' has no host")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| CacheError::Configuration(format!("proxy '{raw}' has invalid port")))?;

        Ok(Self {
            protocol,
            host: host.to_owned(),
            port,
            username,
            password,
            non_proxy_hosts: Vec::new(),
        })
    }

    /// Set bypass patterns from a `|`-separated list such as `localhost|*.corp`.
    pub fn set_non_proxy_hosts(&mut self, list: &str) {
        self.non_proxy_hosts = list
            .split('|')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_owned)
            .collect();
    }

    /// Render in the form `ureq::Proxy::new` understands.
    pub fn to_url(&self) -> String {
        let credentials = match (&self.username, &self.password) {
            (Some(u), Some(p)) => format!("{u}:{p}@"),
            (Some(u), None) => format!("{u}@"),
            _ => String::new(),
        };
        format!(
            "{}://{}{}:{}",
            self.protocol, credentials, self.host, self.port
        )
    }
}

/// Everything an acquisition needs besides the request attributes.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_root: PathBuf,
    pub offline: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub proxy: Option<ProxyConfig>,
    /// Sent verbatim as the `Authorization` header.
    pub authorization: Option<String>,
    pub user_agent: String,
    pub lock: LockPolicy,
    /// Backoff before the single retry on a gateway timeout.
    pub gateway_retry_delay: Duration,
    pub show_progress: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let timeout = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS);
        Self {
            cache_root: default_cache_root(),
            offline: false,
            connect_timeout: timeout,
            read_timeout: timeout,
            proxy: None,
            authorization: None,
            user_agent: concat!("jdk-cache/", env!("CARGO_PKG_VERSION")).to_owned(),
            lock: LockPolicy::default(),
            gateway_retry_delay: Duration::from_secs(DEFAULT_GATEWAY_RETRY_SECS),
            show_progress: true,
        }
    }
}

impl CacheConfig {
    /// Defaults, then config files, then environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        let mut merged = ConfigToml::default();
        for path in find_config_files() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "reading config file");
                merged.merge(read_toml(&path)?);
            }
        }
        config.apply_toml(&merged)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// A config rooted at `cache_root` with every other field defaulted.
    pub fn with_root(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    pub fn apply_toml(&mut self, toml: &ConfigToml) -> Result<()> {
        if let Some(root) = &toml.cache_root {
            self.cache_root = expand_home(root);
        }
        if let Some(offline) = toml.offline {
            self.offline = offline;
        }
        if let Some(secs) = toml.connect_timeout_secs {
            self.connect_timeout = clamp_timeout(secs);
            self.read_timeout = self.connect_timeout;
        }
        if let Some(secs) = toml.read_timeout_secs {
            self.read_timeout = clamp_timeout(secs);
        }
        if let Some(proxy) = &toml.proxy {
            self.proxy = Some(ProxyConfig::parse(proxy)?);
        }
        if let (Some(proxy), Some(list)) = (self.proxy.as_mut(), &toml.non_proxy_hosts) {
            proxy.set_non_proxy_hosts(list);
        }
        if let Some(auth) = &toml.authorization {
            self.authorization = Some(auth.clone());
        }
        if let Some(agent) = &toml.user_agent {
            self.user_agent = agent.clone();
        }
        if let Some(ms) = toml.lock_poll_ms {
            self.lock.poll_interval = Duration::from_millis(ms.max(10));
        }
        if let Some(secs) = toml.lock_timeout_secs {
            self.lock.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = toml.gateway_retry_delay_secs {
            self.gateway_retry_delay = Duration::from_secs(secs);
        }
        if let Some(progress) = toml.progress {
            self.show_progress = progress;
        }
        Ok(())
    }

    /// Connect and read timeout, clamped to 1..=3600 seconds.
    pub fn set_timeout(&mut self, secs: u64) {
        self.connect_timeout = clamp_timeout(secs);
        self.read_timeout = self.connect_timeout;
    }

    /// Apply `JDK_CACHE_*` variables as resolved by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(root) = get("JDK_CACHE_ROOT") {
            self.cache_root = expand_home(Path::new(&root));
        }
        if let Some(offline) = get("JDK_CACHE_OFFLINE") {
            self.offline = parse_bool("JDK_CACHE_OFFLINE", &offline)?;
        }
        if let Some(secs) = get("JDK_CACHE_TIMEOUT") {
            self.set_timeout(parse_u64("JDK_CACHE_TIMEOUT", &secs)?);
        }
        if let Some(proxy) = get("JDK_CACHE_PROXY") {
            self.proxy = Some(ProxyConfig::parse(&proxy)?);
        }
        if let (Some(proxy), Some(list)) = (self.proxy.as_mut(), get("JDK_CACHE_NON_PROXY_HOSTS")) {
            proxy.set_non_proxy_hosts(&list);
        }
        if let Some(auth) = get("JDK_CACHE_AUTHORIZATION") {
            self.authorization = Some(auth);
        }
        if let Some(secs) = get("JDK_CACHE_LOCK_TIMEOUT") {
            self.lock.timeout = Some(Duration::from_secs(parse_u64(
                "JDK_CACHE_LOCK_TIMEOUT",
                &secs,
            )?));
        }
        Ok(())
    }
}

/// On-disk form; every field optional so files can be merged.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigToml {
    pub cache_root: Option<PathBuf>,
    pub offline: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub proxy: Option<String>,
    pub non_proxy_hosts: Option<String>,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub lock_poll_ms: Option<u64>,
    pub lock_timeout_secs: Option<u64>,
    pub gateway_retry_delay_secs: Option<u64>,
    pub progress: Option<bool>,
}

impl ConfigToml {
    pub fn merge(&mut self, other: ConfigToml) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            cache_root,
            offline,
            connect_timeout_secs,
            read_timeout_secs,
            proxy,
            non_proxy_hosts,
            authorization,
            user_agent,
            lock_poll_ms,
            lock_timeout_secs,
            gateway_retry_delay_secs,
            progress
        );
    }
}

fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CACHE_DIR_NAME)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

fn clamp_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(1, 3600))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CacheError::Configuration(format!(
            "{name}: expected a boolean, got '{raw}'"
        ))),
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|_| {
        CacheError::Configuration(format!("{name}: expected a number of seconds, got '{raw}'"))
    })
}

fn split_xdg_config_dirs() -> Vec<PathBuf> {
    let raw = std::env::var("XDG_CONFIG_DIRS").unwrap_or_else(|_| "/etc/xdg".to_owned());
    raw.split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn xdg_config_home() -> PathBuf {
    if let Ok(raw) = std::env::var("XDG_CONFIG_HOME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".").join(".config"))
}

fn find_config_files() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = split_xdg_config_dirs()
        .into_iter()
        .map(|dir| dir.join("jdk-cache").join("config.toml"))
        .collect();
    paths.push(xdg_config_home().join("jdk-cache").join("config.toml"));
    paths
}

fn read_toml(path: &Path) -> Result<ConfigToml> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CacheError::Configuration(format!("failed to read {}: {e}", path.display()))
    })?;
    toml::from_str::<ConfigToml>(&text).map_err(|e| {
        CacheError::Configuration(format!("invalid TOML in {}: {e}", path.display()))
    })
}
