//! Error types for jdk-cache
//!
//! Every failure that can reach the caller of [`crate::JdkCache::acquire`]
//! is one of these variants. Each carries the context needed to diagnose it
//! without re-running verbosely.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for jdk-cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Coarse classification of a [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    OfflineViolation,
    ResolutionFailure,
    Transport,
    Integrity,
    ArchiveFormat,
    Install,
    Lock,
    Cancelled,
    /// Filesystem failure while downloading into or extracting in the work directory
    Io,
}

/// All errors that can occur while acquiring a cached artifact
#[derive(Error, Debug)]
pub enum CacheError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing required attribute '{attribute}' for provider {provider}")]
    MissingAttribute { provider: String, attribute: String },

    #[error("cached entry '{key}' not found and offline mode is active")]
    OfflineViolation { key: String },

    #[error("no release found for {provider} matching {searched}")]
    ResolutionFailure { provider: String, searched: String },

    // Transport errors
    #[error("HTTP request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("unexpected content type '{content_type}' from {url} (accepted: {accepted})")]
    UnexpectedContentType {
        url: String,
        content_type: String,
        accepted: String,
    },

    // Integrity errors
    #[error(
        "{algorithm} integrity check failed for '{}'\n  expected: {expected}\n  computed: {computed}",
        path.display()
    )]
    Integrity {
        algorithm: String,
        expected: String,
        computed: String,
        path: PathBuf,
    },

    #[error("archive error in '{}': {reason}", archive.display())]
    ArchiveFormat { archive: PathBuf, reason: String },

    #[error("cannot install '{}' as '{}': {source}", from.display(), to.display())]
    Install {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Lock errors
    #[error("lock marker '{}' I/O failure: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock '{}' is already held by the current thread", path.display())]
    LockReentrant { path: PathBuf },

    #[error("gave up waiting for lock '{}' after {waited:?}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::MissingAttribute { .. } => ErrorKind::Configuration,
            Self::OfflineViolation { .. } => ErrorKind::OfflineViolation,
            Self::ResolutionFailure { .. } => ErrorKind::ResolutionFailure,
            Self::Transport { .. } | Self::HttpStatus { .. } | Self::UnexpectedContentType { .. } => {
                ErrorKind::Transport
            }
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::ArchiveFormat { .. } => ErrorKind::ArchiveFormat,
            Self::Install { .. } => ErrorKind::Install,
            Self::Lock { .. } | Self::LockReentrant { .. } | Self::LockTimeout { .. } => {
                ErrorKind::Lock
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(archive: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ArchiveFormat {
            archive: archive.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_message_names_both_digests() {
        let err = CacheError::Integrity {
            algorithm: "SHA-256".into(),
            expected: "AA".into(),
            computed: "BB".into(),
            path: PathBuf::from("/tmp/jdk.tar.gz"),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected: AA"));
        assert!(msg.contains("computed: BB"));
        assert!(msg.contains("/tmp/jdk.tar.gz"));
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_kind_groups_transport_variants() {
        let status = CacheError::HttpStatus {
            url: "http://x".into(),
            status: 404,
        };
        assert_eq!(status.kind(), ErrorKind::Transport);
        assert_eq!(
            CacheError::transport("http://x", "reset").kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn test_io_is_not_an_install_failure() {
        let io = CacheError::io(
            "/cache/.~KEY/jdk.tar.gz",
            std::io::Error::new(std::io::ErrorKind::Other, "no space left"),
        );
        assert_eq!(io.kind(), ErrorKind::Io);

        let install = CacheError::Install {
            from: PathBuf::from("/cache/.~KEY/unpacked"),
            to: PathBuf::from("/cache/KEY"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "cross-device link"),
        };
        assert_eq!(install.kind(), ErrorKind::Install);
    }

    #[test]
    fn test_missing_attribute_is_configuration() {
        let err = CacheError::MissingAttribute {
            provider: "ADOPTIUM".into(),
            attribute: "version".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("'version'"));
    }
}
