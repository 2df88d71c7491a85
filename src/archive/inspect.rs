//! Archive format detection and root discovery

use crate::core::error::{CacheError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Container formats JDK distributions ship in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Guess from the file name alone.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| CacheError::io(path, e))
}

fn looks_like_zip(path: &Path) -> Result<bool> {
    Ok(zip::ZipArchive::new(open(path)?).is_ok())
}

fn looks_like_tar_gz(path: &Path) -> Result<bool> {
    let mut archive = tar::Archive::new(GzDecoder::new(open(path)?));
    let first = match archive.entries() {
        Ok(mut entries) => entries.next(),
        Err(_) => return Ok(false),
    };
    Ok(matches!(first, Some(Ok(_))))
}

fn probe(path: &Path, kind: ArchiveKind) -> Result<bool> {
    match kind {
        ArchiveKind::Zip => looks_like_zip(path),
        ArchiveKind::TarGz => looks_like_tar_gz(path),
    }
}

/// Detect the container format of `path`.
///
/// The file name is consulted first; when it names no known format, or the
/// content disagrees with it, the file is opened as zip and then as
/// gzip-compressed tar.
pub fn detect_kind(path: &Path) -> Result<ArchiveKind> {
    let hint = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(ArchiveKind::from_name);

    if let Some(kind) = hint {
        if probe(path, kind)? {
            return Ok(kind);
        }
        tracing::debug!(path = %path.display(), expected = kind.extension(), "content does not match extension");
    }

    for kind in [ArchiveKind::Zip, ArchiveKind::TarGz] {
        if Some(kind) != hint && probe(path, kind)? {
            tracing::debug!(path = %path.display(), kind = kind.extension(), "detected archive by content");
            return Ok(kind);
        }
    }
    Err(CacheError::archive(path, "unrecognized archive"))
}

/// Entry names in archive order, exactly as stored.
pub fn entry_names(path: &Path, kind: ArchiveKind) -> Result<Vec<String>> {
    match kind {
        ArchiveKind::Zip => {
            let mut archive = zip::ZipArchive::new(open(path)?)
                .map_err(|e| CacheError::archive(path, format!("zip read error: {e}")))?;
            let mut names = Vec::with_capacity(archive.len());
            for i in 0..archive.len() {
                let entry = archive
                    .by_index_raw(i)
                    .map_err(|e| CacheError::archive(path, format!("zip entry error: {e}")))?;
                names.push(entry.name().to_owned());
            }
            Ok(names)
        }
        ArchiveKind::TarGz => {
            let mut archive = tar::Archive::new(GzDecoder::new(open(path)?));
            let entries = archive
                .entries()
                .map_err(|e| CacheError::archive(path, format!("tar read error: {e}")))?;
            let mut names = Vec::new();
            for entry in entries {
                let entry =
                    entry.map_err(|e| CacheError::archive(path, format!("tar entry error: {e}")))?;
                names.push(String::from_utf8_lossy(&entry.path_bytes()).into_owned());
            }
            Ok(names)
        }
    }
}

/// Top-level folder of a single entry name, keeping a leading `./`.
///
/// `jdk-17/bin/java` gives `jdk-17/`, `./jdk/lib` gives `./jdk/`, and a
/// top-level file such as `release` gives nothing.
pub fn top_level_folder(name: &str) -> Option<String> {
    let (prefix, rest) = match name.strip_prefix("./") {
        Some(rest) => ("./", rest),
        None => ("", name),
    };
    let slash = rest.find('/')?;
    Some(format!("{prefix}{}", &rest[..=slash]))
}

/// Root folder to strip: the top-level folder of the last entry that has one.
///
/// This is scan-order dependent rather than a true shortest common prefix;
/// an archive mixing several top-level folders yields whichever was seen last.
pub fn archive_root<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    names.into_iter().filter_map(top_level_folder).last()
}

/// Root folder of the archive at `path`.
pub fn find_root(path: &Path, kind: ArchiveKind) -> Result<Option<String>> {
    let names = entry_names(path, kind)?;
    let root = archive_root(names.iter().map(String::as_str));
    tracing::debug!(path = %path.display(), root = ?root, entries = names.len(), "archive root");
    Ok(root)
}
