//! Selective archive extraction
//!
//! Entries are written relative to the archive root, optionally limited to a
//! set of sub-folders. Paths are validated before anything touches the disk:
//! no absolute paths, no `..`, no writing through symlinks, and no link
//! targets outside the destination.

use super::inspect::{self, ArchiveKind};
use crate::core::cancel::CancelToken;
use crate::core::error::{CacheError, Result};
use crate::core::output;
use crate::internal::fs_utils;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// File name suffixes that mark a file as executable.
const EXECUTABLE_SUFFIXES: [&str; 4] = [".sh", ".exe", ".bat", ".cmd"];

/// What to take out of an archive.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Prefix stripped from every entry; entries outside it are skipped.
    /// `None` extracts every entry as stored.
    pub root: Option<String>,
    /// Sub-folders (relative to the root) to extract. Empty means all.
    pub folders: Vec<String>,
}

// ============================================================================
// Path validation
// ============================================================================

fn normalize_lexical(path: &Path) -> PathBuf {
    // No filesystem access; used to validate link targets without following them.
    let mut out = PathBuf::new();
    let mut has_root = false;

    for c in path.components() {
        match c {
            Component::Prefix(p) => {
                out.clear();
                out.push(p.as_os_str());
                has_root = true;
            }
            Component::RootDir => {
                out.push(Component::RootDir.as_os_str());
                has_root = true;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = out
                    .components()
                    .next_back()
                    .is_some_and(|last| matches!(last, Component::Normal(_)));
                if popped {
                    out.pop();
                } else if !has_root {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
        }
    }

    out
}

fn ensure_no_symlink_components(archive: &Path, dest: &Path, full_path: &Path) -> Result<()> {
    let rel = full_path.strip_prefix(dest).map_err(|_| {
        CacheError::archive(
            archive,
            format!("entry outside destination: {}", full_path.display()),
        )
    })?;

    let mut cur = dest.to_path_buf();
    for comp in rel.components() {
        cur.push(comp);
        if let Ok(md) = std::fs::symlink_metadata(&cur)
            && md.file_type().is_symlink()
        {
            return Err(CacheError::archive(
                archive,
                format!("extraction blocked, symlink in path: {}", cur.display()),
            ));
        }
    }
    Ok(())
}

fn ensure_link_target_within_dest(
    archive: &Path,
    dest: &Path,
    link_parent: &Path,
    target: &Path,
) -> Result<()> {
    if target.is_absolute()
        || target
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(CacheError::archive(
            archive,
            format!("unsafe link target (absolute): {}", target.display()),
        ));
    }

    let candidate = normalize_lexical(&link_parent.join(target));
    if candidate.strip_prefix(normalize_lexical(dest)).is_err() {
        return Err(CacheError::archive(
            archive,
            format!(
                "unsafe link target (escapes destination): {} -> {}",
                link_parent.display(),
                target.display()
            ),
        ));
    }
    Ok(())
}

/// Map a stored entry name to its destination-relative path.
///
/// `None` means the entry is skipped: it lies outside the root or the
/// requested folders, or it is the root itself.
pub fn relative_target(name: &str, options: &ExtractOptions) -> Option<String> {
    let rel = match &options.root {
        Some(root) => name.strip_prefix(root.as_str())?,
        None => name.strip_prefix("./").unwrap_or(name),
    };
    let rel = rel.trim_start_matches('/');
    let trimmed = rel.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }

    if !options.folders.is_empty() {
        let wanted = options.folders.iter().any(|folder| {
            let folder = folder.trim_matches('/');
            trimmed == folder
                || trimmed
                    .strip_prefix(folder)
                    .is_some_and(|rest| rest.starts_with('/'))
        });
        if !wanted {
            return None;
        }
    }
    Some(rel.to_owned())
}

fn safe_relative(archive: &Path, rel: &str) -> Result<PathBuf> {
    let path = PathBuf::from(rel);
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
    {
        return Err(CacheError::archive(archive, format!("unsafe entry path: {rel}")));
    }
    Ok(path)
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))
}

fn prepare_parent(archive: &Path, dest: &Path, full_path: &Path) -> Result<()> {
    if let Some(parent) = full_path.parent() {
        ensure_no_symlink_components(archive, dest, parent)?;
        create_dir(parent)?;
    }
    Ok(())
}

/// Whether a file of `size` bytes at `path` should get the execute bit.
pub fn is_executable_name(path: &Path, size: u64) -> bool {
    if size == 0 {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_ascii_lowercase();
    !lower.contains('.') || EXECUTABLE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Copy exactly `declared` bytes from an entry into a new file.
fn write_file(archive: &Path, reader: &mut dyn Read, full_path: &Path, declared: u64) -> Result<()> {
    let mut out = File::create(full_path).map_err(|e| CacheError::io(full_path, e))?;
    let written = std::io::copy(reader, &mut out).map_err(|e| {
        CacheError::archive(archive, format!("write error for {}: {e}", full_path.display()))
    })?;
    if written != declared {
        return Err(CacheError::archive(
            archive,
            format!(
                "entry {} declared {declared} bytes but {written} were written",
                full_path.display()
            ),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777));
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) {}

fn finish_file(full_path: &Path, size: u64, mode: Option<u32>) -> Result<()> {
    apply_mode(full_path, mode);
    if is_executable_name(full_path, size) {
        fs_utils::make_executable(full_path)?;
    }
    Ok(())
}

// ============================================================================
// Formats
// ============================================================================

fn extract_tar<R: Read>(
    archive_path: &Path,
    reader: R,
    dest: &Path,
    options: &ExtractOptions,
    cancel: &CancelToken,
) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut files = 0usize;

    let entries = archive
        .entries()
        .map_err(|e| CacheError::archive(archive_path, format!("tar read error: {e}")))?;
    for entry in entries {
        cancel.check()?;
        let mut entry =
            entry.map_err(|e| CacheError::archive(archive_path, format!("tar entry error: {e}")))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some(rel) = relative_target(&name, options) else {
            continue;
        };
        let full_path = dest.join(safe_relative(archive_path, &rel)?);
        ensure_no_symlink_components(archive_path, dest, &full_path)?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            create_dir(&full_path)?;
            continue;
        }
        prepare_parent(archive_path, dest, &full_path)?;

        if entry_type.is_symlink() {
            let target = entry
                .link_name()
                .map_err(|e| CacheError::archive(archive_path, format!("tar link error: {e}")))?
                .ok_or_else(|| {
                    CacheError::archive(archive_path, format!("symlink without target: {name}"))
                })?
                .into_owned();
            let parent = full_path.parent().unwrap_or(dest);
            ensure_link_target_within_dest(archive_path, dest, parent, &target)?;
            entry.unpack(&full_path).map_err(|e| {
                CacheError::archive(archive_path, format!("unpack error for {name}: {e}"))
            })?;
            files += 1;
        } else if entry_type.is_hard_link() {
            // Hard link targets are archive paths, so they get the same root treatment.
            let target_name = entry
                .link_name_bytes()
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .ok_or_else(|| {
                    CacheError::archive(archive_path, format!("hardlink without target: {name}"))
                })?;
            let target_rel = relative_target(&target_name, &ExtractOptions {
                root: options.root.clone(),
                folders: Vec::new(),
            })
            .ok_or_else(|| {
                CacheError::archive(
                    archive_path,
                    format!("unsafe link target (outside root): {target_name}"),
                )
            })?;
            let source = dest.join(safe_relative(archive_path, &target_rel)?);
            ensure_no_symlink_components(archive_path, dest, &source)?;
            std::fs::hard_link(&source, &full_path).map_err(|e| CacheError::io(&full_path, e))?;
            files += 1;
        } else if entry_type.is_file() || entry_type == tar::EntryType::Continuous {
            let declared = entry.header().size().map_err(|e| {
                CacheError::archive(archive_path, format!("bad size for {name}: {e}"))
            })?;
            let mode = entry.header().mode().ok();
            write_file(archive_path, &mut entry, &full_path, declared)?;
            finish_file(&full_path, declared, mode)?;
            files += 1;
        } else {
            tracing::debug!(entry = %name, kind = ?entry_type, "skipping special tar entry");
        }
    }
    Ok(files)
}

fn extract_zip(
    archive_path: &Path,
    dest: &Path,
    options: &ExtractOptions,
    cancel: &CancelToken,
) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| CacheError::io(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| CacheError::archive(archive_path, format!("zip read error: {e}")))?;
    let mut files = 0usize;

    for i in 0..archive.len() {
        cancel.check()?;
        let mut entry = archive
            .by_index(i)
            .map_err(|e| CacheError::archive(archive_path, format!("zip entry error: {e}")))?;
        let name = entry.name().to_owned();
        if entry.enclosed_name().is_none() {
            return Err(CacheError::archive(
                archive_path,
                format!("unsafe entry path: {name}"),
            ));
        }
        let Some(rel) = relative_target(&name, options) else {
            continue;
        };
        let full_path = dest.join(safe_relative(archive_path, &rel)?);
        ensure_no_symlink_components(archive_path, dest, &full_path)?;

        if entry.is_dir() {
            create_dir(&full_path)?;
            continue;
        }
        prepare_parent(archive_path, dest, &full_path)?;
        let declared = entry.size();
        let mode = entry.unix_mode();
        write_file(archive_path, &mut entry, &full_path, declared)?;
        finish_file(&full_path, declared, mode)?;
        files += 1;
    }
    Ok(files)
}

// ============================================================================
// Bundle layout
// ============================================================================

fn find_child_ignore_case(dir: &Path, wanted: &str) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(dir, e))?;
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(wanted)
            && entry.path().is_dir()
        {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Flatten a `Contents/Home` bundle so the JDK sits directly in `dest`.
///
/// Returns true when the layout was changed.
pub fn normalize_bundle(archive: &Path, dest: &Path) -> Result<bool> {
    let children: Vec<PathBuf> = std::fs::read_dir(dest)
        .map_err(|e| CacheError::io(dest, e))?
        .map(|e| e.map(|e| e.path()).map_err(|err| CacheError::io(dest, err)))
        .collect::<Result<_>>()?;

    let [contents] = children.as_slice() else {
        return Ok(false);
    };
    let is_contents = contents
        .file_name()
        .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case("Contents"));
    if !is_contents || !contents.is_dir() {
        return Ok(false);
    }

    let Some(home) = find_child_ignore_case(contents, "Home")? else {
        return Err(CacheError::archive(
            archive,
            "bundle has a Contents folder without Home",
        ));
    };

    // Move the wrapper aside first so Home's children cannot collide with it.
    let parked = dest.join(".bundle-contents");
    std::fs::rename(contents, &parked).map_err(|e| CacheError::io(contents, e))?;
    let home = parked.join(home.strip_prefix(contents).unwrap_or(Path::new("Home")));

    let entries = std::fs::read_dir(&home).map_err(|e| CacheError::io(&home, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(&home, e))?;
        let target = dest.join(entry.file_name());
        std::fs::rename(entry.path(), &target).map_err(|e| CacheError::io(&target, e))?;
    }
    fs_utils::remove_dir_if_exists(&parked)?;
    tracing::debug!(dest = %dest.display(), "flattened Contents/Home bundle");
    Ok(true)
}

// ============================================================================
// Public API
// ============================================================================

/// Extract `archive` into `dest` and return the number of files written.
///
/// Extracting no files at all is an error: it usually means the root folder
/// was guessed wrong.
pub fn unpack(
    archive: &Path,
    kind: ArchiveKind,
    dest: &Path,
    options: &ExtractOptions,
    cancel: &CancelToken,
) -> Result<usize> {
    create_dir(dest)?;
    let files = match kind {
        ArchiveKind::TarGz => {
            let file = File::open(archive).map_err(|e| CacheError::io(archive, e))?;
            extract_tar(archive, GzDecoder::new(BufReader::new(file)), dest, options, cancel)?
        }
        ArchiveKind::Zip => extract_zip(archive, dest, options, cancel)?,
    };

    if files == 0 {
        return Err(CacheError::archive(
            archive,
            format!(
                "no files extracted (root {:?}, folders {:?})",
                options.root.as_deref().unwrap_or(""),
                options.folders
            ),
        ));
    }
    normalize_bundle(archive, dest)?;
    Ok(files)
}

/// Detect the format and root of `archive`, then extract it into `dest`.
pub fn unpack_jdk(
    archive: &Path,
    dest: &Path,
    folders: &[String],
    show_progress: bool,
    cancel: &CancelToken,
) -> Result<usize> {
    let file_name = archive
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_owned());

    crate::internal::progress::with_spinner(
        &format!("extracting {file_name}"),
        show_progress,
        || {
            let kind = inspect::detect_kind(archive)?;
            let root = inspect::find_root(archive, kind)?;
            let options = ExtractOptions {
                root,
                folders: folders.to_vec(),
            };
            let files = unpack(archive, kind, dest, &options, cancel)?;
            output::detail(&format!("extracted {files} files from {file_name}"));
            Ok(files)
        },
    )
}
