//! Archive inspection and extraction

pub mod extract;
pub mod inspect;

pub use extract::{ExtractOptions, unpack, unpack_jdk};
pub use inspect::{ArchiveKind, archive_root, detect_kind, find_root};
