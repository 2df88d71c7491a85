//! Shared helpers for the integration tests

#![allow(dead_code)]

use jdk_cache::{CacheConfig, LockPolicy};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// (name, contents); names ending in `/` are folders.
pub type Entry<'a> = (&'a str, &'a [u8]);

pub fn tar_gz(entries: &[Entry]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        if name.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, std::io::empty()).unwrap();
        } else {
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn zip(entries: &[Entry]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// A small JDK-shaped tree under `root/`.
pub fn jdk_entries(root: &str) -> Vec<(String, Vec<u8>)> {
    vec![
        (format!("{root}/"), Vec::new()),
        (format!("{root}/bin/"), Vec::new()),
        (format!("{root}/bin/java"), b"#!/bin/sh\necho java\n".to_vec()),
        (format!("{root}/lib/"), Vec::new()),
        (format!("{root}/lib/modules"), b"modules".to_vec()),
        (format!("{root}/release"), b"JAVA_VERSION=\"17.0.4\"\n".to_vec()),
    ]
}

pub fn as_entries(owned: &[(String, Vec<u8>)]) -> Vec<Entry<'_>> {
    owned
        .iter()
        .map(|(name, data)| (name.as_str(), data.as_slice()))
        .collect()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Config for tests: no progress bars, fast lock polling, bounded lock wait.
pub fn test_config(root: &Path) -> CacheConfig {
    CacheConfig {
        show_progress: false,
        lock: LockPolicy {
            poll_interval: Duration::from_millis(20),
            timeout: Some(Duration::from_secs(30)),
        },
        gateway_retry_delay: Duration::from_millis(10),
        ..CacheConfig::with_root(root)
    }
}

/// Names under `root`, sorted.
pub fn listing(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
