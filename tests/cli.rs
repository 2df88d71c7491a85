//! The `jdk-cache` binary, driven as a subprocess

use std::process::Command;
use tempfile::TempDir;

fn jdk_cache(cache_root: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_jdk-cache"));
    cmd.env("JDK_CACHE_ROOT", cache_root)
        .env("XDG_CONFIG_HOME", cache_root)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_providers_lists_every_id() {
    let root = TempDir::new().unwrap();
    let output = jdk_cache(root.path()).arg("providers").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let ids: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        ids,
        [
            "ADOPTIUM",
            "SAPMACHINE",
            "LIBERICA",
            "GRAALVMCE",
            "ADOPTIUM_API",
            "CORRETTO",
            "MICROSOFT",
            "URL",
            "LOCAL"
        ]
    );
}

#[test]
fn test_key_prints_only_the_key() {
    let root = TempDir::new().unwrap();
    let output = jdk_cache(root.path())
        .args(["key", "sapmachine", "-a", "type=jdk", "-a", "version=17*", "-a", "os=linux", "-a", "arch=x64"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("SAPMACHINE_jdk_17._linux_x64_"), "{stdout}");
    assert_eq!(stdout.lines().count(), 1);
}

#[test]
fn test_offline_miss_exits_non_zero() {
    let root = TempDir::new().unwrap();
    let output = jdk_cache(root.path())
        .args([
            "acquire",
            "url",
            "--offline",
            "-a",
            "id=missing",
            "-a",
            "url=http://127.0.0.1:9/jdk.tar.gz",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("offline"), "{stderr}");
}

#[test]
fn test_unknown_provider_is_rejected() {
    let root = TempDir::new().unwrap();
    let output = jdk_cache(root.path())
        .args(["key", "graalvm"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
