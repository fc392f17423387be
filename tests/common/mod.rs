//! Shared fixtures for the integration tests.
//!
//! A [`TestEnv`] is a throwaway deployment: a scratch environment root, a
//! scratch cache, and helpers for writing Puppetfiles and pre-seeding the
//! cache with real (tiny) module archives. Tests that pin versions and
//! seed blobs run fully offline; a download that tried to reach the
//! network would fail the run and show up in the failure count.

#![allow(dead_code)] // not every test binary uses every helper

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use pupdeploy::module::fingerprint;
use pupdeploy::pipeline::PipelineOptions;

pub struct TestEnv {
    _tmp: TempDir,
    pub env_root: PathBuf,
    pub cache_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let env_root = tmp.path().join("env");
        let cache_dir = tmp.path().join("cache");
        std::fs::create_dir_all(&env_root).unwrap();
        Self {
            _tmp: tmp,
            env_root,
            cache_dir,
        }
    }

    pub fn write_puppetfile(&self, contents: &str) {
        std::fs::write(self.env_root.join("Puppetfile"), contents).unwrap();
    }

    /// Pipeline options suitable for tests: no retry pauses, default pool.
    pub fn options(&self) -> PipelineOptions {
        let mut options = PipelineOptions::new(&self.env_root);
        options.cache_dir = self.cache_dir.clone();
        options.retry_delay = Duration::ZERO;
        options
    }

    /// Drop a module archive into the cache slot it would be fetched into.
    pub fn seed_cache_blob(&self, module_name: &str, version: &str, entries: &[(&str, &str)]) {
        let slot = self.cache_dir.join(fingerprint(module_name));
        std::fs::create_dir_all(&slot).unwrap();
        std::fs::write(
            slot.join(format!("{version}.tar.gz")),
            build_archive(entries),
        )
        .unwrap();
    }

    /// Write garbage where a cache blob is expected.
    pub fn seed_corrupt_blob(&self, module_name: &str, version: &str) {
        let slot = self.cache_dir.join(fingerprint(module_name));
        std::fs::create_dir_all(&slot).unwrap();
        std::fs::write(slot.join(format!("{version}.tar.gz")), b"not a tarball").unwrap();
    }

    pub fn installed(&self, leaf: &str) -> PathBuf {
        self.env_root.join("modules").join(leaf)
    }

    pub fn version_marker(&self, leaf: &str) -> Option<String> {
        std::fs::read_to_string(self.installed(leaf).join(".version"))
            .ok()
            .map(|s| s.trim().to_string())
    }
}

/// Build a gzipped tarball from `(path, contents)` pairs.
pub fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    let tarball = builder.into_inner().unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tarball).unwrap();
    encoder.finish().unwrap()
}

/// Entries for a minimal module archive wrapped in `top/`.
pub fn module_entries(top: &str) -> Vec<(String, String)> {
    vec![
        (
            format!("{top}/manifests/init.pp"),
            "class placeholder {}".to_string(),
        ),
        (format!("{top}/README.md"), "placeholder\n".to_string()),
    ]
}

/// Like [`module_entries`] but with a metadata.json declaring dependencies.
pub fn module_entries_with_metadata(top: &str, metadata: &str) -> Vec<(String, String)> {
    let mut entries = module_entries(top);
    entries.push((format!("{top}/metadata.json"), metadata.to_string()));
    entries
}

/// Borrow entry pairs in the shape [`build_archive`] expects.
pub fn as_pairs(entries: &[(String, String)]) -> Vec<(&str, &str)> {
    entries
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect()
}

