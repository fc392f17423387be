//! Gzipped tarball extraction.
//!
//! Both the Forge and the GitHub tarball endpoint wrap a module's files in a
//! single top-level directory (`author-name-1.2.3/`, `owner-repo-<sha>/`).
//! Extraction strips that component so the module's files land directly in
//! the target folder.

use std::fs::File;
use std::io;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::Archive;

/// Unpack `archive` into `target`, stripping the first path component of
/// every entry. `target` is created if missing.
///
/// Runs blocking I/O; callers on the async runtime should wrap it in
/// `spawn_blocking`.
pub fn extract_tar_gz(archive: &Path, target: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut tar = Archive::new(GzDecoder::new(file));
    std::fs::create_dir_all(target)?;

    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let stripped: std::path::PathBuf = path.components().skip(1).collect();
        if stripped.as_os_str().is_empty() {
            // The top-level directory entry itself.
            continue;
        }
        if stripped
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("archive entry escapes target directory: {}", path.display()),
            ));
        }

        entry.unpack(target.join(stripped))?;
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::tests_support::build_archive;
    use super::*;

    #[test]
    fn strips_top_level_component() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("mod.tar.gz");
        std::fs::write(
            &archive_path,
            build_archive(&[
                ("acme-thing-1.0.0/manifests/init.pp", "class thing {}"),
                ("acme-thing-1.0.0/README.md", "# thing"),
            ]),
        )
        .unwrap();

        let target = dir.path().join("out");
        extract_tar_gz(&archive_path, &target).unwrap();

        assert!(target.join("manifests/init.pp").is_file());
        assert!(target.join("README.md").is_file());
        assert!(!target.join("acme-thing-1.0.0").exists());
    }

    #[test]
    fn rejects_escaping_entries() {
        // tar::Builder refuses to write `..` itself, so forge the name
        // bytes directly into an old-style header.
        let mut builder = tar::Builder::new(Vec::new());
        let contents = b"nope";
        let mut header = tar::Header::new_gnu();
        let name = b"top/../../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &contents[..]).unwrap();
        let tarball = builder.into_inner().unwrap();

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, &tarball).unwrap();
        let gz = encoder.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("evil.tar.gz");
        std::fs::write(&archive_path, gz).unwrap();

        let target = dir.path().join("out");
        assert!(extract_tar_gz(&archive_path, &target).is_err());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn garbage_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("broken.tar.gz");
        std::fs::write(&archive_path, b"this is not gzip").unwrap();
        assert!(extract_tar_gz(&archive_path, dir.path().join("out").as_path()).is_err());
    }
}
