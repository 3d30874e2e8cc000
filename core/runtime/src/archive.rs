//! Archive extraction for runtime bundles.
//!
//! Supports ZIP, tar.gz and tar.xz. The format is inferred from the file name,
//! and the caller picks a [`RootPolicy`] deciding what happens to the single
//! enclosing folder most vendor archives carry (`node-v20.18.0-linux-x64/`,
//! `jdk-17.0.12+7/`, `apache-maven-3.9.9/`).
//!
//! ## Strip
//!
//! The archive is unpacked into a staging directory inside the destination.
//! If the staging directory then holds exactly one entry and it is a
//! directory, that directory's children are moved up into the destination.
//! Otherwise every top-level entry is moved up as is. The staging directory is
//! removed afterwards, also on failure.
//!
//! ## Preserve
//!
//! The archive is unpacked directly into the destination.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use xz2::read::XzDecoder;

use crate::catalog::ArchiveKind;
use crate::errors::ExtractError;

/// Staging directory name used by [`RootPolicy::Strip`].
const STAGING_DIR: &str = ".devrt-extracting";

/// What to do with an archive's enclosing folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootPolicy {
    /// Discard a single enclosing directory.
    #[default]
    Strip,
    /// Keep the archive's structure verbatim.
    Preserve,
}

/// Extracts an archive into `dest_dir` using the given root policy.
///
/// Creates `dest_dir` if needed.
///
/// # Errors
///
/// - [`ExtractError::UnsupportedFormat`] if the file name has no known extension
/// - [`ExtractError::ExtractionFailed`] if the archive is corrupt, contains an
///   entry with an absolute path or a `..` component, or the filesystem fails
pub fn extract(archive_path: &Path, dest_dir: &Path, policy: RootPolicy) -> Result<(), ExtractError> {
    let kind = ArchiveKind::from_path(archive_path).ok_or_else(|| ExtractError::UnsupportedFormat {
        path: archive_path.to_path_buf(),
    })?;

    std::fs::create_dir_all(dest_dir).map_err(|e| ExtractError::failed(archive_path, e))?;

    match policy {
        RootPolicy::Preserve => unpack(kind, archive_path, dest_dir),
        RootPolicy::Strip => {
            let staging = dest_dir.join(STAGING_DIR);
            if staging.exists() {
                std::fs::remove_dir_all(&staging).map_err(|e| ExtractError::failed(archive_path, e))?;
            }

            let result = unpack(kind, archive_path, &staging)
                .and_then(|()| hoist(&staging, dest_dir).map_err(|e| ExtractError::failed(archive_path, e)));

            if let Err(e) = std::fs::remove_dir_all(&staging)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
            }

            result
        }
    }
}

/// Unpacks an archive of a known kind verbatim into `dest_dir`.
fn unpack(kind: ArchiveKind, archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    std::fs::create_dir_all(dest_dir).map_err(|e| ExtractError::failed(archive_path, e))?;

    match kind {
        ArchiveKind::Zip => unpack_zip(archive_path, dest_dir),
        ArchiveKind::TarGz => {
            let file = File::open(archive_path).map_err(|e| ExtractError::failed(archive_path, e))?;
            unpack_tar(Archive::new(GzDecoder::new(file)), archive_path, dest_dir)
        }
        ArchiveKind::TarXz => {
            let file = File::open(archive_path).map_err(|e| ExtractError::failed(archive_path, e))?;
            unpack_tar(Archive::new(XzDecoder::new(file)), archive_path, dest_dir)
        }
    }
}

/// Rejects absolute paths and parent directory references.
fn check_entry_path(archive_path: &Path, entry_path: &Path) -> Result<(), ExtractError> {
    let unsafe_path = entry_path.is_absolute()
        || entry_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if unsafe_path {
        return Err(ExtractError::failed(
            archive_path,
            format!(
                "refusing to extract path with parent directory or absolute reference: {}",
                entry_path.display()
            ),
        ));
    }
    Ok(())
}

fn unpack_tar<R: Read>(
    mut archive: Archive<R>,
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<(), ExtractError> {
    let entries = archive
        .entries()
        .map_err(|e| ExtractError::failed(archive_path, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractError::failed(archive_path, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| ExtractError::failed(archive_path, e))?
            .into_owned();

        check_entry_path(archive_path, &entry_path)?;

        // unpack_in resolves hard links against dest_dir and keeps symlinks
        // such as bin/npm intact.
        let unpacked = entry.unpack_in(dest_dir).map_err(|e| {
            ExtractError::failed(archive_path, format!("{}: {e}", entry_path.display()))
        })?;
        if !unpacked {
            return Err(ExtractError::failed(
                archive_path,
                format!("entry escapes destination: {}", entry_path.display()),
            ));
        }
    }

    Ok(())
}

fn unpack_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path).map_err(|e| ExtractError::failed(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| ExtractError::failed(archive_path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::failed(archive_path, e))?;

        let raw_name = PathBuf::from(entry.name());
        check_entry_path(archive_path, &raw_name)?;
        let entry_path = entry.enclosed_name().ok_or_else(|| {
            ExtractError::failed(archive_path, format!("invalid entry path: {}", raw_name.display()))
        })?;

        let output_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            std::fs::create_dir_all(&output_path).map_err(|e| ExtractError::failed(archive_path, e))?;
            continue;
        }

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ExtractError::failed(archive_path, e))?;
        }

        let mut outfile =
            File::create(&output_path).map_err(|e| ExtractError::failed(archive_path, e))?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| {
            ExtractError::failed(archive_path, format!("{}: {e}", output_path.display()))
        })?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&output_path, std::fs::Permissions::from_mode(mode & 0o777))
                .map_err(|e| ExtractError::failed(archive_path, e))?;
        }
    }

    Ok(())
}

/// Moves the staged content up into `dest_dir`, dropping a single enclosing folder.
fn hoist(staging: &Path, dest_dir: &Path) -> std::io::Result<()> {
    let top_level = read_children(staging)?;

    let source = match top_level.as_slice() {
        [only] if only.is_dir() && !only.is_symlink() => only.clone(),
        _ => staging.to_path_buf(),
    };

    let children = if source == staging {
        top_level
    } else {
        read_children(&source)?
    };

    for child in children {
        let Some(name) = child.file_name() else {
            continue;
        };
        std::fs::rename(&child, dest_dir.join(name))?;
    }

    Ok(())
}

fn read_children(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut children = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    children.sort();
    Ok(children)
}

/// Sets executable permissions on every file in `<root>/bin` (Unix only).
///
/// ZIP bundles created on Windows often carry no mode bits at all, which
/// would leave `bin/mvn` unexecutable.
///
/// # Errors
///
/// Returns an error if the directory or file metadata cannot be read or the
/// permissions cannot be set.
#[cfg(unix)]
pub fn set_executable_permissions(root: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let bin_dir = root.join("bin");
    if !bin_dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(&bin_dir)? {
        let path = entry?.path();
        // Symlinks point into lib/; chmod would follow them to the target.
        if path.is_file() && !path.is_symlink() {
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(perms.mode() | 0o755);
            std::fs::set_permissions(&path, perms)?;
        }
    }

    Ok(())
}

/// Sets executable permissions (no-op on Windows).
#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
pub fn set_executable_permissions(_root: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::Builder;

    fn temp_test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("devrt_archive_{}_{}", name, rand::random::<u64>()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        dir
    }

    fn append(builder: &mut Builder<impl Write>, path: &str, content: &[u8], mode: u32) {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content)
            .expect("Should append file");
    }

    fn create_tar_gz(archive_path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(archive_path).expect("Should create file");
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        for (path, content) in files {
            append(&mut builder, path, content, 0o755);
        }
        builder
            .into_inner()
            .expect("Should finish tar")
            .finish()
            .expect("Should finish gzip");
    }

    fn create_tar_xz(archive_path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(archive_path).expect("Should create file");
        let mut builder = Builder::new(xz2::write::XzEncoder::new(file, 6));
        for (path, content) in files {
            append(&mut builder, path, content, 0o755);
        }
        builder
            .into_inner()
            .expect("Should finish tar")
            .finish()
            .expect("Should finish xz");
    }

    fn create_zip(archive_path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(archive_path).expect("Should create file");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (path, content) in files {
            zip.start_file(*path, options).expect("Should start file");
            zip.write_all(content).expect("Should write");
        }
        zip.finish().expect("Should finish");
    }

    #[test]
    fn strip_removes_single_enclosing_folder() {
        let temp_dir = temp_test_dir("strip");
        let archive_path = temp_dir.join("node.tar.gz");
        let dest_dir = temp_dir.join("output");

        create_tar_gz(&archive_path, &[("root/a", b"a"), ("root/b", b"b")]);
        extract(&archive_path, &dest_dir, RootPolicy::Strip).expect("Should extract");

        assert!(dest_dir.join("a").is_file());
        assert!(dest_dir.join("b").is_file());
        assert!(!dest_dir.join("root").exists());
        assert!(!dest_dir.join(STAGING_DIR).exists());

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn preserve_keeps_enclosing_folder() {
        let temp_dir = temp_test_dir("preserve");
        let archive_path = temp_dir.join("maven.zip");
        let dest_dir = temp_dir.join("output");

        create_zip(&archive_path, &[("root/a", b"a"), ("root/b", b"b")]);
        extract(&archive_path, &dest_dir, RootPolicy::Preserve).expect("Should extract");

        assert!(dest_dir.join("root").join("a").is_file());
        assert!(dest_dir.join("root").join("b").is_file());

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn strip_moves_all_entries_without_single_root() {
        let temp_dir = temp_test_dir("strip_flat");
        let archive_path = temp_dir.join("flat.zip");
        let dest_dir = temp_dir.join("output");

        create_zip(&archive_path, &[("bin/node", b"n"), ("README", b"r")]);
        extract(&archive_path, &dest_dir, RootPolicy::Strip).expect("Should extract");

        assert!(dest_dir.join("bin").join("node").is_file());
        assert!(dest_dir.join("README").is_file());

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn strip_keeps_single_top_level_file() {
        let temp_dir = temp_test_dir("strip_single_file");
        let archive_path = temp_dir.join("one.tar.gz");
        let dest_dir = temp_dir.join("output");

        create_tar_gz(&archive_path, &[("tool", b"x")]);
        extract(&archive_path, &dest_dir, RootPolicy::Strip).expect("Should extract");

        assert!(dest_dir.join("tool").is_file());

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn tar_xz_is_supported() {
        let temp_dir = temp_test_dir("xz");
        let archive_path = temp_dir.join("node-v20.18.0-linux-x64.tar.xz");
        let dest_dir = temp_dir.join("output");

        create_tar_xz(
            &archive_path,
            &[
                ("node-v20.18.0-linux-x64/bin/node", b"node"),
                ("node-v20.18.0-linux-x64/bin/npm", b"npm"),
            ],
        );
        extract(&archive_path, &dest_dir, RootPolicy::Strip).expect("Should extract");

        assert_eq!(
            std::fs::read(dest_dir.join("bin").join("node")).expect("Should read"),
            b"node"
        );

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let temp_dir = temp_test_dir("unsupported");
        let archive_path = temp_dir.join("bundle.rar");
        std::fs::write(&archive_path, b"not an archive").expect("Should write");

        let err = extract(&archive_path, &temp_dir.join("out"), RootPolicy::Strip)
            .expect_err("Should fail");
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn corrupt_archive_fails_and_cleans_staging() {
        let temp_dir = temp_test_dir("corrupt");
        let archive_path = temp_dir.join("broken.tar.gz");
        std::fs::write(&archive_path, b"\x1f\x8b garbage").expect("Should write");
        let dest_dir = temp_dir.join("output");

        let err = extract(&archive_path, &dest_dir, RootPolicy::Strip).expect_err("Should fail");
        assert!(matches!(err, ExtractError::ExtractionFailed { .. }));
        assert!(!dest_dir.join(STAGING_DIR).exists());

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn parent_dir_entries_are_refused() {
        let temp_dir = temp_test_dir("traversal");
        let archive_path = temp_dir.join("evil.zip");
        let dest_dir = temp_dir.join("output");

        create_zip(&archive_path, &[("../escape.txt", b"evil")]);
        let err = extract(&archive_path, &dest_dir, RootPolicy::Preserve).expect_err("Should fail");

        assert!(err.to_string().contains("refusing to extract"));
        assert!(!temp_dir.join("escape.txt").exists());

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[cfg(unix)]
    #[test]
    fn bin_files_become_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = temp_test_dir("perms");
        let bin = temp_dir.join("bin");
        std::fs::create_dir_all(&bin).expect("Should create bin");
        std::fs::write(bin.join("mvn"), b"#!/bin/sh\n").expect("Should write");
        std::fs::set_permissions(bin.join("mvn"), std::fs::Permissions::from_mode(0o644))
            .expect("Should set perms");

        set_executable_permissions(&temp_dir).expect("Should set permissions");

        let mode = std::fs::metadata(bin.join("mvn"))
            .expect("Should stat")
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);

        let _ = std::fs::remove_dir_all(&temp_dir);
    }
}
