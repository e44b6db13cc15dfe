//! Artifact Handling Module
//!
//! Unpacks the packaged extension (`.xpi`, a zip archive) into the browser
//! tree, copies test fixtures, and hashes downloaded engine files.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Summary of an extracted archive
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Extract a zip archive into `dest`, creating it if needed.
///
/// Entries whose names would land outside `dest` are rejected.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<ExtractionReport> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::InvalidArchive(format!("{}: {}", archive_path.display(), e)))?;

    fs::create_dir_all(dest)?;
    let mut report = ExtractionReport::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();

        let relative = entry
            .enclosed_name()
            .ok_or_else(|| Error::PathTraversal(name.clone()))?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            report.directories += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        report.bytes += std::io::copy(&mut entry, &mut out_file)?;
        report.files += 1;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
        }
    }

    debug!(
        files = report.files,
        bytes = report.bytes,
        "extracted {} into {}",
        archive_path.display(),
        dest.display()
    );
    Ok(report)
}

/// Recursively copy `src` into `dest`, returning the number of files copied
pub fn copy_dir_all(src: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;

    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::PathTraversal(entry.path().display().to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        } else {
            warn!("Skipping non-regular file {}", entry.path().display());
        }
    }

    Ok(copied)
}

/// Copy a single file into `dest_dir`, keeping its file name
pub fn copy_into(file: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| Error::PathTraversal(file.display().to_string()))?;
    fs::create_dir_all(dest_dir)?;
    let target = dest_dir.join(name);
    fs::copy(file, &target)?;
    Ok(target)
}

/// Join a relative path from configuration onto `root`, refusing `..` and
/// absolute components
pub fn join_relative(root: &Path, relative: &Path) -> Result<PathBuf> {
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::PathTraversal(relative.display().to_string()));
    }
    Ok(root.join(relative))
}

/// Compute SHA256 hash of a file
pub fn compute_file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file against an expected hex SHA256
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = compute_file_sha256(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
