//! Project archiving and template extraction.
//!
//! [`build_archive`] walks a project directory once and writes every file
//! outside the [`EXCLUDED_DIRS`] into a single zip. Entry names are relative
//! to the project root and always use `/` as separator.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::TransferError;
use crate::validation::validate_relative_path;

/// Directory names never included in a repository archive, at any depth.
///
/// Covers the staging directory, interpreter/build caches and the sample
/// input/output directories used by local test runs.
pub const EXCLUDED_DIRS: [&str; 6] = [".temp", "__pycache__", "target", "output", "results", "data"];

/// Outcome of [`build_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Number of files written.
    pub files: usize,
    /// Size of the archive on disk.
    pub size: u64,
}

struct SourceFile {
    name: String,
    path: PathBuf,
    size: u64,
}

fn is_excluded_name(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| EXCLUDED_DIRS.contains(&n))
}

/// Returns `true` if a file at `relative` (to the project root) lies under
/// an excluded directory.
pub fn is_excluded(relative: &Path) -> bool {
    relative.parent().is_some_and(|dirs| {
        dirs.components()
            .any(|c| matches!(c, Component::Normal(name) if is_excluded_name(name)))
    })
}

/// Zips `source` into `archive_path`, replacing any existing archive.
///
/// Files are written in sorted path order so the same tree always yields
/// the same entry order.
pub fn build_archive(source: &Path, archive_path: &Path) -> Result<ArchiveSummary, TransferError> {
    let meta = std::fs::metadata(source)?;
    if !meta.is_dir() {
        return Err(TransferError::NotADirectory(source.to_path_buf()));
    }

    let mut files = Vec::new();
    walk_dir(source, source, &mut HashSet::new(), &mut files)?;

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let out = File::create(archive_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(out));

    for file in &files {
        debug!(entry = %file.name, size = file.size, "adding to archive");
        let options = entry_options(&file.path, file.size)?;
        zip.start_file(file.name.as_str(), options)?;
        let mut src = File::open(&file.path)?;
        std::io::copy(&mut src, &mut zip)?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    drop(writer);

    let size = std::fs::metadata(archive_path)?.len();
    info!(
        source = %source.display(),
        archive = %archive_path.display(),
        files = files.len(),
        size,
        "archive built"
    );

    Ok(ArchiveSummary {
        path: archive_path.to_path_buf(),
        files: files.len(),
        size,
    })
}

fn entry_options(path: &Path, size: u64) -> Result<SimpleFileOptions, TransferError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u32::MAX as u64);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path)?.permissions().mode();
        Ok(options.unix_permissions(mode & 0o777))
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(options)
    }
}

/// Collects the files under `current`. Symlinks are followed; a linked
/// directory already on the walk is skipped so loops terminate.
fn walk_dir(
    root: &Path,
    current: &Path,
    visited: &mut HashSet<PathBuf>,
    files: &mut Vec<SourceFile>,
) -> Result<(), TransferError> {
    if !visited.insert(std::fs::canonicalize(current)?) {
        debug!(dir = %current.display(), "skipping directory already visited");
        return Ok(());
    }

    let mut entries = std::fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = std::fs::metadata(&path)?;

        if metadata.is_dir() {
            if is_excluded_name(&entry.file_name()) {
                debug!(dir = %path.display(), "skipping excluded directory");
                continue;
            }
            walk_dir(root, &path, visited, files)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;
            let name = rel_path.to_str().ok_or_else(|| {
                TransferError::InvalidPath(format!(
                    "file name is not valid UTF-8: {}",
                    rel_path.display()
                ))
            })?;
            files.push(SourceFile {
                name: name.replace('\\', "/"),
                path,
                size: metadata.len(),
            });
        }
    }

    Ok(())
}

/// Extracts a zip into `dest`, returning the number of files written.
///
/// Every entry name is validated first; an entry that would land outside
/// `dest` aborts the extraction.
pub fn extract_archive<R: Read + Seek>(reader: R, dest: &Path) -> Result<usize, TransferError> {
    let mut archive = ZipArchive::new(reader)?;
    std::fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        validate_relative_path(&name)?;

        let out_path = dest.join(&name);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))?;
        }

        written += 1;
    }

    debug!(dest = %dest.display(), files = written, "archive extracted");
    Ok(written)
}
