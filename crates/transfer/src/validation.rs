use std::path::{Component, Path};

use crate::TransferError;

/// Validates that an archive entry name stays inside the extraction directory.
///
/// Rejects empty names, absolute paths, `..` components and Windows
/// drive or UNC prefixes. `.` components and trailing slashes (directory
/// entries) are fine.
pub fn validate_relative_path(entry_name: &str) -> Result<(), TransferError> {
    if entry_name.is_empty() {
        return Err(TransferError::InvalidPath("empty entry name".into()));
    }

    let path = Path::new(entry_name);
    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute entry not allowed: {entry_name}"
        )));
    }

    for component in path.components() {
        let reason = match component {
            Component::CurDir | Component::Normal(_) => continue,
            Component::ParentDir => "escapes the extraction directory",
            Component::Prefix(_) => "carries a drive or UNC prefix",
            Component::RootDir => "is rooted",
        };
        return Err(TransferError::InvalidPath(format!("{entry_name} {reason}")));
    }

    Ok(())
}
