//! Input resolution: list the statement documents in a folder.
//!
//! A folder of downloaded statements usually also holds lock files
//! (`~$report.pdf`), exports in other formats and sub-folders. Only regular
//! files with the configured extension and without the reserved prefix are
//! returned, sorted by file name so that "later file wins" is reproducible
//! across platforms.

use crate::config::ReconConfig;
use crate::error::ReconError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `true` when `path`'s file name passes the prefix and extension filters.
pub fn is_statement_file(path: &Path, extension: &str, skip_prefix: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if !skip_prefix.is_empty() && name.starts_with(skip_prefix) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// List the statement documents in `folder`, sorted by file name.
pub fn list_statement_files(folder: &Path, config: &ReconConfig) -> Result<Vec<PathBuf>, ReconError> {
    if !folder.exists() {
        return Err(ReconError::FolderNotFound {
            path: folder.to_path_buf(),
        });
    }
    if !folder.is_dir() {
        return Err(ReconError::NotADirectory {
            path: folder.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(folder).map_err(|e| folder_error(folder, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| folder_error(folder, e))?;
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        if is_statement_file(&path, &config.extension, &config.skip_prefix) {
            files.push(path);
        } else {
            debug!("Skipping {}", path.display());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Found {} statement files in {}", files.len(), folder.display());
    Ok(files)
}

/// Reject input whose first bytes are not the `%PDF` magic.
pub fn check_pdf_magic(bytes: &[u8]) -> Result<(), ReconError> {
    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(ReconError::NotAPdf { magic });
    }
    Ok(())
}

fn folder_error(folder: &Path, e: std::io::Error) -> ReconError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ReconError::PermissionDenied {
            path: folder.to_path_buf(),
        }
    } else {
        ReconError::Io {
            path: folder.to_path_buf(),
            source: e,
        }
    }
}
