//! Installing a rewritten archive over the original path
//!
//! The new archive is written in full to a temporary file in the destination's
//! directory, closed, and only then moved over the destination. A rename is
//! tried first; if it fails the bytes are copied over the destination and the
//! temporary file is deleted.

use log::{debug, info, warn};
use std::fs::{self, File, Permissions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::{PathPersistError, TempPath};

use crate::archive::{self, EntryMap};
use crate::error::{ImageError, Result};

/// Write `entries` as a new archive and install it at `dest`
pub fn replace_archive(entries: &EntryMap, dest: &Path) -> Result<()> {
    let temp_path = write_temp_archive(entries, dest)?;
    install(temp_path, dest)?;
    info!("Rewrote {} ({} entries)", dest.display(), entries.len());
    Ok(())
}

/// Directory holding `dest`, so the temporary file lands on the same filesystem
fn parent_dir(dest: &Path) -> &Path {
    match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn write_temp_archive(entries: &EntryMap, dest: &Path) -> Result<TempPath> {
    let dir = parent_dir(dest);
    let file_name = dest
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string());

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|source| ImageError::WriteFailure {
            path: dir.to_path_buf(),
            source,
        })?;
    let (file, temp_path) = temp.into_parts();
    debug!("Writing new archive to {}", temp_path.display());

    // The temp file starts out 0600; the rewritten archive keeps the original's mode
    let permissions = fs::metadata(dest).ok().map(|meta| meta.permissions());

    match write_file(entries, file, archive::is_gzip_path(dest), permissions) {
        Ok(()) => Ok(temp_path),
        // Dropping temp_path removes the partial file
        Err(source) => Err(ImageError::WriteFailure {
            path: temp_path.to_path_buf(),
            source,
        }),
    }
}

/// Write the archive and close the file; it must be closed before any rename
fn write_file(
    entries: &EntryMap,
    file: File,
    gzip: bool,
    permissions: Option<Permissions>,
) -> io::Result<()> {
    if let Some(permissions) = permissions {
        file.set_permissions(permissions)?;
    }
    let writer = archive::write_archive(entries, BufWriter::new(file), gzip)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

fn install(temp_path: TempPath, dest: &Path) -> Result<()> {
    match temp_path.persist(dest) {
        Ok(()) => Ok(()),
        Err(PathPersistError { error, path }) => {
            warn!(
                "Rename onto {} failed ({}), falling back to copy",
                dest.display(),
                error
            );
            copy_then_delete(path, dest)
        }
    }
}

fn copy_then_delete(temp_path: TempPath, dest: &Path) -> Result<()> {
    if let Err(source) = fs::copy(&temp_path, dest) {
        // Keep the new archive on disk so the caller can recover it
        let kept: PathBuf = match temp_path.keep() {
            Ok(path) => path,
            Err(e) => e.path.to_path_buf(),
        };
        return Err(ImageError::ReplaceFailure {
            temp_path: kept,
            dest: dest.to_path_buf(),
            source,
        });
    }

    // The destination is complete at this point; a leftover temp file is not fatal
    let shown = temp_path.to_path_buf();
    if let Err(e) = temp_path.close() {
        warn!("Failed to delete temporary file {}: {}", shown.display(), e);
    }
    Ok(())
}
