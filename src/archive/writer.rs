//! Package writer.

use super::{DATABASE_ENTRY, FILES_DIR, MANIFEST_ENTRY};
use crate::error::{Error, Result};
use crate::snapshot::{Exclusions, walk_files};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Everything that goes into one package.
#[derive(Debug, Clone, Copy)]
pub struct PackageContents<'a> {
    /// Manifest file written by the export workflow.
    pub manifest: &'a Path,
    /// SQL dump written by the dump engine.
    pub database: &'a Path,
    /// Directory trees mirrored under `files/`.
    pub file_roots: &'a [PathBuf],
    /// Paths left out of the mirror.
    pub exclusions: &'a Exclusions,
}

/// Statistics from writing a package.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveStats {
    /// Files added under `files/`.
    pub files: usize,
    /// Uncompressed bytes of those files.
    pub bytes: u64,
}

/// Create (or overwrite) the package at `container`.
///
/// Each file is streamed into a Deflate entry with `io::copy`. There is no
/// rollback: a failure leaves a partial container behind.
///
/// # Errors
///
/// Returns `Error::ArchiveWrite` if the container cannot be created, an input
/// file cannot be opened, or an entry cannot be written.
pub fn write(container: &Path, contents: &PackageContents<'_>) -> Result<ArchiveStats> {
    let file = File::create(container).map_err(|e| {
        Error::ArchiveWrite(format!("cannot create {}: {e}", container.display()))
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut stats = ArchiveStats::default();

    add_file(&mut zip, contents.manifest, MANIFEST_ENTRY)?;
    add_file(&mut zip, contents.database, DATABASE_ENTRY)?;

    // Present even when the site tree is empty, so the package stays importable.
    zip.add_directory(format!("{FILES_DIR}/"), entry_options())
        .map_err(|e| Error::ArchiveWrite(format!("cannot add {FILES_DIR}/: {e}")))?;

    for root in contents.file_roots {
        for entry in walk_files(root, contents.exclusions) {
            let name = format!("{FILES_DIR}/{}", entry.relative);
            stats.bytes += add_file(&mut zip, &entry.path, &name)?;
            stats.files += 1;
        }
    }

    let mut writer = zip
        .finish()
        .map_err(|e| Error::ArchiveWrite(format!("cannot finalize archive: {e}")))?;
    writer
        .flush()
        .map_err(|e| Error::ArchiveWrite(format!("cannot flush archive: {e}")))?;

    info!(
        path = %container.display(),
        files = stats.files,
        bytes = stats.bytes,
        "Package written"
    );
    Ok(stats)
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

fn add_file<W: Write + Seek>(zip: &mut ZipWriter<W>, source: &Path, name: &str) -> Result<u64> {
    let mut input = File::open(source).map_err(|e| {
        Error::ArchiveWrite(format!("cannot open '{}': {e}", source.display()))
    })?;
    let large = input
        .metadata()
        .is_ok_and(|m| m.len() >= u64::from(u32::MAX));

    zip.start_file(name, entry_options().large_file(large))
        .map_err(|e| Error::ArchiveWrite(format!("cannot start entry '{name}': {e}")))?;

    let copied = io::copy(&mut input, zip)
        .map_err(|e| Error::ArchiveWrite(format!("cannot write entry '{name}': {e}")))?;

    debug!(entry = name, bytes = copied, "Added entry");
    Ok(copied)
}
