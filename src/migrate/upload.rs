//! Upload acceptance.
//!
//! A package handed to `start_import` is checked before any job exists:
//! it must not carry an upload error, must be non-empty, must be named
//! `*.zip` and must start with the zip local-file-header magic.

use crate::error::{Error, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Zip local file header signature.
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Names tried before giving up on a free upload slot.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// A package offered for import.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Name the client gave the file.
    pub file_name: String,
    /// Where the bytes are on disk now.
    pub path: PathBuf,
    pub size: u64,
    /// Transport-level error reported by the host, if any.
    pub error: Option<String>,
    /// Whether `path` is a host-owned temporary that may be moved away.
    /// Otherwise the file is copied and left in place.
    pub temporary: bool,
}

impl Upload {
    /// Describe an existing file on disk (copied on acceptance).
    ///
    /// # Errors
    ///
    /// Returns `Error::ArchiveMissing` if there is no file at `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|_| Error::ArchiveMissing {
            path: path.to_path_buf(),
        })?;
        if !metadata.is_file() {
            return Err(Error::ArchiveMissing {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            size: metadata.len(),
            error: None,
            temporary: false,
        })
    }
}

/// Validate `upload` and move (or copy) it into `uploads_dir`.
///
/// Returns the accepted package's new path.
///
/// # Errors
///
/// Returns `Error::UploadRejected` if any check fails, or an I/O error if the
/// file cannot be stored.
pub fn accept_upload(upload: &Upload, uploads_dir: &Path) -> Result<PathBuf> {
    if let Some(error) = &upload.error {
        return Err(Error::UploadRejected(error.clone()));
    }
    if upload.size == 0 {
        return Err(Error::UploadRejected("the uploaded file is empty".to_string()));
    }
    if !upload.file_name.to_ascii_lowercase().ends_with(".zip") {
        return Err(Error::UploadRejected(format!(
            "'{}' is not a .zip file",
            upload.file_name
        )));
    }
    if !has_zip_magic(&upload.path) {
        return Err(Error::UploadRejected(format!(
            "'{}' is not a zip archive",
            upload.file_name
        )));
    }

    fs::create_dir_all(uploads_dir)?;
    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let (destination, mut reserved) =
        reserve_destination(uploads_dir, &stamp, &sanitize_file_name(&upload.file_name))?;

    if upload.temporary && fs::rename(&upload.path, &destination).is_ok() {
        debug!(from = %upload.path.display(), to = %destination.display(), "Moved upload");
    } else {
        let copied = File::open(&upload.path).and_then(|mut src| io::copy(&mut src, &mut reserved));
        if let Err(e) = copied {
            drop(reserved);
            let _ = fs::remove_file(&destination);
            return Err(e.into());
        }
        debug!(from = %upload.path.display(), to = %destination.display(), "Copied upload");
    }

    info!(package = %destination.display(), bytes = upload.size, "Upload accepted");
    Ok(destination)
}

// Creates `<stamp>-<name>`, or `<stamp>-NN-<name>` when an upload in the
// same second already holds it. The empty file reserves the name.
fn reserve_destination(uploads_dir: &Path, stamp: &str, name: &str) -> Result<(PathBuf, File)> {
    for suffix in 0..MAX_NAME_ATTEMPTS {
        let destination = if suffix == 0 {
            uploads_dir.join(format!("{stamp}-{name}"))
        } else {
            uploads_dir.join(format!("{stamp}-{suffix:02}-{name}"))
        };
        match OpenOptions::new().write(true).create_new(true).open(&destination) {
            Ok(file) => return Ok((destination, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::UploadRejected(format!(
        "no free name for '{name}' in {}",
        uploads_dir.display()
    )))
}

fn has_zip_magic(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .is_ok_and(|()| &magic == ZIP_MAGIC)
}

// Keep only the final component, in a conservative character set.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "package.zip".to_string()
    } else {
        cleaned
    }
}
