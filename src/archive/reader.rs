//! Package reader.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use tracing::{debug, info};
use zip::ZipArchive;

/// Extract the whole package at `container` into `dest`.
///
/// Returns the number of entries extracted. Member presence is not checked
/// here.
///
/// # Errors
///
/// Returns `Error::ArchiveExtract` if the container cannot be opened or
/// parsed, if any entry name would escape `dest` (absolute path or `..`),
/// or if any entry cannot be written.
pub fn read(container: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(container).map_err(|e| {
        Error::ArchiveExtract(format!("cannot open {}: {e}", container.display()))
    })?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::ArchiveExtract(format!("not a readable zip archive: {e}")))?;

    fs::create_dir_all(dest)
        .map_err(|e| Error::ArchiveExtract(format!("cannot create {}: {e}", dest.display())))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::ArchiveExtract(format!("cannot read entry {index}: {e}")))?;

        let enclosed = entry.enclosed_name().ok_or_else(|| {
            Error::ArchiveExtract(format!("refusing unsafe entry path: {}", entry.name()))
        })?;
        let target = dest.join(&enclosed);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                Error::ArchiveExtract(format!("cannot create {}: {e}", enclosed.display()))
            })?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::ArchiveExtract(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let mut output = File::create(&target).map_err(|e| {
            Error::ArchiveExtract(format!("cannot create {}: {e}", enclosed.display()))
        })?;
        io::copy(&mut entry, &mut output).map_err(|e| {
            Error::ArchiveExtract(format!("cannot extract {}: {e}", enclosed.display()))
        })?;

        debug!(entry = %enclosed.display(), "Extracted entry");
    }

    info!(
        path = %container.display(),
        entries = archive.len(),
        "Package extracted"
    );
    Ok(archive.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_files_and_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let container = temp_dir.path().join("p.zip");
        build_zip(
            &container,
            &[
                ("manifest.json", "{}"),
                ("files/", ""),
                ("files/a/b.txt", "deep"),
            ],
        );
        let dest = temp_dir.path().join("out");

        let count = read(&container, &dest).unwrap();

        assert_eq!(count, 3);
        assert_eq!(fs::read_to_string(dest.join("files/a/b.txt")).unwrap(), "deep");
        assert!(dest.join("files").is_dir());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let container = temp_dir.path().join("evil.zip");
        build_zip(&container, &[("../escape.txt", "x")]);

        let err = read(&container, &temp_dir.path().join("out")).unwrap_err();

        assert!(matches!(err, Error::ArchiveExtract(_)));
        assert!(!temp_dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_not_a_zip() {
        let temp_dir = TempDir::new().unwrap();
        let container = temp_dir.path().join("p.zip");
        fs::write(&container, "definitely not a zip").unwrap();

        let err = read(&container, &temp_dir.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::ArchiveExtract(_)));
    }
}
