//! Package container format.
//!
//! A package is a single zip file with three top-level members:
//!
//! ```text
//! manifest.json     # Manifest describing the source site
//! database.sql      # Statement stream from the dump engine
//! files/            # Mirror of the site root, root-relative paths
//! ```
//!
//! All three must be present for a package to be importable. The reader
//! does not check that; the import workflow does.

pub mod checksum;
pub mod manifest;
pub mod reader;
pub mod writer;

pub use checksum::file_sha256;
pub use manifest::Manifest;
pub use reader::read;
pub use writer::{ArchiveStats, PackageContents, write};

/// Entry name of the manifest.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Entry name of the SQL dump.
pub const DATABASE_ENTRY: &str = "database.sql";

/// Directory prefix of the mirrored file tree.
pub const FILES_DIR: &str = "files";
