//! Error types for sitepack.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sitepack operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,
    DatabaseFileError,

    // Not Found (exit 3)
    JobNotFound,
    ArchiveMissing,

    // Validation (exit 4)
    ManifestInvalid,
    UploadRejected,
    JobFinished,
    InvalidArgument,

    // Access (exit 5)
    Unauthorized,
    InvalidDownload,

    // Archive (exit 6)
    ArchiveWriteError,
    ArchiveExtractError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    TempDirError,
    FileCopyError,
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DatabaseFileError => "DATABASE_FILE_ERROR",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::ArchiveMissing => "ARCHIVE_MISSING",
            Self::ManifestInvalid => "MANIFEST_INVALID",
            Self::UploadRejected => "UPLOAD_REJECTED",
            Self::JobFinished => "JOB_FINISHED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidDownload => "INVALID_DOWNLOAD",
            Self::ArchiveWriteError => "ARCHIVE_WRITE_ERROR",
            Self::ArchiveExtractError => "ARCHIVE_EXTRACT_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::TempDirError => "TEMP_DIR_ERROR",
            Self::FileCopyError => "FILE_COPY_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError | Self::DatabaseFileError => 2,
            Self::JobNotFound | Self::ArchiveMissing => 3,
            Self::ManifestInvalid
            | Self::UploadRejected
            | Self::JobFinished
            | Self::InvalidArgument => 4,
            Self::Unauthorized | Self::InvalidDownload => 5,
            Self::ArchiveWriteError | Self::ArchiveExtractError => 6,
            Self::ConfigError => 7,
            Self::TempDirError | Self::FileCopyError | Self::IoError | Self::JsonError => 8,
        }
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in sitepack operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not create working directory {}: {message}", path.display())]
    TempDir { path: PathBuf, message: String },

    #[error("Could not write archive: {0}")]
    ArchiveWrite(String),

    #[error("Could not extract archive: {0}")]
    ArchiveExtract(String),

    #[error("Manifest, database or file tree missing from package: {0}")]
    ManifestInvalid(String),

    #[error("Database file error: {0}")]
    DatabaseFile(String),

    #[error("Could not copy file {path}: {message}")]
    FileCopy { path: String, message: String },

    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("Package not found: {}", path.display())]
    ArchiveMissing { path: PathBuf },

    #[error("Not authorized to perform this operation")]
    Unauthorized,

    #[error("Invalid download request")]
    InvalidDownload,

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Job {id} already finished with status {status}")]
    JobFinished { id: String, status: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::TempDir { .. } => ErrorCode::TempDirError,
            Self::ArchiveWrite(_) => ErrorCode::ArchiveWriteError,
            Self::ArchiveExtract(_) => ErrorCode::ArchiveExtractError,
            Self::ManifestInvalid(_) => ErrorCode::ManifestInvalid,
            Self::DatabaseFile(_) => ErrorCode::DatabaseFileError,
            Self::FileCopy { .. } => ErrorCode::FileCopyError,
            Self::UploadRejected(_) => ErrorCode::UploadRejected,
            Self::ArchiveMissing { .. } => ErrorCode::ArchiveMissing,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::InvalidDownload => ErrorCode::InvalidDownload,
            Self::JobNotFound { .. } => ErrorCode::JobNotFound,
            Self::JobFinished { .. } => ErrorCode::JobFinished,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Zip(_) => ErrorCode::ArchiveExtractError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for operators.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::ArchiveMissing { path } => Some(format!(
                "No package at '{}'. Run `sitepack export` on the source host first.",
                path.display()
            )),
            Self::ManifestInvalid(_) => Some(
                "A package needs manifest.json, database.sql and a files/ directory. \
                 Re-export it with `sitepack export`."
                    .to_string(),
            ),
            Self::FileCopy { .. } => Some(
                "Check permissions on the target directory. Files copied before this \
                 one were left in place."
                    .to_string(),
            ),
            Self::UploadRejected(_) => {
                Some("Only non-empty .zip packages produced by `sitepack export` are accepted.".to_string())
            }
            Self::JobNotFound { id } => Some(format!(
                "No job with ID '{id}'. Use `sitepack jobs list` to see retained jobs."
            )),
            Self::InvalidDownload => Some(
                "The job ID and token must match a successful export job. \
                 Use `sitepack jobs show <id>` to read its token."
                    .to_string(),
            ),
            Self::DatabaseFile(_) => {
                Some("Check the --db path or the SITEPACK_DB environment variable.".to_string())
            }
            Self::TempDir { .. }
            | Self::ArchiveWrite(_)
            | Self::ArchiveExtract(_)
            | Self::Unauthorized
            | Self::JobFinished { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Zip(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, exit code, and optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::Unauthorized.exit_code(), 5);
        assert_eq!(
            Error::ArchiveMissing { path: PathBuf::from("/x.zip") }.exit_code(),
            3
        );
        assert_eq!(Error::ManifestInvalid("no manifest".into()).exit_code(), 4);
        assert_eq!(Error::ArchiveExtract("bad".into()).exit_code(), 6);
        assert_eq!(Error::Other("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_file_copy_names_path_and_cause() {
        let err = Error::FileCopy {
            path: "wp-content/uploads/a.png".into(),
            message: "Is a directory (os error 21)".into(),
        };
        assert_eq!(
            err.to_string(),
            "Could not copy file wp-content/uploads/a.png: Is a directory (os error 21)"
        );
        assert_eq!(err.error_code(), ErrorCode::FileCopyError);
        let json = err.to_structured_json();
        assert!(json["error"]["message"].as_str().unwrap().contains("Is a directory"));
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::JobNotFound { id: "abc".into() };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "JOB_NOT_FOUND");
        assert_eq!(json["error"]["exit_code"], 3);
        assert!(json["error"]["hint"].as_str().unwrap().contains("abc"));
    }

    #[test]
    fn test_structured_json_without_hint() {
        let json = Error::Unauthorized.to_structured_json();
        assert!(json["error"].get("hint").is_none());
    }

    #[test]
    fn test_zip_error_maps_to_archive_category() {
        let err: Error = zip::result::ZipError::FileNotFound.into();
        assert_eq!(err.exit_code(), 6);
        assert_eq!(err.error_code(), ErrorCode::ArchiveExtractError);
    }
}
