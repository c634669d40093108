//! Package manifest.
//!
//! Written once at export time and only read at import time, where it drives
//! informational compatibility warnings. It is never a hard gate beyond being
//! a readable JSON object.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Describes the site a package was exported from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
    /// sitepack version that wrote the package.
    pub version: String,
    pub site_url: String,
    pub home_url: String,
    /// Database engine version on the source host.
    pub runtime_version: String,
    /// `os-arch` of the source host.
    pub platform: String,
    pub table_prefix: String,
}

impl Manifest {
    /// Build the manifest for an export from the current settings.
    #[must_use]
    pub fn for_export(settings: &Settings) -> Self {
        Self {
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            version: env!("CARGO_PKG_VERSION").to_string(),
            site_url: settings.site_url.clone(),
            home_url: settings.home_url.clone(),
            runtime_version: SqliteStorage::engine_version().to_string(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            table_prefix: settings.table_prefix.clone(),
        }
    }

    /// Write the manifest as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Read a manifest from an extracted package.
    ///
    /// Unknown fields are ignored and missing fields default to empty.
    ///
    /// # Errors
    ///
    /// Returns `Error::ManifestInvalid` if the file is empty, is not JSON,
    /// or is not a JSON object.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::ManifestInvalid(format!("cannot read manifest: {e}")))?;

        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| Error::ManifestInvalid(format!("manifest is not valid JSON: {e}")))?;

        if !value.is_object() {
            return Err(Error::ManifestInvalid(
                "manifest is not a JSON object".to_string(),
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| Error::ManifestInvalid(format!("manifest has invalid fields: {e}")))
    }

    /// Human-readable compatibility notes against the target settings.
    ///
    /// These are advisory; an import proceeds regardless.
    #[must_use]
    pub fn compatibility_notes(&self, settings: &Settings) -> Vec<String> {
        let mut notes = Vec::new();

        if self.table_prefix != settings.table_prefix {
            notes.push(format!(
                "Table prefix differs: package uses '{}', this site uses '{}'",
                self.table_prefix, settings.table_prefix
            ));
        }

        let local_version = env!("CARGO_PKG_VERSION");
        if !self.version.is_empty() && self.version != local_version {
            notes.push(format!(
                "Package was written by sitepack {}, this is {local_version}",
                self.version
            ));
        }

        notes
    }
}
