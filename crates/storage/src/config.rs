//! Storage configuration via `machinestore.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Hosts that keep settings elsewhere can build a
//! [`StorageConfig`] with the `with_*` methods instead.

use machinestore_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "machinestore.toml";

/// Default partition tag holding the binary index.
pub const DEFAULT_INDEX_TAG: &str = "machine_index_tag";

/// Default partition tag holding the record data blob.
pub const DEFAULT_DATA_TAG: &str = "machine_data_tag";

/// Storage configuration loaded from `machinestore.toml`.
///
/// # Example
///
/// ```toml
/// index_tag = "machine_index_tag"
/// data_tag = "machine_data_tag"
/// verify_consistency_on_load = true
/// preserve_unknown_records = true
/// log_flush_counts = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Partition tag for the binary index.
    #[serde(default = "default_index_tag")]
    pub index_tag: String,
    /// Partition tag for the record data blob.
    #[serde(default = "default_data_tag")]
    pub data_tag: String,
    /// Cross-check loaded machines against the identifier cache.
    #[serde(default = "default_true")]
    pub verify_consistency_on_load: bool,
    /// Keep records whose type has no factory and write them back on flush.
    /// When false such records are dropped at the next flush.
    #[serde(default = "default_true")]
    pub preserve_unknown_records: bool,
    /// Emit an info event with machine counts for every flushed chunk.
    #[serde(default)]
    pub log_flush_counts: bool,
}

fn default_index_tag() -> String {
    DEFAULT_INDEX_TAG.to_string()
}

fn default_data_tag() -> String {
    DEFAULT_DATA_TAG.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_tag: default_index_tag(),
            data_tag: default_data_tag(),
            verify_consistency_on_load: true,
            preserve_unknown_records: true,
            log_flush_counts: false,
        }
    }
}

impl StorageConfig {
    /// Set the index tag
    pub fn with_index_tag(mut self, tag: impl Into<String>) -> Self {
        self.index_tag = tag.into();
        self
    }

    /// Set the data tag
    pub fn with_data_tag(mut self, tag: impl Into<String>) -> Self {
        self.data_tag = tag.into();
        self
    }

    /// Enable or disable load-time consistency checks
    pub fn with_consistency_checks(mut self, enabled: bool) -> Self {
        self.verify_consistency_on_load = enabled;
        self
    }

    /// Keep or drop records of unregistered types
    pub fn with_preserve_unknown_records(mut self, enabled: bool) -> Self {
        self.preserve_unknown_records = enabled;
        self
    }

    /// Enable or disable per-chunk flush counts at info level
    pub fn with_flush_counts(mut self, enabled: bool) -> Self {
        self.log_flush_counts = enabled;
        self
    }

    /// Check that the tags are usable.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a tag is empty or both tags are equal.
    pub fn validate(&self) -> Result<()> {
        if self.index_tag.is_empty() || self.data_tag.is_empty() {
            return Err(Error::Config("partition tags must not be empty".to_string()));
        }
        if self.index_tag == self.data_tag {
            return Err(Error::Config(format!(
                "index_tag and data_tag must differ (both are {:?})",
                self.index_tag
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StorageConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Machine storage configuration
#
# Partition tags under which each chunk's index and record data are stored.
# Changing them on an existing world makes previously saved machines invisible.
index_tag = "machine_index_tag"
data_tag = "machine_data_tag"

# Cross-check machines against the identifier cache when a chunk loads.
verify_consistency_on_load = true

# Keep records whose machine type is not registered and write them back
# unchanged on flush (default: true).
preserve_unknown_records = true

# Log machine counts for every flushed chunk at info level (default: false).
log_flush_counts = false
"#
    }
}
