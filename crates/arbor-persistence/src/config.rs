use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, Result};

/// Tuning knobs of the persistence manager. Read once at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Bundle cache budget in megabytes.
    pub bundle_cache_size_mb: u64,
    /// Binary values larger than this many bytes go to the blob store.
    pub min_blob_size: usize,
    /// Number of independently locked cache shards.
    pub cache_shards: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            bundle_cache_size_mb: 8,
            min_blob_size: 4096,
            cache_shards: arbor_cache::DEFAULT_SHARDS,
        }
    }
}

impl PersistenceConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| PersistenceError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PersistenceError::Configuration(format!("{}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the cache budget from its textual form, e.g. `"16"`.
    pub fn set_bundle_cache_size(&mut self, value: &str) -> Result<()> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PersistenceError::Configuration(
                "bundle cache size must not be empty".into(),
            ));
        }
        let mb: u64 = trimmed.parse().map_err(|_| {
            PersistenceError::Configuration(format!("invalid bundle cache size: {value:?}"))
        })?;
        if mb == 0 {
            return Err(PersistenceError::Configuration(
                "bundle cache size must be positive".into(),
            ));
        }
        self.bundle_cache_size_mb = mb;
        Ok(())
    }

    /// Cache budget in bytes.
    pub fn bundle_cache_bytes(&self) -> u64 {
        self.bundle_cache_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bundle_cache_size_mb == 0 {
            return Err(PersistenceError::Configuration(
                "bundle cache size must be positive".into(),
            ));
        }
        if self.cache_shards == 0 {
            return Err(PersistenceError::Configuration(
                "cache shard count must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = PersistenceConfig::default();
        assert_eq!(c.bundle_cache_size_mb, 8);
        assert_eq!(c.bundle_cache_bytes(), 8 * 1024 * 1024);
        assert_eq!(c.min_blob_size, 4096);
        assert_eq!(c.cache_shards, 16);
    }

    #[test]
    fn toml_missing_keys_take_defaults() {
        let c = PersistenceConfig::from_toml_str("min_blob_size = 100\n").unwrap();
        assert_eq!(c.min_blob_size, 100);
        assert_eq!(c.bundle_cache_size_mb, 8);

        let empty = PersistenceConfig::from_toml_str("").unwrap();
        assert_eq!(empty, PersistenceConfig::default());
    }

    #[test]
    fn toml_rejects_zero_cache() {
        assert!(matches!(
            PersistenceConfig::from_toml_str("bundle_cache_size_mb = 0"),
            Err(PersistenceError::Configuration(_))
        ));
    }

    #[test]
    fn toml_rejects_wrong_types() {
        assert!(PersistenceConfig::from_toml_str("bundle_cache_size_mb = \"lots\"").is_err());
    }

    #[test]
    fn cache_size_from_text() {
        let mut c = PersistenceConfig::default();
        c.set_bundle_cache_size(" 32 ").unwrap();
        assert_eq!(c.bundle_cache_size_mb, 32);

        for bad in ["", "  ", "abc", "0", "-4"] {
            assert!(
                matches!(c.set_bundle_cache_size(bad), Err(PersistenceError::Configuration(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(c.bundle_cache_size_mb, 32);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbor.toml");
        std::fs::write(&path, "bundle_cache_size_mb = 2\ncache_shards = 4\n").unwrap();
        let c = PersistenceConfig::load(&path).unwrap();
        assert_eq!(c.bundle_cache_size_mb, 2);
        assert_eq!(c.cache_shards, 4);
        assert!(PersistenceConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
