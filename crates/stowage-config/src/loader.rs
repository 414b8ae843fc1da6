//! Loading configuration from TOML

use std::path::Path;

use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::error::ConfigResult;

impl PersistenceConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: PersistenceConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub async fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading persistence configuration");
        let contents = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), layout = %config.layout, "Loaded persistence configuration");
        Ok(config)
    }

    /// Blocking variant of [`PersistenceConfig::from_file`]
    pub fn from_file_sync(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading persistence configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::error::ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreLayout;
    use crate::error::ConfigError;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = PersistenceConfig::from_toml_str(
            r#"
            layout = "split"
            region = "us-west-2"

            [tables]
            nodes = "MyNodes"
            "#,
        )
        .unwrap();

        assert_eq!(config.layout, StoreLayout::Split);
        assert_eq!(config.tables.nodes, "MyNodes");
        assert_eq!(config.tables.properties, "Properties");
        assert_eq!(config.provisioning.read_capacity, 25);
    }

    #[test]
    fn test_invalid_region_in_document() {
        let err = PersistenceConfig::from_toml_str(r#"region = "moon""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_layout_is_parse_error() {
        let err = PersistenceConfig::from_toml_str(r#"layout = "columnar""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PersistenceConfig::default()
            .with_layout(StoreLayout::Split)
            .with_consistency_check(true, true);
        let text = config.to_toml_string().unwrap();
        assert_eq!(PersistenceConfig::from_toml_str(&text).unwrap(), config);
    }
}
