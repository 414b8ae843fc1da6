//! Persistence configuration
//!
//! Table names, store location, start-up flags and provisioning constants,
//! resolved to primitives before they reach the adapters.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

pub const ENV_REGION: &str = "STOWAGE_REGION";
pub const ENV_ENDPOINT: &str = "STOWAGE_ENDPOINT";
pub const ENV_LAYOUT: &str = "STOWAGE_LAYOUT";
pub const ENV_CREATE_ON_MISSING: &str = "STOWAGE_CREATE_ON_MISSING";
pub const ENV_CONSISTENCY_CHECK: &str = "STOWAGE_CONSISTENCY_CHECK";
pub const ENV_CONSISTENCY_FIX: &str = "STOWAGE_CONSISTENCY_FIX";
pub const ENV_TABLE: &str = "STOWAGE_TABLE";

/// How entities are laid out in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreLayout {
    /// One item per node holding the node, its properties and its references
    #[default]
    Bundle,
    /// Node shells and properties in separate tables
    Split,
}

impl fmt::Display for StoreLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLayout::Bundle => f.write_str("bundle"),
            StoreLayout::Split => f.write_str("split"),
        }
    }
}

impl FromStr for StoreLayout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bundle" => Ok(StoreLayout::Bundle),
            "split" => Ok(StoreLayout::Split),
            other => Err(ConfigError::invalid("layout", other)),
        }
    }
}

/// Table names per layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    pub bundles: String,
    pub nodes: String,
    pub properties: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            bundles: "Bundles".to_string(),
            nodes: "Nodes".to_string(),
            properties: "Properties".to_string(),
        }
    }
}

/// Table creation and readiness polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub read_capacity: i64,
    pub write_capacity: i64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            max_attempts: 12,
            read_capacity: 25,
            write_capacity: 25,
        }
    }
}

impl ProvisioningConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Top-level persistence configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub layout: StoreLayout,
    pub region: Option<String>,
    /// Endpoint override, for local emulators
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub tables: TablesConfig,
    pub create_on_missing: bool,
    pub consistency_check: bool,
    pub consistency_fix: bool,
    pub provisioning: ProvisioningConfig,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            layout: StoreLayout::default(),
            region: None,
            endpoint: None,
            timeout_ms: None,
            tables: TablesConfig::default(),
            create_on_missing: false,
            consistency_check: false,
            consistency_fix: false,
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl PersistenceConfig {
    /// Builder-style: select the layout
    #[must_use]
    pub fn with_layout(mut self, layout: StoreLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Builder-style: allow table creation at start-up
    #[must_use]
    pub fn with_create_on_missing(mut self, create: bool) -> Self {
        self.create_on_missing = create;
        self
    }

    /// Builder-style: enable the consistency check, optionally with repairs
    #[must_use]
    pub fn with_consistency_check(mut self, check: bool, fix: bool) -> Self {
        self.consistency_check = check;
        self.consistency_fix = fix;
        self
    }

    /// Builder-style: set the region
    pub fn with_region(mut self, region: impl Into<String>) -> ConfigResult<Self> {
        let region = region.into();
        validate_region(&region)?;
        self.region = Some(region);
        Ok(self)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check every field against its domain
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("tables.bundles", &self.tables.bundles),
            ("tables.nodes", &self.tables.nodes),
            ("tables.properties", &self.tables.properties),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::missing(field));
            }
        }
        if let Some(region) = &self.region {
            validate_region(region)?;
        }
        if let Some(endpoint) = &self.endpoint {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::invalid("endpoint", "empty endpoint"));
            }
        }
        if self.consistency_fix && !self.consistency_check {
            return Err(ConfigError::invalid(
                "consistency_fix",
                "requires consistency_check",
            ));
        }
        if self.provisioning.max_attempts == 0 {
            return Err(ConfigError::invalid("provisioning.max_attempts", "0"));
        }
        if self.provisioning.read_capacity <= 0 {
            return Err(ConfigError::invalid(
                "provisioning.read_capacity",
                self.provisioning.read_capacity.to_string(),
            ));
        }
        if self.provisioning.write_capacity <= 0 {
            return Err(ConfigError::invalid(
                "provisioning.write_capacity",
                self.provisioning.write_capacity.to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `STOWAGE_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(region) = lookup(ENV_REGION) {
            validate_region(&region)?;
            self.region = Some(region);
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = Some(endpoint);
        }
        if let Some(layout) = lookup(ENV_LAYOUT) {
            self.layout = layout.parse()?;
        }
        if let Some(flag) = lookup(ENV_CREATE_ON_MISSING) {
            self.create_on_missing = parse_flag(ENV_CREATE_ON_MISSING, &flag)?;
        }
        if let Some(flag) = lookup(ENV_CONSISTENCY_CHECK) {
            self.consistency_check = parse_flag(ENV_CONSISTENCY_CHECK, &flag)?;
        }
        if let Some(flag) = lookup(ENV_CONSISTENCY_FIX) {
            self.consistency_fix = parse_flag(ENV_CONSISTENCY_FIX, &flag)?;
        }
        if let Some(table) = lookup(ENV_TABLE) {
            self.tables.bundles = table;
        }
        Ok(())
    }
}

/// Accept region names shaped like `us-east-1` or `us-gov-west-1`
pub fn validate_region(region: &str) -> ConfigResult<()> {
    let parts: Vec<&str> = region.split('-').collect();
    let plausible = parts.len() >= 3
        && parts[0].len() == 2
        && parts[0].chars().all(|c| c.is_ascii_lowercase())
        && parts[1..parts.len() - 1]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
        && parts
            .last()
            .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if plausible {
        Ok(())
    } else {
        Err(ConfigError::invalid("region", region))
    }
}

fn parse_flag(field: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(field, raw)),
    }
}
