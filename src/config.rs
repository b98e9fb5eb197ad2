//! Catalog endpoint, product types and per-target instrument tables

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::QueryError;

const DEFAULT_CONFIG: &str = include_str!("../ode.conl");

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub endpoint: String,
    pub user_agent: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub calibrated_pt: String,
    pub derived_pt: String,
    /// Reported field name -> catalog tag
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

/// Settings for a target queried in two phases (images, then geometry)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub image_pt: String,
    pub geometry_pt: String,
    /// Accepted instrument hosts; empty accepts any
    #[serde(default)]
    pub ihid: Vec<String>,
    pub instruments: BTreeMap<String, InstrumentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    /// Instrument id sent to the catalog
    pub iid: String,
    /// File type token a product id must carry to be kept
    pub img_type: String,
}

impl Config {
    /// Configuration shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_conl(DEFAULT_CONFIG).context("Failed to parse built-in configuration")
    }

    /// Load from `path`, or fall back to the built-in configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Self::builtin(),
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::from_conl(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    pub fn from_conl(content: &str) -> Result<Self> {
        let config: Config = serde_conl::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid endpoint URL: {}", self.endpoint))?;
        if self.calibrated_pt.trim().is_empty() || self.derived_pt.trim().is_empty() {
            bail!("calibrated_pt and derived_pt must not be empty");
        }
        for (name, target) in &self.targets {
            if target.image_pt.trim().is_empty() || target.geometry_pt.trim().is_empty() {
                bail!("Target '{}' needs both image_pt and geometry_pt", name);
            }
            if target.instruments.is_empty() {
                bail!("Target '{}' has no instruments", name);
            }
            for (iid, instrument) in &target.instruments {
                if instrument.img_type.len() < 2 || instrument.iid.trim().is_empty() {
                    bail!(
                        "Instrument '{}' of target '{}' needs an iid and an img_type of at least two characters",
                        iid,
                        name
                    );
                }
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Look up a specialized target, ignoring case
    pub fn target(&self, name: &str) -> Result<&TargetConfig, QueryError> {
        self.find_target(name).map(|(_, target)| target)
    }

    /// Case-insensitive lookup returning the configured spelling of the name too
    pub fn find_target(&self, name: &str) -> Result<(&str, &TargetConfig), QueryError> {
        self.targets
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, target)| (key.as_str(), target))
            .ok_or_else(|| QueryError::UnknownTarget(name.to_string()))
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }
}

impl TargetConfig {
    pub fn instrument(&self, target: &str, iid: &str) -> Result<&InstrumentConfig, QueryError> {
        self.instruments
            .get(iid)
            .ok_or_else(|| QueryError::UnknownInstrument {
                target: target.to_string(),
                iid: iid.to_string(),
                known: self
                    .instruments
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub fn check_ihid(&self, target: &str, ihid: &str) -> Result<(), QueryError> {
        if self.ihid.is_empty() || self.ihid.iter().any(|h| h == ihid) {
            Ok(())
        } else {
            Err(QueryError::UnknownInstrumentHost {
                target: target.to_string(),
                ihid: ihid.to_string(),
            })
        }
    }
}
