//! Session configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::markup::DEFAULT_ID_ATTRIBUTE;

/// Environment variable overriding [`SessionConfig::id_attribute`].
pub const ENV_ID_ATTRIBUTE: &str = "AQUEDUCT_ID_ATTRIBUTE";
/// Environment variable overriding [`SessionConfig::lazy_children`].
pub const ENV_LAZY_CHILDREN: &str = "AQUEDUCT_LAZY_CHILDREN";
/// Environment variable overriding [`SessionConfig::dedupe_computed`].
pub const ENV_DEDUPE_COMPUTED: &str = "AQUEDUCT_DEDUPE_COMPUTED";
/// Environment variable overriding [`SessionConfig::auto_flush`].
pub const ENV_AUTO_FLUSH: &str = "AQUEDUCT_AUTO_FLUSH";
/// Environment variable overriding [`SessionConfig::log_filter`].
pub const ENV_LOG: &str = "AQUEDUCT_LOG";

/// Tunables of a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Attribute carrying the component id on every rendered element.
    pub id_attribute: String,
    /// Render child ids as deferred placeholders instead of assembling them eagerly.
    pub lazy_children: bool,
    /// Issue at most one evaluation per computed key.
    pub dedupe_computed: bool,
    /// Deliver queued backend calls after every user-side operation.
    pub auto_flush: bool,
    /// Default `tracing` filter directive.
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_owned(),
            lazy_children: true,
            dedupe_computed: true,
            auto_flush: true,
            log_filter: "info".to_owned(),
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `AQUEDUCT_*` environment variables.
    ///
    /// Values that do not parse are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().merge_env(|name| std::env::var(name).ok())
    }

    /// Reads a TOML file. Missing keys keep their default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("failed to read {}: {err}", path.display())))?;
        Self::from_toml(&contents)
            .map_err(|err| Error::Config(format!("failed to parse {}: {err}", path.display())))
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the text is not a valid configuration.
    pub fn from_toml(contents: &str) -> core::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn merge_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(attribute) = var(ENV_ID_ATTRIBUTE) {
            if attribute.trim().is_empty() {
                warn!("{ENV_ID_ATTRIBUTE} is empty, keeping `{}`", self.id_attribute);
            } else {
                self.id_attribute = attribute.trim().to_owned();
            }
        }
        for (name, flag) in [
            (ENV_LAZY_CHILDREN, &mut self.lazy_children),
            (ENV_DEDUPE_COMPUTED, &mut self.dedupe_computed),
            (ENV_AUTO_FLUSH, &mut self.auto_flush),
        ] {
            if let Some(raw) = var(name) {
                match parse_flag(&raw) {
                    Some(value) => *flag = value,
                    None => warn!("{name}={raw} is not a boolean, keeping {flag}"),
                }
            }
        }
        if let Some(filter) = var(ENV_LOG) {
            self.log_filter = filter;
        }
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::SessionConfig;

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("AQUEDUCT_ID_ATTRIBUTE", "data-id"),
            ("AQUEDUCT_LAZY_CHILDREN", "off"),
            ("AQUEDUCT_AUTO_FLUSH", "maybe"),
            ("AQUEDUCT_LOG", "aqueduct=debug"),
        ]
        .into_iter()
        .collect();
        let config = SessionConfig::default().merge_env(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(config.id_attribute, "data-id");
        assert!(!config.lazy_children);
        assert!(config.auto_flush);
        assert!(config.dedupe_computed);
        assert_eq!(config.log_filter, "aqueduct=debug");
    }

    #[test]
    fn toml_keeps_defaults_for_missing_keys() {
        let config = SessionConfig::from_toml("dedupe_computed = false\n").unwrap();
        assert!(!config.dedupe_computed);
        assert_eq!(config.id_attribute, "data-component-id");
        assert!(SessionConfig::from_toml("auto_flush = \"sometimes\"").is_err());
    }
}
