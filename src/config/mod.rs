use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod validator;

use crate::cli::Cli;
use crate::domain::FormDefinition;
use crate::persistence::{LockPolicy, PersistenceConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub arrays: ArraySettings,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Form definitions, inline or loaded from `config/forms`
    #[serde(default)]
    pub forms: Vec<FormDefinition>,
}

/// Defaults applied to every array field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArraySettings {
    /// Identifier field of array fields built without a definition
    #[serde(default = "default_identifier_field")]
    pub identifier_field: String,
    /// Rows per bulk create / bulk update batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Read policy inside the reconciliation transaction
    #[serde(default)]
    pub lock_policy: LockPolicy,
    /// Roll a pass back when it recorded any error
    #[serde(default = "default_rollback_on_error")]
    pub rollback_on_error: bool,
    /// Separator of `<field><d><index><d><sub_field>` keys
    #[serde(default = "default_key_delimiter")]
    pub key_delimiter: String,
}

fn default_identifier_field() -> String {
    "pk".to_string()
}

fn default_batch_size() -> usize {
    200
}

fn default_rollback_on_error() -> bool {
    false
}

fn default_key_delimiter() -> String {
    ".".to_string()
}

impl Default for ArraySettings {
    fn default() -> Self {
        Self {
            identifier_field: default_identifier_field(),
            batch_size: default_batch_size(),
            lock_policy: LockPolicy::default(),
            rollback_on_error: default_rollback_on_error(),
            key_delimiter: default_key_delimiter(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Create settings from CLI arguments (config file, then env, then CLI)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let config_path = &cli.config;
        let root = config_path
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or(".");

        let mut settings = Self::build(File::from(config_path.clone()).required(false))?;
        settings.apply_cli_overrides(cli);
        settings.load_external_configs(root)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `<root>/silica.{toml,yaml,json}` and `<root>/config/forms`
    pub fn from_root(root: &str) -> Result<Self, anyhow::Error> {
        let config_path = Path::new(root).join("silica");
        let mut settings = Self::build(File::from(config_path).required(false))?;
        settings.load_external_configs(root)?;
        settings.validate()?;
        Ok(settings)
    }

    fn build<S>(file: S) -> Result<Self, anyhow::Error>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = PersistenceConfig::default();
        let s = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SILICA")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("persistence.url", defaults.url)?
            .set_default("persistence.max_connections", defaults.max_connections as i64)?
            .set_default("persistence.auto_migrate", defaults.auto_migrate)?
            .set_default(
                "persistence.connect_timeout_secs",
                defaults.connect_timeout_secs as i64,
            )?
            .build()?;

        Ok(s.try_deserialize()?)
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(url) = &cli.database_url {
            self.persistence.url = url.clone();
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                error_messages.join("\n")
            )
        })
    }

    fn load_external_configs(&mut self, root: &str) -> Result<(), anyhow::Error> {
        self.load_forms_from_dir(&format!("{}/config/forms", root))
    }

    fn load_forms_from_dir(&mut self, path: &str) -> Result<(), anyhow::Error> {
        let pattern = format!("{}/*", path);
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) => {
                    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                        continue;
                    };
                    if !matches!(ext, "json" | "yaml" | "yml") {
                        continue;
                    }
                    let content = std::fs::read_to_string(&path)?;
                    let form: FormDefinition = if ext == "json" {
                        serde_json::from_str(&content)?
                    } else {
                        serde_yaml::from_str(&content)?
                    };
                    tracing::debug!(form = %form.name, path = %path.display(), "loaded form definition");
                    self.forms.push(form);
                }
                Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
            }
        }
        Ok(())
    }

    /// Form definition by name
    pub fn form(&self, name: &str) -> Option<&FormDefinition> {
        self.forms.iter().find(|form| form.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_defaults() {
        let settings = ArraySettings::default();
        assert_eq!(settings.identifier_field, "pk");
        assert_eq!(settings.batch_size, 200);
        assert_eq!(settings.lock_policy, LockPolicy::None);
        assert!(!settings.rollback_on_error);
        assert_eq!(settings.key_delimiter, ".");
    }

    #[test]
    fn test_partial_array_section() {
        let settings: ArraySettings =
            serde_json::from_str(r#"{"batch_size": 50, "lock_policy": "for_update"}"#).unwrap();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.lock_policy, LockPolicy::ForUpdate);
        assert_eq!(settings.identifier_field, "pk");
    }
}
