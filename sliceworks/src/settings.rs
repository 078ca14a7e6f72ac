//! Typed settings, declared per application or slice in a settings definition file and resolved
//! against a [SettingsStore].
//!
//! The definition file lives at `<root>/<settings_path>.<ext>` (`config/settings.toml` by default,
//! any format supported by the `config` crate works) and maps setting names to their definitions:
//!
//! ```toml
//! [database_url]
//! type = "string"
//! required = true
//!
//! [pool_size]
//! type = "integer"
//! default = "5"
//! ```
//!
//! Every declared setting is looked up in the store, falling back to its default. A missing
//! definition file simply means there are no settings. All validation failures are collected and
//! reported together when loading, never on first access.

use crate::config::find_config_file;
use config::{Config, ConfigBuilder, ConfigError, File};
use derive_more::Display;
use fxhash::FxHashMap;
use itertools::Itertools;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub type SettingsStorePtr = Arc<dyn SettingsStore + Send + Sync>;

/// Source of raw setting values.
#[cfg_attr(test, automock)]
pub trait SettingsStore {
    /// Returns the raw value for given setting name.
    fn fetch(&self, name: &str) -> Option<String>;
}

/// Reads settings from environment variables named after upper-cased setting names, with an
/// optional prefix, e.g. `database_url` -> `MYAPP_DATABASE_URL`.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentStore {
    prefix: Option<String>,
}

impl EnvironmentStore {
    pub fn with_prefix<T: ToString>(prefix: T) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
        }
    }

    fn variable_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, name).to_uppercase(),
            None => name.to_uppercase(),
        }
    }
}

impl SettingsStore for EnvironmentStore {
    fn fetch(&self, name: &str) -> Option<String> {
        std::env::var(self.variable_name(name)).ok()
    }
}

/// In-memory store.
#[derive(Clone, Debug, Default)]
pub struct MapStore {
    values: FxHashMap<String, String>,
}

impl MapStore {
    pub fn with<K: ToString, V: ToString>(mut self, name: K, value: V) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for MapStore {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }
}

impl SettingsStore for MapStore {
    fn fetch(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    #[default]
    #[display(fmt = "string")]
    String,
    #[display(fmt = "integer")]
    Integer,
    #[display(fmt = "float")]
    Float,
    #[display(fmt = "boolean")]
    Boolean,
}

impl SettingType {
    fn parse(self, raw: &str) -> Option<SettingValue> {
        let raw = raw.trim();
        match self {
            SettingType::String => Some(SettingValue::String(raw.to_string())),
            SettingType::Integer => raw.parse().ok().map(SettingValue::Integer),
            SettingType::Float => raw.parse().ok().map(SettingValue::Float),
            SettingType::Boolean => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(SettingValue::Boolean(true)),
                "false" | "0" | "no" | "off" => Some(SettingValue::Boolean(false)),
                _ => None,
            },
        }
    }
}

/// Declaration of a single setting.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SettingDefinition {
    #[serde(rename = "type", default)]
    pub kind: SettingType,
    /// Raw default value, parsed like values coming from the store.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, PartialEq, Debug, Display)]
pub enum SettingValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// Validation failure of a single setting.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum SettingError {
    #[error("missing required setting '{0}'")]
    Missing(String),
    #[error("setting '{name}' must be of type {kind}, got '{value}'")]
    InvalidValue {
        name: String,
        kind: SettingType,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Error loading settings from '{}': {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("Invalid settings: {}", .0.iter().join(", "))]
    Invalid(Vec<SettingError>),
    #[error("Error deserializing settings: {0}")]
    Deserialize(#[source] ConfigError),
}

/// Resolved, read-only settings.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    definitions: FxHashMap<String, SettingDefinition>,
    values: FxHashMap<String, SettingValue>,
}

impl Settings {
    /// Loads settings declared in `<root>/<settings_path>.<ext>`. Returns `None` if there's no
    /// definition file.
    pub fn load(
        root: &Path,
        settings_path: &Path,
        store: &dyn SettingsStore,
    ) -> Result<Option<Self>, SettingsError> {
        let Some(path) = find_config_file(&root.join(settings_path)) else {
            return Ok(None);
        };

        debug!(path = %path.display(), "Loading settings");

        let definitions = Config::builder()
            .add_source(File::from(path.as_path()))
            .build()
            .and_then(|config| config.try_deserialize::<FxHashMap<String, SettingDefinition>>())
            .map_err(|source| SettingsError::Load { path, source })?;

        Self::resolve(definitions, store).map(Some)
    }

    /// Resolves given definitions against the store.
    pub fn resolve(
        definitions: FxHashMap<String, SettingDefinition>,
        store: &dyn SettingsStore,
    ) -> Result<Self, SettingsError> {
        let mut values = FxHashMap::default();
        let mut errors = vec![];

        for (name, definition) in definitions.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            let Some(raw) = store.fetch(name).or_else(|| definition.default.clone()) else {
                if definition.required {
                    errors.push(SettingError::Missing(name.clone()));
                }

                continue;
            };

            match definition.kind.parse(&raw) {
                Some(value) => {
                    values.insert(name.clone(), value);
                }
                None => errors.push(SettingError::InvalidValue {
                    name: name.clone(),
                    kind: definition.kind,
                    value: raw,
                }),
            }
        }

        if !errors.is_empty() {
            return Err(SettingsError::Invalid(errors));
        }

        Ok(Self {
            definitions,
            values,
        })
    }

    /// Checks if given setting is declared, regardless of having a value.
    #[inline]
    pub fn responds_to(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Sorted names of all declared settings.
    pub fn names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).sorted().collect()
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            SettingValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            SettingValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            SettingValue::Float(value) => Some(*value),
            SettingValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            SettingValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Deserializes all values with a value into a custom structure.
    pub fn try_deserialize<T: DeserializeOwned>(&self) -> Result<T, SettingsError> {
        self.values
            .iter()
            .try_fold(Config::builder(), |builder, (name, value)| {
                set_override(builder, name, value)
            })
            .and_then(|builder| builder.build())
            .and_then(|config| config.try_deserialize())
            .map_err(SettingsError::Deserialize)
    }
}

fn set_override(
    builder: ConfigBuilder<config::builder::DefaultState>,
    name: &str,
    value: &SettingValue,
) -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    match value {
        SettingValue::String(value) => builder.set_override(name, value.clone()),
        SettingValue::Integer(value) => builder.set_override(name, *value),
        SettingValue::Float(value) => builder.set_override(name, *value),
        SettingValue::Boolean(value) => builder.set_override(name, *value),
    }
}

#[cfg(test)]
mod tests {
    use crate::settings::{
        MapStore, MockSettingsStore, SettingDefinition, SettingError, SettingType, SettingValue,
        Settings, SettingsError,
    };
    use fxhash::FxHashMap;
    use mockall::predicate::*;
    use serde::Deserialize;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn definition(kind: SettingType, default: Option<&str>, required: bool) -> SettingDefinition {
        SettingDefinition {
            kind,
            default: default.map(str::to_string),
            required,
        }
    }

    #[test]
    fn should_resolve_values_from_store() {
        let mut store = MockSettingsStore::new();
        store
            .expect_fetch()
            .with(eq("pool_size"))
            .times(1)
            .return_const(Some("10".to_string()));

        let definitions: FxHashMap<_, _> = [(
            "pool_size".to_string(),
            definition(SettingType::Integer, Some("5"), true),
        )]
        .into_iter()
        .collect();

        let settings = Settings::resolve(definitions, &store).unwrap();
        assert_eq!(settings.get_i64("pool_size"), Some(10));
    }

    #[test]
    fn should_fall_back_to_defaults() {
        let definitions: FxHashMap<_, _> = [
            (
                "debug".to_string(),
                definition(SettingType::Boolean, Some("true"), false),
            ),
            (
                "optional".to_string(),
                definition(SettingType::String, None, false),
            ),
        ]
        .into_iter()
        .collect();

        let settings = Settings::resolve(definitions, &MapStore::default()).unwrap();
        assert_eq!(settings.get_bool("debug"), Some(true));
        assert!(settings.responds_to("optional"));
        assert_eq!(settings.get("optional"), None);
        assert!(!settings.responds_to("unknown"));
        assert_eq!(settings.names(), vec!["debug", "optional"]);
    }

    #[test]
    fn should_collect_all_errors() {
        let definitions: FxHashMap<_, _> = [
            (
                "secret".to_string(),
                definition(SettingType::String, None, true),
            ),
            (
                "ratio".to_string(),
                definition(SettingType::Float, None, false),
            ),
        ]
        .into_iter()
        .collect();

        let store = MapStore::default().with("ratio", "half");

        let SettingsError::Invalid(errors) =
            Settings::resolve(definitions, &store).unwrap_err() else {
            panic!("expected invalid settings");
        };

        assert_eq!(
            errors,
            vec![
                SettingError::InvalidValue {
                    name: "ratio".to_string(),
                    kind: SettingType::Float,
                    value: "half".to_string(),
                },
                SettingError::Missing("secret".to_string()),
            ]
        );
    }

    #[test]
    fn should_load_definition_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/settings.toml"),
            r#"
[main_session_secret]
type = "string"
required = true

[pool_size]
type = "integer"
default = "5"
"#,
        )
        .unwrap();

        let store = MapStore::default().with("main_session_secret", "abc");
        let settings = Settings::load(dir.path(), Path::new("config/settings"), &store)
            .unwrap()
            .unwrap();

        assert_eq!(settings.get_str("main_session_secret"), Some("abc"));
        assert_eq!(settings.get("pool_size"), Some(&SettingValue::Integer(5)));
    }

    #[test]
    fn should_skip_missing_definition_file() {
        let dir = TempDir::new().unwrap();

        assert!(
            Settings::load(dir.path(), Path::new("config/settings"), &MapStore::default())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn should_propagate_malformed_definition_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/settings.toml"), "[broken").unwrap();

        assert!(matches!(
            Settings::load(dir.path(), Path::new("config/settings"), &MapStore::default())
                .unwrap_err(),
            SettingsError::Load { .. }
        ));
    }

    #[test]
    fn should_deserialize_values() {
        #[derive(Deserialize)]
        struct Database {
            pool_size: i64,
            debug: bool,
        }

        let definitions: FxHashMap<_, _> = [
            (
                "pool_size".to_string(),
                definition(SettingType::Integer, Some("5"), false),
            ),
            (
                "debug".to_string(),
                definition(SettingType::Boolean, Some("off"), false),
            ),
        ]
        .into_iter()
        .collect();

        let database = Settings::resolve(definitions, &MapStore::default())
            .unwrap()
            .try_deserialize::<Database>()
            .unwrap();

        assert_eq!(database.pool_size, 5);
        assert!(!database.debug);
    }
}
