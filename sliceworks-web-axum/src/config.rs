//! Server configuration is created with opinionated default values, which can then be overwritten
//! by values from the `sliceworks.json` file in the application root, under the `web` key.

use config::{Config, ConfigError, File};
use fxhash::FxHashMap;
use serde::Deserialize;
use sliceworks::config::CONFIG_FILE;
use std::path::Path;

/// Default address to serve applications on.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:2300";

/// Server configuration.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    /// Address on which to listen.
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
        }
    }
}

/// Web configuration of an application.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct WebConfig {
    /// Map from server name to their config. Typically, only one server with one address will be
    /// present, but in case multiple servers are desired, they should be specified here.
    pub servers: FxHashMap<String, ServerConfig>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            servers: [("default".to_string(), Default::default())]
                .into_iter()
                .collect(),
        }
    }
}

impl From<OptionalWebConfig> for WebConfig {
    fn from(value: OptionalWebConfig) -> Self {
        let default = Self::default();
        Self {
            servers: value.servers.unwrap_or(default.servers),
        }
    }
}

impl WebConfig {
    /// Reads configuration from the config file in application `root`, falling back to defaults
    /// if the file or the `web` key is missing.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(root.join(CONFIG_FILE)).required(false))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalWebConfigWrapper>())
            .map(|config| config.web.map(|config| config.into()).unwrap_or_default())
    }

    /// Config with a single server named `default`.
    pub fn single(server: ServerConfig) -> Self {
        Self {
            servers: [("default".to_string(), server)].into_iter().collect(),
        }
    }
}

#[derive(Deserialize)]
struct OptionalWebConfig {
    servers: Option<FxHashMap<String, ServerConfig>>,
}

#[derive(Deserialize)]
struct OptionalWebConfigWrapper {
    web: Option<OptionalWebConfig>,
}
