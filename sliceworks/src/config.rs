//! Framework configuration of an [Application](crate::application::Application).
//!
//! The configuration is created with opinionated default values, which can then be overwritten by
//! environment variables prefixed with `SLICEWORKS_` or a `sliceworks.json` file in the application
//! root, and finally adjusted programmatically until the application gets prepared. Preparation
//! [finalizes](Configuration::finalize) the configuration, making it read-only.

use crate::inflector::Inflector;
use crate::router::{default_resolver, RouteResolverFactory, RouteSet};
use crate::settings::{EnvironmentStore, SettingsStorePtr};
use crate::slice::SliceImport;
use config::{Config, ConfigError, Environment, File};
use fxhash::FxHashMap;
use serde::Deserialize;
use sliceworks_di::instance_provider::ComponentInstanceAnyPtr;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const CONFIG_ENV_PREFIX: &str = "SLICEWORKS";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "sliceworks.json";

/// Extensions of supported configuration files, in lookup order.
pub const CONFIG_EXTENSIONS: [&str; 6] = ["toml", "json", "yaml", "yml", "ini", "ron"];

/// Finds an existing file at `base` with one of [CONFIG_EXTENSIONS].
pub fn find_config_file(base: &Path) -> Option<PathBuf> {
    CONFIG_EXTENSIONS
        .iter()
        .map(|extension| base.with_extension(extension))
        .find(|path| path.is_file())
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration has already been finalized")]
    AlreadyFinalized,
    #[error("Cannot change finalized configuration")]
    Finalized,
    #[error("Error reading configuration overrides: {0}")]
    Overrides(#[source] ConfigError),
}

/// Configuration of a single slice.
#[derive(Clone, Debug, Default)]
pub struct SliceConfiguration {
    /// Imports from other slices, wired when the slice gets prepared.
    pub imports: Vec<SliceImport>,
}

impl SliceConfiguration {
    pub fn import(&mut self, import: SliceImport) -> &mut Self {
        self.imports.push(import);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct RouterOptions {
    /// Path prefix prepended to every route.
    pub prefix: String,
}

#[derive(Clone)]
pub struct RouterConfiguration {
    /// Path of the optional routes file, relative to the root and without extension.
    pub routes_path: PathBuf,
    /// Creates the resolver mapping route identifiers to endpoints.
    pub resolver: RouteResolverFactory,
    pub options: RouterOptions,
    /// Routes defined in code, in addition to the routes file.
    pub routes: RouteSet,
}

impl Default for RouterConfiguration {
    fn default() -> Self {
        Self {
            routes_path: PathBuf::from("config/routes"),
            resolver: Arc::new(default_resolver),
            options: Default::default(),
            routes: Default::default(),
        }
    }
}

impl Debug for RouterConfiguration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterConfiguration")
            .field("routes_path", &self.routes_path)
            .field("options", &self.options)
            .field("routes", &self.routes)
            .finish()
    }
}

/// Framework configuration.
#[derive(Clone)]
pub struct Configuration {
    root: PathBuf,
    /// Application environment, e.g. `development` or `production`.
    pub env: String,
    pub inflector: Inflector,
    /// Path of the settings definition file, relative to the application or slice root and without
    /// extension.
    pub settings_path: PathBuf,
    pub settings_store: SettingsStorePtr,
    /// Directory, relative to the root, in which slices are discovered.
    pub slices_dir: PathBuf,
    /// Directories, relative to the application or slice root, searched for provider files.
    pub provider_dirs: Vec<PathBuf>,
    pub slices: FxHashMap<String, SliceConfiguration>,
    pub router: RouterConfiguration,
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
    middleware: Vec<ComponentInstanceAnyPtr>,
    finalized: bool,
}

impl Debug for Configuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("root", &self.root)
            .field("env", &self.env)
            .field("settings_path", &self.settings_path)
            .field("slices_dir", &self.slices_dir)
            .field("provider_dirs", &self.provider_dirs)
            .field("slices", &self.slices)
            .field("router", &self.router)
            .field("install_tracing_logger", &self.install_tracing_logger)
            .field("middleware", &self.middleware.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Configuration {
    /// Creates a configuration with default values for an application in given root.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            env: "development".to_string(),
            inflector: Default::default(),
            settings_path: PathBuf::from("config/settings"),
            settings_store: Arc::new(EnvironmentStore::default()),
            slices_dir: PathBuf::from("slices"),
            provider_dirs: vec![PathBuf::from("config/providers")],
            slices: Default::default(),
            router: Default::default(),
            install_tracing_logger: true,
            middleware: vec![],
            finalized: false,
        }
    }

    /// Creates a default configuration, overridden by `SLICEWORKS_*` variables and
    /// [CONFIG_FILE] in the root.
    pub fn from_environment<P: Into<PathBuf>>(root: P) -> Result<Self, ConfigurationError> {
        let mut configuration = Self::new(root);

        let overrides = Config::builder()
            .add_source(File::from(configuration.root.join(CONFIG_FILE)).required(false))
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalConfiguration>())
            .map_err(ConfigurationError::Overrides)?;

        configuration.apply(overrides);
        Ok(configuration)
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns configuration for given slice, creating a default one if needed.
    pub fn slice(&mut self, name: &str) -> &mut SliceConfiguration {
        self.slices.entry(name.to_string()).or_default()
    }

    /// Adds a middleware, applied by web integrations in registration order.
    pub fn use_middleware(&mut self, middleware: ComponentInstanceAnyPtr) {
        self.middleware.push(middleware);
    }

    pub fn for_each_middleware<F: FnMut(&ComponentInstanceAnyPtr)>(&self, f: F) {
        self.middleware.iter().for_each(f);
    }

    /// Makes the configuration read-only. Can only be called once.
    pub fn finalize(&mut self) -> Result<(), ConfigurationError> {
        if self.finalized {
            return Err(ConfigurationError::AlreadyFinalized);
        }

        self.finalized = true;
        Ok(())
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn apply(&mut self, overrides: OptionalConfiguration) {
        if let Some(env) = overrides.env {
            self.env = env;
        }

        if let Some(install_tracing_logger) = overrides.install_tracing_logger {
            self.install_tracing_logger = install_tracing_logger;
        }

        if let Some(slices_dir) = overrides.slices_dir {
            self.slices_dir = slices_dir;
        }

        if let Some(settings_path) = overrides.settings_path {
            self.settings_path = settings_path;
        }
    }
}

#[derive(Default, Deserialize)]
struct OptionalConfiguration {
    env: Option<String>,
    install_tracing_logger: Option<bool>,
    slices_dir: Option<PathBuf>,
    settings_path: Option<PathBuf>,
}
