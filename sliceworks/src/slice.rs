//! Slices are named parts of an application, each owning its own
//! [Container](sliceworks_di::container::Container), settings and component directory.
//!
//! A slice goes through the following lifecycle, with every step being idempotent:
//!
//! 1. Configuration - imports from other slices are declared.
//! 2. [Preparation](Slice::prepare) - configuration hooks are run, settings loaded, components
//!    discovered in the component directory, providers in provider directories and imports wired.
//! 3. [Boot](Slice::boot) - all providers are started, all imports materialized and the container
//!    becomes frozen.
//! 4. [Shutdown](Slice::shutdown) - started providers are stopped.
//!
//! Component discovery maps files to keys and constants: `slices/search/lib/index_entity.rs`
//! becomes the key `index_entity`, constructed by whatever the
//! [ComponentCatalog](crate::catalog::ComponentCatalog) holds for `Search::IndexEntity`. A leading
//! directory named after the slice is skipped, so `slices/admin/lib/admin/test_op.rs` becomes
//! `test_op` (`Admin::TestOp`).

use crate::autoload::{constant_name, namespaced_segments};
use crate::catalog::ComponentCatalog;
use crate::inflector::Inflector;
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::slice_name::SliceName;
use itertools::Itertools;
use once_cell::sync::OnceCell;
use sliceworks_di::component::ComponentKey;
use sliceworks_di::component_registry::import::{ImportDirective, ImportFilter};
use sliceworks_di::component_registry::{ComponentDefinition, ComponentSource};
use sliceworks_di::container::{Container, ContainerBuilder, ContainerConfig};
use sliceworks_di::error::{
    ComponentDefinitionRegistryError, ComponentInstanceProviderError, ContainerError,
    ProviderError,
};
use sliceworks_di::instance_provider::{
    ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr,
};
use sliceworks_di::provider::ProviderPtr;
use sliceworks_di::scope::SINGLETON;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Key under which loaded settings are registered.
pub const SETTINGS_KEY: &str = "settings";

/// Import source naming the application slice.
pub const APPLICATION_IMPORT: &str = "application";

/// Hook run at the beginning of slice preparation.
pub type SliceHook = Arc<dyn Fn(&Slice) -> Result<(), ErrorPtr> + Send + Sync>;

#[derive(Error, Debug)]
pub enum SliceError {
    #[error("Slice '{0}' has not been prepared")]
    NotPrepared(String),
    #[error("Cannot add imports to already prepared slice '{0}'")]
    AlreadyPrepared(String),
    #[error("Slice '{slice}' imports from unknown slice '{from}'")]
    UnknownImportSource { slice: String, from: String },
    #[error("Error configuring slice '{slice}': {source}")]
    Hook {
        slice: String,
        #[source]
        source: ErrorPtr,
    },
    #[error("Error loading settings of slice '{slice}': {source}")]
    Settings {
        slice: String,
        #[source]
        source: SettingsError,
    },
    #[error("Error scanning '{}': {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error(transparent)]
    Registration(#[from] ComponentDefinitionRegistryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Resolution(#[from] ComponentInstanceProviderError),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
enum KeySelection {
    #[default]
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

/// Declares which components of another slice are visible in the importing one, and under which
/// namespace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SliceImport {
    from: String,
    namespace: Option<String>,
    selection: KeySelection,
}

impl SliceImport {
    /// Imports all components of given slice, prefixed with its name.
    pub fn new<T: ToString>(from: T) -> Self {
        let from = from.to_string();
        Self {
            namespace: Some(from.clone()),
            from,
            selection: KeySelection::All,
        }
    }

    /// Changes the namespace of imported keys.
    pub fn with_namespace<T: ToString>(mut self, namespace: T) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Exposes imported keys without any prefix.
    pub fn unprefixed(mut self) -> Self {
        self.namespace = None;
        self
    }

    /// Imports only the given keys.
    pub fn only<I: IntoIterator<Item = S>, S: ToString>(mut self, keys: I) -> Self {
        self.selection = KeySelection::Only(keys.into_iter().map(|key| key.to_string()).collect());
        self
    }

    /// Imports every key apart from the given ones.
    pub fn except<I: IntoIterator<Item = S>, S: ToString>(mut self, keys: I) -> Self {
        self.selection =
            KeySelection::Except(keys.into_iter().map(|key| key.to_string()).collect());
        self
    }

    #[inline]
    pub fn from(&self) -> &str {
        &self.from
    }

    #[inline]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn directive(&self) -> Result<ImportDirective, ComponentDefinitionRegistryError> {
        let filter = match &self.selection {
            KeySelection::All => ImportFilter::All,
            KeySelection::Only(keys) => ImportFilter::only(keys)?,
            KeySelection::Except(keys) => ImportFilter::except(keys)?,
        };

        Ok(ImportDirective {
            namespace: self.namespace.clone(),
            filter,
        })
    }
}

/// Collaborators needed to prepare a slice.
pub struct PrepareContext<'a> {
    pub settings_path: &'a Path,
    pub settings_store: &'a dyn SettingsStore,
    pub provider_dirs: &'a [PathBuf],
    pub catalog: &'a ComponentCatalog,
    pub inflector: &'a Inflector,
    /// Looks up import sources by name.
    pub sources: &'a dyn Fn(&str) -> Option<Arc<Slice>>,
}

/// Builder for [Slice]s.
pub struct SliceBuilder {
    name: SliceName,
    root: PathBuf,
    component_dir: PathBuf,
    provider_dirs: Vec<PathBuf>,
    imports: Vec<SliceImport>,
    hooks: Vec<SliceHook>,
}

impl SliceBuilder {
    /// Creates a builder for a slice with given root directory. Components are discovered in
    /// `<root>/lib` by default.
    pub fn new<P: Into<PathBuf>>(name: SliceName, root: P) -> Self {
        Self {
            name,
            root: root.into(),
            component_dir: PathBuf::from("lib"),
            provider_dirs: vec![],
            imports: vec![],
            hooks: vec![],
        }
    }

    #[inline]
    pub fn name(&self) -> &SliceName {
        &self.name
    }

    /// Sets the component directory, relative to the root.
    pub fn with_component_dir<P: Into<PathBuf>>(mut self, component_dir: P) -> Self {
        self.component_dir = component_dir.into();
        self
    }

    /// Sets provider directories recorded in the container configuration.
    pub fn with_provider_dirs(mut self, provider_dirs: Vec<PathBuf>) -> Self {
        self.provider_dirs = provider_dirs;
        self
    }

    pub fn with_import(mut self, import: SliceImport) -> Self {
        self.imports.push(import);
        self
    }

    /// Adds a hook run when the slice gets prepared, before anything else.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Slice) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Arc<Slice> {
        let container = ContainerBuilder::new(self.name.name())
            .with_config(ContainerConfig {
                root: Some(self.root.clone()),
                provider_dirs: self.provider_dirs,
            })
            .build();

        Arc::new(Slice {
            name: self.name,
            root: self.root,
            component_dir: self.component_dir,
            container,
            imports: Mutex::new(self.imports),
            hooks: self.hooks,
            settings: OnceCell::new(),
            lifecycle: Mutex::new(()),
            prepared: AtomicBool::new(false),
            booted: AtomicBool::new(false),
        })
    }
}

/// A named part of an application. See module-level documentation for details.
pub struct Slice {
    name: SliceName,
    root: PathBuf,
    component_dir: PathBuf,
    container: Arc<Container>,
    imports: Mutex<Vec<SliceImport>>,
    hooks: Vec<SliceHook>,
    settings: OnceCell<Option<ComponentInstancePtr<Settings>>>,
    lifecycle: Mutex<()>,
    prepared: AtomicBool,
    booted: AtomicBool,
}

impl Debug for Slice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slice")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("imports", &self.imports())
            .field("prepared", &self.is_prepared())
            .field("booted", &self.is_booted())
            .finish()
    }
}

impl Slice {
    #[inline]
    pub fn name(&self) -> &SliceName {
        &self.name
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Absolute path of the component directory.
    pub fn component_dir(&self) -> PathBuf {
        self.root.join(&self.component_dir)
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    /// Declares a new import. Imports are wired when the slice gets prepared, so this fails for
    /// prepared slices. Adding an identical import again is a no-op.
    pub fn import(&self, import: SliceImport) -> Result<(), SliceError> {
        if self.is_prepared() {
            return Err(SliceError::AlreadyPrepared(self.name.to_string()));
        }

        let mut imports = self.imports.lock().unwrap_or_else(PoisonError::into_inner);
        if !imports.contains(&import) {
            imports.push(import);
        }

        Ok(())
    }

    pub fn imports(&self) -> Vec<SliceImport> {
        self.imports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of slices this slice imports from, including the application.
    pub fn import_sources(&self) -> Vec<String> {
        self.imports()
            .into_iter()
            .map(|import| import.from)
            .unique()
            .collect()
    }

    /// Returns loaded settings. Always `None` before settings are loaded or if the slice has no
    /// settings definition file.
    pub fn settings(&self) -> Option<ComponentInstancePtr<Settings>> {
        self.settings.get().cloned().flatten()
    }

    /// Loads settings once - subsequent calls return the same result.
    pub fn load_settings(
        &self,
        settings_path: &Path,
        store: &dyn SettingsStore,
    ) -> Result<Option<ComponentInstancePtr<Settings>>, SliceError> {
        self.settings
            .get_or_try_init(|| {
                Settings::load(&self.root, settings_path, store)
                    .map(|settings| settings.map(ComponentInstancePtr::new))
            })
            .cloned()
            .map_err(|source| SliceError::Settings {
                slice: self.name.to_string(),
                source,
            })
    }

    /// Prepares the slice, if not prepared already.
    pub fn prepare(&self, context: &PrepareContext) -> Result<(), SliceError> {
        if self.is_prepared() {
            return Ok(());
        }

        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_prepared() {
            return Ok(());
        }

        info!(slice = %self.name, "Preparing slice");

        for hook in &self.hooks {
            (**hook)(self).map_err(|source| SliceError::Hook {
                slice: self.name.to_string(),
                source,
            })?;
        }

        self.prepare_settings(context)?;
        self.prepare_components(context)?;
        self.prepare_providers(context)?;
        self.prepare_imports(context)?;

        self.prepared.store(true, Ordering::Release);
        Ok(())
    }

    /// Prepares given provider of the slice container.
    pub fn prepare_provider(&self, name: &str) -> Result<(), SliceError> {
        self.container.prepare_provider(name).map_err(Into::into)
    }

    /// Boots a prepared slice: starts providers, materializes imports and freezes the container.
    pub fn boot(&self) -> Result<(), SliceError> {
        if self.is_booted() {
            return Ok(());
        }

        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_booted() {
            return Ok(());
        }

        if !self.is_prepared() {
            return Err(SliceError::NotPrepared(self.name.to_string()));
        }

        info!(slice = %self.name, "Booting slice");

        self.container.finalize()?;
        self.booted.store(true, Ordering::Release);

        Ok(())
    }

    /// Stops started providers. The slice stays booted.
    pub fn shutdown(&self) -> Result<(), SliceError> {
        info!(slice = %self.name, "Shutting down slice");
        self.container.shutdown().map_err(Into::into)
    }

    pub fn register_instance<T: Any + Send + Sync>(
        &self,
        key: &str,
        instance: ComponentInstancePtr<T>,
    ) -> Result<(), SliceError> {
        self.container
            .register_instance(key, instance)
            .map_err(Into::into)
    }

    pub fn register_provider(&self, name: &str, provider: ProviderPtr) -> Result<(), SliceError> {
        self.container
            .register_provider(name, provider)
            .map_err(Into::into)
    }

    /// Starts given provider.
    pub fn start(&self, name: &str) -> Result<(), SliceError> {
        self.container.start_provider(name).map_err(Into::into)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.container.contains_key(key)
    }

    #[inline]
    pub fn keys(&self) -> Vec<ComponentKey> {
        self.container.keys()
    }

    pub fn resolve(&self, key: &str) -> Result<ComponentInstanceAnyPtr, SliceError> {
        self.container.resolve(key).map_err(Into::into)
    }

    pub fn resolve_typed<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, SliceError> {
        self.container.resolve_typed(key).map_err(Into::into)
    }

    fn prepare_imports(&self, context: &PrepareContext) -> Result<(), SliceError> {
        for import in self.imports() {
            let source = (context.sources)(import.from()).ok_or_else(|| {
                SliceError::UnknownImportSource {
                    slice: self.name.to_string(),
                    from: import.from.clone(),
                }
            })?;

            self.container
                .import(source.container(), import.directive()?)?;
        }

        Ok(())
    }

    fn prepare_settings(&self, context: &PrepareContext) -> Result<(), SliceError> {
        if let Some(settings) = self.load_settings(context.settings_path, context.settings_store)? {
            self.container.register_instance(SETTINGS_KEY, settings)?;
        }

        Ok(())
    }

    fn prepare_components(&self, context: &PrepareContext) -> Result<(), SliceError> {
        let component_dir = self.component_dir();
        if !component_dir.is_dir() {
            return Ok(());
        }

        debug!(slice = %self.name, path = %component_dir.display(), "Registering component dir");

        for entry in WalkDir::new(&component_dir).sort_by_file_name() {
            let entry = entry.map_err(|source| SliceError::Scan {
                path: component_dir.clone(),
                source,
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative) = entry.path().strip_prefix(&component_dir).ok() else {
                continue;
            };

            let namespace = self.name.namespace_name();
            let Some(segments) = namespaced_segments(relative, namespace, context.inflector) else {
                continue;
            };

            let key = ComponentKey::normalize(
                &segments
                    .iter()
                    .map(|segment| context.inflector.underscore(segment))
                    .join("."),
            )?;
            let constant = constant_name(namespace, &segments);

            let Some(constructor) = context.catalog.component(&constant) else {
                warn!(slice = %self.name, %constant, "No constructor found for component");
                continue;
            };

            let result = self.container.register_definition(ComponentDefinition {
                key,
                source: ComponentSource::Constructor {
                    scope_name: SINGLETON.to_string(),
                    constructor,
                },
            });

            match result {
                // explicit registration takes precedence
                Ok(_) | Err(ComponentDefinitionRegistryError::DuplicateComponentKey(_)) => {}
                Err(error) => return Err(error.into()),
            }
        }

        Ok(())
    }

    fn prepare_providers(&self, context: &PrepareContext) -> Result<(), SliceError> {
        for provider_dir in context.provider_dirs {
            let provider_dir = self.root.join(provider_dir);
            if !provider_dir.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&provider_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|source| SliceError::Scan {
                    path: provider_dir.clone(),
                    source,
                })?;

                let Some(name) = entry
                    .path()
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .filter(|stem| !stem.starts_with('.'))
                else {
                    continue;
                };

                if !entry.file_type().is_file() {
                    continue;
                }

                let qualified_name = format!("{}.{}", self.name.name(), name);
                let Some(factory) = context.catalog.provider(&qualified_name) else {
                    warn!(slice = %self.name, provider = name, "No provider found in catalog");
                    continue;
                };

                debug!(slice = %self.name, provider = name, "Registering provider");

                match self.container.register_provider(name, (*factory)()) {
                    Ok(_) | Err(ProviderError::DuplicateProvider(_)) => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }

        Ok(())
    }
}
