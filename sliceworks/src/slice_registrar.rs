//! Registry of application slices.

use crate::config::Configuration;
use crate::slice::{PrepareContext, Slice, SliceBuilder, SliceError};
use crate::slice_name::SliceName;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SliceRegistrarError {
    #[error("Slice '{0}' is already registered")]
    DuplicateSlice(String),
    #[error("Cannot register slice '{0}' - slices have already been loaded")]
    Frozen(String),
    #[error("Error reading slices directory '{}': {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error(transparent)]
    Slice(#[from] SliceError),
}

/// Slices of an application, keyed by name.
#[derive(Default, Debug)]
pub struct SliceRegistrar {
    slices: RwLock<BTreeMap<String, Arc<Slice>>>,
    frozen: AtomicBool,
}

impl SliceRegistrar {
    /// Registers a slice. Names must be unique and registration is only possible until the
    /// registrar is frozen.
    pub fn register(&self, slice: Arc<Slice>) -> Result<(), SliceRegistrarError> {
        let name = slice.name().name().to_string();
        if self.is_frozen() {
            return Err(SliceRegistrarError::Frozen(name));
        }

        let mut slices = self.slices.write().unwrap_or_else(PoisonError::into_inner);
        if slices.contains_key(&name) {
            return Err(SliceRegistrarError::DuplicateSlice(name));
        }

        debug!(slice = %name, "Registering slice");

        slices.insert(name, slice);
        Ok(())
    }

    /// Registers every directory in the slices directory as a slice, applying slice
    /// configuration. Slices registered manually beforehand take precedence over discovered
    /// ones with the same name.
    pub fn load_slices(&self, configuration: &Configuration) -> Result<(), SliceRegistrarError> {
        let slices_dir = configuration.root().join(&configuration.slices_dir);
        if !slices_dir.is_dir() {
            return Ok(());
        }

        for entry in WalkDir::new(&slices_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| SliceRegistrarError::Scan {
                path: slices_dir.clone(),
                source,
            })?;

            let path = entry.path();
            let Some(dir_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };

            if dir_name.starts_with('.') {
                continue;
            }

            if !path.is_dir() {
                warn!(path = %path.display(), "Ignoring non-directory entry in slices dir");
                continue;
            }

            let name = SliceName::new(dir_name, &configuration.inflector);
            if self.get(name.name()).is_some() {
                continue;
            }

            let mut builder = SliceBuilder::new(name, path)
                .with_provider_dirs(configuration.provider_dirs.clone());
            if let Some(slice_configuration) = configuration.slices.get(builder.name().name()) {
                for import in &slice_configuration.imports {
                    builder = builder.with_import(import.clone());
                }
            }

            self.register(builder.build())?;
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Slice>> {
        self.read_slices().get(name).cloned()
    }

    /// Registered slices, ordered by name.
    pub fn slices(&self) -> Vec<Arc<Slice>> {
        self.read_slices().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.read_slices().keys().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.read_slices().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_slices().is_empty()
    }

    /// Prevents further registration.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Prepares all slices, ordered by name.
    pub fn prepare_all(&self, context: &PrepareContext) -> Result<(), SliceRegistrarError> {
        for slice in self.slices() {
            slice.prepare(context)?;
        }

        Ok(())
    }

    /// Boots all slices, such that import sources boot before importing slices.
    pub fn boot_all(&self) -> Result<(), SliceRegistrarError> {
        for slice in self.boot_order() {
            slice.boot()?;
        }

        Ok(())
    }

    /// Shuts down all slices in reverse boot order. Every slice is shut down even if some fail -
    /// the first error is returned.
    pub fn shutdown_all(&self) -> Result<(), SliceRegistrarError> {
        let mut result = Ok(());
        for slice in self.boot_order().into_iter().rev() {
            if let Err(error) = slice.shutdown() {
                warn!(slice = %slice.name(), %error, "Error shutting down slice");
                if result.is_ok() {
                    result = Err(error.into());
                }
            }
        }

        result
    }

    /// Topological order of slices with respect to imports between them, with ties broken by
    /// name. Import cycles are broken in name order.
    pub fn boot_order(&self) -> Vec<Arc<Slice>> {
        let slices = self.read_slices().clone();

        let mut dependencies: BTreeMap<&str, BTreeSet<String>> = slices
            .iter()
            .map(|(name, slice)| {
                let sources = slice
                    .import_sources()
                    .into_iter()
                    .filter(|source| source != name && slices.contains_key(source))
                    .collect();
                (name.as_str(), sources)
            })
            .collect();

        let mut order = Vec::with_capacity(slices.len());
        while !dependencies.is_empty() {
            let next = dependencies
                .iter()
                .find(|(_, sources)| sources.is_empty())
                .map(|(name, _)| *name)
                .unwrap_or_else(|| {
                    let name = dependencies.keys().next().copied().unwrap_or_default();
                    warn!(slice = name, "Import cycle detected - booting slice out of order");
                    name
                });

            dependencies.remove(next);
            for sources in dependencies.values_mut() {
                sources.remove(next);
            }

            if let Some(slice) = slices.get(next) {
                order.push(slice.clone());
            }
        }

        order
    }

    fn read_slices(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<Slice>>> {
        self.slices.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Configuration;
    use crate::inflector::Inflector;
    use crate::slice::{SliceBuilder, SliceImport};
    use crate::slice_name::SliceName;
    use crate::slice_registrar::{SliceRegistrar, SliceRegistrarError};
    use std::fs;
    use tempfile::TempDir;

    fn builder(name: &str) -> SliceBuilder {
        SliceBuilder::new(SliceName::new(name, &Inflector::default()), "/app/slices")
    }

    #[test]
    fn should_reject_duplicates() {
        let registrar = SliceRegistrar::default();
        registrar.register(builder("admin").build()).unwrap();

        assert!(matches!(
            registrar.register(builder("admin").build()).unwrap_err(),
            SliceRegistrarError::DuplicateSlice(name) if name == "admin"
        ));
    }

    #[test]
    fn should_reject_registration_when_frozen() {
        let registrar = SliceRegistrar::default();
        registrar.freeze();

        assert!(matches!(
            registrar.register(builder("admin").build()).unwrap_err(),
            SliceRegistrarError::Frozen(_)
        ));
        assert!(registrar.is_empty());
    }

    #[test]
    fn should_load_slices_from_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("slices/search")).unwrap();
        fs::create_dir_all(dir.path().join("slices/admin")).unwrap();
        fs::create_dir_all(dir.path().join("slices/.cache")).unwrap();
        fs::write(dir.path().join("slices/README.md"), "").unwrap();

        let mut configuration = Configuration::new(dir.path());
        configuration
            .slice("admin")
            .import(SliceImport::new("search"));

        let registrar = SliceRegistrar::default();
        registrar.load_slices(&configuration).unwrap();

        assert_eq!(registrar.names(), vec!["admin", "search"]);
        assert_eq!(
            registrar.get("admin").unwrap().import_sources(),
            vec!["search".to_string()]
        );
        assert_eq!(
            registrar.get("search").unwrap().root(),
            dir.path().join("slices/search")
        );
    }

    #[test]
    fn should_order_by_imports() {
        let registrar = SliceRegistrar::default();
        registrar
            .register(
                builder("admin")
                    .with_import(SliceImport::new("search"))
                    .with_import(SliceImport::new("application"))
                    .build(),
            )
            .unwrap();
        registrar
            .register(
                builder("billing")
                    .with_import(SliceImport::new("admin"))
                    .build(),
            )
            .unwrap();
        registrar.register(builder("search").build()).unwrap();

        let order = registrar
            .boot_order()
            .iter()
            .map(|slice| slice.name().name().to_string())
            .collect::<Vec<_>>();

        assert_eq!(order, vec!["search", "admin", "billing"]);
    }

    #[test]
    fn should_break_import_cycles() {
        let registrar = SliceRegistrar::default();
        registrar
            .register(builder("a").with_import(SliceImport::new("b")).build())
            .unwrap();
        registrar
            .register(builder("b").with_import(SliceImport::new("a")).build())
            .unwrap();

        assert_eq!(registrar.boot_order().len(), 2);
    }
}
