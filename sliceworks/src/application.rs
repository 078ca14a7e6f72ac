//! Core application functionality.
//!
//! An [Application] owns the application slice (its own components, settings and providers), all
//! other slices and the framework [Configuration]. It moves through the following states:
//!
//! * defined - created by an [ApplicationBuilder], still configurable,
//! * [prepared](Application::prepare) - configuration finalized, settings loaded, application
//!   slice prepared, slices discovered, prepared and frozen, autoloader set up,
//! * [booted](Application::boot) - every container finalized, with providers started and imports
//!   materialized.
//!
//! [Shutdown](Application::shutdown) stops providers without resetting any state. Every transition
//! is idempotent and guarded by a lock, so concurrent callers don't run any step twice.
//!
//! Every slice imports the components of the application slice under the `application`
//! namespace, e.g. the built-in logger is visible in slices as `application.logger`.

use crate::autoload::{AutoloadError, Autoloader};
use crate::catalog::ComponentCatalog;
use crate::config::{Configuration, ConfigurationError};
use crate::inflector::Inflector;
use crate::logger::{LoggerProvider, LOGGER_KEY};
use crate::notifications::{Notifications, NOTIFICATIONS_KEY};
use crate::router::{RouteSet, Router, RouterError};
use crate::settings::Settings;
use crate::slice::{
    PrepareContext, Slice, SliceBuilder, SliceError, SliceImport, APPLICATION_IMPORT,
};
use crate::slice_name::SliceName;
use crate::slice_registrar::{SliceRegistrar, SliceRegistrarError};
use once_cell::sync::OnceCell;
use sliceworks_di::component::ComponentKey;
use sliceworks_di::container::Container;
use sliceworks_di::error::{ComponentDefinitionRegistryError, ProviderError};
use sliceworks_di::instance_provider::{ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr};
use sliceworks_di::provider::ProviderPtr;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Key of the application [Inflector] component.
pub const INFLECTOR_KEY: &str = "inflector";

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Application '{0}' not yet prepared")]
    NotPrepared(String),
    #[error("Application '{0}' has already been defined")]
    AlreadyDefined(String),
    #[error("No application has been defined")]
    Undefined,
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Slice(#[from] SliceError),
    #[error(transparent)]
    SliceRegistrar(#[from] SliceRegistrarError),
    #[error(transparent)]
    Autoload(#[from] AutoloadError),
    #[error(transparent)]
    Router(#[from] RouterError),
}

type ConfigurationHook = Box<dyn FnOnce(&mut Configuration)>;

/// Builder for an [Application], replacing the need to define one statically.
pub struct ApplicationBuilder {
    name: String,
    root: Option<PathBuf>,
    catalog: Option<ComponentCatalog>,
    configuration_hooks: Vec<ConfigurationHook>,
    slice_hooks: Vec<Box<dyn FnOnce(SliceBuilder) -> SliceBuilder>>,
}

impl ApplicationBuilder {
    /// Creates a builder for an application with given name, e.g. `test_app` or `TestApp`.
    pub fn new<T: ToString>(name: T) -> Self {
        Self {
            name: name.to_string(),
            root: None,
            catalog: None,
            configuration_hooks: vec![],
            slice_hooks: vec![],
        }
    }

    /// Sets the application root. Defaults to the current directory.
    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Sets the catalog used for component discovery. Defaults to
    /// [ComponentCatalog::from_inventory].
    pub fn with_catalog(mut self, catalog: ComponentCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Adjusts the configuration after defaults and overrides have been applied.
    pub fn configure<F: FnOnce(&mut Configuration) + 'static>(mut self, f: F) -> Self {
        self.configuration_hooks.push(Box::new(f));
        self
    }

    /// Adds a hook run when the application slice gets prepared.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Slice) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        self.slice_hooks
            .push(Box::new(move |builder| builder.with_hook(hook)));
        self
    }

    pub fn build(self) -> Result<Arc<Application>, ApplicationError> {
        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };

        let mut configuration = Configuration::from_environment(root)?;
        for hook in self.configuration_hooks {
            hook(&mut configuration);
        }

        if configuration.install_tracing_logger
            && tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .try_init()
                .is_err()
        {
            debug!("Global tracing subscriber already installed");
        }

        let name = SliceName::new(&self.name, &configuration.inflector);
        let application_slice = self.slice_hooks.into_iter().fold(
            SliceBuilder::new(name.clone(), configuration.root())
                .with_component_dir(Path::new("lib").join(name.name()))
                .with_provider_dirs(configuration.provider_dirs.clone()),
            |builder, hook| hook(builder),
        );

        info!(application = %name, root = %configuration.root().display(), "Defined application");

        Ok(Arc::new(Application {
            name,
            root: configuration.root().to_path_buf(),
            application_slice: application_slice.build(),
            configuration: RwLock::new(configuration),
            slices: Default::default(),
            autoloader: Default::default(),
            catalog: self.catalog.unwrap_or_else(ComponentCatalog::from_inventory),
            router: OnceCell::new(),
            lifecycle: Mutex::new(()),
            prepared: AtomicBool::new(false),
            booted: AtomicBool::new(false),
        }))
    }
}

/// Root of an application. See module-level documentation for details.
pub struct Application {
    name: SliceName,
    root: PathBuf,
    configuration: RwLock<Configuration>,
    application_slice: Arc<Slice>,
    slices: SliceRegistrar,
    autoloader: Mutex<Autoloader>,
    catalog: ComponentCatalog,
    router: OnceCell<Arc<Router>>,
    lifecycle: Mutex<()>,
    prepared: AtomicBool,
    booted: AtomicBool,
}

impl Debug for Application {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("slices", &self.slices.names())
            .field("prepared", &self.is_prepared())
            .field("booted", &self.is_booted())
            .finish()
    }
}

impl Application {
    /// Application name, e.g. `test_app`.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.name()
    }

    #[inline]
    pub fn namespace(&self) -> &SliceName {
        &self.name
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    /// Read access to the configuration.
    pub fn configuration(&self) -> RwLockReadGuard<'_, Configuration> {
        self.configuration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the configuration. Fails once the application is prepared.
    pub fn configure<F: FnOnce(&mut Configuration)>(&self, f: F) -> Result<(), ApplicationError> {
        let mut configuration = self.write_configuration();
        if configuration.is_finalized() {
            return Err(ConfigurationError::Finalized.into());
        }

        f(&mut configuration);
        Ok(())
    }

    pub fn inflector(&self) -> Inflector {
        self.configuration().inflector.clone()
    }

    /// Settings of the application slice, available once prepared.
    pub fn settings(&self) -> Option<ComponentInstancePtr<Settings>> {
        self.application_slice.settings()
    }

    #[inline]
    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    pub fn autoloader(&self) -> MutexGuard<'_, Autoloader> {
        self.autoloader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn application_slice(&self) -> &Arc<Slice> {
        &self.application_slice
    }

    /// All slices apart from the application slice.
    #[inline]
    pub fn slices(&self) -> &SliceRegistrar {
        &self.slices
    }

    pub fn slice(&self, name: &str) -> Option<Arc<Slice>> {
        self.slices.get(name)
    }

    /// Registers a slice rooted in the slices directory, allowing it to be configured with
    /// given function. Fails once slices are loaded during preparation.
    pub fn register_slice<F>(
        &self,
        name: &str,
        configure: F,
    ) -> Result<Arc<Slice>, ApplicationError>
    where
        F: FnOnce(SliceBuilder) -> SliceBuilder,
    {
        let builder = {
            let configuration = self.configuration();
            let name = SliceName::new(name, &configuration.inflector);
            let root = configuration
                .root()
                .join(&configuration.slices_dir)
                .join(name.name());

            let imports = configuration
                .slices
                .get(name.name())
                .map(|slice_configuration| slice_configuration.imports.clone())
                .unwrap_or_default();

            imports.into_iter().fold(
                SliceBuilder::new(name, root)
                    .with_provider_dirs(configuration.provider_dirs.clone()),
                SliceBuilder::with_import,
            )
        };

        let slice = configure(builder).build();
        self.slices.register(slice.clone())?;

        Ok(slice)
    }

    /// Prepares the application, if not prepared already.
    pub fn prepare(&self) -> Result<(), ApplicationError> {
        if self.is_prepared() {
            return Ok(());
        }

        let _guard = self.lock_lifecycle();
        if self.is_prepared() {
            return Ok(());
        }

        info!(application = %self.name, "Preparing application");

        self.write_configuration().finalize()?;
        let configuration = self.configuration().clone();

        let sources = |name: &str| self.import_source(name);
        let context = PrepareContext {
            settings_path: &configuration.settings_path,
            settings_store: &*configuration.settings_store,
            provider_dirs: &configuration.provider_dirs,
            catalog: &self.catalog,
            inflector: &configuration.inflector,
            sources: &sources,
        };

        self.application_slice
            .load_settings(context.settings_path, context.settings_store)?;

        self.prepare_application_slice(&context)?;
        self.prepare_slices(&configuration, &context)?;
        self.prepare_autoloader(&configuration)?;

        self.prepared.store(true, Ordering::Release);

        info!(application = %self.name, "Application prepared");
        Ok(())
    }

    /// Prepares a single provider of the application slice, without preparing the application.
    pub fn prepare_provider(&self, name: &str) -> Result<(), ApplicationError> {
        self.application_slice
            .prepare_provider(name)
            .map_err(Into::into)
    }

    /// Boots the application, preparing it first if needed.
    pub fn boot(&self) -> Result<(), ApplicationError> {
        if self.is_booted() {
            return Ok(());
        }

        self.prepare()?;

        let _guard = self.lock_lifecycle();
        if self.is_booted() {
            return Ok(());
        }

        info!(application = %self.name, "Booting application");

        self.application_slice.boot()?;
        self.slices.boot_all()?;

        self.booted.store(true, Ordering::Release);

        info!(application = %self.name, "Application booted");
        Ok(())
    }

    /// Shuts down all slices, then the application slice. Every slice is shut down even if some
    /// fail - the first error is returned.
    pub fn shutdown(&self) -> Result<(), ApplicationError> {
        info!(application = %self.name, "Shutting down application");

        let slices_result = self.slices.shutdown_all();
        let application_result = self.application_slice.shutdown();

        slices_result?;
        application_result.map_err(Into::into)
    }

    /// Returns the router, creating it on first access. Fails if the application is not prepared.
    pub fn router(&self) -> Result<Arc<Router>, ApplicationError> {
        if !self.is_prepared() {
            return Err(ApplicationError::NotPrepared(self.name.to_string()));
        }

        self.router
            .get_or_try_init(|| {
                let (routes_path, routes, resolver_factory, options) = {
                    let configuration = self.configuration();
                    (
                        configuration.router.routes_path.clone(),
                        configuration.router.routes.clone(),
                        configuration.router.resolver.clone(),
                        configuration.router.options.clone(),
                    )
                };

                let mut all_routes = RouteSet::load(&self.root, &routes_path)?;
                all_routes.extend(routes);

                let resolver = (*resolver_factory)(self);
                Router::new(&all_routes, &*resolver, &options).map(Arc::new)
            })
            .cloned()
            .map_err(Into::into)
    }

    #[inline]
    pub fn container(&self) -> &Arc<Container> {
        self.application_slice.container()
    }

    pub fn register_instance<T: Any + Send + Sync>(
        &self,
        key: &str,
        instance: ComponentInstancePtr<T>,
    ) -> Result<(), ApplicationError> {
        self.application_slice
            .register_instance(key, instance)
            .map_err(Into::into)
    }

    pub fn register_provider(
        &self,
        name: &str,
        provider: ProviderPtr,
    ) -> Result<(), ApplicationError> {
        self.application_slice
            .register_provider(name, provider)
            .map_err(Into::into)
    }

    /// Starts given provider of the application slice.
    pub fn start(&self, name: &str) -> Result<(), ApplicationError> {
        self.application_slice.start(name).map_err(Into::into)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.application_slice.contains_key(key)
    }

    #[inline]
    pub fn keys(&self) -> Vec<ComponentKey> {
        self.application_slice.keys()
    }

    pub fn resolve(&self, key: &str) -> Result<ComponentInstanceAnyPtr, ApplicationError> {
        self.application_slice.resolve(key).map_err(Into::into)
    }

    pub fn resolve_typed<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ApplicationError> {
        self.application_slice
            .resolve_typed(key)
            .map_err(Into::into)
    }

    fn import_source(&self, name: &str) -> Option<Arc<Slice>> {
        if name == APPLICATION_IMPORT || name == self.name.name() {
            Some(self.application_slice.clone())
        } else {
            self.slices.get(name)
        }
    }

    fn prepare_application_slice(&self, context: &PrepareContext) -> Result<(), ApplicationError> {
        self.register_default(
            INFLECTOR_KEY,
            ComponentInstancePtr::new(context.inflector.clone()),
        )?;
        self.register_default(
            NOTIFICATIONS_KEY,
            ComponentInstancePtr::new(Notifications::default()),
        )?;

        match self
            .application_slice
            .register_provider(LOGGER_KEY, Arc::new(LoggerProvider::new(self.name.name())))
        {
            Ok(_) | Err(SliceError::Provider(ProviderError::DuplicateProvider(_))) => {}
            Err(error) => return Err(error.into()),
        }

        self.application_slice.prepare(context).map_err(Into::into)
    }

    fn prepare_slices(
        &self,
        configuration: &Configuration,
        context: &PrepareContext,
    ) -> Result<(), ApplicationError> {
        self.slices.load_slices(configuration)?;

        for slice in self.slices.slices() {
            if !slice.is_prepared() {
                slice.import(SliceImport::new(APPLICATION_IMPORT))?;
            }
        }

        self.slices.prepare_all(context)?;
        self.slices.freeze();

        debug!(application = %self.name, slices = ?self.slices.names(), "Slices loaded");
        Ok(())
    }

    fn prepare_autoloader(&self, configuration: &Configuration) -> Result<(), ApplicationError> {
        let mut autoloader = self.autoloader();

        for slice in self.slices.slices() {
            let component_dir = slice.component_dir();
            if component_dir.is_dir() {
                autoloader.push_dir(component_dir, slice.name().namespace_name())?;
            }
        }

        let component_dir = self.application_slice.component_dir();
        if component_dir.is_dir() {
            autoloader.push_dir(component_dir, self.name.namespace_name())?;
        }

        autoloader
            .setup(&configuration.inflector)
            .map_err(Into::into)
    }

    fn register_default<T: Any + Send + Sync>(
        &self,
        key: &str,
        instance: ComponentInstancePtr<T>,
    ) -> Result<(), ApplicationError> {
        match self.application_slice.register_instance(key, instance) {
            Ok(_)
            | Err(SliceError::Registration(
                ComponentDefinitionRegistryError::DuplicateComponentKey(_),
            )) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn write_configuration(&self) -> RwLockWriteGuard<'_, Configuration> {
        self.configuration
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(|error| {
            warn!(application = %self.name, "Recovering poisoned lifecycle lock");
            error.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::application::{Application, ApplicationBuilder, ApplicationError};
    use crate::catalog::{ComponentCatalog, ComponentCatalogBuilder};
    use crate::config::ConfigurationError;
    use crate::logger::ApplicationLogger;
    use crate::notifications::Notifications;
    use sliceworks_di::component::Component;
    use sliceworks_di::instance_provider::{
        ComponentInstanceProvider, ComponentInstanceProviderError, ComponentInstancePtr,
    };
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    struct TestOp;

    impl Component for TestOp {
        fn create(
            _instance_provider: &mut dyn ComponentInstanceProvider,
        ) -> Result<Self, ComponentInstanceProviderError> {
            Ok(Self)
        }
    }

    fn application(root: &Path) -> Arc<Application> {
        ApplicationBuilder::new("TestApp")
            .with_root(root)
            .with_catalog(ComponentCatalog::default())
            .configure(|configuration| configuration.install_tracing_logger = false)
            .build()
            .unwrap()
    }

    #[test]
    fn should_prepare_once() {
        let dir = TempDir::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let application = ApplicationBuilder::new("test_app")
            .with_root(dir.path())
            .with_catalog(ComponentCatalog::default())
            .with_hook(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();

        application.prepare().unwrap();
        let keys = application.keys();
        application.prepare().unwrap();

        assert!(application.is_prepared());
        assert!(!application.is_booted());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(application.keys(), keys);
    }

    #[test]
    fn should_register_builtin_components() {
        let dir = TempDir::new().unwrap();
        let application = application(dir.path());

        application.prepare().unwrap();

        assert_eq!(application.name(), "test_app");
        assert_eq!(application.namespace().namespace_name(), "TestApp");
        assert!(application.resolve_typed::<Notifications>("notifications").is_ok());
        assert_eq!(
            application
                .resolve_typed::<ApplicationLogger>("logger")
                .unwrap()
                .application(),
            "test_app"
        );
    }

    #[test]
    fn should_boot_after_preparing() {
        let dir = TempDir::new().unwrap();
        let application = application(dir.path());

        application.boot().unwrap();
        application.boot().unwrap();

        assert!(application.is_prepared());
        assert!(application.is_booted());
        assert!(application.container().is_finalized());

        application.shutdown().unwrap();
        assert!(application.is_booted());
    }

    #[test]
    fn should_reject_router_access_before_prepare() {
        let dir = TempDir::new().unwrap();
        let application = application(dir.path());

        assert!(matches!(
            application.router().unwrap_err(),
            ApplicationError::NotPrepared(name) if name == "test_app"
        ));

        application.prepare().unwrap();

        let router = application.router().unwrap();
        assert!(router.routes().is_empty());
        assert!(Arc::ptr_eq(&router, &application.router().unwrap()));
    }

    #[test]
    fn should_reject_configuration_after_prepare() {
        let dir = TempDir::new().unwrap();
        let application = application(dir.path());

        application
            .configure(|configuration| configuration.env = "test".to_string())
            .unwrap();
        application.prepare().unwrap();

        assert!(matches!(
            application.configure(|_| {}).unwrap_err(),
            ApplicationError::Configuration(ConfigurationError::Finalized)
        ));
        assert_eq!(application.configuration().env, "test");
    }

    #[test]
    fn should_freeze_slices_after_prepare() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("slices/main")).unwrap();
        let application = application(dir.path());

        application.register_slice("admin", |slice| slice).unwrap();
        application.prepare().unwrap();

        assert_eq!(application.slices().names(), vec!["admin", "main"]);
        assert!(application.register_slice("billing", |slice| slice).is_err());
        assert!(application
            .slice("main")
            .unwrap()
            .contains_key("application.notifications"));
    }

    #[test]
    fn should_register_instances_between_prepare_and_boot() {
        let dir = TempDir::new().unwrap();
        let application = application(dir.path());

        application.prepare().unwrap();
        application
            .register_instance("shared_service", ComponentInstancePtr::new(5u32))
            .unwrap();
        application.boot().unwrap();

        assert_eq!(*application.resolve_typed::<u32>("shared_service").unwrap(), 5);
        assert!(application
            .register_instance("late", ComponentInstancePtr::new(1u32))
            .is_err());
    }

    #[test]
    fn should_prepare_once_under_contention() {
        let dir = TempDir::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let application = ApplicationBuilder::new("test_app")
            .with_root(dir.path())
            .with_catalog(ComponentCatalog::default())
            .configure(|configuration| configuration.install_tracing_logger = false)
            .with_hook(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();

        let barrier = Arc::new(Barrier::new(4));
        let handles = (0..4)
            .map(|_| {
                let application = application.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    application.prepare().unwrap();
                    application.router().unwrap()
                })
            })
            .collect::<Vec<_>>();

        let routers = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(routers
            .iter()
            .all(|router| Arc::ptr_eq(router, &routers[0])));
    }

    #[test]
    fn should_autoload_components_under_slice_namespace_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("slices/admin/lib/admin")).unwrap();
        fs::write(dir.path().join("slices/admin/lib/admin/test_op.rs"), "").unwrap();

        let application = ApplicationBuilder::new("test_app")
            .with_root(dir.path())
            .with_catalog(
                ComponentCatalogBuilder::new()
                    .with_component::<TestOp>("Admin::TestOp")
                    .build(),
            )
            .configure(|configuration| configuration.install_tracing_logger = false)
            .build()
            .unwrap();

        application.prepare().unwrap();

        let admin = application.slice("admin").unwrap();
        assert!(admin.contains_key("test_op"));
        assert_eq!(
            application.autoloader().constant_path("Admin::TestOp").unwrap(),
            dir.path().join("slices/admin/lib/admin/test_op.rs")
        );
        assert!(application
            .autoloader()
            .constant_path("Admin::Admin::TestOp")
            .is_none());
    }
}
