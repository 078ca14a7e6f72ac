//! Core functionality for registering and resolving components.
//!
//! A [Container] maps [keys](crate::component::ComponentKey) to component definitions and
//! resolves them lazily - a constructor is not called until its key is first resolved, and
//! [scopes](crate::scope) decide whether the created instance is reused afterwards.
//!
//! Containers can import components from other containers (see
//! [import](crate::component_registry::import)). Until a container is
//! [finalized](Container::finalize), imports are resolved on demand: requesting an imported key
//! makes it appear in [keys](Container::keys). Finalization starts all providers, eagerly
//! materializes all imports and freezes the container, so no further registration is possible.

use crate::component::{Component, ComponentKey};
use crate::component_registry::import::ImportDirective;
use crate::component_registry::{
    ComponentDefinition, ComponentDefinitionRegistry, ComponentSource,
    OrderedComponentDefinitionRegistry,
};
use crate::error::{
    ComponentDefinitionRegistryError, ComponentInstanceProviderError, ContainerError,
    ProviderError,
};
use crate::instance_provider::{
    downcast_instance, ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstancePtr,
};
use crate::provider::{ProviderPtr, ProviderRegistry, ProviderState};
use crate::scope::{
    PrototypeScopeFactory, ScopeFactory, ScopePtr, SingletonScopeFactory, PROTOTYPE, SINGLETON,
};
use fxhash::FxHashMap;
use itertools::Itertools;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::mem;
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    Weak,
};
use std::thread;
use tracing::{debug, info, warn};

pub type ComponentDefinitionRegistryPtr = Box<dyn ComponentDefinitionRegistry + Send + Sync>;

pub type ScopeFactoryPtr = Box<dyn ScopeFactory + Send + Sync>;

pub type ScopeFactoryRegistry = FxHashMap<String, ScopeFactoryPtr>;

/// Base configuration of a container.
#[derive(Clone, Debug, Default)]
pub struct ContainerConfig {
    /// Root directory of the code managed by the container.
    pub root: Option<PathBuf>,
    /// Directories, relative to the root, searched for provider definitions.
    pub provider_dirs: Vec<PathBuf>,
}

/// Builder for [Container] with sensible defaults, for easy construction.
pub struct ContainerBuilder {
    name: String,
    config: ContainerConfig,
    definition_registry: ComponentDefinitionRegistryPtr,
    scope_factories: ScopeFactoryRegistry,
}

impl ContainerBuilder {
    /// Creates a new builder with a default configuration.
    pub fn new<T: ToString>(name: T) -> Self {
        Self {
            name: name.to_string(),
            config: Default::default(),
            definition_registry: Box::<OrderedComponentDefinitionRegistry>::default(),
            scope_factories: [
                (
                    SINGLETON.to_string(),
                    Box::<SingletonScopeFactory>::default() as ScopeFactoryPtr,
                ),
                (
                    PROTOTYPE.to_string(),
                    Box::<PrototypeScopeFactory>::default() as ScopeFactoryPtr,
                ),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Sets new [ContainerConfig].
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets new [ComponentDefinitionRegistry].
    pub fn with_definition_registry(
        mut self,
        definition_registry: ComponentDefinitionRegistryPtr,
    ) -> Self {
        self.definition_registry = definition_registry;
        self
    }

    /// Sets new scope factories.
    pub fn with_scope_factories(mut self, scope_factories: ScopeFactoryRegistry) -> Self {
        self.scope_factories = scope_factories;
        self
    }

    /// Adds a new scope factory.
    pub fn with_scope_factory<T: ToString>(mut self, name: T, factory: ScopeFactoryPtr) -> Self {
        self.scope_factories.insert(name.to_string(), factory);
        self
    }

    /// Builds resulting [Container].
    pub fn build(self) -> Arc<Container> {
        Arc::new(Container::new(
            self.name,
            self.config,
            self.definition_registry,
            self.scope_factories,
        ))
    }
}

#[derive(Clone)]
struct Importer {
    source: Weak<Container>,
    source_name: String,
    directive: ImportDirective,
}

/// Thread-safe component container. See module-level documentation for details.
pub struct Container {
    name: String,
    config: ContainerConfig,
    definitions: RwLock<ComponentDefinitionRegistryPtr>,
    scopes: FxHashMap<String, ScopePtr>,
    importers: RwLock<Vec<Importer>>,
    providers: Mutex<ProviderRegistry>,
    providers_released: Condvar,
    finalized: AtomicBool,
    finalize_lock: Mutex<()>,
}

impl Debug for Container {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("keys", &self.keys())
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

impl Container {
    /// Creates a new container with given registry and scope factories. The factory map should
    /// include built-in [SINGLETON] and [PROTOTYPE] for maximum compatibility, since components
    /// registered without an explicit scope use [SINGLETON].
    pub fn new(
        name: String,
        config: ContainerConfig,
        definition_registry: ComponentDefinitionRegistryPtr,
        scope_factories: ScopeFactoryRegistry,
    ) -> Self {
        Self {
            name,
            config,
            definitions: RwLock::new(definition_registry),
            scopes: scope_factories
                .iter()
                .map(|(name, factory)| (name.clone(), factory.create_scope()))
                .collect(),
            importers: Default::default(),
            providers: Default::default(),
            providers_released: Condvar::new(),
            finalized: AtomicBool::new(false),
            finalize_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Checks if the container has been finalized and no longer accepts registrations.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Registers a raw definition. Fails for a finalized container.
    pub fn register_definition(
        &self,
        definition: ComponentDefinition,
    ) -> Result<(), ComponentDefinitionRegistryError> {
        if self.is_finalized() {
            return Err(ComponentDefinitionRegistryError::Frozen {
                container: self.name.clone(),
                key: definition.key.to_string(),
            });
        }

        debug!(container = %self.name, key = %definition.key, "Registering component");
        self.write_definitions().register_definition(definition)
    }

    /// Registers a ready instance under given key.
    pub fn register_instance<T: Any + Send + Sync>(
        &self,
        key: &str,
        instance: ComponentInstancePtr<T>,
    ) -> Result<(), ComponentDefinitionRegistryError> {
        self.register_definition(ComponentDefinition {
            key: ComponentKey::normalize(key)?,
            source: ComponentSource::Instance(instance as ComponentInstanceAnyPtr),
        })
    }

    /// Registers a constructor function with instances stored in given scope.
    pub fn register_factory<F>(
        &self,
        key: &str,
        scope_name: &str,
        constructor: F,
    ) -> Result<(), ComponentDefinitionRegistryError>
    where
        F: Fn(
                &mut dyn ComponentInstanceProvider,
            ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.register_definition(ComponentDefinition {
            key: ComponentKey::normalize(key)?,
            source: ComponentSource::Constructor {
                scope_name: scope_name.to_string(),
                constructor: Arc::new(constructor),
            },
        })
    }

    /// Registers a [Component] as a singleton.
    #[inline]
    pub fn register_component<T: Component>(
        &self,
        key: &str,
    ) -> Result<(), ComponentDefinitionRegistryError> {
        self.register_component_with_scope::<T>(key, SINGLETON)
    }

    /// Registers a [Component] with instances stored in given scope.
    pub fn register_component_with_scope<T: Component>(
        &self,
        key: &str,
        scope_name: &str,
    ) -> Result<(), ComponentDefinitionRegistryError> {
        self.register_factory(key, scope_name, |instance_provider| {
            T::create(instance_provider)
                .map(|instance| ComponentInstancePtr::new(instance) as ComponentInstanceAnyPtr)
        })
    }

    /// Registers a provider. Providers are started in registration order.
    pub fn register_provider(
        &self,
        name: &str,
        provider: ProviderPtr,
    ) -> Result<(), ProviderError> {
        if self.is_finalized() {
            return Err(ProviderError::Frozen {
                container: self.name.clone(),
                name: name.to_string(),
            });
        }

        self.lock_providers().register(name, provider)
    }

    /// Names of registered providers, in registration order.
    pub fn provider_names(&self) -> Vec<String> {
        self.lock_providers().names()
    }

    /// Returns the lifecycle state of given provider.
    pub fn provider_state(&self, name: &str) -> Result<ProviderState, ProviderError> {
        self.lock_providers().get(name).map(|(_, state)| state)
    }

    /// Prepares given provider, if not prepared already.
    pub fn prepare_provider(&self, name: &str) -> Result<(), ProviderError> {
        self.transition(
            name,
            None,
            |state| state == ProviderState::Registered,
            |provider, state| {
                self.run_prepare(name, provider)?;
                *state = ProviderState::Prepared;
                Ok(())
            },
        )
    }

    /// Starts given provider, preparing it first if needed. Starting an already started provider
    /// is a no-op, while a provider being started by another thread is waited for.
    pub fn start_provider(&self, name: &str) -> Result<(), ProviderError> {
        self.transition(
            name,
            Some(ProviderState::Starting),
            |state| state != ProviderState::Started,
            |provider, state| {
                if *state == ProviderState::Registered {
                    self.run_prepare(name, provider)?;
                    *state = ProviderState::Prepared;
                }

                debug!(container = %self.name, provider = name, "Starting provider");

                provider
                    .start(self)
                    .map_err(|source| ProviderError::StartError {
                        name: name.to_string(),
                        source,
                    })?;

                *state = ProviderState::Started;
                Ok(())
            },
        )
    }

    fn stop_provider(&self, name: &str) -> Result<(), ProviderError> {
        self.transition(
            name,
            None,
            |state| state == ProviderState::Started,
            |provider, state| {
                debug!(container = %self.name, provider = name, "Stopping provider");

                provider
                    .stop(self)
                    .map_err(|source| ProviderError::StopError {
                        name: name.to_string(),
                        source,
                    })?;

                *state = ProviderState::Stopped;
                Ok(())
            },
        )
    }

    fn run_prepare(&self, name: &str, provider: &ProviderPtr) -> Result<(), ProviderError> {
        debug!(container = %self.name, provider = name, "Preparing provider");

        provider
            .prepare(self)
            .map_err(|source| ProviderError::PrepareError {
                name: name.to_string(),
                source,
            })
    }

    /// Runs a lifecycle step of given provider, if `pending` says it is needed. Steps of a single
    /// provider are serialized: other threads wait until the running one releases the provider,
    /// while the thread running a step skips nested ones. The step updates the state it is given
    /// as it progresses, and the provider is released with whatever state it reached.
    fn transition<P, S>(
        &self,
        name: &str,
        running: Option<ProviderState>,
        pending: P,
        step: S,
    ) -> Result<(), ProviderError>
    where
        P: Fn(ProviderState) -> bool,
        S: FnOnce(&ProviderPtr, &mut ProviderState) -> Result<(), ProviderError>,
    {
        let current = thread::current().id();
        let mut providers = self.lock_providers();
        let (provider, state) = loop {
            let owner = providers.owner(name);
            match owner {
                Some(owner) if owner == current => return Ok(()),
                Some(_) => {
                    providers = self
                        .providers_released
                        .wait(providers)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                None => {
                    let (provider, state) = providers.get(name)?;
                    if !pending(state) {
                        return Ok(());
                    }

                    providers.claim(name, current, running.unwrap_or(state));
                    break (provider, state);
                }
            }
        };
        drop(providers);

        let mut claim = ProviderClaim {
            container: self,
            name,
            state,
        };
        step(&provider, &mut claim.state)
    }

    /// Makes components of the `source` container available in this one, as described by the
    /// directive. Imports are resolved lazily until the container is finalized.
    pub fn import(
        &self,
        source: &Arc<Container>,
        directive: ImportDirective,
    ) -> Result<(), ComponentDefinitionRegistryError> {
        if self.is_finalized() {
            return Err(ComponentDefinitionRegistryError::Frozen {
                container: self.name.clone(),
                key: directive.namespace.unwrap_or_default(),
            });
        }

        let mut importers = self
            .importers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let source_ptr = Arc::downgrade(source);
        if importers
            .iter()
            .any(|importer| importer.source.ptr_eq(&source_ptr) && importer.directive == directive)
        {
            return Ok(());
        }

        debug!(
            container = %self.name,
            source = %source.name,
            namespace = ?directive.namespace,
            "Adding import"
        );

        importers.push(Importer {
            source: source_ptr,
            source_name: source.name.clone(),
            directive,
        });

        Ok(())
    }

    /// Resolves an instance registered under given key.
    pub fn resolve(
        &self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        let key = ComponentKey::normalize(key)?;
        self.resolve_key(&key, &mut ResolutionContext::new(self))
    }

    /// Typesafe version of [Container::resolve].
    pub fn resolve_typed<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError> {
        self.resolve(key)
            .and_then(|instance| downcast_instance(key, instance))
    }

    /// Checks if given key can be resolved. In a non-finalized container this can import the key
    /// or start a provider named after its first segment.
    pub fn contains_key(&self, key: &str) -> bool {
        let Ok(key) = ComponentKey::normalize(key) else {
            return false;
        };

        match self.lookup(&key) {
            Ok(definition) => definition.is_some(),
            Err(error) => {
                warn!(container = %self.name, key = %key, %error, "Error looking up component");
                false
            }
        }
    }

    /// Returns all keys registered so far, including materialized imports.
    pub fn keys(&self) -> Vec<ComponentKey> {
        self.read_definitions().keys()
    }

    /// Returns keys which can be imported by other containers - components defined in this
    /// container, excluding its own imports.
    pub fn exported_keys(&self) -> Vec<ComponentKey> {
        self.read_definitions().exported_keys()
    }

    /// Starts all providers, materializes all imports and freezes the container. Calling it on a
    /// finalized container is a no-op.
    pub fn finalize(&self) -> Result<(), ContainerError> {
        if self.is_finalized() {
            return Ok(());
        }

        let _guard = self
            .finalize_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_finalized() {
            return Ok(());
        }

        info!(container = %self.name, "Finalizing container");

        for name in self.provider_names() {
            self.start_provider(&name)?;
        }

        self.materialize_imports()?;
        self.finalized.store(true, Ordering::Release);

        Ok(())
    }

    /// Stops all started providers in reverse registration order. All providers are stopped even
    /// if one of them fails - the first error is returned.
    pub fn shutdown(&self) -> Result<(), ContainerError> {
        info!(container = %self.name, "Shutting down container");

        let started = self.lock_providers().names_in_state(ProviderState::Started);
        let mut result = Ok(());

        for name in started.into_iter().rev() {
            if let Err(error) = self.stop_provider(&name) {
                warn!(
                    container = %self.name,
                    provider = %name,
                    %error,
                    "Error stopping provider"
                );
                if result.is_ok() {
                    result = Err(error.into());
                }
            }
        }

        result
    }

    fn materialize_imports(&self) -> Result<(), ContainerError> {
        for importer in self.read_importers() {
            let source = importer
                .source
                .upgrade()
                .ok_or_else(|| {
                    ContainerError::SourceContainerDropped(importer.source_name.clone())
                })?;

            let keys = source
                .exported_keys()
                .into_iter()
                .filter(|key| importer.directive.filter.allows(key))
                .collect_vec();

            let mut definitions = self.write_definitions();
            for source_key in keys {
                let key = importer.directive.local_key(&source_key)?;
                if definitions.is_registered(key.as_str()) {
                    continue;
                }

                debug!(
                    container = %self.name,
                    source = %importer.source_name,
                    key = %key,
                    "Importing component"
                );

                definitions.register_definition(ComponentDefinition {
                    key,
                    source: ComponentSource::Imported {
                        container: importer.source.clone(),
                        source_container: importer.source_name.clone(),
                        key: source_key,
                    },
                })?;
            }
        }

        Ok(())
    }

    fn lookup(
        &self,
        key: &ComponentKey,
    ) -> Result<Option<ComponentDefinition>, ComponentInstanceProviderError> {
        if let Some(definition) = self.read_definitions().definition(key.as_str()) {
            return Ok(Some(definition));
        }

        if self.is_finalized() {
            return Ok(None);
        }

        if self.start_provider_for(key)? {
            if let Some(definition) = self.read_definitions().definition(key.as_str()) {
                return Ok(Some(definition));
            }
        }

        self.lazy_import(key)
    }

    fn lazy_import(
        &self,
        key: &ComponentKey,
    ) -> Result<Option<ComponentDefinition>, ComponentInstanceProviderError> {
        for importer in self.read_importers() {
            let Some(source_key) = importer.directive.source_key(key) else {
                continue;
            };

            let source = importer.source.upgrade().ok_or_else(|| {
                ComponentInstanceProviderError::SourceContainerDropped(key.to_string())
            })?;

            if !source.has_export(&source_key)? {
                continue;
            }

            debug!(
                container = %self.name,
                source = %importer.source_name,
                key = %key,
                "Lazily importing component"
            );

            let definition = ComponentDefinition {
                key: key.clone(),
                source: ComponentSource::Imported {
                    container: importer.source.clone(),
                    source_container: importer.source_name.clone(),
                    key: source_key,
                },
            };

            match self.write_definitions().register_definition(definition.clone()) {
                Ok(_) | Err(ComponentDefinitionRegistryError::DuplicateComponentKey(_)) => {}
                Err(error) => return Err(error.into()),
            }

            return Ok(Some(definition));
        }

        Ok(None)
    }

    /// Checks if given key is defined by this container, as opposed to being imported.
    fn has_export(&self, key: &ComponentKey) -> Result<bool, ComponentInstanceProviderError> {
        let exported = |container: &Self| {
            container
                .read_definitions()
                .definition(key.as_str())
                .map(|definition| !definition.is_imported())
        };

        if let Some(exported) = exported(self) {
            return Ok(exported);
        }

        if !self.is_finalized() && self.start_provider_for(key)? {
            return Ok(exported(self).unwrap_or(false));
        }

        Ok(false)
    }

    /// Starts a not yet started provider named after the first segment of the key. A provider
    /// being started by the current thread is skipped, so its own missing keys stay missing.
    fn start_provider_for(
        &self,
        key: &ComponentKey,
    ) -> Result<bool, ComponentInstanceProviderError> {
        let name = key.root();
        let should_start = {
            let providers = self.lock_providers();
            match providers.get(name) {
                Ok((_, state)) => {
                    state != ProviderState::Started
                        && providers.owner(name) != Some(thread::current().id())
                }
                Err(_) => false,
            }
        };

        if should_start {
            self.start_provider(name)?;
        }

        Ok(should_start)
    }

    fn resolve_key(
        &self,
        key: &ComponentKey,
        context: &mut ResolutionContext,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        let definition = self
            .lookup(key)?
            .ok_or_else(|| ComponentInstanceProviderError::MissingComponent(key.to_string()))?;

        match &definition.source {
            ComponentSource::Instance(instance) => Ok(instance.clone()),
            ComponentSource::Constructor {
                scope_name,
                constructor,
            } => {
                if context.is_constructing(&self.name, key) {
                    return Err(ComponentInstanceProviderError::DependencyCycle(
                        key.to_string(),
                    ));
                }

                let scope = self.scopes.get(scope_name).ok_or_else(|| {
                    ComponentInstanceProviderError::UnrecognizedScope(scope_name.clone())
                })?;

                scope.instance(key, &mut || {
                    context
                        .under_construction
                        .push((self.name.clone(), key.clone()));
                    let instance = (**constructor)(&mut *context);
                    context.under_construction.pop();

                    instance.map_err(|error| match error {
                        ComponentInstanceProviderError::ConstructorError { key: failed, source }
                            if failed.is_empty() =>
                        {
                            ComponentInstanceProviderError::ConstructorError {
                                key: key.to_string(),
                                source,
                            }
                        }
                        error => error,
                    })
                })
            }
            ComponentSource::Imported {
                container,
                key: source_key,
                ..
            } => {
                let source = container.upgrade().ok_or_else(|| {
                    ComponentInstanceProviderError::SourceContainerDropped(key.to_string())
                })?;

                let mut source_context = ResolutionContext {
                    container: &source,
                    under_construction: mem::take(&mut context.under_construction),
                };
                let instance = source.resolve_key(source_key, &mut source_context);
                context.under_construction = source_context.under_construction;

                instance
            }
        }
    }

    fn read_definitions(&self) -> RwLockReadGuard<'_, ComponentDefinitionRegistryPtr> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_definitions(&self) -> RwLockWriteGuard<'_, ComponentDefinitionRegistryPtr> {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_importers(&self) -> Vec<Importer> {
        self.importers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_providers(&self) -> MutexGuard<'_, ProviderRegistry> {
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases a provider claimed by [Container::transition], waking up threads waiting for it.
struct ProviderClaim<'a> {
    container: &'a Container,
    name: &'a str,
    state: ProviderState,
}

impl Drop for ProviderClaim<'_> {
    fn drop(&mut self) {
        self.container
            .lock_providers()
            .release(self.name, self.state);
        self.container.providers_released.notify_all();
    }
}

/// Provider passed to constructors, tracking keys under construction to detect dependency cycles.
/// Keys are paired with container names, since a resolution can pass through imports.
struct ResolutionContext<'a> {
    container: &'a Container,
    under_construction: Vec<(String, ComponentKey)>,
}

impl<'a> ResolutionContext<'a> {
    fn new(container: &'a Container) -> Self {
        Self {
            container,
            under_construction: Vec::new(),
        }
    }

    fn is_constructing(&self, container: &str, key: &ComponentKey) -> bool {
        self.under_construction
            .iter()
            .any(|(name, constructed)| name == container && constructed == key)
    }
}

impl ComponentInstanceProvider for ResolutionContext<'_> {
    fn instance_by_key(
        &mut self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        let key = ComponentKey::normalize(key)?;
        let container = self.container;
        container.resolve_key(&key, self)
    }
}

#[cfg(test)]
mod tests {
    use crate::component::{Component, ComponentKey};
    use crate::component_registry::import::{ImportDirective, ImportFilter};
    use crate::component_registry::{
        ComponentDefinition, ComponentSource, MockComponentDefinitionRegistry,
    };
    use crate::container::{
        Container, ContainerBuilder, ComponentDefinitionRegistryPtr, ScopeFactoryPtr,
    };
    use crate::error::{
        ComponentDefinitionRegistryError, ComponentInstanceProviderError, ProviderError,
    };
    use crate::instance_provider::{
        error_ptr, ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstancePtr,
        ErrorPtr, TypedComponentInstanceProvider,
    };
    use crate::provider::{MockProvider, Provider, ProviderState};
    use crate::scope::{MockScopeFactory, PrototypeScope, ScopePtr, PROTOTYPE, SINGLETON};
    use mockall::predicate::*;
    use mockall::Sequence;
    use std::fmt::{Display, Formatter};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    struct Repository;

    struct Service {
        repository: ComponentInstancePtr<Repository>,
    }

    impl Component for Service {
        fn create(
            instance_provider: &mut dyn ComponentInstanceProvider,
        ) -> Result<Self, ComponentInstanceProviderError> {
            Ok(Self {
                repository: instance_provider.instance_typed("repository")?,
            })
        }
    }

    #[derive(Debug)]
    struct TestError;

    impl Display for TestError {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str("test error")
        }
    }

    impl std::error::Error for TestError {}

    fn recursive_constructor(
        instance_provider: &mut dyn ComponentInstanceProvider,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        instance_provider.instance_by_key("recursive")
    }

    struct RegisteringProvider;

    impl Provider for RegisteringProvider {
        fn start(&self, container: &Container) -> Result<(), ErrorPtr> {
            container
                .register_instance("logger", ComponentInstancePtr::new(5u8))
                .map_err(error_ptr)
        }
    }

    struct SlowProvider {
        starts: Arc<AtomicUsize>,
    }

    impl Provider for SlowProvider {
        fn start(&self, container: &Container) -> Result<(), ErrorPtr> {
            thread::sleep(Duration::from_millis(50));
            self.starts.fetch_add(1, Ordering::SeqCst);
            container
                .register_instance("db.connection", ComponentInstancePtr::new(1u8))
                .map_err(error_ptr)
        }
    }

    struct SelfResolvingProvider;

    impl Provider for SelfResolvingProvider {
        fn start(&self, container: &Container) -> Result<(), ErrorPtr> {
            container.resolve("db.config").map_err(error_ptr)?;
            container
                .register_instance("db.connection", ComponentInstancePtr::new(1u8))
                .map_err(error_ptr)
        }
    }

    #[test]
    fn should_resolve_instances() {
        let container = ContainerBuilder::new("test").build();
        let instance = ComponentInstancePtr::new(7i32);
        container
            .register_instance("Shared_Service", instance.clone())
            .unwrap();

        let resolved = container.resolve_typed::<i32>("shared_service").unwrap();
        assert!(Arc::ptr_eq(&resolved, &instance));
    }

    #[test]
    fn should_resolve_components_with_dependencies() {
        let container = ContainerBuilder::new("test").build();
        container
            .register_instance("repository", ComponentInstancePtr::new(Repository))
            .unwrap();
        container.register_component::<Service>("service").unwrap();

        let first = container.resolve_typed::<Service>("service").unwrap();
        let second = container.resolve_typed::<Service>("service").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(
            &first.repository,
            &container.resolve_typed::<Repository>("repository").unwrap()
        ));
    }

    #[test]
    fn should_construct_lazily() {
        let created = Arc::new(AtomicUsize::new(0));
        let container = ContainerBuilder::new("test").build();

        let counter = created.clone();
        container
            .register_factory("lazy", SINGLETON, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 0);
        container.resolve("lazy").unwrap();
        container.resolve("lazy").unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_support_prototypes() {
        let container = ContainerBuilder::new("test").build();
        container
            .register_factory("proto", PROTOTYPE, |_| {
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();

        assert!(!Arc::ptr_eq(
            &container.resolve("proto").unwrap(),
            &container.resolve("proto").unwrap()
        ));
    }

    #[test]
    fn should_detect_dependency_cycles() {
        let container = ContainerBuilder::new("test").build();
        container
            .register_factory("recursive", SINGLETON, recursive_constructor)
            .unwrap();

        assert!(matches!(
            container.resolve("recursive").unwrap_err(),
            ComponentInstanceProviderError::DependencyCycle(key) if key == "recursive"
        ));
    }

    #[test]
    fn should_not_resolve_missing_component() {
        let container = ContainerBuilder::new("test").build();

        assert!(container
            .resolve("missing")
            .unwrap_err()
            .is_missing_component());
    }

    #[test]
    fn should_reject_incompatible_types() {
        let container = ContainerBuilder::new("test").build();
        container
            .register_instance("number", ComponentInstancePtr::new(7i32))
            .unwrap();

        assert!(matches!(
            container.resolve_typed::<String>("number").unwrap_err(),
            ComponentInstanceProviderError::IncompatibleComponent { .. }
        ));
    }

    #[test]
    fn should_recognize_missing_scope() {
        let container = ContainerBuilder::new("test")
            .with_scope_factories(Default::default())
            .build();
        container
            .register_factory("component", SINGLETON, |_| {
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();

        assert!(matches!(
            container.resolve("component").unwrap_err(),
            ComponentInstanceProviderError::UnrecognizedScope(scope) if scope == SINGLETON
        ));
    }

    #[test]
    fn should_create_custom_scopes_from_factories() {
        let mut scope_factory = MockScopeFactory::new();
        scope_factory
            .expect_create_scope()
            .times(1)
            .returning(|| Box::<PrototypeScope>::default() as ScopePtr);

        let container = ContainerBuilder::new("test")
            .with_scope_factory("REQUEST", Box::new(scope_factory) as ScopeFactoryPtr)
            .build();
        container
            .register_factory("per_request", "REQUEST", |_| {
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();

        assert!(container.resolve("per_request").is_ok());
    }

    #[test]
    fn should_forward_constructor_errors() {
        let container = ContainerBuilder::new("test").build();
        container
            .register_factory("failing", SINGLETON, |_| {
                Err(ComponentInstanceProviderError::constructor(TestError))
            })
            .unwrap();
        container
            .register_factory("dependent", SINGLETON, |instance_provider| {
                instance_provider.instance_by_key("failing")
            })
            .unwrap();

        let error = container.resolve("dependent").unwrap_err();
        assert!(matches!(
            &error,
            ComponentInstanceProviderError::ConstructorError { key, .. } if key == "failing"
        ));
        assert!(error.to_string().contains("'failing'"));
    }

    #[test]
    fn should_use_custom_definition_registry() {
        let mut registry = MockComponentDefinitionRegistry::new();
        registry
            .expect_definition()
            .with(eq("configured"))
            .times(1)
            .return_const(Some(ComponentDefinition {
                key: ComponentKey::normalize("configured").unwrap(),
                source: ComponentSource::Instance(
                    ComponentInstancePtr::new(1) as ComponentInstanceAnyPtr
                ),
            }));

        let container = ContainerBuilder::new("test")
            .with_definition_registry(Box::new(registry) as ComponentDefinitionRegistryPtr)
            .build();

        assert!(container.resolve("configured").is_ok());
    }

    #[test]
    fn should_freeze_after_finalization() {
        let container = ContainerBuilder::new("test").build();
        container.finalize().unwrap();

        assert!(container.is_finalized());
        assert!(matches!(
            container
                .register_instance("late", ComponentInstancePtr::new(0))
                .unwrap_err(),
            ComponentDefinitionRegistryError::Frozen { .. }
        ));
        assert!(matches!(
            container
                .register_provider("late", Arc::new(RegisteringProvider))
                .unwrap_err(),
            ProviderError::Frozen { .. }
        ));
    }

    #[test]
    fn should_start_providers_in_order_once() {
        let mut seq = Sequence::new();

        let mut first = MockProvider::new();
        first
            .expect_prepare()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        first
            .expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut second = MockProvider::new();
        second
            .expect_prepare()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        second
            .expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let container = ContainerBuilder::new("test").build();
        container.register_provider("first", Arc::new(first)).unwrap();
        container
            .register_provider("second", Arc::new(second))
            .unwrap();

        container.finalize().unwrap();
        container.finalize().unwrap();

        assert_eq!(
            container.provider_state("second").unwrap(),
            ProviderState::Started
        );
    }

    #[test]
    fn should_stop_providers_in_reverse_order() {
        let mut seq = Sequence::new();

        let mut first = MockProvider::new();
        first.expect_prepare().returning(|_| Ok(()));
        first.expect_start().returning(|_| Ok(()));

        let mut second = MockProvider::new();
        second.expect_prepare().returning(|_| Ok(()));
        second.expect_start().returning(|_| Ok(()));
        second
            .expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        first
            .expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let container = ContainerBuilder::new("test").build();
        container.register_provider("first", Arc::new(first)).unwrap();
        container
            .register_provider("second", Arc::new(second))
            .unwrap();

        container.finalize().unwrap();
        container.shutdown().unwrap();

        assert_eq!(
            container.provider_state("first").unwrap(),
            ProviderState::Stopped
        );
        assert!(container.is_finalized());
    }

    #[test]
    fn should_report_provider_start_errors() {
        let mut provider = MockProvider::new();
        provider.expect_prepare().returning(|_| Ok(()));
        provider
            .expect_start()
            .returning(|_| Err(error_ptr(TestError)));

        let container = ContainerBuilder::new("test").build();
        container
            .register_provider("broken", Arc::new(provider))
            .unwrap();

        assert!(matches!(
            container.start_provider("broken").unwrap_err(),
            ProviderError::StartError { name, .. } if name == "broken"
        ));
        assert!(!container.is_finalized());
    }

    #[test]
    fn should_start_provider_on_demand() {
        let container = ContainerBuilder::new("test").build();
        container
            .register_provider("logger", Arc::new(RegisteringProvider))
            .unwrap();

        assert!(container.keys().is_empty());
        assert_eq!(*container.resolve_typed::<u8>("logger").unwrap(), 5);
        assert_eq!(
            container.provider_state("logger").unwrap(),
            ProviderState::Started
        );
    }

    #[test]
    fn should_import_lazily_before_finalization() {
        let source = ContainerBuilder::new("search").build();
        source
            .register_instance("index_entity", ComponentInstancePtr::new(1u32))
            .unwrap();

        let target = ContainerBuilder::new("admin").build();
        target
            .import(&source, ImportDirective::namespaced("search"))
            .unwrap();

        assert!(target.keys().is_empty());

        let imported = target.resolve("search.index_entity").unwrap();
        assert!(Arc::ptr_eq(
            &imported,
            &source.resolve("index_entity").unwrap()
        ));
        assert_eq!(
            target.keys(),
            vec![ComponentKey::normalize("search.index_entity").unwrap()]
        );
    }

    #[test]
    fn should_materialize_imports_on_finalization() {
        let source = ContainerBuilder::new("search").build();
        source
            .register_instance("index_entity", ComponentInstancePtr::new(1u32))
            .unwrap();
        source
            .register_instance("private", ComponentInstancePtr::new(2u32))
            .unwrap();

        let target = ContainerBuilder::new("admin").build();
        target
            .import(
                &source,
                ImportDirective::namespaced("search")
                    .with_filter(ImportFilter::except(["private"]).unwrap()),
            )
            .unwrap();
        target.finalize().unwrap();

        assert_eq!(
            target.keys(),
            vec![ComponentKey::normalize("search.index_entity").unwrap()]
        );
        assert!(!target.contains_key("search.private"));
    }

    #[test]
    fn should_not_reexport_imports() {
        let application = ContainerBuilder::new("application").build();
        application
            .register_instance("logger", ComponentInstancePtr::new(0u8))
            .unwrap();

        let search = ContainerBuilder::new("search").build();
        search
            .import(&application, ImportDirective::namespaced("application"))
            .unwrap();
        search
            .register_instance("index_entity", ComponentInstancePtr::new(1u8))
            .unwrap();

        let admin = ContainerBuilder::new("admin").build();
        admin
            .import(&search, ImportDirective::namespaced("search"))
            .unwrap();

        assert!(search.contains_key("application.logger"));
        assert!(!admin.contains_key("search.application.logger"));

        search.finalize().unwrap();
        admin.finalize().unwrap();

        assert!(admin.contains_key("search.index_entity"));
        assert!(!admin.contains_key("search.application.logger"));
    }

    #[test]
    fn should_import_from_providers_of_source() {
        let application = ContainerBuilder::new("application").build();
        application
            .register_provider("logger", Arc::new(RegisteringProvider))
            .unwrap();

        let slice = ContainerBuilder::new("main").build();
        slice
            .import(&application, ImportDirective::namespaced("application"))
            .unwrap();

        assert!(slice.contains_key("application.logger"));
        assert_eq!(
            application.provider_state("logger").unwrap(),
            ProviderState::Started
        );
    }

    #[test]
    fn should_fail_on_dropped_import_source() {
        let target = ContainerBuilder::new("admin").build();
        {
            let source = ContainerBuilder::new("search").build();
            target
                .import(&source, ImportDirective::namespaced("search"))
                .unwrap();
        }

        assert!(matches!(
            target.resolve("search.anything").unwrap_err(),
            ComponentInstanceProviderError::SourceContainerDropped(_)
        ));
    }

    #[test]
    fn should_resolve_concurrently_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let container = ContainerBuilder::new("test").build();

        let counter = created.clone();
        container
            .register_factory("shared", SINGLETON, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();
        container.finalize().unwrap();

        let handles = (0..8)
            .map(|_| {
                let container = container.clone();
                std::thread::spawn(move || container.resolve("shared").unwrap())
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_start_provider_once_under_contention() {
        let starts = Arc::new(AtomicUsize::new(0));
        let container = ContainerBuilder::new("test").build();
        container
            .register_provider(
                "db",
                Arc::new(SlowProvider {
                    starts: starts.clone(),
                }),
            )
            .unwrap();

        let barrier = Arc::new(Barrier::new(4));
        let handles = (0..4)
            .map(|_| {
                let container = container.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    container.resolve_typed::<u8>("db.connection")
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert_eq!(*handle.join().unwrap().unwrap(), 1);
        }

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(
            container.provider_state("db").unwrap(),
            ProviderState::Started
        );
    }

    #[test]
    fn should_not_restart_provider_resolving_own_keys() {
        let container = ContainerBuilder::new("test").build();
        container
            .register_provider("db", Arc::new(SelfResolvingProvider))
            .unwrap();

        let error = container.resolve("db.connection").unwrap_err();
        assert!(matches!(
            error,
            ComponentInstanceProviderError::ProviderError(ProviderError::StartError { name, .. })
                if name == "db"
        ));
        assert_eq!(
            container.provider_state("db").unwrap(),
            ProviderState::Prepared
        );
        assert!(container.keys().is_empty());
    }

    #[test]
    fn should_detect_dependency_cycles_across_containers() {
        let first = ContainerBuilder::new("first").build();
        let second = ContainerBuilder::new("second").build();
        first
            .import(&second, ImportDirective::namespaced("second"))
            .unwrap();
        second
            .import(&first, ImportDirective::namespaced("first"))
            .unwrap();

        first
            .register_factory("x", SINGLETON, |instance_provider| {
                instance_provider.instance_by_key("second.y")
            })
            .unwrap();
        second
            .register_factory("y", SINGLETON, |instance_provider| {
                instance_provider.instance_by_key("first.x")
            })
            .unwrap();

        assert!(matches!(
            first.resolve("x").unwrap_err(),
            ComponentInstanceProviderError::DependencyCycle(key) if key == "x"
        ));
        assert!(matches!(
            second.resolve("y").unwrap_err(),
            ComponentInstanceProviderError::DependencyCycle(key) if key == "y"
        ));
    }
}
