//! Catalog of known component and provider constructors.
//!
//! Slices discover components by walking their component directories - a file
//! `slices/search/lib/index_entity.rs` stands for the constant `Search::IndexEntity`, registered
//! under the key `index_entity`. The catalog maps such constant names to constructors, so
//! discovery never needs to turn a string into a type at runtime. Providers are looked up the same
//! way, by `<slice>.<provider>` names derived from provider files.
//!
//! Constructors can be added explicitly with a [ComponentCatalogBuilder], or statically from
//! anywhere in the program with [submit_component](crate::submit_component) and
//! [submit_provider](crate::submit_provider):
//!
//! ```no_run
//! use sliceworks::{submit_component, submit_provider};
//! use sliceworks::catalog::ComponentCatalog;
//! use sliceworks_di::component::Component;
//! use sliceworks_di::container::Container;
//! use sliceworks_di::instance_provider::{
//!     ComponentInstanceProvider, ComponentInstanceProviderError, ErrorPtr,
//! };
//! use sliceworks_di::provider::Provider;
//!
//! struct IndexEntity;
//!
//! impl Component for IndexEntity {
//!     fn create(
//!         _instance_provider: &mut dyn ComponentInstanceProvider,
//!     ) -> Result<Self, ComponentInstanceProviderError> {
//!         Ok(Self)
//!     }
//! }
//!
//! #[derive(Default)]
//! struct ClientProvider;
//!
//! impl Provider for ClientProvider {
//!     fn start(&self, _container: &Container) -> Result<(), ErrorPtr> {
//!         Ok(())
//!     }
//! }
//!
//! submit_component!("Search::IndexEntity", IndexEntity);
//! submit_provider!("search.client", ClientProvider);
//!
//! let catalog = ComponentCatalog::from_inventory();
//! assert!(catalog.component("Search::IndexEntity").is_some());
//! assert!(catalog.provider("search.client").is_some());
//! ```

use fxhash::FxHashMap;
use sliceworks_di::component::Component;
use sliceworks_di::component_registry::Constructor;
use sliceworks_di::instance_provider::{
    ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstanceProviderError,
    ComponentInstancePtr,
};
use sliceworks_di::provider::{Provider, ProviderPtr};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Creates a new provider instance.
pub type ProviderFactory = Arc<dyn Fn() -> ProviderPtr + Send + Sync>;

/// Maps constant names to component constructors and provider names to provider factories.
#[derive(Clone, Default)]
pub struct ComponentCatalog {
    components: FxHashMap<String, Constructor>,
    providers: FxHashMap<String, ProviderFactory>,
}

impl Debug for ComponentCatalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCatalog")
            .field("components", &self.components.keys())
            .field("providers", &self.providers.keys())
            .finish()
    }
}

impl ComponentCatalog {
    /// Creates a catalog containing all statically submitted components and providers.
    pub fn from_inventory() -> Self {
        ComponentCatalogBuilder::new().with_inventory().build()
    }

    /// Returns a constructor for given constant, e.g. `Search::IndexEntity`.
    pub fn component(&self, constant: &str) -> Option<Constructor> {
        self.components.get(constant).cloned()
    }

    /// Returns a factory for given provider name, e.g. `search.client`.
    pub fn provider(&self, name: &str) -> Option<ProviderFactory> {
        self.providers.get(name).cloned()
    }

    pub fn constants(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}

/// Builder for [ComponentCatalog]. Entries added later override earlier ones with the same name.
#[derive(Default)]
pub struct ComponentCatalogBuilder {
    catalog: ComponentCatalog,
}

impl ComponentCatalogBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds all statically submitted components and providers.
    pub fn with_inventory(mut self) -> Self {
        for registerer in inventory::iter::<internal::ComponentRegisterer> {
            self.catalog.components.insert(
                registerer.constant.to_string(),
                Arc::new(registerer.constructor) as Constructor,
            );
        }

        for registerer in inventory::iter::<internal::ProviderRegisterer> {
            let factory = registerer.factory;
            self.catalog
                .providers
                .insert(registerer.name.to_string(), Arc::new(factory) as ProviderFactory);
        }

        self
    }

    /// Adds a [Component] under given constant name.
    pub fn with_component<T: Component>(self, constant: &str) -> Self {
        self.with_constructor(constant, Arc::new(component_constructor::<T>))
    }

    pub fn with_constructor(mut self, constant: &str, constructor: Constructor) -> Self {
        self.catalog
            .components
            .insert(constant.to_string(), constructor);
        self
    }

    pub fn with_provider<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> ProviderPtr + Send + Sync + 'static,
    {
        self.catalog
            .providers
            .insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn build(self) -> ComponentCatalog {
        self.catalog
    }
}

#[doc(hidden)]
pub fn component_constructor<T: Component>(
    instance_provider: &mut dyn ComponentInstanceProvider,
) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
    T::create(instance_provider)
        .map(|instance| ComponentInstancePtr::new(instance) as ComponentInstanceAnyPtr)
}

#[doc(hidden)]
pub fn provider_factory<T: Provider + Default + Send + Sync + 'static>() -> ProviderPtr {
    Arc::new(T::default()) as ProviderPtr
}

/// Statically registers a [Component] under a constant name.
#[macro_export]
macro_rules! submit_component {
    ($constant:expr, $component:ty) => {
        $crate::catalog::internal::submit! {
            $crate::catalog::internal::ComponentRegisterer {
                constant: $constant,
                constructor: $crate::catalog::component_constructor::<$component>,
            }
        }
    };
}

/// Statically registers a [Provider] type, which must implement [Default], under a
/// `<slice>.<provider>` name.
#[macro_export]
macro_rules! submit_provider {
    ($name:expr, $provider:ty) => {
        $crate::catalog::internal::submit! {
            $crate::catalog::internal::ProviderRegisterer {
                name: $name,
                factory: $crate::catalog::provider_factory::<$provider>,
            }
        }
    };
}

#[doc(hidden)]
pub mod internal {
    use inventory::collect;
    pub use inventory::submit;
    use sliceworks_di::instance_provider::{
        ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstanceProviderError,
    };
    use sliceworks_di::provider::ProviderPtr;

    pub struct ComponentRegisterer {
        pub constant: &'static str,
        pub constructor: fn(
            &mut dyn ComponentInstanceProvider,
        ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>,
    }

    pub struct ProviderRegisterer {
        pub name: &'static str,
        pub factory: fn() -> ProviderPtr,
    }

    collect!(ComponentRegisterer);
    collect!(ProviderRegisterer);
}

#[cfg(test)]
mod tests {
    use crate::catalog::ComponentCatalogBuilder;
    use sliceworks_di::component::Component;
    use sliceworks_di::instance_provider::{
        ComponentInstanceProvider, ComponentInstanceProviderError,
    };
    use sliceworks_di::container::Container;
    use sliceworks_di::instance_provider::ErrorPtr;
    use sliceworks_di::provider::{Provider, ProviderPtr};
    use std::sync::Arc;

    struct TestProvider;

    impl Provider for TestProvider {
        fn start(&self, _container: &Container) -> Result<(), ErrorPtr> {
            Ok(())
        }
    }

    struct TestComponent;

    impl Component for TestComponent {
        fn create(
            _instance_provider: &mut dyn ComponentInstanceProvider,
        ) -> Result<Self, ComponentInstanceProviderError> {
            Ok(Self)
        }
    }

    #[test]
    fn should_register_explicit_entries() {
        let catalog = ComponentCatalogBuilder::new()
            .with_component::<TestComponent>("Search::IndexEntity")
            .with_provider("search.client", || Arc::new(TestProvider) as ProviderPtr)
            .build();

        assert!(catalog.component("Search::IndexEntity").is_some());
        assert!(catalog.component("Search::Missing").is_none());
        assert!(catalog.provider("search.client").is_some());
        assert_eq!(
            catalog.constants().collect::<Vec<_>>(),
            vec!["Search::IndexEntity"]
        );
    }
}
