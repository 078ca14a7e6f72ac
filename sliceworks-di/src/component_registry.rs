//! Functionality related to registering definitions of components. A
//! [Container](crate::container::Container) creates or looks up instances based on those
//! definitions, which can be registered manually, discovered from the file system or imported from
//! other containers.

pub mod import;

use crate::component::ComponentKey;
use crate::container::Container;
use crate::error::{ComponentDefinitionRegistryError, ComponentInstanceProviderError};
use crate::instance_provider::{ComponentInstanceAnyPtr, ComponentInstanceProvider};
use derivative::Derivative;
use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use std::sync::{Arc, Weak};

/// Constructor for type-erased instances. Dependencies can be requested from the given
/// [ComponentInstanceProvider].
pub type Constructor = Arc<
    dyn Fn(
            &mut dyn ComponentInstanceProvider,
        ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>
        + Send
        + Sync,
>;

/// Where the instance for a [ComponentDefinition] comes from.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub enum ComponentSource {
    /// A ready instance, shared by everyone resolving the key.
    Instance(#[derivative(Debug = "ignore")] ComponentInstanceAnyPtr),
    /// Constructor called lazily, with instance reuse decided by the named
    /// [Scope](crate::scope::Scope).
    Constructor {
        scope_name: String,
        #[derivative(Debug = "ignore")]
        constructor: Constructor,
    },
    /// A component imported from another container. Resolution is delegated to the source
    /// container, so both containers return the same instance.
    Imported {
        #[derivative(Debug = "ignore")]
        container: Weak<Container>,
        source_container: String,
        key: ComponentKey,
    },
}

/// Definition for a component registered in a definition registry.
#[derive(Clone, Debug)]
pub struct ComponentDefinition {
    pub key: ComponentKey,
    pub source: ComponentSource,
}

impl ComponentDefinition {
    /// Imported definitions are never exported again.
    #[inline]
    pub fn is_imported(&self) -> bool {
        matches!(self.source, ComponentSource::Imported { .. })
    }
}

/// A registry of component definitions.
#[cfg_attr(test, automock)]
pub trait ComponentDefinitionRegistry {
    /// Adds a new definition. Note: handling of duplicate keys is registry-dependent.
    fn register_definition(
        &mut self,
        definition: ComponentDefinition,
    ) -> Result<(), ComponentDefinitionRegistryError>;

    /// Returns a definition with given key.
    fn definition(&self, key: &str) -> Option<ComponentDefinition>;

    /// Checks if there's a definition with given key.
    fn is_registered(&self, key: &str) -> bool;

    /// Returns all registered keys in registration order.
    fn keys(&self) -> Vec<ComponentKey>;

    /// Returns keys of definitions which are not imported from other containers.
    fn exported_keys(&self) -> Vec<ComponentKey>;
}

/// Registry keeping definitions in registration order.
#[derive(Clone, Debug, Default)]
pub struct OrderedComponentDefinitionRegistry {
    definitions: FxHashMap<ComponentKey, ComponentDefinition>,
    order: Vec<ComponentKey>,
    allow_definition_overriding: bool,
}

impl OrderedComponentDefinitionRegistry {
    pub fn new(allow_definition_overriding: bool) -> Self {
        Self {
            allow_definition_overriding,
            ..Default::default()
        }
    }
}

impl ComponentDefinitionRegistry for OrderedComponentDefinitionRegistry {
    fn register_definition(
        &mut self,
        definition: ComponentDefinition,
    ) -> Result<(), ComponentDefinitionRegistryError> {
        if let Some(existing) = self.definitions.get_mut(&definition.key) {
            if !self.allow_definition_overriding {
                return Err(ComponentDefinitionRegistryError::DuplicateComponentKey(
                    definition.key.to_string(),
                ));
            }

            *existing = definition;
            return Ok(());
        }

        self.order.push(definition.key.clone());
        self.definitions.insert(definition.key.clone(), definition);

        Ok(())
    }

    #[inline]
    fn definition(&self, key: &str) -> Option<ComponentDefinition> {
        self.definitions.get(key).cloned()
    }

    #[inline]
    fn is_registered(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    #[inline]
    fn keys(&self) -> Vec<ComponentKey> {
        self.order.clone()
    }

    fn exported_keys(&self) -> Vec<ComponentKey> {
        self.order
            .iter()
            .filter(|key| {
                self.definitions
                    .get(*key)
                    .map(|definition| !definition.is_imported())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
