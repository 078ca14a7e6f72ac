//! Components are values stored in a [Container](crate::container::Container) under a
//! [ComponentKey]. A component can be registered as a ready instance, as a constructor function
//! or as a type implementing [Component], which knows how to build itself from other components.
//!
//! ## Keys
//!
//! Keys are dotted paths, e.g. `"repositories.user_repository"`. They are case-normalized, so
//! `"Repositories.User_Repository"` refers to the same component. Empty segments are not allowed.
//!
//! ```
//! use sliceworks_di::component::ComponentKey;
//!
//! let key = ComponentKey::normalize(" Search.Index_Entity ").unwrap();
//! assert_eq!(key.as_str(), "search.index_entity");
//! assert_eq!(key.namespace(), Some("search"));
//! ```
//!
//! ## Registering concrete components
//!
//! ```
//! use sliceworks_di::component::Component;
//! use sliceworks_di::container::ContainerBuilder;
//! use sliceworks_di::instance_provider::{
//!     ComponentInstanceProvider, ComponentInstanceProviderError, ComponentInstancePtr,
//!     TypedComponentInstanceProvider,
//! };
//!
//! struct Repository;
//!
//! struct Service {
//!     repository: ComponentInstancePtr<Repository>,
//! }
//!
//! impl Component for Service {
//!     fn create(
//!         instance_provider: &mut dyn ComponentInstanceProvider,
//!     ) -> Result<Self, ComponentInstanceProviderError> {
//!         Ok(Self {
//!             repository: instance_provider.instance_typed("repository")?,
//!         })
//!     }
//! }
//!
//! let container = ContainerBuilder::new("app").build();
//! container
//!     .register_instance("repository", ComponentInstancePtr::new(Repository))
//!     .unwrap();
//! container.register_component::<Service>("service").unwrap();
//!
//! let service = container.resolve_typed::<Service>("service").unwrap();
//! ```

use crate::error::ComponentDefinitionRegistryError;
use crate::instance_provider::{ComponentInstanceProvider, ComponentInstanceProviderError};
use std::borrow::Borrow;
use std::fmt::{Display, Formatter};

/// Separator between key segments.
pub const KEY_SEPARATOR: char = '.';

/// Normalized key of a component.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct ComponentKey(String);

impl ComponentKey {
    /// Normalizes and validates a raw key.
    pub fn normalize(raw: &str) -> Result<Self, ComponentDefinitionRegistryError> {
        let key = raw.trim().to_lowercase();
        if key.is_empty()
            || key
                .split(KEY_SEPARATOR)
                .any(|segment| segment.trim().is_empty())
        {
            return Err(ComponentDefinitionRegistryError::InvalidKey(raw.to_string()));
        }

        Ok(Self(key))
    }

    /// Prefixes a key with a namespace. An empty namespace leaves the key untouched.
    pub fn namespaced(
        namespace: &str,
        key: &ComponentKey,
    ) -> Result<Self, ComponentDefinitionRegistryError> {
        if namespace.is_empty() {
            return Ok(key.clone());
        }

        Self::normalize(&format!("{namespace}{KEY_SEPARATOR}{}", key.0))
    }

    /// Returns the key without the given namespace prefix, if the key lives in that namespace.
    pub fn strip_namespace(&self, namespace: &str) -> Option<ComponentKey> {
        if namespace.is_empty() {
            return Some(self.clone());
        }

        self.0
            .strip_prefix(namespace)
            .and_then(|rest| rest.strip_prefix(KEY_SEPARATOR))
            .filter(|rest| !rest.is_empty())
            .map(|rest| Self(rest.to_string()))
    }

    /// First segment of the key, if the key has more than one.
    pub fn namespace(&self) -> Option<&str> {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(namespace, _)| namespace)
    }

    /// First segment of the key, or the whole key if it has only one.
    pub fn root(&self) -> &str {
        self.namespace().unwrap_or(&self.0)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ComponentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ComponentKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ComponentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Base trait for components which can construct themselves from other components.
///
/// Please see the module-level documentation for more information.
pub trait Component: Send + Sync + Sized + 'static {
    /// Creates an instance of this component using dependencies from given
    /// [ComponentInstanceProvider].
    fn create(
        instance_provider: &mut dyn ComponentInstanceProvider,
    ) -> Result<Self, ComponentInstanceProviderError>;
}
