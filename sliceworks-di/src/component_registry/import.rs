//! Import directives describing which components of one container are visible in another.
//!
//! Only components defined in the source container are importable - components the source itself
//! imported are never re-exported. This keeps the export surface of every container equal to what
//! it defines, regardless of what it depends on.

use crate::component::ComponentKey;
use crate::error::ComponentDefinitionRegistryError;
use fxhash::FxHashSet;

/// Selects source keys taking part in an import.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ImportFilter {
    /// Import every exported key.
    #[default]
    All,
    /// Import only the given keys.
    Only(FxHashSet<ComponentKey>),
    /// Import every exported key apart from the given ones.
    Except(FxHashSet<ComponentKey>),
}

impl ImportFilter {
    pub fn only<I: IntoIterator<Item = S>, S: AsRef<str>>(
        keys: I,
    ) -> Result<Self, ComponentDefinitionRegistryError> {
        Self::collect_keys(keys).map(Self::Only)
    }

    pub fn except<I: IntoIterator<Item = S>, S: AsRef<str>>(
        keys: I,
    ) -> Result<Self, ComponentDefinitionRegistryError> {
        Self::collect_keys(keys).map(Self::Except)
    }

    /// Checks if the given source key passes the filter.
    pub fn allows(&self, key: &ComponentKey) -> bool {
        match self {
            ImportFilter::All => true,
            ImportFilter::Only(keys) => keys.contains(key),
            ImportFilter::Except(keys) => !keys.contains(key),
        }
    }

    fn collect_keys<I: IntoIterator<Item = S>, S: AsRef<str>>(
        keys: I,
    ) -> Result<FxHashSet<ComponentKey>, ComponentDefinitionRegistryError> {
        keys.into_iter()
            .map(|key| ComponentKey::normalize(key.as_ref()))
            .collect()
    }
}

/// Describes how components of a source container are exposed in the importing one.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImportDirective {
    /// Namespace prefixed to imported keys; `None` exposes the keys unprefixed.
    pub namespace: Option<String>,
    pub filter: ImportFilter,
}

impl ImportDirective {
    /// Imports all keys under `namespace.<key>`.
    pub fn namespaced<T: ToString>(namespace: T) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            filter: ImportFilter::All,
        }
    }

    /// Imports all keys as they are named in the source container.
    pub fn unprefixed() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: ImportFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Maps a source key to the key visible in the importing container.
    pub fn local_key(
        &self,
        source_key: &ComponentKey,
    ) -> Result<ComponentKey, ComponentDefinitionRegistryError> {
        ComponentKey::namespaced(self.namespace.as_deref().unwrap_or_default(), source_key)
    }

    /// Maps a key requested in the importing container to a source key, if the key could come
    /// from this import.
    pub fn source_key(&self, local_key: &ComponentKey) -> Option<ComponentKey> {
        local_key
            .strip_namespace(self.namespace.as_deref().unwrap_or_default())
            .filter(|key| self.filter.allows(key))
    }
}
