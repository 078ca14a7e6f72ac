use crate::instance_provider::{error_ptr, ErrorPtr};
use thiserror::Error;

/// Errors related to resolving component instances.
#[derive(Error, Clone, Debug)]
pub enum ComponentInstanceProviderError {
    #[error("Cannot find component with key: {0}")]
    MissingComponent(String),
    #[error("Component '{key}' cannot be cast to the requested type: {type_name}")]
    IncompatibleComponent { key: String, type_name: &'static str },
    #[error("Detected dependency cycle while resolving: {0}")]
    DependencyCycle(String),
    #[error("Unrecognized scope: {0}")]
    UnrecognizedScope(String),
    #[error("Error constructing component '{key}': {source}")]
    ConstructorError {
        key: String,
        #[source]
        source: ErrorPtr,
    },
    #[error("Container providing imported component '{0}' no longer exists")]
    SourceContainerDropped(String),
    #[error(transparent)]
    ProviderError(#[from] ProviderError),
    #[error(transparent)]
    DefinitionRegistryError(#[from] ComponentDefinitionRegistryError),
}

impl ComponentInstanceProviderError {
    /// Wraps an error raised inside a constructor. The key is filled in by the container
    /// resolving the failing component.
    pub fn constructor<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::ConstructorError {
            key: String::new(),
            source: error_ptr(error),
        }
    }

    /// Checks if the error signals a missing component, as opposed to a failure while creating
    /// an existing one.
    #[inline]
    pub fn is_missing_component(&self) -> bool {
        matches!(self, Self::MissingComponent(_))
    }
}

/// Error related to component registries.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ComponentDefinitionRegistryError {
    #[error("Attempted to register a duplicated component with key: {0}")]
    DuplicateComponentKey(String),
    #[error("Invalid component key: '{0}'")]
    InvalidKey(String),
    #[error("Cannot register '{key}' in frozen container: {container}")]
    Frozen { container: String, key: String },
}

/// Errors related to provider lifecycle.
#[derive(Error, Clone, Debug)]
pub enum ProviderError {
    #[error("Cannot find provider: {0}")]
    MissingProvider(String),
    #[error("Attempted to register a duplicated provider: {0}")]
    DuplicateProvider(String),
    #[error("Cannot register provider '{name}' in frozen container: {container}")]
    Frozen { container: String, name: String },
    #[error("Error preparing provider '{name}': {source}")]
    PrepareError {
        name: String,
        #[source]
        source: ErrorPtr,
    },
    #[error("Error starting provider '{name}': {source}")]
    StartError {
        name: String,
        #[source]
        source: ErrorPtr,
    },
    #[error("Error stopping provider '{name}': {source}")]
    StopError {
        name: String,
        #[source]
        source: ErrorPtr,
    },
}

/// Errors related to container lifecycle - importing, finalizing and shutting down.
#[derive(Error, Clone, Debug)]
pub enum ContainerError {
    #[error(transparent)]
    ProviderError(#[from] ProviderError),
    #[error(transparent)]
    DefinitionRegistryError(#[from] ComponentDefinitionRegistryError),
    #[error("Container '{0}' used as import source no longer exists")]
    SourceContainerDropped(String),
}
