pub use crate::error::ComponentInstanceProviderError;
use std::any::{type_name, Any};
use std::error::Error;
use std::sync::Arc;

pub type ComponentInstancePtr<T> = Arc<T>;

pub type ComponentInstanceAnyPtr = ComponentInstancePtr<dyn Any + Send + Sync + 'static>;

/// Shared error pointer used by user-provided code, such as constructors and provider hooks.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Wraps any error in an [ErrorPtr].
#[inline]
pub fn error_ptr<E: Error + Send + Sync + 'static>(error: E) -> ErrorPtr {
    Arc::new(error) as ErrorPtr
}

/// Generic provider for component instances, identified by their keys.
pub trait ComponentInstanceProvider {
    /// Tries to return an instance registered under the given key.
    fn instance_by_key(
        &mut self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>;
}

/// Helper trait for [ComponentInstanceProvider] providing strongly-typed access.
pub trait TypedComponentInstanceProvider {
    /// Typesafe version of [ComponentInstanceProvider::instance_by_key].
    fn instance_typed<T: Send + Sync + 'static>(
        &mut self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError>;

    /// Tries to get an instance like [TypedComponentInstanceProvider::instance_typed] does,
    /// but returns `None` on missing instance.
    fn instance_option<T: Send + Sync + 'static>(
        &mut self,
        key: &str,
    ) -> Result<Option<ComponentInstancePtr<T>>, ComponentInstanceProviderError>;
}

impl<CIP: ComponentInstanceProvider + ?Sized> TypedComponentInstanceProvider for CIP {
    fn instance_typed<T: Send + Sync + 'static>(
        &mut self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError> {
        self.instance_by_key(key)
            .and_then(|instance| downcast_instance(key, instance))
    }

    fn instance_option<T: Send + Sync + 'static>(
        &mut self,
        key: &str,
    ) -> Result<Option<ComponentInstancePtr<T>>, ComponentInstanceProviderError> {
        match self.instance_typed(key) {
            Ok(instance) => Ok(Some(instance)),
            Err(ComponentInstanceProviderError::MissingComponent(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Casts a type-erased instance to a concrete type.
pub fn downcast_instance<T: Send + Sync + 'static>(
    key: &str,
    instance: ComponentInstanceAnyPtr,
) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError> {
    instance
        .downcast::<T>()
        .map_err(|_| ComponentInstanceProviderError::IncompatibleComponent {
            key: key.to_string(),
            type_name: type_name::<T>(),
        })
}
