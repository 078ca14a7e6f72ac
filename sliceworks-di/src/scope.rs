//! Component instances created by constructors are contained in [Scope]s - containers which
//! decide when to reuse or create an instance. There's a built-in one for singletons, which
//! memoizes instances for the lifetime of the container, and one for prototypes, which creates a
//! new instance on every request. Instances registered directly in a container are always shared
//! and do not go through scopes.
//!
//! Note: scope resolution happens at component instantiation time, which can lead to unexpected
//! consequences if incompatible scopes are mixed together, e.g. a [singleton](SINGLETON) component
//! can depend on a [prototype](PROTOTYPE) one. In such case when creating the singleton, a new
//! instance of the dependency will be created, since it's a prototype, but then that single
//! instance will live as long as the singleton lives.

use crate::component::ComponentKey;
use crate::instance_provider::{ComponentInstanceAnyPtr, ComponentInstanceProviderError};
use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, PoisonError};

pub type ScopePtr = Box<dyn Scope + Send + Sync>;

/// Function creating a new instance, passed to a [Scope] which decides whether to call it.
pub type InstanceCreator<'a> =
    &'a mut dyn FnMut() -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>;

/// Name of the [SingletonScope].
pub const SINGLETON: &str = "SINGLETON";

/// Name of the [PrototypeScope].
pub const PROTOTYPE: &str = "PROTOTYPE";

/// A scope containing component instances. See module documentation for information on scopes.
pub trait Scope {
    /// Returns an instance for the given key, either a stored one or one created with `create`.
    /// Implementations shared between threads must ensure a stored instance is created at most
    /// once.
    fn instance(
        &self,
        key: &ComponentKey,
        create: InstanceCreator,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>;
}

/// Scope for instances shared between components. Stateless components are good candidates to be
/// stored in the singleton scope.
#[derive(Default)]
pub struct SingletonScope {
    instances: Mutex<FxHashMap<ComponentKey, Arc<OnceCell<ComponentInstanceAnyPtr>>>>,
}

impl Scope for SingletonScope {
    fn instance(
        &self,
        key: &ComponentKey,
        create: InstanceCreator,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        // the map lock only guards cell lookup, so constructors can resolve other singletons
        let cell = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();

        cell.get_or_try_init(create).cloned()
    }
}

/// A scope which creates a new instance of a given component on each request. Stateful components
/// usually should be stored in a prototype scope.
#[derive(Default, Copy, Clone, Eq, PartialEq)]
pub struct PrototypeScope;

impl Scope for PrototypeScope {
    #[inline]
    fn instance(
        &self,
        _key: &ComponentKey,
        create: InstanceCreator,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        create()
    }
}

/// Factory for custom [Scope]s.
#[cfg_attr(test, automock)]
pub trait ScopeFactory {
    fn create_scope(&self) -> ScopePtr;
}

#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct SingletonScopeFactory;

impl ScopeFactory for SingletonScopeFactory {
    fn create_scope(&self) -> ScopePtr {
        Box::<SingletonScope>::default()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct PrototypeScopeFactory;

impl ScopeFactory for PrototypeScopeFactory {
    fn create_scope(&self) -> ScopePtr {
        Box::<PrototypeScope>::default()
    }
}

#[cfg(test)]
mod tests {
    use crate::component::ComponentKey;
    use crate::instance_provider::{
        ComponentInstanceAnyPtr, ComponentInstanceProviderError, ComponentInstancePtr,
    };
    use crate::scope::{PrototypeScopeFactory, ScopeFactory, SingletonScopeFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn key() -> ComponentKey {
        ComponentKey::normalize("test").unwrap()
    }

    #[test]
    fn should_support_singletons() {
        let scope = SingletonScopeFactory.create_scope();
        let mut created = 0;

        let first = scope
            .instance(&key(), &mut || {
                created += 1;
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();
        let second = scope
            .instance(&key(), &mut || {
                created += 1;
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();

        assert_eq!(created, 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_support_prototypes() {
        let scope = PrototypeScopeFactory.create_scope();

        let first = scope
            .instance(&key(), &mut || {
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();
        let second = scope
            .instance(&key(), &mut || {
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_not_store_failed_singletons() {
        let scope = SingletonScopeFactory.create_scope();

        assert!(scope
            .instance(&key(), &mut || {
                Err(ComponentInstanceProviderError::MissingComponent(
                    "dep".to_string(),
                ))
            })
            .is_err());
        assert!(scope
            .instance(&key(), &mut || {
                Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
            })
            .is_ok());
    }

    #[test]
    fn should_create_singleton_once_under_contention() {
        let scope = Arc::new(SingletonScopeFactory.create_scope());
        let created = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles = (0..8)
            .map(|_| {
                let scope = scope.clone();
                let created = created.clone();
                let barrier = barrier.clone();

                thread::spawn(move || {
                    barrier.wait();
                    scope
                        .instance(&key(), &mut || {
                            created.fetch_add(1, Ordering::SeqCst);
                            Ok(ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr)
                        })
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();

        let instances = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(instances
            .windows(2)
            .all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }
}
