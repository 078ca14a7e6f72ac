//! Providers manage components which need explicit lifecycle handling, e.g. database connections
//! or loggers. A provider is registered in a [Container](crate::container::Container) under a name
//! and goes through the following states:
//!
//! `Registered` → `Prepared` → `Starting` → `Started` → `Stopped`
//!
//! Providers are usually started when the container gets finalized, but can also be started
//! on demand - resolving a missing key whose first segment is the name of an unstarted provider
//! starts that provider in a non-finalized container. Preparing or starting a provider more than
//! once is a no-op.
//!
//! Lifecycle hooks of a single provider never run concurrently. A thread wanting to start a
//! provider which is being started elsewhere waits for it to finish. Keys of a provider resolved
//! from within its own `start` are not looked up in the provider again.

use crate::container::Container;
use crate::error::ProviderError;
use crate::instance_provider::ErrorPtr;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::thread::ThreadId;

pub type ProviderPtr = Arc<dyn Provider + Send + Sync>;

/// Lifecycle hooks of a provider. Each hook receives the container owning the provider.
#[cfg_attr(test, automock)]
pub trait Provider {
    /// Prepares the provider, e.g. loads required configuration without starting anything.
    fn prepare(&self, _container: &Container) -> Result<(), ErrorPtr> {
        Ok(())
    }

    /// Starts the provider. Components are usually registered in the container here.
    fn start(&self, container: &Container) -> Result<(), ErrorPtr>;

    /// Stops the provider on container shutdown.
    fn stop(&self, _container: &Container) -> Result<(), ErrorPtr> {
        Ok(())
    }
}

/// Lifecycle state of a registered provider.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ProviderState {
    Registered,
    Prepared,
    /// The `start` hook is running.
    Starting,
    Started,
    Stopped,
}

pub(crate) struct ProviderEntry {
    pub(crate) name: String,
    pub(crate) provider: ProviderPtr,
    pub(crate) state: ProviderState,
    /// Thread running one of the lifecycle hooks.
    pub(crate) owner: Option<ThreadId>,
}

/// Providers in registration order.
#[derive(Default)]
pub(crate) struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
}

impl ProviderRegistry {
    pub(crate) fn register(
        &mut self,
        name: &str,
        provider: ProviderPtr,
    ) -> Result<(), ProviderError> {
        if self.entries.iter().any(|entry| entry.name == name) {
            return Err(ProviderError::DuplicateProvider(name.to_string()));
        }

        self.entries.push(ProviderEntry {
            name: name.to_string(),
            provider,
            state: ProviderState::Registered,
            owner: None,
        });

        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Result<(ProviderPtr, ProviderState), ProviderError> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| (entry.provider.clone(), entry.state))
            .ok_or_else(|| ProviderError::MissingProvider(name.to_string()))
    }

    pub(crate) fn owner(&self, name: &str) -> Option<ThreadId> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.owner)
    }

    /// Marks given provider as being handled by `owner`, until [released](Self::release).
    pub(crate) fn claim(&mut self, name: &str, owner: ThreadId, state: ProviderState) {
        if let Some(entry) = self.entry_mut(name) {
            entry.owner = Some(owner);
            entry.state = state;
        }
    }

    pub(crate) fn release(&mut self, name: &str, state: ProviderState) {
        if let Some(entry) = self.entry_mut(name) {
            entry.owner = None;
            entry.state = state;
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.name.clone()).collect()
    }

    pub(crate) fn names_in_state(&self, state: ProviderState) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.state == state)
            .map(|entry| entry.name.clone())
            .collect()
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut ProviderEntry> {
        self.entries.iter_mut().find(|entry| entry.name == name)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ProviderError;
    use crate::provider::{MockProvider, ProviderPtr, ProviderRegistry, ProviderState};
    use std::sync::Arc;
    use std::thread;

    impl std::fmt::Debug for dyn crate::provider::Provider + Send + Sync {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("Provider")
        }
    }

    fn provider() -> ProviderPtr {
        Arc::new(MockProvider::new())
    }

    #[test]
    fn should_keep_registration_order() {
        let mut registry = ProviderRegistry::default();
        registry.register("b", provider()).unwrap();
        registry.register("a", provider()).unwrap();

        assert_eq!(registry.names(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn should_reject_duplicate_providers() {
        let mut registry = ProviderRegistry::default();
        registry.register("db", provider()).unwrap();

        assert!(matches!(
            registry.register("db", provider()).unwrap_err(),
            ProviderError::DuplicateProvider(name) if name == "db"
        ));
    }

    #[test]
    fn should_track_states() {
        let mut registry = ProviderRegistry::default();
        registry.register("db", provider()).unwrap();
        registry.register("logger", provider()).unwrap();
        registry.claim("logger", thread::current().id(), ProviderState::Starting);

        assert_eq!(registry.owner("logger"), Some(thread::current().id()));
        assert_eq!(registry.get("logger").unwrap().1, ProviderState::Starting);

        registry.release("logger", ProviderState::Started);

        assert!(registry.owner("logger").is_none());
        assert_eq!(registry.get("db").unwrap().1, ProviderState::Registered);
        assert_eq!(
            registry.names_in_state(ProviderState::Started),
            vec!["logger".to_string()]
        );
        assert!(matches!(
            registry.get("cache").unwrap_err(),
            ProviderError::MissingProvider(_)
        ));
    }
}
