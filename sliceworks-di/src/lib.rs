//! Keyed component container with lazy resolution, lifecycle-managed providers and imports between
//! containers.
//!
//! Every part of a sliced application (the application itself and each of its slices) owns a
//! [Container](container::Container). Components are registered under dot-separated
//! [keys](component::ComponentKey) and created on first resolution, with instance reuse decided by
//! [scopes](scope). Components which need explicit startup and shutdown are managed by
//! [providers](provider::Provider). Containers can expose their components to other containers via
//! [imports](component_registry::import), without re-exporting what they imported themselves.

pub mod component;
pub mod component_registry;
pub mod container;
pub mod error;
pub mod instance_provider;
pub mod provider;
pub mod scope;
