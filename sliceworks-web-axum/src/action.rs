//! Actions are endpoint components handling requests routed to them. They are registered under
//! `actions.*` keys of slices, e.g. the route `home.show` is handled by the `actions.home.show`
//! component of the application slice.
//!
//! Endpoints are stored type-erased, so actions need to be registered as [ActionPtr] instances,
//! either with [action_instance] or with [action_constructor] when constructed by a
//! [ComponentCatalog](sliceworks::catalog::ComponentCatalog).

use axum::body::Body;
use axum::response::Response;
use futures::future::BoxFuture;
use hyper::Request;
use sliceworks_di::component::Component;
use sliceworks_di::component_registry::Constructor;
use sliceworks_di::instance_provider::{
    ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstanceProviderError,
    ComponentInstancePtr,
};
use std::sync::Arc;

/// Request handler.
pub trait Action {
    fn call(&self, request: Request<Body>) -> BoxFuture<'_, Response>;
}

pub type ActionPtr = ComponentInstancePtr<dyn Action + Send + Sync>;

/// Wraps an action, so it can be registered as an endpoint.
pub fn action_instance<T: Action + Send + Sync + 'static>(
    action: T,
) -> ComponentInstancePtr<ActionPtr> {
    ComponentInstancePtr::new(ComponentInstancePtr::new(action) as ActionPtr)
}

/// Creates a constructor registering a [Component] as an action endpoint.
pub fn action_constructor<T: Action + Component>() -> Constructor {
    Arc::new(construct_action::<T>)
}

fn construct_action<T: Action + Component>(
    instance_provider: &mut dyn ComponentInstanceProvider,
) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
    T::create(instance_provider).map(|action| action_instance(action) as ComponentInstanceAnyPtr)
}

/// Casts a type-erased endpoint to an action, if it is one.
pub fn downcast_action(endpoint: ComponentInstanceAnyPtr) -> Option<ActionPtr> {
    endpoint
        .downcast::<ActionPtr>()
        .ok()
        .map(|action| (*action).clone())
}

#[cfg(test)]
mod tests {
    use crate::action::{action_constructor, action_instance, downcast_action, Action};
    use axum::body::Body;
    use axum::response::{IntoResponse, Response};
    use futures::future::{BoxFuture, FutureExt};
    use hyper::Request;
    use sliceworks_di::component::Component;
    use sliceworks_di::container::ContainerBuilder;
    use sliceworks_di::instance_provider::{
        ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstanceProviderError,
        ComponentInstancePtr,
    };
    use sliceworks_di::scope::SINGLETON;

    struct Show;

    impl Action for Show {
        fn call(&self, _request: Request<Body>) -> BoxFuture<'_, Response> {
            async { "show".into_response() }.boxed()
        }
    }

    impl Component for Show {
        fn create(
            _instance_provider: &mut dyn ComponentInstanceProvider,
        ) -> Result<Self, ComponentInstanceProviderError> {
            Ok(Self)
        }
    }

    #[test]
    fn should_downcast_registered_actions() {
        let container = ContainerBuilder::new("test_app").build();
        container
            .register_instance("actions.home.show", action_instance(Show))
            .unwrap();
        container
            .register_factory("actions.home.index", SINGLETON, |provider| {
                (*action_constructor::<Show>())(provider)
            })
            .unwrap();
        container
            .register_instance("actions.home.other", ComponentInstancePtr::new(1u8))
            .unwrap();

        assert!(downcast_action(container.resolve("actions.home.show").unwrap()).is_some());
        assert!(downcast_action(container.resolve("actions.home.index").unwrap()).is_some());
        assert!(downcast_action(container.resolve("actions.home.other").unwrap()).is_none());
        assert!(downcast_action(ComponentInstancePtr::new(Show) as ComponentInstanceAnyPtr)
            .is_none());
    }
}
