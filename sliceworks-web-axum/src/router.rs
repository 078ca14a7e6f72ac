//! Turning application routes into an axum [Router].

use crate::action::{downcast_action, ActionPtr};
use crate::monitor::{monitor_request, REQUEST_EVENT};
use axum::body::Body;
use axum::middleware::from_fn_with_state;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use fxhash::FxHashSet;
use hyper::Request;
use once_cell::sync::OnceCell;
use sliceworks::application::{Application, ApplicationError};
use sliceworks::notifications::{Notifications, NOTIFICATIONS_KEY};
use sliceworks::router::{ResolvedRoute, RouteMethod};
use sliceworks_di::instance_provider::{ComponentInstanceAnyPtr, ComponentInstancePtr};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum WebError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error("Endpoint for '{0}' is not a callable action")]
    NotCallableEndpoint(String),
    #[error("Route {method} {path} is defined more than once")]
    DuplicateRoute { method: RouteMethod, path: String },
    #[error("Configured middleware is not a web middleware")]
    NotMiddleware,
}

/// Middleware applied to the whole application router, registered with
/// [use_middleware](sliceworks::config::Configuration::use_middleware) after wrapping with
/// [middleware].
pub trait Middleware {
    fn apply(&self, router: Router) -> Router;
}

pub type MiddlewarePtr = Arc<dyn Middleware + Send + Sync>;

/// Wraps middleware for registration in application configuration.
pub fn middleware<T: Middleware + Send + Sync + 'static>(middleware: T) -> ComponentInstanceAnyPtr {
    ComponentInstancePtr::new(Arc::new(middleware) as MiddlewarePtr)
}

/// Web entrypoint of an [Application].
#[derive(Debug)]
pub struct WebApplication {
    application: Arc<Application>,
    rack_app: OnceCell<Router>,
}

impl WebApplication {
    pub fn new(application: Arc<Application>) -> Self {
        Self {
            application,
            rack_app: OnceCell::new(),
        }
    }

    #[inline]
    pub fn application(&self) -> &Arc<Application> {
        &self.application
    }

    /// Returns the router serving all application routes, creating it on first access. The
    /// application needs to be prepared first.
    pub fn rack_app(&self) -> Result<Router, WebError> {
        self.rack_app
            .get_or_try_init(|| self.create_router())
            .cloned()
    }

    fn create_router(&self) -> Result<Router, WebError> {
        let routes = self.application.router()?;

        let mut seen = FxHashSet::default();
        let mut method_routers: BTreeMap<&str, MethodRouter> = BTreeMap::new();

        for route in routes.routes() {
            if !seen.insert((route.method, route.path.as_str())) {
                return Err(WebError::DuplicateRoute {
                    method: route.method,
                    path: route.path.clone(),
                });
            }

            let action = action(route)?;
            let filter = method_filter(route.method);
            let handler = move |request: Request<Body>| {
                let action = action.clone();
                async move { action.call(request).await }
            };

            debug!(method = %route.method, path = %route.path, "Adding route");

            let method_router = match method_routers.remove(route.path.as_str()) {
                Some(method_router) => method_router.on(filter, handler),
                None => on(filter, handler),
            };
            method_routers.insert(route.path.as_str(), method_router);
        }

        let mut router = method_routers
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(path, method_router)
            });

        let mut middleware = vec![];
        self.application
            .configuration()
            .for_each_middleware(|entry| middleware.push(entry.clone()));

        for entry in middleware {
            let entry = entry
                .downcast::<MiddlewarePtr>()
                .map_err(|_| WebError::NotMiddleware)?;
            router = entry.apply(router);
        }

        let notifications = self
            .application
            .resolve_typed::<Notifications>(NOTIFICATIONS_KEY)?;
        notifications.register_event(REQUEST_EVENT);

        Ok(router.layer(from_fn_with_state(notifications, monitor_request)))
    }
}

fn action(route: &ResolvedRoute) -> Result<ActionPtr, WebError> {
    downcast_action(route.endpoint.clone())
        .ok_or_else(|| WebError::NotCallableEndpoint(route.identifier.clone()))
}

fn method_filter(method: RouteMethod) -> MethodFilter {
    match method {
        RouteMethod::Get => MethodFilter::GET,
        RouteMethod::Post => MethodFilter::POST,
        RouteMethod::Put => MethodFilter::PUT,
        RouteMethod::Patch => MethodFilter::PATCH,
        RouteMethod::Delete => MethodFilter::DELETE,
    }
}
