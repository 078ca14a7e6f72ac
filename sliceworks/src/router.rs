//! Routes and their resolution to endpoints.
//!
//! Routes are declared in an optional routes file (`config/routes.toml` by default) and/or
//! programmatically via [RouteSet]. Each route names its endpoint with an identifier, e.g.
//! `home.show`, which a [RouteResolver] maps to a component. The default [SliceRouteResolver]
//! looks up `actions.<identifier>` in the slice owning the route:
//!
//! 1. the slice named explicitly by the route,
//! 2. the slice named by the first identifier segment (`admin.users.index` resolves
//!    `actions.users.index` in `admin`),
//! 3. the application slice.
//!
//! Example routes file:
//!
//! ```toml
//! [[routes]]
//! method = "get"
//! path = "/"
//! to = "home.show"
//!
//! [[routes]]
//! method = "post"
//! path = "/admin/users"
//! to = "users.create"
//! slice = "admin"
//! ```

use crate::application::Application;
use crate::config::{find_config_file, RouterOptions};
use crate::slice::{Slice, SliceError};
use config::{Config, ConfigError, File};
use derive_more::Display;
use itertools::Itertools;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use sliceworks_di::instance_provider::ComponentInstanceAnyPtr;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Namespace of endpoint components.
pub const ACTIONS_NAMESPACE: &str = "actions";

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Unknown slice for routes: {0}")]
    UnknownSlice(String),
    #[error("Handler '{identifier}' not found in slice '{slice}'")]
    HandlerNotFound { identifier: String, slice: String },
    #[error("Error creating endpoint for '{identifier}': {source}")]
    Endpoint {
        identifier: String,
        #[source]
        source: SliceError,
    },
    #[error("Error loading routes from '{}': {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    #[display(fmt = "GET")]
    Get,
    #[display(fmt = "POST")]
    Post,
    #[display(fmt = "PUT")]
    Put,
    #[display(fmt = "PATCH")]
    Patch,
    #[display(fmt = "DELETE")]
    Delete,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
pub struct RouteDefinition {
    pub method: RouteMethod,
    pub path: String,
    /// Endpoint identifier.
    pub to: String,
    /// Slice owning the endpoint.
    #[serde(default)]
    pub slice: Option<String>,
}

/// Ordered route definitions.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub struct RouteSet {
    #[serde(default)]
    routes: Vec<RouteDefinition>,
}

impl RouteSet {
    /// Loads routes from `<root>/<routes_path>.<ext>`. A missing file results in an empty set.
    pub fn load(root: &Path, routes_path: &Path) -> Result<Self, RouterError> {
        let Some(path) = find_config_file(&root.join(routes_path)) else {
            return Ok(Self::default());
        };

        debug!(path = %path.display(), "Loading routes");

        Config::builder()
            .add_source(File::from(path.as_path()))
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .map_err(|source| RouterError::Load { path, source })
    }

    pub fn route<P: ToString, T: ToString>(
        &mut self,
        method: RouteMethod,
        path: P,
        to: T,
    ) -> &mut Self {
        self.routes.push(RouteDefinition {
            method,
            path: path.to_string(),
            to: to.to_string(),
            slice: None,
        });
        self
    }

    #[inline]
    pub fn get<P: ToString, T: ToString>(&mut self, path: P, to: T) -> &mut Self {
        self.route(RouteMethod::Get, path, to)
    }

    #[inline]
    pub fn post<P: ToString, T: ToString>(&mut self, path: P, to: T) -> &mut Self {
        self.route(RouteMethod::Post, path, to)
    }

    #[inline]
    pub fn put<P: ToString, T: ToString>(&mut self, path: P, to: T) -> &mut Self {
        self.route(RouteMethod::Put, path, to)
    }

    #[inline]
    pub fn patch<P: ToString, T: ToString>(&mut self, path: P, to: T) -> &mut Self {
        self.route(RouteMethod::Patch, path, to)
    }

    #[inline]
    pub fn delete<P: ToString, T: ToString>(&mut self, path: P, to: T) -> &mut Self {
        self.route(RouteMethod::Delete, path, to)
    }

    /// Declares routes owned by given slice, mounted at `at`.
    pub fn slice<F: FnOnce(&mut RouteSet)>(&mut self, name: &str, at: &str, f: F) -> &mut Self {
        let mut routes = RouteSet::default();
        f(&mut routes);

        self.routes
            .extend(routes.routes.into_iter().map(|route| RouteDefinition {
                path: join_paths(at, &route.path),
                slice: Some(route.slice.unwrap_or_else(|| name.to_string())),
                ..route
            }));
        self
    }

    /// Appends routes from another set.
    pub fn extend(&mut self, other: RouteSet) -> &mut Self {
        self.routes.extend(other.routes);
        self
    }

    #[inline]
    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Maps route definitions to endpoints.
#[cfg_attr(test, automock)]
pub trait RouteResolver {
    fn resolve(&self, route: &RouteDefinition) -> Result<ComponentInstanceAnyPtr, RouterError>;
}

pub type RouteResolverPtr = Arc<dyn RouteResolver + Send + Sync>;

/// Creates a resolver for a prepared application.
pub type RouteResolverFactory = Arc<dyn Fn(&Application) -> RouteResolverPtr + Send + Sync>;

/// Default [RouteResolverFactory], creating a [SliceRouteResolver].
pub fn default_resolver(application: &Application) -> RouteResolverPtr {
    Arc::new(SliceRouteResolver::new(application))
}

/// Resolves `actions.<identifier>` keys in slices. See module-level documentation for details.
#[derive(Debug)]
pub struct SliceRouteResolver {
    application: Arc<Slice>,
    slices: BTreeMap<String, Arc<Slice>>,
}

impl SliceRouteResolver {
    pub fn new(application: &Application) -> Self {
        Self::with_slices(
            application.application_slice().clone(),
            application.slices().slices(),
        )
    }

    pub fn with_slices<I: IntoIterator<Item = Arc<Slice>>>(
        application: Arc<Slice>,
        slices: I,
    ) -> Self {
        Self {
            application,
            slices: slices
                .into_iter()
                .map(|slice| (slice.name().name().to_string(), slice))
                .collect(),
        }
    }

    fn owner<'a>(
        &'a self,
        route: &'a RouteDefinition,
    ) -> Result<(&'a Slice, &'a str), RouterError> {
        if let Some(name) = &route.slice {
            return self
                .slices
                .get(name)
                .map(|slice| (slice.as_ref(), route.to.as_str()))
                .ok_or_else(|| RouterError::UnknownSlice(name.clone()));
        }

        Ok(route
            .to
            .split_once('.')
            .and_then(|(first, rest)| {
                self.slices
                    .get(first)
                    .map(|slice| (slice.as_ref(), rest))
            })
            .unwrap_or((self.application.as_ref(), route.to.as_str())))
    }
}

impl RouteResolver for SliceRouteResolver {
    fn resolve(&self, route: &RouteDefinition) -> Result<ComponentInstanceAnyPtr, RouterError> {
        let (slice, identifier) = self.owner(route)?;
        let key = format!("{}.{}", ACTIONS_NAMESPACE, identifier);

        if !slice.contains_key(&key) {
            return Err(RouterError::HandlerNotFound {
                identifier: route.to.clone(),
                slice: slice.name().to_string(),
            });
        }

        slice
            .resolve(&key)
            .map_err(|source| RouterError::Endpoint {
                identifier: route.to.clone(),
                source,
            })
    }
}

/// A route with its endpoint.
#[derive(Clone)]
pub struct ResolvedRoute {
    pub method: RouteMethod,
    /// Full path, including the router prefix.
    pub path: String,
    pub identifier: String,
    pub endpoint: ComponentInstanceAnyPtr,
}

impl Debug for ResolvedRoute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// Routes with resolved endpoints.
#[derive(Clone, Debug, Default)]
pub struct Router {
    routes: Vec<ResolvedRoute>,
}

impl Router {
    /// Resolves every route, failing on the first one which can't be resolved.
    pub fn new(
        routes: &RouteSet,
        resolver: &dyn RouteResolver,
        options: &RouterOptions,
    ) -> Result<Self, RouterError> {
        let routes = routes
            .routes()
            .iter()
            .map(|route| {
                resolver.resolve(route).map(|endpoint| ResolvedRoute {
                    method: route.method,
                    path: join_paths(&options.prefix, &route.path),
                    identifier: route.to.clone(),
                    endpoint,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(routes = routes.len(), "Created router");
        Ok(Self { routes })
    }

    #[inline]
    pub fn routes(&self) -> &[ResolvedRoute] {
        &self.routes
    }

    pub fn find(&self, method: RouteMethod, path: &str) -> Option<&ResolvedRoute> {
        let path = join_paths("", path);
        self.routes
            .iter()
            .find(|route| route.method == method && route.path == path)
    }
}

fn join_paths(prefix: &str, path: &str) -> String {
    format!(
        "/{}",
        prefix
            .split('/')
            .chain(path.split('/'))
            .filter(|segment| !segment.is_empty())
            .join("/")
    )
}
