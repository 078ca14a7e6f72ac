//! Serving [Sliceworks](https://crates.io/crates/sliceworks) applications with axum.
//!
//! Routes defined in the application configuration or its routes file are resolved to
//! [*Actions*](action::Action) living in slice containers, which can take full advantage of
//! dependency injection. [WebApplication](router::WebApplication) turns them into an
//! `axum::Router`, which can then be served with the [server] module.
//!
//! ### Simple usage example
//!
//! ```no_run
//! use axum::body::Body;
//! use axum::response::{IntoResponse, Response};
//! use futures::future::{BoxFuture, FutureExt};
//! use hyper::Request;
//! use sliceworks::application::ApplicationBuilder;
//! use sliceworks_web_axum::action::{action_instance, Action};
//! use sliceworks_web_axum::config::WebConfig;
//! use sliceworks_web_axum::router::WebApplication;
//! use sliceworks_web_axum::server;
//!
//! struct HelloWorld;
//!
//! impl Action for HelloWorld {
//!     fn call(&self, _request: Request<Body>) -> BoxFuture<'_, Response> {
//!         async { "Hello world!".into_response() }.boxed()
//!     }
//! }
//!
//! // note: for the sake of simplicity, errors are unwrapped, rather than
//! // gracefully handled
//! #[tokio::main]
//! async fn main() {
//!     let application = ApplicationBuilder::new("hello")
//!         .configure(|configuration| {
//!             configuration.router.routes.get("/", "hello_world");
//!         })
//!         .build()
//!         .expect("unable to create application");
//!
//!     application
//!         .register_instance("actions.hello_world", action_instance(HelloWorld))
//!         .expect("unable to register action");
//!
//!     let config = WebConfig::load(application.root()).expect("unable to read config");
//!     let web_application = WebApplication::new(application);
//!
//!     // serve the application until ctrl-c
//!     server::run(&web_application, &config)
//!         .await
//!         .expect("error running application");
//! }
//! ```

pub mod action;
pub mod config;
pub mod monitor;
pub mod router;
pub mod server;

pub use axum;
