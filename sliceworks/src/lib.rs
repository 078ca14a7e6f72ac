//! Application framework built from slices, based on [sliceworks_di] containers.
//!
//! An application is split into slices - named parts, each with its own component container,
//! settings, providers and component directory. The application itself owns a distinguished
//! application slice, whose components every other slice can see under the `application`
//! namespace. Slices can import components from each other, but never re-export what they
//! imported.
//!
//! Applications are defined with an [ApplicationBuilder](application::ApplicationBuilder) and go
//! through the `prepare` and `boot` phases:
//!
//! ```no_run
//! use sliceworks::application::ApplicationBuilder;
//! use sliceworks::slice::SliceImport;
//! use sliceworks_di::instance_provider::ComponentInstancePtr;
//!
//! let application = ApplicationBuilder::new("bookshelf")
//!     .with_root("/srv/bookshelf")
//!     .configure(|configuration| {
//!         configuration
//!             .slice("admin")
//!             .import(SliceImport::new("search"));
//!     })
//!     .build()
//!     .unwrap();
//!
//! application
//!     .register_instance("clock", ComponentInstancePtr::new(42u64))
//!     .unwrap();
//! application.boot().unwrap();
//!
//! let admin = application.slice("admin").unwrap();
//! assert!(admin.contains_key("application.clock"));
//! ```
//!
//! Slices are discovered in `slices/<name>` directories of the application root. Files in
//! `<slice>/lib` become components, as long as the
//! [ComponentCatalog](catalog::ComponentCatalog) knows how to construct them, and files in
//! `<slice>/config/providers` name providers. Settings are declared in `config/settings.toml`
//! (or any other supported format) and read from the environment.

pub mod application;
pub mod autoload;
pub mod catalog;
pub mod config;
pub mod global;
pub mod inflector;
pub mod logger;
pub mod notifications;
pub mod router;
pub mod settings;
pub mod slice;
pub mod slice_name;
pub mod slice_registrar;
