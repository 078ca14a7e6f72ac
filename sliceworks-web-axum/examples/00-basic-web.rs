use axum::body::Body;
use axum::response::{IntoResponse, Response};
use futures::future::{BoxFuture, FutureExt};
use hyper::Request;
use sliceworks::application::ApplicationBuilder;
use sliceworks::logger::ApplicationLogger;
use sliceworks_di::component::Component;
use sliceworks_di::instance_provider::{
    ComponentInstanceProvider, ComponentInstanceProviderError, ComponentInstancePtr,
    TypedComponentInstanceProvider,
};
use sliceworks_web_axum::action::{action_constructor, Action};
use sliceworks_web_axum::config::WebConfig;
use sliceworks_web_axum::router::WebApplication;
use sliceworks_web_axum::server;
use std::fs;

// an action living in slices/books/lib/actions/books/index.rs
struct BooksIndex {
    logger: ComponentInstancePtr<ApplicationLogger>,
}

impl Component for BooksIndex {
    fn create(
        instance_provider: &mut dyn ComponentInstanceProvider,
    ) -> Result<Self, ComponentInstanceProviderError> {
        Ok(Self {
            logger: instance_provider.instance_typed("application.logger")?,
        })
    }
}

impl Action for BooksIndex {
    fn call(&self, _request: Request<Body>) -> BoxFuture<'_, Response> {
        async {
            self.logger.info("Listing books");
            "Dune, Hyperion".into_response()
        }
        .boxed()
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
#[tokio::main]
async fn main() {
    let root = tempfile::tempdir().expect("error creating application root");
    fs::create_dir_all(root.path().join("slices/books/lib/actions/books"))
        .expect("error creating slice");
    fs::write(root.path().join("slices/books/lib/actions/books/index.rs"), "")
        .expect("error creating action file");

    let application = ApplicationBuilder::new("bookshelf")
        .with_root(root.path())
        .with_catalog(
            sliceworks::catalog::ComponentCatalogBuilder::new()
                .with_constructor(
                    "Books::Actions::Books::Index",
                    action_constructor::<BooksIndex>(),
                )
                .build(),
        )
        .configure(|configuration| {
            // GET /books is handled by actions.books.index of the books slice
            configuration.router.routes.get("/books", "books.books.index");
        })
        .build()
        .expect("error creating application");

    let config = WebConfig::load(application.root()).expect("error reading web config");
    let web_application = WebApplication::new(application);

    // serves on 0.0.0.0:2300 until ctrl-c
    server::run(&web_application, &config)
        .await
        .expect("error running application");
}
