use sliceworks::application::ApplicationBuilder;
use sliceworks::logger::ApplicationLogger;
use sliceworks::slice::SliceImport;
use sliceworks::submit_component;
use sliceworks_di::component::Component;
use sliceworks_di::instance_provider::{
    ComponentInstanceProvider, ComponentInstanceProviderError, ComponentInstancePtr,
    TypedComponentInstanceProvider,
};
use std::fs;

// a component living in slices/search/lib/index_entity.rs
struct IndexEntity {
    logger: ComponentInstancePtr<ApplicationLogger>,
}

impl Component for IndexEntity {
    fn create(
        instance_provider: &mut dyn ComponentInstanceProvider,
    ) -> Result<Self, ComponentInstanceProviderError> {
        Ok(Self {
            // every slice sees application components under the "application" namespace
            logger: instance_provider.instance_typed("application.logger")?,
        })
    }
}

// the catalog maps constant names derived from file paths to constructors
submit_component!("Search::IndexEntity", IndexEntity);

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    // lay out an application with two slices: search and admin
    let root = tempfile::tempdir().expect("error creating application root");
    fs::create_dir_all(root.path().join("slices/search/lib")).expect("error creating slice");
    fs::create_dir_all(root.path().join("slices/admin")).expect("error creating slice");
    fs::write(root.path().join("slices/search/lib/index_entity.rs"), "")
        .expect("error creating component file");

    let application = ApplicationBuilder::new("bookshelf")
        .with_root(root.path())
        .configure(|configuration| {
            configuration
                .slice("admin")
                .import(SliceImport::new("search"));
        })
        .build()
        .expect("error creating application");

    application.boot().expect("error booting application");

    let admin = application.slice("admin").expect("missing admin slice");
    let entity = admin
        .resolve_typed::<IndexEntity>("search.index_entity")
        .expect("error resolving imported component");

    entity.logger.info("Index entity resolved through an import");
}
