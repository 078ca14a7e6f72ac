use sliceworks_di::component_registry::import::ImportDirective;
use sliceworks_di::container::ContainerBuilder;
use sliceworks_di::instance_provider::ComponentInstancePtr;

fn main() {
    let application = ContainerBuilder::new("application").build();
    application
        .register_instance("app_name", ComponentInstancePtr::new("bookshelf".to_string()))
        .expect("error registering app name");

    let catalog = ContainerBuilder::new("catalog").build();
    catalog
        .import(&application, ImportDirective::namespaced("application"))
        .expect("error importing application components");

    // nothing is imported until requested
    println!("keys before lookup: {:?}", catalog.keys());

    let app_name = catalog
        .resolve_typed::<String>("application.app_name")
        .expect("error resolving imported component");
    println!("resolved imported app name: {app_name}");
    println!("keys after lookup: {:?}", catalog.keys());
}
