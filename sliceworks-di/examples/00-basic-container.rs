use sliceworks_di::component::Component;
use sliceworks_di::container::ContainerBuilder;
use sliceworks_di::instance_provider::{
    ComponentInstanceProvider, ComponentInstanceProviderError, ComponentInstancePtr,
    TypedComponentInstanceProvider,
};

struct Greeting(&'static str);

struct Greeter {
    greeting: ComponentInstancePtr<Greeting>,
}

impl Greeter {
    fn greet(&self, name: &str) {
        println!("{}, {name}!", self.greeting.0);
    }
}

impl Component for Greeter {
    fn create(
        instance_provider: &mut dyn ComponentInstanceProvider,
    ) -> Result<Self, ComponentInstanceProviderError> {
        Ok(Self {
            greeting: instance_provider.instance_typed("greeting")?,
        })
    }
}

fn main() {
    let container = ContainerBuilder::new("application").build();
    container
        .register_instance("greeting", ComponentInstancePtr::new(Greeting("Hello")))
        .expect("error registering greeting");
    container
        .register_component::<Greeter>("greeter")
        .expect("error registering greeter");

    // the greeter gets created here, on first resolution
    let greeter = container
        .resolve_typed::<Greeter>("greeter")
        .expect("error resolving greeter");
    greeter.greet("slices");
}
