//! Application logger component, started lazily by the built-in `logger` provider of the
//! application slice.

use sliceworks_di::container::Container;
use sliceworks_di::instance_provider::{error_ptr, ComponentInstancePtr, ErrorPtr};
use sliceworks_di::provider::Provider;
use tracing::{debug, error, info, warn};

/// Key of the [ApplicationLogger] component, as well as the name of its provider.
pub const LOGGER_KEY: &str = "logger";

/// Logger emitting `tracing` events tagged with the application name.
#[derive(Clone, Debug)]
pub struct ApplicationLogger {
    application: String,
}

impl ApplicationLogger {
    pub fn new<T: ToString>(application: T) -> Self {
        Self {
            application: application.to_string(),
        }
    }

    #[inline]
    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn debug(&self, message: &str) {
        debug!(application = %self.application, "{}", message);
    }

    pub fn info(&self, message: &str) {
        info!(application = %self.application, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(application = %self.application, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(application = %self.application, "{}", message);
    }
}

/// Registers [ApplicationLogger] when started.
#[derive(Clone, Debug)]
pub struct LoggerProvider {
    application: String,
}

impl LoggerProvider {
    pub fn new<T: ToString>(application: T) -> Self {
        Self {
            application: application.to_string(),
        }
    }
}

impl Provider for LoggerProvider {
    fn start(&self, container: &Container) -> Result<(), ErrorPtr> {
        container
            .register_instance(
                LOGGER_KEY,
                ComponentInstancePtr::new(ApplicationLogger::new(&self.application)),
            )
            .map_err(error_ptr)
    }
}
