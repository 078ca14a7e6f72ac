//! Process-wide application handle, for entry points which can't have the application passed
//! explicitly. The handle can be set only once per process.

use crate::application::{Application, ApplicationError};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

static APPLICATION: OnceCell<Arc<Application>> = OnceCell::new();

/// Sets the active application. Fails if one is already set.
pub fn set_application(application: Arc<Application>) -> Result<(), ApplicationError> {
    let name = application.name().to_string();
    APPLICATION.set(application).map_err(|_| {
        ApplicationError::AlreadyDefined(
            APPLICATION
                .get()
                .map(|application| application.name().to_string())
                .unwrap_or(name.clone()),
        )
    })?;

    debug!(application = %name, "Application set as active");
    Ok(())
}

/// Returns the active application.
pub fn application() -> Result<Arc<Application>, ApplicationError> {
    APPLICATION.get().cloned().ok_or(ApplicationError::Undefined)
}

/// Prepares the active application.
pub fn prepare() -> Result<Arc<Application>, ApplicationError> {
    let application = application()?;
    application.prepare()?;
    Ok(application)
}

/// Boots the active application.
pub fn boot() -> Result<Arc<Application>, ApplicationError> {
    let application = application()?;
    application.boot()?;
    Ok(application)
}
