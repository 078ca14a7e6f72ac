//! Core server-related functionality.

use crate::config::{ServerConfig, WebConfig};
use crate::router::{WebApplication, WebError};
use futures::future::try_join_all;
use hyper::server::conn::AddrIncoming;
use hyper::server::Builder;
use hyper::Error as HyperError;
use sliceworks::application::ApplicationError;
use std::future::Future;
use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Errors related to bootstrapping servers.
#[derive(Error, Debug)]
pub enum ServerBootstrapError {
    #[error("Error parsing listen address: {0}")]
    ListenAddressParseError(AddrParseError),
    #[error("Error binding server: {0}")]
    BindError(#[source] HyperError),
    #[error("Error serving requests: {0}")]
    ServeError(#[source] HyperError),
    #[error("Error configuring router: {0}")]
    RouterError(#[from] WebError),
    #[error("Error starting application: {0}")]
    ApplicationError(#[from] ApplicationError),
}

/// Sends shutdown signal to all servers started by [serve_all].
pub type ShutdownSignalSender = broadcast::Sender<()>;

/// Creates a [Builder] bound to the configured listen address.
pub fn bootstrap_server(
    config: &ServerConfig,
) -> Result<Builder<AddrIncoming>, ServerBootstrapError> {
    let address: SocketAddr = config
        .listen_address
        .parse()
        .map_err(ServerBootstrapError::ListenAddressParseError)?;

    axum::Server::try_bind(&address).map_err(ServerBootstrapError::BindError)
}

/// Serves the application on a single server until `shutdown` completes. The application needs to
/// be prepared first.
pub async fn serve<F>(
    web_app: &WebApplication,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), ServerBootstrapError>
where
    F: Future<Output = ()>,
{
    let router = web_app.rack_app()?;
    let builder = bootstrap_server(config)?;

    info!(address = %config.listen_address, "Starting server");

    builder
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerBootstrapError::ServeError)
}

/// Boots the application and serves it on all configured servers, until a shutdown signal gets
/// sent or all servers stop. The application is shut down afterwards.
pub async fn serve_all(
    web_app: &WebApplication,
    config: &WebConfig,
    shutdown_sender: &ShutdownSignalSender,
) -> Result<(), ServerBootstrapError> {
    web_app.application().boot()?;

    let servers = config.servers.iter().map(|(server_name, config)| {
        let mut shutdown_receiver = shutdown_sender.subscribe();
        info!(server = %server_name, "Creating server");

        serve(web_app, config, async move {
            let _ = shutdown_receiver.recv().await;
        })
    });

    let result = try_join_all(servers).await.map(|_| ());

    if let Err(error) = web_app.application().shutdown() {
        warn!(%error, "Error shutting down application");
    }

    result
}

/// Like [serve_all], but stops servers on `ctrl-c`.
pub async fn run(web_app: &WebApplication, config: &WebConfig) -> Result<(), ServerBootstrapError> {
    let (shutdown_sender, _) = broadcast::channel(1);
    let signal_sender = shutdown_sender.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = signal_sender.send(());
        }
    });

    serve_all(web_app, config, &shutdown_sender).await
}
