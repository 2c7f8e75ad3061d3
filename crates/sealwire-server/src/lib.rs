//! sealwire server.
//!
//! Runs the session dispatcher over WebSocket with the demo business layer.
//! The binary in `main.rs` parses [`ServerArgs`], installs logging and calls
//! [`run`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod service;
pub mod ws;

use std::sync::Arc;

pub use config::ServerArgs;
pub use error::ServerError;
use sealwire_core::{Dispatcher, SystemEnv};
pub use service::DemoService;
use tracing::info;
pub use ws::{WsConnection, WsTransport, upgrade};

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Fails if the listener cannot be bound or the signal handler cannot be
/// installed.
pub async fn run(args: ServerArgs) -> Result<(), ServerError> {
    let transport = WsTransport::bind(args.bind, args.upgrade_timeout())
        .await
        .map_err(|source| ServerError::Bind { addr: args.bind, source })?;
    let addr = transport.local_addr().map_err(ServerError::Io)?;

    let config = args.dispatcher_config();
    info!(%addr, ?config, "listening");

    let env = SystemEnv;
    let dispatcher = Arc::new(Dispatcher::new(DemoService::new(env), env, config));

    tokio::select! {
        () = Arc::clone(&dispatcher).run(transport) => {},
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(ServerError::Signal)?;
            info!(live_sessions = dispatcher.registry().len(), "shutting down");
        },
    }

    Ok(())
}
