//! sealwire server binary.

use clap::Parser;
use sealwire_server::{ServerArgs, ServerError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = ServerArgs::parse();

    let filter = match &args.log_filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    sealwire_server::run(args).await
}
