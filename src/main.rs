use std::{net::SocketAddr, sync::Arc};

use clap::Parser as _;
use moproxy_core::{
    origin::{resolve, resolve_strict},
    server::Server,
    service::{FallbackService, Forwarder},
};
use tracing::{debug, error, info, info_span, instrument, warn};

use crate::config::{Cli, Settings};

mod config;
mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load(Cli::parse())?;

    logging::init_logging(settings.loglevel.into())?;

    let (server_addr, service) = {
        let _span = info_span!("moproxy_startup");
        let _enter = _span.enter();

        info!("Starting moproxy");

        let origins = if settings.strict {
            resolve_strict(settings.origins.as_slice())?
        } else {
            resolve(settings.origins.as_slice())
        };
        if origins.is_empty() {
            warn!("No usable origins configured, every request will be answered 404");
        }

        let forwarder = Arc::new(Forwarder::new(origins, settings.timeout));
        for (i, origin) in forwarder.origins().iter().enumerate() {
            info!("Origin {}: {}", i, origin.target_url(""));
        }
        (
            SocketAddr::from(([0, 0, 0, 0], settings.port)),
            FallbackService::new(forwarder),
        )
    };

    info!("Starting server on {}", server_addr);
    let server = Server::new(server_addr, service).await?;

    info!("Server started successfully, accepting connections");

    run_server(server).await;
    Ok(())
}

#[instrument(skip(server))]
async fn run_server(server: Server) {
    loop {
        match server.accept().await {
            Ok(_) => debug!("Accepted new connection"),
            Err(e) => error!("Failed to accept connection: {}", e),
        }
    }
}
