use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use hyper_util::{
    rt::{TokioExecutor, TokioIo as HyperSocket},
    server::conn::auto::Builder,
};
use tokio::net::TcpListener;
use tracing::{debug, error};

use crate::service::FallbackService;

/// HTTP server that accepts connections and answers them with the fallback
/// service.
pub struct Server {
    /// The TCP listener for accepting incoming connections
    connection: TcpListener,
    /// Service cloned into every connection task
    service: FallbackService,
}

impl Server {
    /// Creates a new server instance bound to the specified address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The network address to bind to
    /// * `service` - The service answering requests on every connection
    ///
    /// # Returns
    ///
    /// Returns a `Result<Server>` containing the new server instance or an error.
    pub async fn new(addr: SocketAddr, service: FallbackService) -> Result<Self> {
        let connection = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        Ok(Self {
            connection,
            service,
        })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.connection.local_addr()?)
    }

    /// Accepts a new connection and spawns a task to handle it.
    ///
    /// Errors on an established connection are logged by the spawned task and
    /// never reach the caller.
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once the connection is handed off, or an error if
    /// accepting failed.
    pub async fn accept(&self) -> Result<()> {
        let (conn, address) = self.connection.accept().await?;
        debug!("Accepted connection from {}", address);

        let io = HyperSocket::new(conn);
        let service = self.service.clone();

        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                error!("Error serving connection from {}: {:?}", address, e);
            }
        });
        Ok(())
    }
}
