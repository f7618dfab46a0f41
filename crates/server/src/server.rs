//! Server - binds the listener and serves the router until shutdown

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::error::ServerError;
use crate::hub::StreamHub;
use crate::ws::router;

/// Bound listener plus the hub it serves
pub struct Server {
    hub: StreamHub,
    listener: TcpListener,
}

impl Server {
    /// Bind `server.bind_addr` from the hub's configuration
    pub async fn bind(hub: StreamHub) -> Result<Self, ServerError> {
        let addr = hub.config().server.bind_addr.clone();
        Self::bind_to(hub, &addr).await
    }

    /// Bind an explicit address (`127.0.0.1:0` picks a free port)
    pub async fn bind_to(hub: StreamHub, addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::bind(addr, e))?;
        Ok(Self { hub, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Serve)
    }

    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    /// Serve until the hub's shutdown token is cancelled, then drain
    #[instrument(name = "server_run", skip(self))]
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        let shutdown = self.hub.shutdown_token();
        let app = router(self.hub.clone());

        info!(addr = %addr, "listening");
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ServerError::Serve)?;

        self.hub.drain().await;
        info!("server stopped");
        Ok(())
    }
}
