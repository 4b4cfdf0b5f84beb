//! MCP server runners for bq-mcp.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use bq_core::control::WarehouseControlPlane;
use bq_core::warehouse::Warehouse;
use rmcp::serve_server;
use rmcp::transport::io::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig,
    StreamableHttpService,
    session::local::LocalSessionManager,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::BigQueryMcp;

pub type ServeResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);
const SSE_RETRY: Duration = Duration::from_secs(3);

/// Configuration for the MCP streamable HTTP server.
#[derive(Debug, Clone)]
pub struct McpHttpServerConfig {
    pub addr: SocketAddr,
    /// Keep per-client sessions. Stateless mode answers each POST on its own.
    pub stateful_mode: bool,
}

impl McpHttpServerConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stateful_mode: true,
        }
    }

    #[must_use]
    pub const fn with_stateful_mode(mut self, stateful_mode: bool) -> Self {
        self.stateful_mode = stateful_mode;
        self
    }
}

/// Serves the MCP server over an arbitrary reader/writer pair until the peer
/// disconnects.
///
/// # Errors
/// Returns any handshake or transport error.
pub async fn serve_io<W, R, Wr>(
    control: WarehouseControlPlane<W>,
    reader: R,
    writer: Wr,
) -> ServeResult
where
    W: Warehouse,
    R: AsyncRead + Send + Unpin + 'static,
    Wr: AsyncWrite + Send + Unpin + 'static,
{
    let service = BigQueryMcp::new(control);
    let running = serve_server(service, (reader, writer)).await?;
    let reason = running.waiting().await?;
    info!(?reason, "mcp session ended");
    Ok(())
}

/// Serves the MCP server over stdio.
///
/// # Errors
/// Returns any transport or server error.
pub async fn serve_stdio<W: Warehouse>(control: WarehouseControlPlane<W>) -> ServeResult {
    let (stdin, stdout) = stdio();
    serve_io(control, stdin, stdout).await
}

/// Serves the MCP server using streamable HTTP transport.
///
/// # Errors
/// Returns any listener or server error.
pub async fn serve_streamable_http<W: Warehouse>(
    control: WarehouseControlPlane<W>,
    config: McpHttpServerConfig,
) -> ServeResult {
    let service: StreamableHttpService<BigQueryMcp<W>, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(BigQueryMcp::new(control.clone())),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                sse_keep_alive: Some(SSE_KEEP_ALIVE),
                sse_retry: Some(SSE_RETRY),
                stateful_mode: config.stateful_mode,
                ..Default::default()
            },
        );

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "serving MCP over streamable HTTP");
    axum::serve(listener, app).await?;
    Ok(())
}
