//! FTPS transfer server.
//!
//! Explicit TLS (`AUTH TLS`) on the control port, one configured account,
//! passive TLS data connections from a fixed port range. Each login lands in
//! today's album; every finished STOR is handed to the dispatcher.
//!
//! # Session flow
//!
//! ```text
//! 220 → AUTH TLS → 234 → [TLS] → USER/PASS → 230 (home = today's album)
//!     → PBSZ 0 / PROT P → PASV → 227 → STOR → 150 → [TLS data] → 226
//!     → Dispatcher::handle(TransferEvent)
//! ```

pub mod auth;
pub mod passive;
pub mod session;
pub mod tls;
pub mod vfs;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::core::Dispatcher;
use crate::library::AlbumProvisioner;

pub use auth::{AuthError, Authenticator, Credentials, Identity};
pub use passive::{PassiveError, PassivePorts, PortLease};
pub use session::SessionContext;
pub use vfs::{HomeFs, VfsError};

/// Accepts control connections and runs one task per session
pub struct TransferServer {
    bind: SocketAddr,
    context: Arc<SessionContext>,
}

impl TransferServer {
    pub fn new(bind: SocketAddr, context: SessionContext) -> Self {
        Self {
            bind,
            context: Arc::new(context),
        }
    }

    /// Assemble the server from configuration and a ready dispatcher
    pub fn from_config(config: &ResolvedConfig, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let server = &config.server;
        let password = server.require_password()?;
        let acceptor = tls::load_acceptor(&server.cert_path, &server.key_path)?;
        let authenticator = Authenticator::new(
            server.username.clone(),
            password,
            AlbumProvisioner::from_config(&config.albums),
        );

        Ok(Self::new(
            server.bind,
            SessionContext {
                acceptor,
                authenticator,
                passive: PassivePorts::new(server.passive_ports.clone()),
                passive_address: server.passive_address,
                dispatcher,
                lenient_tls_eof: server.lenient_tls_eof,
                data_timeout: Duration::from_secs(server.data_timeout_seconds),
            },
        ))
    }

    /// Serve until the process is stopped
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("Failed to bind {}", self.bind))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            passive = ?self.context.passive.range(),
            "Transfer server listening"
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let context = self.context.clone();
            let span = tracing::info_span!("session", %peer, id = %Uuid::new_v4());

            tokio::spawn(
                async move {
                    tracing::info!("Connection opened");
                    match session::run(stream, peer, context).await {
                        Ok(()) => tracing::info!("Connection closed"),
                        Err(e) => tracing::warn!(error = %format!("{:#}", e), "Session ended with error"),
                    }
                }
                .instrument(span),
            );
        }
    }
}
