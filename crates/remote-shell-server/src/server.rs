//! Accept loop serving one dispatcher per connection.

use std::sync::Arc;

use remote_shell_transport::{MessageSink, MessageSource};

use crate::{
    config::ServerConfig,
    dispatcher::{DispatchError, Dispatcher},
    registry::CommandRegistry,
};

/// Shell server: a registry shared by every session.
#[derive(Clone)]
pub struct ShellServer {
    registry: Arc<CommandRegistry>,
    config: ServerConfig,
}

impl ShellServer {
    /// Create a server over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<CommandRegistry>, config: ServerConfig) -> Self {
        Self { registry, config }
    }

    /// The shared command registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Serve one session over an already-established channel.
    ///
    /// # Errors
    /// Returns the fatal transport error that ended the session.
    pub async fn serve_channel<S, K>(&self, source: S, sink: K) -> Result<(), DispatchError>
    where
        S: MessageSource,
        K: MessageSink + 'static,
    {
        Dispatcher::new(Arc::clone(&self.registry), sink, self.config.clone())
            .run(source)
            .await
    }
}

#[cfg(feature = "tcp")]
mod tcp {
    use remote_shell_transport::json_lines::tcp;
    use tokio::net::{TcpListener, TcpStream};

    use super::ShellServer;

    impl ShellServer {
        /// Accept connections forever, one session each.
        ///
        /// # Errors
        /// Returns error if accepting fails.
        pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
            if let Ok(addr) = listener.local_addr() {
                tracing::info!("Listening on {addr}");
            }

            loop {
                let (stream, peer) = listener.accept().await?;
                tracing::debug!("New connection from {peer}");

                let server = self.clone();
                tokio::spawn(async move {
                    match server.serve_stream(stream).await {
                        Ok(()) => tracing::debug!("Connection closed: {peer}"),
                        Err(e) => tracing::warn!("Connection error from {peer}: {e}"),
                    }
                });
            }
        }

        /// Serve one session over a TCP stream.
        ///
        /// # Errors
        /// Returns the fatal transport error that ended the session.
        pub async fn serve_stream(&self, stream: TcpStream) -> Result<(), super::DispatchError> {
            let (source, sink) = tcp::from_stream(stream);
            self.serve_channel(source, sink).await
        }
    }
}
