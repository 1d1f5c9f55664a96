//! Daemon wiring
//!
//! Owns the shared core (buffer + persist registry) and runs the two socket
//! servers until shutdown. On cancellation the servers stop accepting and
//! every persist job is stopped with a final flush; staging files stay on
//! disk so a restart can recover them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use ember_buffer::LogBuffer;
use ember_config::Config;
use ember_persist::PersisterRegistry;

use crate::control::{ControlContext, ControlServer};
use crate::ingress::IngressServer;

fn flatten(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> std::io::Result<()> {
    match result {
        Ok(inner) => inner,
        Err(join_err) => Err(std::io::Error::other(join_err)),
    }
}

/// The assembled daemon.
pub struct Daemon {
    config: Config,
    buffer: Arc<LogBuffer>,
    registry: Arc<PersisterRegistry>,
}

impl Daemon {
    /// Build the daemon from configuration.
    pub fn new(config: Config) -> Self {
        let buffer = Arc::new(LogBuffer::with_limits(config.buffer.limits()));
        let registry = Arc::new(PersisterRegistry::new());
        Self {
            config,
            buffer,
            registry,
        }
    }

    /// The shared log buffer.
    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    /// The persist job registry.
    pub fn registry(&self) -> &Arc<PersisterRegistry> {
        &self.registry
    }

    /// Run both socket servers until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) -> std::io::Result<()> {
        let ingress = IngressServer::new(
            self.config.ingress.socket_path.clone(),
            Arc::clone(&self.buffer),
            token.clone(),
        );
        let control = ControlServer::new(
            self.config.control.socket_path.clone(),
            ControlContext {
                buffer: Arc::clone(&self.buffer),
                registry: Arc::clone(&self.registry),
                persist_defaults: self.config.persist.clone(),
            },
            token.clone(),
        );

        let mut ingress_task = tokio::spawn(ingress.run());
        let mut control_task = tokio::spawn(control.run());

        // A server bailing out early (e.g. a failed bind) ends the daemon;
        // otherwise run until cancelled.
        enum First {
            Cancelled,
            Ingress(std::io::Result<()>),
            Control(std::io::Result<()>),
        }
        let first = tokio::select! {
            _ = token.cancelled() => First::Cancelled,
            result = &mut ingress_task => First::Ingress(flatten(result)),
            result = &mut control_task => First::Control(flatten(result)),
        };
        token.cancel();
        info!("shutting down");

        let result = match first {
            First::Cancelled => {
                let (ingress_result, control_result) = tokio::join!(ingress_task, control_task);
                flatten(ingress_result).and(flatten(control_result))
            }
            First::Ingress(finished) => finished.and(flatten(control_task.await)),
            First::Control(finished) => finished.and(flatten(ingress_task.await)),
        };

        // Stop persist workers after the servers wind down; each flushes
        // once more before its thread exits.
        self.registry.shutdown_all();

        result
    }
}
