use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::server::run_session;
use super::utils::{EventSender, emit};
use crate::config::ServerConfig;
use crate::{AppEvent, TransferError};

/// A failure that ends the current listening socket
#[derive(Debug, Error)]
pub enum SessionFault {
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("session with {peer} failed: {source}")]
    Session {
        peer: SocketAddr,
        #[source]
        source: TransferError,
    },
}

/// Sequential TCP server: one session at a time, restarted after faults
pub struct Listener {
    config: ServerConfig,
    socket: Option<TcpListener>,
    local_addr: SocketAddr,
    event_tx: EventSender,
    shutdown: CancellationToken,
}

impl Listener {
    /// Bind the configured port on every interface
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let socket = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind port {}", config.port))?;
        let local_addr = socket.local_addr()?;
        info!("Port opened: {}", local_addr);

        Ok(Self {
            config,
            socket: Some(socket),
            local_addr,
            event_tx: None,
            shutdown: CancellationToken::new(),
        })
    }

    /// Forward progress and session events to a console
    pub fn with_events(mut self, event_tx: mpsc::Sender<AppEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the listener once the running session is done
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve sessions until shutdown
    ///
    /// A session fault drops the listening socket and binds it again. Only
    /// consecutive bind failures are bounded by the restart policy.
    pub async fn run(mut self) -> Result<()> {
        let policy = self.config.restart;
        let mut bind_failures = 0u32;

        loop {
            let socket = match self.socket.take() {
                Some(s) => s,
                None => match TcpListener::bind(self.local_addr).await {
                    Ok(s) => {
                        bind_failures = 0;
                        info!("Listener restarted on {}", self.local_addr);
                        emit(
                            &self.event_tx,
                            AppEvent::Status(format!("Listener restarted on {}", self.local_addr)),
                        );
                        s
                    }
                    Err(e) => {
                        bind_failures += 1;
                        error!(
                            "Rebind of {} failed ({}/{}): {}",
                            self.local_addr, bind_failures, policy.max_consecutive_faults, e
                        );
                        if bind_failures >= policy.max_consecutive_faults {
                            bail!(
                                "Giving up on {} after {} failed binds: {}",
                                self.local_addr,
                                bind_failures,
                                e
                            );
                        }
                        if !self.pause(policy.backoff).await {
                            return Ok(());
                        }
                        continue;
                    }
                },
            };

            match self.serve(&socket).await {
                Ok(()) => {
                    info!("Listener on {} stopped", self.local_addr);
                    return Ok(());
                }
                Err(fault) => {
                    error!("{}", fault);
                    emit(&self.event_tx, AppEvent::Error(fault.to_string()));
                    drop(socket);
                    if !self.pause(policy.backoff).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleep before a restart; false when shutdown was requested meanwhile
    async fn pause(&self, backoff: std::time::Duration) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if backoff.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(backoff) => true,
        }
    }

    async fn serve(&self, socket: &TcpListener) -> Result<(), SessionFault> {
        info!("Waiting for clients on {}...", self.local_addr);

        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                accepted = socket.accept() => accepted.map_err(SessionFault::Accept)?,
            };

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Could not disable Nagle for {}: {}", peer, e);
            }
            info!("Client {} connected", peer);
            emit(&self.event_tx, AppEvent::ClientConnected { peer });

            let outcome = run_session(stream, peer, &self.config, &self.event_tx).await;
            emit(&self.event_tx, AppEvent::SessionClosed { peer });

            match outcome {
                Ok(summary) => {
                    info!(
                        "Client {} served {} ({}, {} bytes)",
                        peer,
                        summary.entry,
                        summary.mode,
                        summary.declared_size
                    );
                    emit(&self.event_tx, AppEvent::TransferCompleted(summary.entry));
                }
                Err(source) => {
                    if source.is_connection_lost() {
                        warn!("Client {} went away mid-session", peer);
                    }
                    return Err(SessionFault::Session { peer, source });
                }
            }
        }
    }
}
