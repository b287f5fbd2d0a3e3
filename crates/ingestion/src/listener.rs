//! TriggerListener - raw-byte trigger input over TCP
//!
//! Connections are served one at a time. Every positive byte is dispatched
//! straight away, bypassing the queue; a byte `<= 0`, end of stream, or a
//! read error ends the session and the next connection is accepted.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use contracts::{ListenerConfig, TriggerEvent};
use dispatcher::SharedDispatcher;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};

use crate::error::{IngestionError, Result};

/// Why a listener session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Non-positive byte received
    Sentinel(i8),
    /// Peer closed the connection
    Eof,
    /// Read failed
    ReadError,
}

/// Listener bound to its port
pub struct TriggerListener {
    listener: TcpListener,
    dispatcher: SharedDispatcher,
}

impl TriggerListener {
    /// Bind the listening socket
    pub async fn bind(config: &ListenerConfig, dispatcher: SharedDispatcher) -> Result<Self> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| IngestionError::Bind { address, source })?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections forever
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Serve connections until `shutdown` completes
    ///
    /// A session in progress is dropped when the shutdown fires.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "Listening for triggers");
        }

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.serve_session(stream, peer) => {}
            }
        }

        info!("Trigger listener stopped");
    }

    #[instrument(name = "listener_session", skip(self, stream), fields(%peer))]
    async fn serve_session(&self, stream: TcpStream, peer: SocketAddr) -> SessionEnd {
        info!("Accepted, now waiting for triggers...");
        let mut reader = BufReader::new(stream);
        let mut triggers: u64 = 0;

        let end = loop {
            let code = match reader.read_i8().await {
                Ok(code) => code,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break SessionEnd::Eof,
                Err(e) => {
                    warn!(error = %e, "Trigger read failed");
                    break SessionEnd::ReadError;
                }
            };

            let event = TriggerEvent::now(code);
            if event.is_sentinel() {
                break SessionEnd::Sentinel(code);
            }

            triggers += 1;
            observability::record_trigger_received("listener");
            if let Err(e) = self.dispatcher.dispatch(event).await {
                warn!(code, error = %e, "Trigger dispatch failed");
            }
        };

        observability::record_listener_session(triggers);
        debug!(?end, triggers, "Listener session ended");
        end
    }
}
