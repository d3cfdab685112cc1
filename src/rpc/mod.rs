//! Request/response RPC over TCP
//!
//! Every service speaks the same framing ([`frame`]): the client sends one
//! request frame and receives one reply frame carrying
//! `Result<Response, WireError>`. A connection may carry any number of
//! such exchanges in sequence.
//!
//! [`serve`] runs one task per connection and bounds the number of
//! requests being handled at once with a semaphore, so a service behaves
//! like a fixed-size worker pool over shared state.

pub mod backup;
pub mod frame;
pub mod master;
pub mod minion;

use crate::error::{DeedsError, Result, WireError};
use async_trait::async_trait;
use frame::{read_frame, write_frame};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Reply envelope sent back for every request
pub type Reply<T> = std::result::Result<T, WireError>;

/// A request handler exposed over the wire
#[async_trait]
pub trait Service: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send + Sync;

    /// Name used in log lines
    const NAME: &'static str;

    async fn handle(&self, request: Self::Request) -> Result<Self::Response>;
}

/// Accept connections until `shutdown` resolves
pub async fn serve<S, F>(
    listener: TcpListener,
    service: Arc<S>,
    workers: usize,
    shutdown: F,
) -> Result<()>
where
    S: Service,
    F: Future<Output = ()> + Send,
{
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let local_addr = listener.local_addr()?;
    info!(service = S::NAME, addr = %local_addr, workers, "service listening");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let service = Arc::clone(&service);
                    let permits = Arc::clone(&permits);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, service, permits).await {
                            debug!(service = S::NAME, peer = %peer, error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    warn!(service = S::NAME, error = %e, "failed to accept connection");
                }
            },
            _ = &mut shutdown => {
                info!(service = S::NAME, "service stopped accepting connections");
                return Ok(());
            }
        }
    }
}

async fn handle_connection<S: Service>(
    mut socket: TcpStream,
    service: Arc<S>,
    permits: Arc<Semaphore>,
) -> Result<()> {
    socket.set_nodelay(true)?;

    while let Some(request) = read_frame::<_, S::Request>(&mut socket).await? {
        let reply: Reply<S::Response> = {
            let _permit = permits
                .acquire()
                .await
                .map_err(|_| DeedsError::Protocol("worker pool closed".to_string()))?;
            service.handle(request).await.map_err(|e| {
                debug!(service = S::NAME, error = %e, "request failed");
                WireError::from(&e)
            })
        };
        write_frame(&mut socket, &reply).await?;
    }

    Ok(())
}

/// Client side of a single service endpoint
#[derive(Debug, Clone)]
pub struct RpcClient {
    addr: String,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        RpcClient {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and wait for its reply
    ///
    /// Connection failures map to `Unreachable`, an elapsed timeout to
    /// `Timeout`, and remote errors to their original kind.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        let exchange = async {
            let mut stream =
                TcpStream::connect(&self.addr)
                    .await
                    .map_err(|e| DeedsError::Unreachable {
                        addr: self.addr.clone(),
                        reason: e.to_string(),
                    })?;
            stream.set_nodelay(true)?;

            write_frame(&mut stream, request).await?;
            let reply: Reply<Resp> =
                read_frame(&mut stream)
                    .await?
                    .ok_or_else(|| DeedsError::Unreachable {
                        addr: self.addr.clone(),
                        reason: "connection closed before reply".to_string(),
                    })?;
            reply.map_err(DeedsError::from)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(DeedsError::Timeout(format!(
                "no reply from {} within {:?}",
                self.addr, self.timeout
            ))),
        }
    }
}
