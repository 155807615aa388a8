//! Request/response client and connection pool.
//!
//! Connections are strictly sequential: one request in flight at a time,
//! responses matched by order. Callers that need concurrency borrow several
//! clients from the pool.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::ClientCodec;
use crate::error::ProtoError;
use crate::messages::{Request, Response};

/// A connection to a peer speaking the darter wire protocol.
pub struct RpcClient {
    framed: Framed<TcpStream, ClientCodec>,
    peer: SocketAddr,
}

impl RpcClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, ProtoError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            framed: Framed::new(stream, ClientCodec::new()),
            peer: addr,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Issue one request and wait for the peer's answer.
    pub async fn call(&mut self, request: Request) -> Result<Response, ProtoError> {
        self.framed.send(request).await?;
        match self.framed.next().await {
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(e.into()),
            None => Err(ProtoError::ConnectionClosed),
        }
    }
}

/// Idle connections keyed by peer address.
///
/// `borrow` hands out an existing idle client or dials a new one on a miss.
/// Only healthy clients go back via `give_back`; a client that saw an error
/// is simply dropped, so the next borrow dials a fresh connection.
pub struct ClientPool {
    idle: Mutex<HashMap<SocketAddr, Vec<RpcClient>>>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub async fn borrow(&self, addr: SocketAddr) -> Result<RpcClient, ProtoError> {
        let pooled = self
            .idle
            .lock()
            .unwrap()
            .get_mut(&addr)
            .and_then(Vec::pop);
        if let Some(client) = pooled {
            return Ok(client);
        }
        debug!(peer = %addr, "Dialing new connection");
        RpcClient::connect(addr).await
    }

    pub fn give_back(&self, client: RpcClient) {
        self.idle
            .lock()
            .unwrap()
            .entry(client.peer())
            .or_default()
            .push(client);
    }

    /// Number of idle connections held for `addr` (for tests and metrics).
    pub fn idle_count(&self, addr: SocketAddr) -> usize {
        self.idle
            .lock()
            .unwrap()
            .get(&addr)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new()
    }
}
