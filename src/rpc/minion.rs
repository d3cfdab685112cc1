//! Storage daemon protocol

use crate::core::block_store::{BlockStore, MinionTransport};
use crate::core::namespace::entry::BlockId;
use crate::error::{DeedsError, Result};
use crate::rpc::{RpcClient, Service};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MinionRequest {
    /// Store a block and relay it to `peers` in order
    Put {
        block_id: BlockId,
        data: Vec<u8>,
        peers: Vec<String>,
    },
    Get {
        block_id: BlockId,
    },
    DeleteBlock {
        block_id: BlockId,
    },
    /// Chain hop issued by an upstream daemon; same effect as `Put`
    Forward {
        block_id: BlockId,
        data: Vec<u8>,
        peers: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MinionResponse {
    Stored,
    Data(Vec<u8>),
    Deleted(bool),
}

pub struct MinionService {
    store: BlockStore,
}

impl MinionService {
    pub fn new(store: BlockStore) -> Self {
        MinionService { store }
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }
}

#[async_trait]
impl Service for MinionService {
    type Request = MinionRequest;
    type Response = MinionResponse;

    const NAME: &'static str = "minion";

    async fn handle(&self, request: MinionRequest) -> Result<MinionResponse> {
        match request {
            MinionRequest::Put {
                block_id,
                data,
                peers,
            }
            | MinionRequest::Forward {
                block_id,
                data,
                peers,
            } => {
                self.store.put(block_id, data, peers).await?;
                Ok(MinionResponse::Stored)
            }
            MinionRequest::Get { block_id } => Ok(MinionResponse::Data(self.store.get(block_id).await?)),
            MinionRequest::DeleteBlock { block_id } => {
                Ok(MinionResponse::Deleted(self.store.delete_block(block_id).await?))
            }
        }
    }
}

/// Typed client for one storage daemon
#[derive(Debug, Clone)]
pub struct MinionClient {
    rpc: RpcClient,
}

impl MinionClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        MinionClient {
            rpc: RpcClient::new(addr, timeout),
        }
    }

    pub async fn put(&self, block_id: BlockId, data: Vec<u8>, peers: Vec<String>) -> Result<()> {
        let request = MinionRequest::Put {
            block_id,
            data,
            peers,
        };
        self.expect_stored(&request).await
    }

    pub async fn forward(&self, block_id: BlockId, data: Vec<u8>, peers: Vec<String>) -> Result<()> {
        let request = MinionRequest::Forward {
            block_id,
            data,
            peers,
        };
        self.expect_stored(&request).await
    }

    pub async fn get(&self, block_id: BlockId) -> Result<Vec<u8>> {
        match self.rpc.call(&MinionRequest::Get { block_id }).await? {
            MinionResponse::Data(data) => Ok(data),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn delete_block(&self, block_id: BlockId) -> Result<bool> {
        match self.rpc.call(&MinionRequest::DeleteBlock { block_id }).await? {
            MinionResponse::Deleted(existed) => Ok(existed),
            other => Err(unexpected(&other)),
        }
    }

    async fn expect_stored(&self, request: &MinionRequest) -> Result<()> {
        match self.rpc.call(request).await? {
            MinionResponse::Stored => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &MinionResponse) -> DeedsError {
    DeedsError::Protocol(format!("unexpected minion response: {}", variant_name(response)))
}

fn variant_name(response: &MinionResponse) -> &'static str {
    match response {
        MinionResponse::Stored => "Stored",
        MinionResponse::Data(_) => "Data",
        MinionResponse::Deleted(_) => "Deleted",
    }
}

/// Reaches storage daemons over TCP, one connection per call
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        TcpTransport { timeout }
    }

    fn client(&self, addr: &str) -> MinionClient {
        MinionClient::new(addr, self.timeout)
    }
}

#[async_trait]
impl MinionTransport for TcpTransport {
    async fn put(&self, addr: &str, block_id: BlockId, data: Vec<u8>, peers: Vec<String>) -> Result<()> {
        self.client(addr).forward(block_id, data, peers).await
    }

    async fn get(&self, addr: &str, block_id: BlockId) -> Result<Vec<u8>> {
        self.client(addr).get(block_id).await
    }

    async fn delete_block(&self, addr: &str, block_id: BlockId) -> Result<bool> {
        self.client(addr).delete_block(block_id).await
    }
}
