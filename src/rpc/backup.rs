//! Backup service protocol

use crate::core::backup_store::BackupStore;
use crate::core::snapshot::Snapshot;
use crate::error::{DeedsError, Result};
use crate::rpc::{RpcClient, Service};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackupRequest {
    GetSnapshot,
    UpdateSnapshot(Snapshot),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackupResponse {
    Snapshot(Option<Snapshot>),
    Ack,
}

pub struct BackupService {
    store: Arc<BackupStore>,
}

impl BackupService {
    pub fn new(store: Arc<BackupStore>) -> Self {
        BackupService { store }
    }
}

#[async_trait]
impl Service for BackupService {
    type Request = BackupRequest;
    type Response = BackupResponse;

    const NAME: &'static str = "backup";

    async fn handle(&self, request: BackupRequest) -> Result<BackupResponse> {
        match request {
            BackupRequest::GetSnapshot => Ok(BackupResponse::Snapshot(self.store.snapshot())),
            BackupRequest::UpdateSnapshot(snapshot) => {
                let store = Arc::clone(&self.store);
                tokio::task::spawn_blocking(move || store.update(snapshot))
                    .await
                    .map_err(|e| DeedsError::Protocol(format!("snapshot writer panicked: {}", e)))??;
                Ok(BackupResponse::Ack)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupClient {
    rpc: RpcClient,
}

impl BackupClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        BackupClient {
            rpc: RpcClient::new(addr, timeout),
        }
    }

    pub fn addr(&self) -> &str {
        self.rpc.addr()
    }

    pub async fn get_snapshot(&self) -> Result<Option<Snapshot>> {
        match self.rpc.call(&BackupRequest::GetSnapshot).await? {
            BackupResponse::Snapshot(snapshot) => Ok(snapshot),
            BackupResponse::Ack => Err(DeedsError::Protocol(
                "backup acknowledged a snapshot request".to_string(),
            )),
        }
    }

    pub async fn update_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        match self.rpc.call(&BackupRequest::UpdateSnapshot(snapshot)).await? {
            BackupResponse::Ack => Ok(()),
            BackupResponse::Snapshot(_) => Err(DeedsError::Protocol(
                "backup returned a snapshot for an update".to_string(),
            )),
        }
    }
}
