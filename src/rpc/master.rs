//! Control node protocol
//!
//! One request variant per namespace operation. Successful replies carry
//! the variant matching the request; errors travel as [`WireError`]s and
//! are rebuilt into [`DeedsError`]s on the client.
//!
//! [`WireError`]: crate::error::WireError

use crate::control::store::{NamespaceStore, StatFs};
use crate::core::namespace::entry::{BlockDescriptor, EntryAttributes};
use crate::core::registry::NodeId;
use crate::error::{DeedsError, Result};
use crate::rpc::{RpcClient, Service};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MasterRequest {
    Create { path: String, mode: u32 },
    Mkdir { path: String, mode: u32 },
    Delete { path: String },
    Rename { src: String, dest: String },
    Read { path: String },
    Write { path: String, size: u64 },
    GetFileTableEntry { path: String },
    GetListOfFiles { path: String },
    GetBlockSize,
    GetMinions,
    Statfs,
    SetExpireTime { path: String, ttl: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MasterResponse {
    Path(String),
    Blocks(Vec<BlockDescriptor>),
    Entry {
        blocks: Vec<BlockDescriptor>,
        attrs: EntryAttributes,
    },
    Names(Vec<String>),
    BlockSize(u64),
    Minions(BTreeMap<NodeId, String>),
    Statfs(StatFs),
    Ack,
}

impl MasterResponse {
    fn kind(&self) -> &'static str {
        match self {
            MasterResponse::Path(_) => "Path",
            MasterResponse::Blocks(_) => "Blocks",
            MasterResponse::Entry { .. } => "Entry",
            MasterResponse::Names(_) => "Names",
            MasterResponse::BlockSize(_) => "BlockSize",
            MasterResponse::Minions(_) => "Minions",
            MasterResponse::Statfs(_) => "Statfs",
            MasterResponse::Ack => "Ack",
        }
    }
}

pub struct MasterService {
    store: Arc<NamespaceStore>,
}

impl MasterService {
    pub fn new(store: Arc<NamespaceStore>) -> Self {
        MasterService { store }
    }
}

#[async_trait]
impl Service for MasterService {
    type Request = MasterRequest;
    type Response = MasterResponse;

    const NAME: &'static str = "master";

    async fn handle(&self, request: MasterRequest) -> Result<MasterResponse> {
        let store = &self.store;
        let response = match request {
            MasterRequest::Create { path, mode } => MasterResponse::Path(store.create(&path, mode)?),
            MasterRequest::Mkdir { path, mode } => MasterResponse::Path(store.mkdir(&path, mode)?),
            MasterRequest::Delete { path } => MasterResponse::Blocks(store.delete(&path)?),
            MasterRequest::Rename { src, dest } => MasterResponse::Path(store.rename(&src, &dest)?),
            MasterRequest::Read { path } => MasterResponse::Blocks(store.read(&path)?),
            MasterRequest::Write { path, size } => MasterResponse::Blocks(store.write(&path, size)?),
            MasterRequest::GetFileTableEntry { path } => {
                let (blocks, attrs) = store.entry(&path)?;
                MasterResponse::Entry { blocks, attrs }
            }
            MasterRequest::GetListOfFiles { path } => MasterResponse::Names(store.list(&path)?),
            MasterRequest::GetBlockSize => MasterResponse::BlockSize(store.block_size()),
            MasterRequest::GetMinions => MasterResponse::Minions(store.minions()),
            MasterRequest::Statfs => MasterResponse::Statfs(store.statfs()),
            MasterRequest::SetExpireTime { path, ttl } => {
                store.set_expire_time(&path, ttl)?;
                MasterResponse::Ack
            }
        };
        Ok(response)
    }
}

/// Typed client for the control node
#[derive(Debug, Clone)]
pub struct MasterClient {
    rpc: RpcClient,
}

macro_rules! expect {
    ($response:expr, $pattern:pat => $value:expr) => {
        match $response {
            $pattern => Ok($value),
            other => Err(DeedsError::Protocol(format!(
                "unexpected master response: {}",
                other.kind()
            ))),
        }
    };
}

impl MasterClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        MasterClient {
            rpc: RpcClient::new(addr, timeout),
        }
    }

    async fn call(&self, request: MasterRequest) -> Result<MasterResponse> {
        self.rpc.call(&request).await
    }

    pub async fn create(&self, path: &str, mode: u32) -> Result<String> {
        let response = self
            .call(MasterRequest::Create {
                path: path.to_string(),
                mode,
            })
            .await?;
        expect!(response, MasterResponse::Path(p) => p)
    }

    pub async fn mkdir(&self, path: &str, mode: u32) -> Result<String> {
        let response = self
            .call(MasterRequest::Mkdir {
                path: path.to_string(),
                mode,
            })
            .await?;
        expect!(response, MasterResponse::Path(p) => p)
    }

    /// Returns the blocks released by the deletion
    pub async fn delete(&self, path: &str) -> Result<Vec<BlockDescriptor>> {
        let response = self
            .call(MasterRequest::Delete {
                path: path.to_string(),
            })
            .await?;
        expect!(response, MasterResponse::Blocks(b) => b)
    }

    pub async fn rename(&self, src: &str, dest: &str) -> Result<String> {
        let response = self
            .call(MasterRequest::Rename {
                src: src.to_string(),
                dest: dest.to_string(),
            })
            .await?;
        expect!(response, MasterResponse::Path(p) => p)
    }

    pub async fn read(&self, path: &str) -> Result<Vec<BlockDescriptor>> {
        let response = self
            .call(MasterRequest::Read {
                path: path.to_string(),
            })
            .await?;
        expect!(response, MasterResponse::Blocks(b) => b)
    }

    pub async fn write(&self, path: &str, size: u64) -> Result<Vec<BlockDescriptor>> {
        let response = self
            .call(MasterRequest::Write {
                path: path.to_string(),
                size,
            })
            .await?;
        expect!(response, MasterResponse::Blocks(b) => b)
    }

    pub async fn get_file_table_entry(
        &self,
        path: &str,
    ) -> Result<(Vec<BlockDescriptor>, EntryAttributes)> {
        let response = self
            .call(MasterRequest::GetFileTableEntry {
                path: path.to_string(),
            })
            .await?;
        expect!(response, MasterResponse::Entry { blocks, attrs } => (blocks, attrs))
    }

    pub async fn get_list_of_files(&self, path: &str) -> Result<Vec<String>> {
        let response = self
            .call(MasterRequest::GetListOfFiles {
                path: path.to_string(),
            })
            .await?;
        expect!(response, MasterResponse::Names(n) => n)
    }

    pub async fn get_block_size(&self) -> Result<u64> {
        let response = self.call(MasterRequest::GetBlockSize).await?;
        expect!(response, MasterResponse::BlockSize(s) => s)
    }

    pub async fn get_minions(&self) -> Result<BTreeMap<NodeId, String>> {
        let response = self.call(MasterRequest::GetMinions).await?;
        expect!(response, MasterResponse::Minions(m) => m)
    }

    pub async fn statfs(&self) -> Result<StatFs> {
        let response = self.call(MasterRequest::Statfs).await?;
        expect!(response, MasterResponse::Statfs(s) => s)
    }

    pub async fn set_expire_time(&self, path: &str, ttl: i64) -> Result<()> {
        let response = self
            .call(MasterRequest::SetExpireTime {
                path: path.to_string(),
                ttl,
            })
            .await?;
        expect!(response, MasterResponse::Ack => ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterConfig;
    use crate::control::reclaim::Reclaimer;
    use crate::core::expiry::ExpiryTimer;
    use crate::core::namespace::Namespace;
    use crate::core::registry::MinionRegistry;
    use crate::rpc::serve;
    use tokio::net::TcpListener;

    async fn start() -> MasterClient {
        let config = MasterConfig {
            block_size: 16,
            minions: vec!["A:127.0.0.1:1".to_string()],
            ..MasterConfig::default()
        };
        let registry = Arc::new(MinionRegistry::parse(&config.minions).unwrap());
        let (reclaimer, _rx) = Reclaimer::channel();
        let store = Arc::new(NamespaceStore::new(
            Namespace::new(config.block_size),
            config,
            registry,
            Arc::new(ExpiryTimer::new()),
            reclaimer,
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve(
            listener,
            Arc::new(MasterService::new(store)),
            4,
            std::future::pending(),
        ));
        MasterClient::new(addr, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_namespace_round_trip() {
        let client = start().await;

        assert_eq!(client.mkdir("/docs", 0o755).await.unwrap(), "/docs");
        let blocks = client.write("/docs/a.txt", 40).await.unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(client.read("/docs/a.txt").await.unwrap(), blocks);

        let (entry_blocks, attrs) = client.get_file_table_entry("/docs/a.txt").await.unwrap();
        assert_eq!(entry_blocks, blocks);
        assert_eq!(attrs.stat.st_size, 40);

        assert_eq!(client.get_list_of_files("/docs").await.unwrap(), vec!["a.txt"]);
        assert_eq!(client.get_block_size().await.unwrap(), 16);
        assert_eq!(client.get_minions().await.unwrap().get("A").unwrap(), "127.0.0.1:1");

        assert_eq!(client.rename("/docs", "/papers").await.unwrap(), "/papers");
        assert_eq!(client.delete("/papers").await.unwrap(), blocks);
        assert!(client.get_list_of_files("/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_errors_keep_their_kind() {
        let client = start().await;

        client.create("/f", 0o644).await.unwrap();
        assert!(matches!(
            client.create("/f", 0o644).await,
            Err(DeedsError::AlreadyExists(_))
        ));
        assert!(matches!(client.read("/missing").await, Err(DeedsError::NotFound(_))));
        assert!(matches!(
            client.get_list_of_files("/f").await,
            Err(DeedsError::NotADirectory(_))
        ));
        assert!(matches!(
            client.set_expire_time("/missing", 5).await,
            Err(DeedsError::NotFound(_))
        ));
        client.set_expire_time("/f", 60).await.unwrap();
        client.set_expire_time("/f", i64::MAX).await.unwrap();

        // The server keeps answering after an oversized write
        assert!(matches!(
            client.write("/big", u64::MAX).await,
            Err(DeedsError::FileTooLarge(_))
        ));
        assert!(matches!(client.read("/big").await, Err(DeedsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_statfs_over_wire() {
        let client = start().await;
        client.write("/f", 32).await.unwrap();

        let stats = client.statfs().await.unwrap();
        assert_eq!(stats.block_size, 16);
        assert_eq!(stats.total_blocks - stats.free_blocks, 2);
        assert_eq!(stats.total_files - stats.free_files, 2);
    }
}
