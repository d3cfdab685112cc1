//! End-to-end tests over TCP: backup, three storage daemons and a control node
//!
//! Clients drive the data path themselves: ask the control node for block
//! descriptors, then push each block to its primary with the replica chain.

use deeds::config::MasterConfig;
use deeds::control::ControlNode;
use deeds::core::backup_store::BackupStore;
use deeds::core::block_store::BlockStore;
use deeds::rpc::backup::BackupService;
use deeds::rpc::minion::{MinionService, TcpTransport};
use deeds::rpc::{serve, Service};
use deeds::{BlockDescriptor, DeedsError, MasterClient, MinionClient, Result};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_service<S, F>(service: Arc<S>, shutdown: F) -> (String, JoinHandle<Result<()>>)
where
    S: Service,
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(serve(listener, service, 4, shutdown));
    (addr, handle)
}

struct Master {
    node: ControlNode,
    client: MasterClient,
    stop: oneshot::Sender<()>,
    server: JoinHandle<Result<()>>,
}

impl Master {
    async fn start(config: MasterConfig, backup_addr: &str) -> Self {
        let node = ControlNode::start(config, backup_addr).await.unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let (addr, server) = spawn_service(node.service(), async move {
            let _ = stopped.await;
        })
        .await;
        Master {
            node,
            client: MasterClient::new(addr, TIMEOUT),
            stop,
            server,
        }
    }

    /// Stop serving and push the final snapshot
    async fn stop(self) -> bool {
        let _ = self.stop.send(());
        self.server.await.unwrap().unwrap();
        self.node.shutdown().await
    }
}

struct Cluster {
    _dirs: Vec<TempDir>,
    backup_addr: String,
    minions: BTreeMap<String, String>,
    config: MasterConfig,
}

impl Cluster {
    async fn start(block_size: u64, replication_factor: usize) -> Self {
        let mut dirs = Vec::new();

        let backup_dir = TempDir::new().unwrap();
        let backup = Arc::new(BackupStore::open(backup_dir.path().join("deeds.backup")).unwrap());
        let (backup_addr, _) =
            spawn_service(Arc::new(BackupService::new(backup)), std::future::pending()).await;
        dirs.push(backup_dir);

        let mut minions = BTreeMap::new();
        for id in ["m1", "m2", "m3"] {
            let dir = TempDir::new().unwrap();
            let transport = Arc::new(TcpTransport::new(TIMEOUT));
            let store = BlockStore::open(dir.path(), 1, transport).await.unwrap();
            let (addr, _) =
                spawn_service(Arc::new(MinionService::new(store)), std::future::pending()).await;
            minions.insert(id.to_string(), addr);
            dirs.push(dir);
        }

        let config = MasterConfig {
            block_size,
            replication_factor,
            minions: minions
                .iter()
                .map(|(id, addr)| format!("{}:{}", id, addr))
                .collect(),
            expiry_tick_ms: 50,
            rpc_timeout_ms: 5_000,
            ..MasterConfig::default()
        };

        Cluster {
            _dirs: dirs,
            backup_addr,
            minions,
            config,
        }
    }

    async fn master(&self) -> Master {
        Master::start(self.config.clone(), &self.backup_addr).await
    }

    fn minion(&self, node: &str) -> MinionClient {
        MinionClient::new(&self.minions[node], TIMEOUT)
    }

    async fn put_file(&self, master: &MasterClient, path: &str, data: &[u8]) -> Vec<BlockDescriptor> {
        let blocks = master.write(path, data.len() as u64).await.unwrap();
        let chunks = data.chunks(self.config.block_size as usize);
        for (block, chunk) in blocks.iter().zip(chunks) {
            let chain = block.replicas.iter().map(|id| self.minions[id].clone()).collect();
            self.minion(&block.node_id)
                .put(block.block_id, chunk.to_vec(), chain)
                .await
                .unwrap();
        }
        blocks
    }

    async fn read_file(&self, master: &MasterClient, path: &str) -> Vec<u8> {
        let mut data = Vec::new();
        for block in master.read(path).await.unwrap() {
            data.extend(self.minion(&block.node_id).get(block.block_id).await.unwrap());
        }
        data
    }

    /// Wait until no daemon in the block's chain holds it
    async fn wait_reclaimed(&self, block: &BlockDescriptor) {
        for _ in 0..100 {
            let mut held = false;
            for node in block.nodes() {
                if self.minion(node).get(block.block_id).await.is_ok() {
                    held = true;
                }
            }
            if !held {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("block {} was never reclaimed", block.block_id);
    }
}

#[tokio::test]
async fn test_docs_scenario() {
    let cluster = Cluster::start(4, 1).await;
    let master = cluster.master().await;
    let client = &master.client;

    client.mkdir("/docs", 0o755).await.unwrap();
    let blocks = cluster.put_file(client, "/docs/readme.txt", b"Hello Tim").await;
    assert_eq!(blocks.len(), 3);

    assert_eq!(cluster.read_file(client, "/docs/readme.txt").await, b"Hello Tim");
    assert_eq!(client.get_list_of_files("/docs").await.unwrap(), vec!["readme.txt"]);

    let (_, attrs) = client.get_file_table_entry("/docs/readme.txt").await.unwrap();
    assert_eq!(attrs.stat.st_size, 9);
    let (_, docs) = client.get_file_table_entry("/docs").await.unwrap();
    assert_eq!(docs.stat.st_nlink, 2);
    assert!(docs.children.unwrap().contains("readme.txt"));

    assert_eq!(client.get_block_size().await.unwrap(), 4);
    assert_eq!(client.get_minions().await.unwrap(), cluster.minions);
}

#[tokio::test]
async fn test_chain_replicates_to_every_daemon() {
    let cluster = Cluster::start(16, 3).await;
    let master = cluster.master().await;

    let blocks = cluster.put_file(&master.client, "/replicated", b"three copies").await;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].nodes().count(), 3);

    for node in cluster.minions.keys() {
        let data = cluster.minion(node).get(blocks[0].block_id).await.unwrap();
        assert_eq!(data, b"three copies");
    }
}

#[tokio::test]
async fn test_shrink_reclaims_tail_blocks() {
    let cluster = Cluster::start(4, 2).await;
    let master = cluster.master().await;
    let client = &master.client;

    let blocks = cluster.put_file(client, "/log", b"0123456789ab").await;
    assert_eq!(blocks.len(), 3);

    let kept = client.write("/log", 4).await.unwrap();
    assert_eq!(kept, blocks[..1].to_vec());
    for block in &blocks[1..] {
        cluster.wait_reclaimed(block).await;
    }
    assert_eq!(cluster.read_file(client, "/log").await, b"0123");
}

#[tokio::test]
async fn test_delete_reclaims_blocks() {
    let cluster = Cluster::start(4, 1).await;
    let master = cluster.master().await;
    let client = &master.client;

    client.mkdir("/tmp", 0o755).await.unwrap();
    let blocks = cluster.put_file(client, "/tmp/scratch", b"scratch data").await;

    assert_eq!(client.delete("/tmp").await.unwrap(), blocks);
    for block in &blocks {
        cluster.wait_reclaimed(block).await;
    }
    assert!(matches!(client.read("/tmp/scratch").await, Err(DeedsError::NotFound(_))));
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let cluster = Cluster::start(4, 1).await;
    let master = cluster.master().await;
    let client = &master.client;

    let blocks = cluster.put_file(client, "/ephemeral", b"gone soon").await;
    cluster.put_file(client, "/durable", b"stays").await;
    client.set_expire_time("/ephemeral", 1).await.unwrap();
    client.set_expire_time("/durable", -1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(matches!(client.read("/ephemeral").await, Err(DeedsError::NotFound(_))));
    assert_eq!(cluster.read_file(client, "/durable").await, b"stays");
    for block in &blocks {
        cluster.wait_reclaimed(block).await;
    }
}

#[tokio::test]
async fn test_restart_recovers_from_backup() {
    let cluster = Cluster::start(4, 2).await;

    let master = cluster.master().await;
    master.client.mkdir("/docs", 0o755).await.unwrap();
    let blocks = cluster.put_file(&master.client, "/docs/readme.txt", b"Hello Tim").await;
    let before = master.client.get_file_table_entry("/docs").await.unwrap();
    assert!(master.stop().await);

    let master = cluster.master().await;
    assert_eq!(master.client.read("/docs/readme.txt").await.unwrap(), blocks);
    assert_eq!(
        master.client.get_file_table_entry("/docs").await.unwrap().1,
        before.1
    );
    assert_eq!(cluster.read_file(&master.client, "/docs/readme.txt").await, b"Hello Tim");
}

#[tokio::test]
async fn test_statfs_counts_copies() {
    let cluster = Cluster::start(4, 2).await;
    let master = cluster.master().await;

    master.client.write("/f", 8).await.unwrap();
    let stats = master.client.statfs().await.unwrap();

    assert_eq!(stats.block_size, 4);
    assert_eq!(stats.total_blocks, cluster.config.blocks_per_minion * 3);
    assert_eq!(stats.total_blocks - stats.free_blocks, 4);
    assert_eq!(stats.total_files - stats.free_files, 2);
}
