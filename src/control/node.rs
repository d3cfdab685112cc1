//! Control node lifecycle
//!
//! Startup restores the namespace from the backup service (falling back to
//! an empty one), then wires the expiry timer, the reclamation worker and
//! the request service together. Shutdown pushes a final snapshot.

use crate::config::MasterConfig;
use crate::control::reclaim::Reclaimer;
use crate::control::store::NamespaceStore;
use crate::core::block_store::MinionTransport;
use crate::core::expiry::ExpiryTimer;
use crate::core::namespace::Namespace;
use crate::core::registry::MinionRegistry;
use crate::error::Result;
use crate::rpc::backup::BackupClient;
use crate::rpc::master::MasterService;
use crate::rpc::minion::TcpTransport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct ControlNode {
    store: Arc<NamespaceStore>,
    backup: BackupClient,
    tasks: Vec<JoinHandle<()>>,
}

impl ControlNode {
    /// Restore state and start background tasks, reaching storage daemons
    /// over TCP
    pub async fn start(config: MasterConfig, backup_addr: &str) -> Result<Self> {
        let transport = Arc::new(TcpTransport::new(config.rpc_timeout()));
        Self::start_with_transport(config, backup_addr, transport).await
    }

    pub async fn start_with_transport(
        config: MasterConfig,
        backup_addr: &str,
        transport: Arc<dyn MinionTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(MinionRegistry::parse(&config.minions)?);
        let backup = BackupClient::new(backup_addr, config.rpc_timeout());

        let namespace = recover(&backup, config.block_size).await;
        info!(
            entries = namespace.len(),
            minions = registry.len(),
            block_size = config.block_size,
            "control node state ready"
        );

        let expiry = Arc::new(ExpiryTimer::new());
        let (reclaimer, reclaim_task) = Reclaimer::spawn(Arc::clone(&registry), transport);
        let tick = config.expiry_tick();
        let store = Arc::new(NamespaceStore::new(
            namespace,
            config,
            registry,
            Arc::clone(&expiry),
            reclaimer,
        ));

        let (expired, timer_task) = expiry.spawn(tick);
        let listener_task = spawn_expiry_listener(Arc::clone(&store), expired);

        Ok(ControlNode {
            store,
            backup,
            tasks: vec![timer_task, listener_task, reclaim_task],
        })
    }

    pub fn store(&self) -> &Arc<NamespaceStore> {
        &self.store
    }

    pub fn service(&self) -> Arc<MasterService> {
        Arc::new(MasterService::new(Arc::clone(&self.store)))
    }

    /// Push the current snapshot to the backup service
    pub async fn checkpoint(&self) -> Result<()> {
        let snapshot = self.store.snapshot();
        let entries = snapshot.len();
        self.backup.update_snapshot(snapshot).await?;
        info!(entries, backup = %self.backup.addr(), "snapshot pushed to backup");
        Ok(())
    }

    /// Stop background work and push a final snapshot
    ///
    /// Returns `false` if the backup could not be reached; the namespace is
    /// lost in that case.
    pub async fn shutdown(self) -> bool {
        for task in &self.tasks {
            task.abort();
        }

        match self.checkpoint().await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    backup = %self.backup.addr(),
                    error = %e,
                    "backup server not reachable, control node memory lost"
                );
                false
            }
        }
    }
}

/// Load the namespace from the backup service, or start empty
async fn recover(backup: &BackupClient, block_size: u64) -> Namespace {
    match backup.get_snapshot().await {
        Ok(Some(snapshot)) => {
            let entries = snapshot.len();
            match Namespace::from_snapshot(snapshot, block_size) {
                Ok(namespace) => {
                    info!(entries, backup = %backup.addr(), "namespace restored from backup");
                    namespace
                }
                Err(e) => {
                    warn!(error = %e, "backup snapshot unusable, starting with empty namespace");
                    Namespace::new(block_size)
                }
            }
        }
        Ok(None) => {
            info!(backup = %backup.addr(), "backup holds no snapshot, starting with empty namespace");
            Namespace::new(block_size)
        }
        Err(e) => {
            warn!(
                backup = %backup.addr(),
                error = %e,
                "backup server not reachable, starting with empty namespace"
            );
            Namespace::new(block_size)
        }
    }
}

/// Delete paths as the timer reports them
fn spawn_expiry_listener(
    store: Arc<NamespaceStore>,
    mut expired: mpsc::UnboundedReceiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(path) = expired.recv().await {
            match store.expire(&path) {
                Ok(true) => {}
                Ok(false) => debug!(path = %path, "expiry skipped"),
                Err(e) => warn!(path = %path, error = %e, "expiry deletion failed"),
            }
        }
    })
}
