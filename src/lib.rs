//! # Deeds - A Small Distributed Block File Store
//!
//! `deeds` splits files into fixed-size blocks spread over storage daemons
//! ("minions"), with one control node owning all metadata:
//!
//! - **Control node** keeps the namespace (paths, attributes, block lists)
//!   in memory, allocates blocks and expires entries after a TTL
//! - **Storage daemons** store raw blocks and replicate them along a chain
//! - **Backup service** keeps the last namespace snapshot so the control
//!   node can recover after a restart
//!
//! All three speak a framed request/response protocol over TCP (see
//! [`rpc`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deeds::{MasterClient, MinionClient, Result};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<()> {
//! let master = MasterClient::new("localhost:50051", Duration::from_secs(30));
//! let minions = master.get_minions().await?;
//!
//! master.mkdir("/docs", 0o755).await?;
//! let blocks = master.write("/docs/readme.txt", 9).await?;
//!
//! for block in &blocks {
//!     let primary = MinionClient::new(&minions[&block.node_id], Duration::from_secs(30));
//!     let chain = block.replicas.iter().map(|id| minions[id].clone()).collect();
//!     primary.put(block.block_id, b"Hello Tim".to_vec(), chain).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod core;
pub mod error;
pub mod rpc;

pub use crate::config::{Environment, MasterConfig};
pub use crate::control::{ControlNode, NamespaceStore, StatFs};
pub use crate::core::namespace::entry::{Attributes, BlockDescriptor, BlockId, EntryAttributes};
pub use crate::core::namespace::Namespace;
pub use crate::core::snapshot::Snapshot;
pub use crate::error::{DeedsError, Result};
pub use crate::rpc::backup::BackupClient;
pub use crate::rpc::master::MasterClient;
pub use crate::rpc::minion::MinionClient;
