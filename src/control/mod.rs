//! Control node: namespace metadata, block allocation and expiry

pub mod node;
pub mod reclaim;
pub mod store;

pub use node::ControlNode;
pub use reclaim::Reclaimer;
pub use store::{NamespaceStore, StatFs};
