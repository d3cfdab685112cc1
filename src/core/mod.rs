//! Storage and metadata engines shared by the services

pub mod allocator;
pub mod backup_store;
pub mod block_store;
pub mod expiry;
pub mod namespace;
pub mod registry;
pub mod snapshot;
