//! Intra-cluster write forwarding.
//!
//! A node that receives points for a shard it does not own forwards them with a
//! [`ShardWriter`] to the owner, where a [`ShardWriteServer`] applies them to the
//! local [`ShardStore`].

#[macro_use]
extern crate async_trait;

pub mod config;
pub mod error;
pub mod meta;
pub mod pool;
pub mod rpc;
pub mod server;
pub mod store;
pub mod writer;


pub use config::Config;
pub use error::{ClusterError, Result};
pub use meta::{MetaClient, NodeInfo};
pub use server::{ServerStatistics, ShardWriteServer};
pub use store::ShardStore;
pub use writer::ShardWriter;
