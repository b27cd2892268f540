//! Client-side transport for [Hazelcast](https://hazelcast.com/).
//!
//! This crate ships framed requests to cluster members and correlates each
//! in-flight request with its response or event stream:
//!
//! - [`InvocationService`] assigns correlation IDs, routes requests to the
//!   owner of their partition, retries transient failures with backoff and
//!   enforces the invocation deadline.
//! - [`CorrelationRegistry`] matches responses, delivered in any order, to
//!   the requests waiting for them and dispatches listener events.
//! - [`TcpConnection`] and [`PartitionTable`] provide the network and
//!   routing collaborators; both sit behind traits so they can be replaced.
//! - [`Semaphore`] is a typed proxy built on the engine.
//!
//! ```rust,no_run
//! use hazelcast_transport::{InvocationConfig, TransportClient};
//! use std::net::SocketAddr;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InvocationConfig::builder()
//!         .invocation_timeout(Duration::from_secs(30))
//!         .retry(|r| r.max_attempts(3))
//!         .build()?;
//!     let member: SocketAddr = "127.0.0.1:5701".parse()?;
//!     let client = TransportClient::connect(config, &[member], 271).await?;
//!
//!     let semaphore = client.get_semaphore("gate");
//!     semaphore.init(2).await?;
//!     semaphore.acquire(1).await?;
//!     println!("{} permits left", semaphore.available_permits().await?);
//!
//!     client.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod cluster;
pub mod config;
pub mod connection;
pub mod invocation;
pub mod listener;
pub mod proxy;

pub use client::TransportClient;
pub use cluster::{PartitionRouter, PartitionTable};
pub use config::{
    ConfigError, InvocationConfig, InvocationConfigBuilder, RetryConfig, RetryConfigBuilder,
};
pub use connection::{Connection, ConnectionId, TcpConnection};
pub use hazelcast_protocol::{ClientMessage, HazelcastError, Result};
pub use invocation::{
    CorrelationRegistry, InvocationHandle, InvocationService, InvocationTarget, PendingInvocation,
};
pub use listener::{EventHandler, ListenerId, ListenerRegistration};
pub use proxy::Semaphore;
