//! Main docbridge crate: a thin adapter between embedding hosts and a document store.
//!
//! The crate re-exports the core adapter types and adds the two ways to obtain one:
//!
//! - [`factory`] - async, URI-dispatched construction of connections and adapters
//! - [`host`] - a blocking, JSON-speaking client for hosts without an async runtime
//!
//! Every operation runs under a [`Scope`](scope::Scope) that bounds it with cancellation and
//! an optional deadline, and every failure is one of four
//! [`ErrorKind`](error::ErrorKind)s: connection, query, write or configuration.
//!
//! # Quick Start
//!
//! ```ignore
//! use docbridge::prelude::*;
//! use docbridge::bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> AdapterResult<()> {
//!     let adapter = open_adapter("memory://", "shop", "orders", ConnectSettings::new()).await?;
//!     let scope = Scope::with_timeout(std::time::Duration::from_secs(5));
//!
//!     let id = adapter.insert_one(&scope, doc! { "item": "pen" }, OperationOptions::new()).await?;
//!     let order = adapter.find_one(&scope, doc! { "_id": &id }, OperationOptions::new()).await?;
//!     assert!(order.is_some());
//!
//!     assert!(adapter.delete_one(&scope, doc! { "_id": &id }, OperationOptions::new()).await?);
//!     assert!(adapter.find_one(&scope, doc! { "_id": &id }, OperationOptions::new()).await?.is_none());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process store for development and testing (`memory://`)
//! - [`mongodb`] - MongoDB deployments (`mongodb://`, `mongodb+srv://`; requires the default
//!   `mongodb` feature)

pub mod factory;
pub mod host;
pub mod prelude;

pub use docbridge_core::{adapter, collection, config, connection, cursor, document, error, options, scope, translate, value};

// Re-export BSON types for convenience
pub use bson;

/// In-process store backend.
pub mod memory {
    pub use docbridge_memory::{MEMORY_SCHEME, MemoryConnection, MemoryConnectionBuilder};
}

/// MongoDB backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docbridge_mongodb::{MONGODB_SCHEMES, MongoConnection, MongoConnectionBuilder};
}
