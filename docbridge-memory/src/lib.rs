//! In-process document store backend for docbridge.
//!
//! [`MemoryConnection`] implements the core [`Connection`](docbridge_core::connection::Connection)
//! trait over documents held in memory behind an async-aware read-write lock. It understands
//! the common subset of the store's query language:
//!
//! - **Filters** - implicit equality, dotted paths, `$eq` `$ne` `$gt` `$gte` `$lt` `$lte` `$in`
//!   `$nin` `$exists` `$size` `$not`, and the `$and` `$or` `$nor` combinators
//! - **Updates** - `$set` `$unset` `$inc` `$push` `$setOnInsert` `$rename`, with upserts
//! - **Aggregation** - `$match` `$sort` `$skip` `$limit` `$project` `$unset` `$count`
//!
//! Anything else is rejected the way a server rejects an unknown operator. The backend is
//! served for `memory://` URIs, which accept a `latencyMs` query parameter to delay every call.
//!
//! # Quick Start
//!
//! ```ignore
//! use docbridge_core::connection::{Connection, ConnectionBuilder};
//! use docbridge_memory::MemoryConnection;
//!
//! let connection = MemoryConnection::builder().connect().await?;
//! connection.ping().await?;
//! ```

pub mod connection;
mod evaluator;
mod pipeline;
mod update;

pub use connection::{MEMORY_SCHEME, MemoryConnection, MemoryConnectionBuilder};
