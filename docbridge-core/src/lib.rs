//! Core of the docbridge document store adapter.
//!
//! This crate shields an embedding host from a document store driver's strongly-typed API.
//! Callers hand in loosely-typed filters, update documents and pipelines; they get back plain
//! documents, counts, identifiers or a normalized [`AdapterError`](error::AdapterError).
//!
//! - **Connections** ([`connection`]) - The [`Connection`](connection::Connection) trait every
//!   store backend implements, and the [`ConnectionBuilder`](connection::ConnectionBuilder)
//!   factory trait that establishes one
//! - **Collection handles** ([`collection`]) - A connection bound to a database and collection
//! - **Adapter** ([`adapter`]) - One operation per supported command
//! - **Result translation** ([`translate`]) - Store outcomes and failures into caller values
//! - **Execution scope** ([`scope`]) - Cancellation and deadlines for every call
//! - **Cursors** ([`cursor`]) - Lazy, uncapped result sequences for `find` and `aggregate`
//! - **Values** ([`document`], [`value`]) - Documents, identifiers and the JSON bridge
//! - **Options** ([`options`]) and **settings** ([`config`])
//! - **Errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use docbridge_core::{adapter::DocumentAdapter, collection::CollectionHandle, scope::Scope};
//! use bson::doc;
//!
//! # async fn example(connection: impl docbridge_core::connection::Connection) -> docbridge_core::error::AdapterResult<()> {
//! let adapter = DocumentAdapter::new(CollectionHandle::bind(&connection, "app", "users"));
//! let scope = Scope::with_timeout(std::time::Duration::from_secs(5));
//!
//! let id = adapter.insert_one(&scope, doc! { "name": "a" }, Default::default()).await?;
//! let found = adapter.find_one(&scope, doc! { "_id": id }, Default::default()).await?;
//! # Ok(()) }
//! ```

pub mod adapter;
pub mod collection;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod document;
pub mod error;
pub mod options;
pub mod scope;
pub mod translate;
pub mod value;
