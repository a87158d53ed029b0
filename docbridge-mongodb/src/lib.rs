//! MongoDB backend for docbridge.
//!
//! [`MongoConnection`] implements the core [`Connection`](docbridge_core::connection::Connection)
//! trait on top of the official async driver. Filters, update documents and pipelines are
//! handed to the server unchanged; option documents are decoded into the driver's option
//! structs by their camelCase names.
//!
//! To use this backend through the facade crate, keep its default `mongodb` feature:
//!
//! ```toml
//! [dependencies]
//! docbridge = { version = "x.y.z" }
//! ```
//!
//! # Errors
//!
//! Driver errors are mapped onto [`StoreFailure`](docbridge_core::error::StoreFailure):
//! server selection, DNS and I/O errors become `Unreachable`, authentication errors become
//! `Authentication`, error code 11000 becomes `DuplicateKey`, and a partially applied
//! `insert_many` becomes `PartialWrite` carrying the identifiers that were written.
//!
//! # Example
//!
//! ```ignore
//! use docbridge_core::connection::{Connection, ConnectionBuilder};
//! use docbridge_mongodb::MongoConnection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = MongoConnection::builder("mongodb://localhost:27017")
//!         .connect()
//!         .await?;
//!     connection.ping().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod connection;
mod failure;
mod options;

pub use connection::{MONGODB_SCHEMES, MongoConnection, MongoConnectionBuilder};
