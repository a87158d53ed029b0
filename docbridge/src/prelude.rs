//! Convenient re-exports of commonly used types from docbridge.
//!
//! ```ignore
//! use docbridge::prelude::*;
//! ```

pub use docbridge_core::{
    adapter::DocumentAdapter,
    collection::CollectionHandle,
    config::ConnectSettings,
    connection::{Connection, ConnectionBuilder, DocumentStream, UpdateSummary, DeleteSummary},
    cursor::DocumentCursor,
    document::{Document, Filter, Pipeline, Identifier, Namespace},
    error::{AdapterError, AdapterResult, ErrorKind, Operation, StoreFailure, StoreResult},
    options::OperationOptions,
    scope::Scope,
};

pub use crate::factory::{SharedAdapter, SharedConnection, open_adapter, open_connection};
