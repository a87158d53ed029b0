//! Error types and result types for adapter operations.
//!
//! Two layers are defined here. Backends report a [`StoreFailure`], which carries no driver
//! types. The adapter wraps it with the operation and namespace it happened in and classifies
//! it into an [`AdapterError`], the only failure a caller ever sees.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::document::{Identifier, Namespace};

/// A failure reported by a store backend, before it is attributed to an operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreFailure {
    /// The connection URI could not be parsed or names an unsupported scheme.
    #[error("Invalid connection string: {0}")]
    InvalidUri(String),
    /// The store could not be reached (network, DNS, server selection).
    #[error("Store unreachable: {0}")]
    Unreachable(String),
    /// The store rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// The connection was already released by its owner.
    #[error("Connection is closed")]
    Closed,
    /// A write collided with an existing unique key.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    /// The store refused the command (malformed filter, update, pipeline or options).
    #[error("Rejected by store: {0}")]
    Rejected(String),
    /// A store response could not be decoded.
    #[error("Decode failure: {0}")]
    Decode(String),
    /// A multi-document insert stopped part way. `inserted` pairs the input position of each
    /// written document with its identifier.
    #[error("Partial write, {} of {attempted} documents written: {message}", .inserted.len())]
    PartialWrite {
        attempted: usize,
        inserted: Vec<(usize, Identifier)>,
        message: String,
    },
    /// The caller's scope was cancelled while the call was in flight.
    #[error("Operation cancelled")]
    Cancelled,
    /// The caller's deadline elapsed while the call was in flight.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

impl StoreFailure {
    /// Whether this failure came from the caller's scope rather than the store.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StoreFailure::Cancelled | StoreFailure::DeadlineExceeded)
    }
}

/// Result type returned by backend calls.
pub type StoreResult<T> = Result<T, StoreFailure>;

/// The adapter operation a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Connect,
    Ping,
    Close,
    FindOne,
    Find,
    CountDocuments,
    Aggregate,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    ReplaceOne,
    DeleteOne,
    DeleteMany,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Ping => "ping",
            Operation::Close => "close",
            Operation::FindOne => "find_one",
            Operation::Find => "find",
            Operation::CountDocuments => "count_documents",
            Operation::Aggregate => "aggregate",
            Operation::InsertOne => "insert_one",
            Operation::InsertMany => "insert_many",
            Operation::UpdateOne => "update_one",
            Operation::UpdateMany => "update_many",
            Operation::ReplaceOne => "replace_one",
            Operation::DeleteOne => "delete_one",
            Operation::DeleteMany => "delete_many",
        }
    }

    /// Whether the operation mutates the collection.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::InsertOne
                | Operation::InsertMany
                | Operation::UpdateOne
                | Operation::UpdateMany
                | Operation::ReplaceOne
                | Operation::DeleteOne
                | Operation::DeleteMany
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a failure happened: which operation, against which collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    pub operation: Operation,
    pub namespace: Option<Namespace>,
}

impl ErrorContext {
    pub fn new(operation: Operation, namespace: Option<Namespace>) -> Self {
        Self { operation, namespace }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} on {}", self.operation, namespace),
            None => write!(f, "{}", self.operation),
        }
    }
}

/// The four failure categories a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "ConnectionError")]
    Connection,
    #[serde(rename = "QueryError")]
    Query,
    #[serde(rename = "WriteError")]
    Write,
    #[serde(rename = "ConfigurationError")]
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Query => "QueryError",
            ErrorKind::Write => "WriteError",
            ErrorKind::Configuration => "ConfigurationError",
        })
    }
}

/// Represents every failure an adapter operation can return.
///
/// A failed operation never yields a partial value alongside the error; anything the store
/// managed to do before failing (for example the identifiers of a partially applied
/// `insert_many`) travels inside the [`StoreFailure`] cause.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// The store is unreachable, rejected authentication, or the connection was released.
    #[error("Connection error during {context}: {cause}")]
    Connection { context: ErrorContext, cause: StoreFailure },
    /// A read-side operation failed after the connection was established.
    #[error("Query error during {context}: {cause}")]
    Query { context: ErrorContext, cause: StoreFailure },
    /// A write-side operation failed.
    #[error("Write error during {context}: {cause}")]
    Write { context: ErrorContext, cause: StoreFailure },
    /// The input was structurally invalid; no store call was attempted.
    #[error("Configuration error during {context}: {message}")]
    Configuration { context: ErrorContext, message: String },
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Connection { .. } => ErrorKind::Connection,
            AdapterError::Query { .. } => ErrorKind::Query,
            AdapterError::Write { .. } => ErrorKind::Write,
            AdapterError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            AdapterError::Connection { context, .. }
            | AdapterError::Query { context, .. }
            | AdapterError::Write { context, .. }
            | AdapterError::Configuration { context, .. } => context,
        }
    }

    /// The store-side cause, absent for configuration errors.
    pub fn cause(&self) -> Option<&StoreFailure> {
        match self {
            AdapterError::Connection { cause, .. }
            | AdapterError::Query { cause, .. }
            | AdapterError::Write { cause, .. } => Some(cause),
            AdapterError::Configuration { .. } => None,
        }
    }

    /// Whether the call failed because its scope was cancelled or its deadline elapsed.
    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some_and(StoreFailure::is_cancellation)
    }
}

/// A specialized `Result` type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
