//! Normalization of store outcomes into caller values.
//!
//! A [`ResultTranslator`] is created per call and owns that call's error context. It turns
//! backend summaries into the plain values each operation promises and classifies every
//! [`StoreFailure`] into exactly one [`AdapterError`] category.

use crate::{
    connection::{DeleteSummary, DocumentStream, UpdateSummary},
    cursor::DocumentCursor,
    document::{Identifier, Namespace},
    error::{AdapterError, AdapterResult, ErrorContext, Operation, StoreFailure},
    scope::Scope,
};

#[derive(Debug, Clone)]
pub struct ResultTranslator {
    context: ErrorContext,
}

impl ResultTranslator {
    pub fn new(operation: Operation, namespace: Option<Namespace>) -> Self {
        Self {
            context: ErrorContext::new(operation, namespace),
        }
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Classifies a backend failure.
    ///
    /// Reachability, authentication and released-connection failures are connection errors
    /// wherever they happen, as is anything that fails while connecting or a ping that fails
    /// for a reason other than the caller's scope. Everything else is a write error for write
    /// operations and a query error otherwise.
    pub fn failure(&self, cause: StoreFailure) -> AdapterError {
        let context = self.context.clone();
        let operation = context.operation;

        match cause {
            StoreFailure::InvalidUri(_)
            | StoreFailure::Unreachable(_)
            | StoreFailure::Authentication(_)
            | StoreFailure::Closed => AdapterError::Connection { context, cause },
            _ if operation == Operation::Connect => AdapterError::Connection { context, cause },
            _ if operation == Operation::Ping && !cause.is_cancellation() => {
                AdapterError::Connection { context, cause }
            }
            _ if operation.is_write() => AdapterError::Write { context, cause },
            _ => AdapterError::Query { context, cause },
        }
    }

    /// A structurally invalid input, rejected before any store call.
    pub fn configuration(&self, message: impl Into<String>) -> AdapterError {
        AdapterError::Configuration {
            context: self.context.clone(),
            message: message.into(),
        }
    }

    /// Verifies a multi-document insert returned exactly one identifier per input document.
    pub fn identifiers(&self, expected: usize, ids: Vec<Identifier>) -> AdapterResult<Vec<Identifier>> {
        if ids.len() != expected {
            return Err(self.failure(StoreFailure::Decode(format!(
                "store acknowledged {} identifiers for {} documents",
                ids.len(),
                expected
            ))));
        }

        Ok(ids)
    }

    /// Whether a single-document update or replace wrote anything.
    ///
    /// A match whose content was already up to date is `false`; an upserted insert is `true`.
    pub fn modified(&self, summary: &UpdateSummary) -> bool {
        summary.modified > 0 || summary.upserted.is_some()
    }

    /// Number of documents written by a multi-document update, upserted insert included.
    pub fn modified_count(&self, summary: &UpdateSummary) -> u64 {
        summary.modified + u64::from(summary.upserted.is_some())
    }

    pub fn deleted(&self, summary: &DeleteSummary) -> bool {
        summary.deleted > 0
    }

    pub fn deleted_count(&self, summary: &DeleteSummary) -> u64 {
        summary.deleted
    }

    /// Hands a fresh store stream to a caller-owned cursor.
    pub fn cursor(self, stream: DocumentStream, scope: Scope) -> DocumentCursor {
        DocumentCursor::new(stream, scope, self)
    }
}
