//! Store connection abstraction.
//!
//! A [`Connection`] is a live session with a document store. Backends implement it by
//! translating each call into their native operation and reporting outcomes with the
//! driver-free summaries defined here. Connections are established through a
//! [`ConnectionBuilder`].
//!
//! # Thread Safety
//!
//! Implementations must be safe to share between concurrent callers; the adapter adds no
//! locking around a connection and never mutates it.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;

use crate::{
    document::{Filter, Identifier, Namespace, Pipeline},
    error::{AdapterResult, Operation, StoreResult},
    options::OperationOptions,
    translate::ResultTranslator,
};

/// A lazily pulled sequence of documents backed by a store-side cursor.
pub type DocumentStream = BoxStream<'static, StoreResult<Document>>;

/// Outcome of an update or replace command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    /// Documents matched by the filter.
    pub matched: u64,
    /// Documents whose content actually changed.
    pub modified: u64,
    /// Identifier of the document inserted by an upsert, if one was.
    pub upserted: Option<Identifier>,
}

/// Outcome of a delete command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteSummary {
    pub deleted: u64,
}

/// A live session with a document store.
///
/// Every call names the [`Namespace`] it targets; the connection itself is not bound to a
/// collection. Filters, updates and pipelines are passed through unchanged.
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Returns the first document matching `filter`, or `None` when nothing matches.
    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<Option<Document>>;

    /// Opens a cursor over every document matching `filter`.
    async fn find(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream>;

    /// Counts documents matching `filter`.
    async fn count_documents(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<u64>;

    /// Inserts one document, returning its `_id` (generated when absent).
    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
        options: OperationOptions,
    ) -> StoreResult<Identifier>;

    /// Inserts documents, returning one identifier per input document in input order.
    ///
    /// When only some documents are written the call fails with
    /// [`StoreFailure::PartialWrite`](crate::error::StoreFailure::PartialWrite).
    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        options: OperationOptions,
    ) -> StoreResult<Vec<Identifier>>;

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary>;

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary>;

    async fn replace_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        replacement: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary>;

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DeleteSummary>;

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DeleteSummary>;

    /// Runs an aggregation pipeline, stages in order, and opens a cursor over its output.
    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Pipeline,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Releases the connection. Calls issued afterwards fail with
    /// [`StoreFailure::Closed`](crate::error::StoreFailure::Closed).
    async fn close(&self) -> StoreResult<()>;
}

#[async_trait]
impl<C> Connection for &C
where
    C: Connection + ?Sized,
{
    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<Option<Document>> {
        (**self)
            .find_one(namespace, filter, options)
            .await
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream> {
        (**self)
            .find(namespace, filter, options)
            .await
    }

    async fn count_documents(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<u64> {
        (**self)
            .count_documents(namespace, filter, options)
            .await
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
        options: OperationOptions,
    ) -> StoreResult<Identifier> {
        (**self)
            .insert_one(namespace, document, options)
            .await
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        options: OperationOptions,
    ) -> StoreResult<Vec<Identifier>> {
        (**self)
            .insert_many(namespace, documents, options)
            .await
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        (**self)
            .update_one(namespace, filter, update, options)
            .await
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        (**self)
            .update_many(namespace, filter, update, options)
            .await
    }

    async fn replace_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        replacement: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        (**self)
            .replace_one(namespace, filter, replacement, options)
            .await
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DeleteSummary> {
        (**self)
            .delete_one(namespace, filter, options)
            .await
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DeleteSummary> {
        (**self)
            .delete_many(namespace, filter, options)
            .await
    }

    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Pipeline,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream> {
        (**self)
            .aggregate(namespace, pipeline, options)
            .await
    }

    async fn ping(&self) -> StoreResult<()> {
        (**self)
            .ping()
            .await
    }

    async fn close(&self) -> StoreResult<()> {
        (**self)
            .close()
            .await
    }
}

#[async_trait]
impl<C> Connection for Arc<C>
where
    C: Connection + ?Sized,
{
    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<Option<Document>> {
        (**self)
            .find_one(namespace, filter, options)
            .await
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream> {
        (**self)
            .find(namespace, filter, options)
            .await
    }

    async fn count_documents(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<u64> {
        (**self)
            .count_documents(namespace, filter, options)
            .await
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
        options: OperationOptions,
    ) -> StoreResult<Identifier> {
        (**self)
            .insert_one(namespace, document, options)
            .await
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        options: OperationOptions,
    ) -> StoreResult<Vec<Identifier>> {
        (**self)
            .insert_many(namespace, documents, options)
            .await
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        (**self)
            .update_one(namespace, filter, update, options)
            .await
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        (**self)
            .update_many(namespace, filter, update, options)
            .await
    }

    async fn replace_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        replacement: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        (**self)
            .replace_one(namespace, filter, replacement, options)
            .await
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DeleteSummary> {
        (**self)
            .delete_one(namespace, filter, options)
            .await
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DeleteSummary> {
        (**self)
            .delete_many(namespace, filter, options)
            .await
    }

    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Pipeline,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream> {
        (**self)
            .aggregate(namespace, pipeline, options)
            .await
    }

    async fn ping(&self) -> StoreResult<()> {
        (**self)
            .ping()
            .await
    }

    async fn close(&self) -> StoreResult<()> {
        (**self)
            .close()
            .await
    }
}

/// Factory for establishing a [`Connection`].
///
/// Establishing a connection may open network resources but performs no liveness check;
/// use [`Connection::ping`] for that.
#[async_trait]
pub trait ConnectionBuilder: Send {
    type Connection: Connection;

    /// Establishes the connection, reporting the backend's own failure.
    async fn build(self) -> StoreResult<Self::Connection>;

    /// Establishes the connection, reporting failures as connection errors.
    async fn connect(self) -> AdapterResult<Self::Connection>
    where
        Self: Sized,
    {
        self.build()
            .await
            .map_err(|failure| ResultTranslator::new(Operation::Connect, None).failure(failure))
    }
}
