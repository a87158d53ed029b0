//! The document adapter: one operation per supported store command.
//!
//! Each operation takes the caller's [`Scope`] first, issues exactly one store call bounded by
//! that scope, and translates the outcome through a [`ResultTranslator`]. Inputs that are
//! structurally invalid are rejected with a configuration error before anything reaches the
//! store.

use bson::Document;
use tracing::{debug, warn};

use crate::{
    collection::CollectionHandle,
    connection::Connection,
    cursor::DocumentCursor,
    document::{Filter, Identifier, Pipeline, check_replacement, check_update_spec},
    error::{AdapterResult, Operation, StoreFailure, StoreResult},
    options::OperationOptions,
    scope::Scope,
    translate::ResultTranslator,
};

/// Issues commands against the collection a [`CollectionHandle`] is bound to.
///
/// The adapter holds no mutable state, so one adapter can serve any number of concurrent
/// calls. Results are independent values owned by the caller.
///
/// # Example
///
/// ```ignore
/// let adapter = DocumentAdapter::new(CollectionHandle::bind(connection.clone(), "shop", "orders"));
/// let scope = Scope::with_timeout(Duration::from_secs(2));
///
/// let mut cursor = adapter.find(&scope, doc! { "status": "open" }, OperationOptions::new()).await?;
/// while let Some(order) = cursor.next().await {
///     println!("{}", order?);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DocumentAdapter<C: Connection> {
    handle: CollectionHandle<C>,
}

impl<C: Connection> DocumentAdapter<C> {
    pub fn new(handle: CollectionHandle<C>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &CollectionHandle<C> {
        &self.handle
    }

    /// Returns the first matching document, or `None` when nothing matches.
    pub async fn find_one(
        &self,
        scope: &Scope,
        filter: Filter,
        options: OperationOptions,
    ) -> AdapterResult<Option<Document>> {
        let translator = self.translator(Operation::FindOne);
        let namespace = self.handle.namespace();

        self.issue(&translator, scope, async {
            self.handle.connection().find_one(namespace, filter, options).await
        })
        .await
    }

    /// Opens a lazy cursor over every matching document. No cap is applied.
    pub async fn find(
        &self,
        scope: &Scope,
        filter: Filter,
        options: OperationOptions,
    ) -> AdapterResult<DocumentCursor> {
        let translator = self.translator(Operation::Find);
        let namespace = self.handle.namespace();

        let stream = self
            .issue(&translator, scope, async {
                self.handle.connection().find(namespace, filter, options).await
            })
            .await?;

        Ok(translator.cursor(stream, scope.clone()))
    }

    pub async fn count_documents(
        &self,
        scope: &Scope,
        filter: Filter,
        options: OperationOptions,
    ) -> AdapterResult<u64> {
        let translator = self.translator(Operation::CountDocuments);
        let namespace = self.handle.namespace();

        self.issue(&translator, scope, async {
            self.handle
                .connection()
                .count_documents(namespace, filter, options)
                .await
        })
        .await
    }

    /// Inserts one document and returns its identifier, generated by the store when the
    /// document has no `_id`.
    pub async fn insert_one(
        &self,
        scope: &Scope,
        document: Document,
        options: OperationOptions,
    ) -> AdapterResult<Identifier> {
        let translator = self.translator(Operation::InsertOne);
        let namespace = self.handle.namespace();

        self.issue(&translator, scope, async {
            self.handle
                .connection()
                .insert_one(namespace, document, options)
                .await
        })
        .await
    }

    /// Inserts documents and returns their identifiers in input order.
    ///
    /// An empty batch is a configuration error. When the store writes only some of the
    /// documents the call fails with a write error whose cause lists what was written.
    pub async fn insert_many(
        &self,
        scope: &Scope,
        documents: Vec<Document>,
        options: OperationOptions,
    ) -> AdapterResult<Vec<Identifier>> {
        let translator = self.translator(Operation::InsertMany);
        let namespace = self.handle.namespace();

        if documents.is_empty() {
            return Err(translator.configuration("insert_many requires at least one document"));
        }

        let expected = documents.len();
        let ids = self
            .issue(&translator, scope, async {
                self.handle
                    .connection()
                    .insert_many(namespace, documents, options)
                    .await
            })
            .await?;

        translator.identifiers(expected, ids)
    }

    /// Applies `update` to the first matching document. Returns whether a document was
    /// changed or upserted.
    pub async fn update_one(
        &self,
        scope: &Scope,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> AdapterResult<bool> {
        let translator = self.translator(Operation::UpdateOne);
        let namespace = self.handle.namespace();

        check_update_spec(&update).map_err(|message| translator.configuration(message))?;

        let summary = self
            .issue(&translator, scope, async {
                self.handle
                    .connection()
                    .update_one(namespace, filter, update, options)
                    .await
            })
            .await?;

        Ok(translator.modified(&summary))
    }

    /// Applies `update` to every matching document. Returns how many changed.
    pub async fn update_many(
        &self,
        scope: &Scope,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> AdapterResult<u64> {
        let translator = self.translator(Operation::UpdateMany);
        let namespace = self.handle.namespace();

        check_update_spec(&update).map_err(|message| translator.configuration(message))?;

        let summary = self
            .issue(&translator, scope, async {
                self.handle
                    .connection()
                    .update_many(namespace, filter, update, options)
                    .await
            })
            .await?;

        Ok(translator.modified_count(&summary))
    }

    /// Replaces the first matching document wholesale, keeping its `_id`.
    pub async fn replace_one(
        &self,
        scope: &Scope,
        filter: Filter,
        replacement: Document,
        options: OperationOptions,
    ) -> AdapterResult<bool> {
        let translator = self.translator(Operation::ReplaceOne);
        let namespace = self.handle.namespace();

        check_replacement(&replacement).map_err(|message| translator.configuration(message))?;

        let summary = self
            .issue(&translator, scope, async {
                self.handle
                    .connection()
                    .replace_one(namespace, filter, replacement, options)
                    .await
            })
            .await?;

        Ok(translator.modified(&summary))
    }

    /// Removes the first matching document. Returns whether one was removed.
    pub async fn delete_one(
        &self,
        scope: &Scope,
        filter: Filter,
        options: OperationOptions,
    ) -> AdapterResult<bool> {
        let translator = self.translator(Operation::DeleteOne);
        let namespace = self.handle.namespace();

        let summary = self
            .issue(&translator, scope, async {
                self.handle
                    .connection()
                    .delete_one(namespace, filter, options)
                    .await
            })
            .await?;

        Ok(translator.deleted(&summary))
    }

    pub async fn delete_many(
        &self,
        scope: &Scope,
        filter: Filter,
        options: OperationOptions,
    ) -> AdapterResult<u64> {
        let translator = self.translator(Operation::DeleteMany);
        let namespace = self.handle.namespace();

        let summary = self
            .issue(&translator, scope, async {
                self.handle
                    .connection()
                    .delete_many(namespace, filter, options)
                    .await
            })
            .await?;

        Ok(translator.deleted_count(&summary))
    }

    /// Runs `pipeline` against the collection and opens a lazy cursor over its output.
    ///
    /// The cursor yields every result document the pipeline produces, however many there are.
    pub async fn aggregate(
        &self,
        scope: &Scope,
        pipeline: Pipeline,
        options: OperationOptions,
    ) -> AdapterResult<DocumentCursor> {
        let translator = self.translator(Operation::Aggregate);
        let namespace = self.handle.namespace();

        let stream = self
            .issue(&translator, scope, async {
                self.handle
                    .connection()
                    .aggregate(namespace, pipeline, options)
                    .await
            })
            .await?;

        Ok(translator.cursor(stream, scope.clone()))
    }

    /// Verifies the store is reachable through this adapter's connection.
    pub async fn ping(&self, scope: &Scope) -> AdapterResult<()> {
        let translator = ResultTranslator::new(Operation::Ping, None);

        self.issue(&translator, scope, self.handle.connection().ping())
            .await
    }

    /// Releases the underlying connection. Every later call through it fails with a
    /// connection error.
    pub async fn close(&self, scope: &Scope) -> AdapterResult<()> {
        let translator = ResultTranslator::new(Operation::Close, None);

        self.issue(&translator, scope, self.handle.connection().close())
            .await
    }

    fn translator(&self, operation: Operation) -> ResultTranslator {
        ResultTranslator::new(operation, Some(self.handle.namespace().clone()))
    }

    async fn issue<T, F>(&self, translator: &ResultTranslator, scope: &Scope, call: F) -> AdapterResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let context = translator.context();
        debug!(target: "docbridge::adapter", context = %context, "Issuing store call");

        scope.run(call).await.map_err(|failure: StoreFailure| {
            let error = translator.failure(failure);
            warn!(
                target: "docbridge::adapter",
                context = %context,
                kind = %error.kind(),
                error = %error,
                "Store call failed"
            );
            error
        })
    }
}
