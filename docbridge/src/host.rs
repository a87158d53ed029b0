//! Blocking entry point for embedding hosts.
//!
//! A host runtime obtains a [`HostClient`] from [`new_client`] with a connection URI, the
//! database and collection to bind, and an optional default aggregation pipeline. The client
//! speaks plain JSON (`serde_json::Value`) in both directions and blocks the calling thread
//! until each call completes, fails, or times out. Failures come back as a serializable
//! [`HostError`] so the host never sees a driver type.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::host::new_client;
//! use serde_json::json;
//!
//! let client = new_client("memory://", "shop", "orders", json!(null))?;
//! let id = client.insert_one(json!({ "item": "pen", "qty": 3 }), json!(null))?;
//! let order = client.find_one(json!({ "_id": id }), json!(null))?;
//! assert_eq!(order["item"], "pen");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use docbridge_core::{
    config::ConnectSettings,
    document::{Namespace, Pipeline},
    error::{AdapterError, AdapterResult, ErrorKind, Operation},
    options::OperationOptions,
    scope::Scope,
    translate::ResultTranslator,
    value::{bson_to_json, document_to_json, json_to_document, json_to_documents},
};

use crate::factory::{SharedAdapter, open_adapter, redact};

/// Host-supplied client settings, read from a camelCase JSON object.
///
/// ```json
/// { "operationTimeoutMs": 5000, "serverSelectionTimeoutMs": 2000, "appName": "reports" }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    /// Deadline applied to every call. Unset means calls wait until the store answers.
    pub operation_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub server_selection_timeout_ms: Option<u64>,
    pub app_name: Option<String>,
    /// Threads of the client's private runtime.
    pub worker_threads: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: None,
            connect_timeout_ms: None,
            server_selection_timeout_ms: None,
            app_name: None,
            worker_threads: 2,
        }
    }
}

impl HostConfig {
    /// Reads settings from a host value. `null` means defaults.
    pub fn from_json(value: Value) -> Result<Self, HostError> {
        match value {
            Value::Null => Ok(Self::default()),
            other => serde_json::from_value(other).map_err(|e| {
                HostError::from(
                    ResultTranslator::new(Operation::Connect, None)
                        .configuration(format!("invalid client configuration: {}", e)),
                )
            }),
        }
    }

    fn connect_settings(&self) -> ConnectSettings {
        let mut settings = ConnectSettings::new();

        if let Some(app_name) = &self.app_name {
            settings = settings.with_app_name(app_name.clone());
        }
        if let Some(millis) = self.connect_timeout_ms {
            settings = settings.with_connect_timeout(Duration::from_millis(millis));
        }
        if let Some(millis) = self.server_selection_timeout_ms {
            settings = settings.with_server_selection_timeout(Duration::from_millis(millis));
        }

        settings
    }
}

/// A failure as reported to the host.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{kind} during {operation}: {message}")]
pub struct HostError {
    pub kind: ErrorKind,
    pub operation: Operation,
    /// `database.collection`, when the failure is tied to a collection.
    pub namespace: Option<String>,
    pub message: String,
    /// Whether the call was cancelled or timed out rather than failed by the store.
    pub cancelled: bool,
}

impl From<AdapterError> for HostError {
    fn from(error: AdapterError) -> Self {
        let context = error.context();

        Self {
            kind: error.kind(),
            operation: context.operation,
            namespace: context.namespace.as_ref().map(ToString::to_string),
            message: match error.cause() {
                Some(cause) => cause.to_string(),
                None => error.to_string(),
            },
            cancelled: error.is_cancelled(),
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// Opens a client bound to `database.collection` with default settings.
///
/// `pipeline_hint` is either `null` or an array of stage objects; it is the pipeline
/// [`HostClient::aggregate`] runs when called without one.
pub fn new_client(uri: &str, database: &str, collection: &str, pipeline_hint: Value) -> HostResult<HostClient> {
    new_client_with_config(uri, database, collection, pipeline_hint, HostConfig::default())
}

/// Opens a client bound to `database.collection`.
///
/// Each call returns an independent client with its own connection and runtime.
pub fn new_client_with_config(
    uri: &str,
    database: &str,
    collection: &str,
    pipeline_hint: Value,
    config: HostConfig,
) -> HostResult<HostClient> {
    let translator = ResultTranslator::new(Operation::Connect, Some(Namespace::new(database, collection)));

    let pipeline_hint = match pipeline_hint {
        Value::Null => None,
        other => Some(
            json_to_documents(other)
                .map_err(|message| translator.configuration(format!("invalid pipeline hint: {}", message)))?,
        ),
    };

    let runtime = Builder::new_multi_thread()
        .worker_threads(config.worker_threads.max(1))
        .thread_name("docbridge-host")
        .enable_all()
        .build()
        .map_err(|e| translator.configuration(format!("cannot start runtime: {}", e)))?;

    let adapter = runtime.block_on(open_adapter(uri, database, collection, config.connect_settings()))?;

    info!(
        target: "docbridge::host",
        uri = %redact(uri),
        namespace = %adapter.handle().namespace(),
        "Host client ready"
    );

    Ok(HostClient {
        adapter,
        root: CancellationToken::new(),
        pipeline_hint,
        operation_timeout: config.operation_timeout_ms.map(Duration::from_millis),
        runtime,
    })
}

/// A blocking, JSON-speaking adapter bound to one collection.
///
/// Methods must not be called from inside an async runtime; the client drives its own.
pub struct HostClient {
    // Declared before `runtime` so the connection is released while the runtime is alive.
    adapter: SharedAdapter,
    root: CancellationToken,
    pipeline_hint: Option<Pipeline>,
    operation_timeout: Option<Duration>,
    runtime: Runtime,
}

impl HostClient {
    pub fn namespace(&self) -> &Namespace {
        self.adapter.handle().namespace()
    }

    /// Cancels every in-flight call and every call issued afterwards.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    /// Returns the first matching document, or `null` when nothing matches.
    pub fn find_one(&self, filter: Value, options: Value) -> HostResult<Value> {
        let filter = self.document(Operation::FindOne, "filter", filter)?;
        let options = self.options(Operation::FindOne, options)?;

        let found = self.block_on(|scope| async move { self.adapter.find_one(&scope, filter, options).await })?;

        Ok(found.map(document_to_json).unwrap_or(Value::Null))
    }

    /// Returns every matching document as an array.
    pub fn find(&self, filter: Value, options: Value) -> HostResult<Value> {
        let filter = self.document(Operation::Find, "filter", filter)?;
        let options = self.options(Operation::Find, options)?;

        let documents = self.block_on(|scope| async move {
            self.adapter
                .find(&scope, filter, options)
                .await?
                .collect()
                .await
        })?;

        Ok(Value::Array(documents.into_iter().map(document_to_json).collect()))
    }

    pub fn count_documents(&self, filter: Value, options: Value) -> HostResult<u64> {
        let filter = self.document(Operation::CountDocuments, "filter", filter)?;
        let options = self.options(Operation::CountDocuments, options)?;

        Ok(self.block_on(|scope| async move { self.adapter.count_documents(&scope, filter, options).await })?)
    }

    /// Inserts a document and returns its identifier.
    pub fn insert_one(&self, document: Value, options: Value) -> HostResult<Value> {
        let document = self.document(Operation::InsertOne, "document", document)?;
        let options = self.options(Operation::InsertOne, options)?;

        let id = self.block_on(|scope| async move { self.adapter.insert_one(&scope, document, options).await })?;

        Ok(bson_to_json(id.into_bson()))
    }

    /// Inserts an array of documents and returns their identifiers in input order.
    pub fn insert_many(&self, documents: Value, options: Value) -> HostResult<Value> {
        let documents = json_to_documents(documents)
            .map_err(|message| self.configuration(Operation::InsertMany, format!("documents: {}", message)))?;
        let options = self.options(Operation::InsertMany, options)?;

        let ids = self.block_on(|scope| async move { self.adapter.insert_many(&scope, documents, options).await })?;

        Ok(Value::Array(
            ids.into_iter()
                .map(|id| bson_to_json(id.into_bson()))
                .collect(),
        ))
    }

    pub fn update_one(&self, filter: Value, update: Value, options: Value) -> HostResult<bool> {
        let filter = self.document(Operation::UpdateOne, "filter", filter)?;
        let update = self.document(Operation::UpdateOne, "update", update)?;
        let options = self.options(Operation::UpdateOne, options)?;

        Ok(self.block_on(|scope| async move { self.adapter.update_one(&scope, filter, update, options).await })?)
    }

    pub fn update_many(&self, filter: Value, update: Value, options: Value) -> HostResult<u64> {
        let filter = self.document(Operation::UpdateMany, "filter", filter)?;
        let update = self.document(Operation::UpdateMany, "update", update)?;
        let options = self.options(Operation::UpdateMany, options)?;

        Ok(self.block_on(|scope| async move { self.adapter.update_many(&scope, filter, update, options).await })?)
    }

    pub fn replace_one(&self, filter: Value, replacement: Value, options: Value) -> HostResult<bool> {
        let filter = self.document(Operation::ReplaceOne, "filter", filter)?;
        let replacement = self.document(Operation::ReplaceOne, "replacement", replacement)?;
        let options = self.options(Operation::ReplaceOne, options)?;

        Ok(self.block_on(|scope| async move {
            self.adapter
                .replace_one(&scope, filter, replacement, options)
                .await
        })?)
    }

    pub fn delete_one(&self, filter: Value, options: Value) -> HostResult<bool> {
        let filter = self.document(Operation::DeleteOne, "filter", filter)?;
        let options = self.options(Operation::DeleteOne, options)?;

        Ok(self.block_on(|scope| async move { self.adapter.delete_one(&scope, filter, options).await })?)
    }

    pub fn delete_many(&self, filter: Value, options: Value) -> HostResult<u64> {
        let filter = self.document(Operation::DeleteMany, "filter", filter)?;
        let options = self.options(Operation::DeleteMany, options)?;

        Ok(self.block_on(|scope| async move { self.adapter.delete_many(&scope, filter, options).await })?)
    }

    /// Runs `pipeline` and returns every output document. A `null` pipeline runs the
    /// client's pipeline hint, or an empty pipeline when there is none.
    pub fn aggregate(&self, pipeline: Value, options: Value) -> HostResult<Value> {
        let pipeline = match pipeline {
            Value::Null => self.pipeline_hint.clone().unwrap_or_default(),
            other => json_to_documents(other)
                .map_err(|message| self.configuration(Operation::Aggregate, format!("pipeline: {}", message)))?,
        };
        let options = self.options(Operation::Aggregate, options)?;

        let documents = self.block_on(|scope| async move {
            self.adapter
                .aggregate(&scope, pipeline, options)
                .await?
                .collect()
                .await
        })?;

        Ok(Value::Array(documents.into_iter().map(document_to_json).collect()))
    }

    pub fn ping(&self) -> HostResult<()> {
        Ok(self.block_on(|scope| async move { self.adapter.ping(&scope).await })?)
    }

    /// Releases the connection. Later calls fail with a connection error.
    pub fn close(&self) -> HostResult<()> {
        self.block_on(|scope| async move { self.adapter.close(&scope).await })?;
        info!(target: "docbridge::host", namespace = %self.namespace(), "Host client closed");

        Ok(())
    }

    /// A fresh scope per call: cancelled with the client, bounded by the operation timeout.
    fn scope(&self) -> Scope {
        let root = Scope::from_token(self.root.clone());

        match self.operation_timeout {
            Some(timeout) => root.child_with_timeout(timeout),
            None => root.child(),
        }
    }

    fn block_on<T, F, Fut>(&self, call: F) -> AdapterResult<T>
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let scope = self.scope();
        self.runtime.block_on(call(scope))
    }

    fn document(&self, operation: Operation, argument: &str, value: Value) -> HostResult<bson::Document> {
        json_to_document(value)
            .map_err(|message| self.configuration(operation, format!("{}: {}", argument, message)))
    }

    fn options(&self, operation: Operation, value: Value) -> HostResult<OperationOptions> {
        OperationOptions::from_json(value)
            .map_err(|message| self.configuration(operation, format!("options: {}", message)))
    }

    fn configuration(&self, operation: Operation, message: String) -> HostError {
        ResultTranslator::new(operation, Some(self.namespace().clone()))
            .configuration(message)
            .into()
    }
}

impl Drop for HostClient {
    fn drop(&mut self) {
        let connection = self.adapter.handle().connection();

        if let Err(failure) = self.runtime.block_on(connection.close()) {
            warn!(target: "docbridge::host", namespace = %self.namespace(), error = %failure, "Closing on drop failed");
        }
    }
}

impl std::fmt::Debug for HostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClient")
            .field("namespace", self.namespace())
            .field("operation_timeout", &self.operation_timeout)
            .field("pipeline_hint", &self.pipeline_hint)
            .finish()
    }
}
