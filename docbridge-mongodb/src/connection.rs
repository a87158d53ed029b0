use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bson::{Document, doc, oid::ObjectId};
use futures::{StreamExt, TryStreamExt};
use mongodb::{Client, Collection as MongoCollection, options::ClientOptions};
use tracing::{debug, info};

use docbridge_core::{
    config::ConnectSettings,
    connection::{Connection, ConnectionBuilder, DeleteSummary, DocumentStream, UpdateSummary},
    document::{Filter, ID_FIELD, Identifier, Namespace, Pipeline},
    error::{StoreFailure, StoreResult},
    options::OperationOptions,
};

use crate::{
    failure::{classify, classify_insert_many},
    options,
};

/// URI schemes served by this backend.
pub const MONGODB_SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

/// A connection to a MongoDB deployment.
///
/// Wraps a driver [`Client`], which pools connections internally and is safe to share.
/// Each call resolves its target collection from the [`Namespace`] it is given.
#[derive(Debug, Clone)]
pub struct MongoConnection {
    client: Client,
    closed: Arc<AtomicBool>,
}

impl MongoConnection {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn builder(uri: &str) -> MongoConnectionBuilder {
        MongoConnectionBuilder::new(uri)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, namespace: &Namespace) -> StoreResult<MongoCollection<Document>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreFailure::Closed);
        }

        Ok(self
            .client
            .database(&namespace.database)
            .collection(&namespace.collection))
    }
}

/// Gives every document without an `_id` a fresh object id, so identifiers are known in
/// input order before the batch is sent.
fn assign_ids(documents: &mut [Document]) -> Vec<Identifier> {
    documents
        .iter_mut()
        .map(|document| {
            if let Some(id) = document.get(ID_FIELD) {
                return Identifier::from(id.clone());
            }

            let id = ObjectId::new();
            let mut with_id = Document::new();
            with_id.insert(ID_FIELD, id);
            for (key, value) in std::mem::take(document) {
                with_id.insert(key, value);
            }
            *document = with_id;

            Identifier::from(id)
        })
        .collect()
}

fn summary(result: mongodb::results::UpdateResult) -> UpdateSummary {
    UpdateSummary {
        matched: result.matched_count,
        modified: result.modified_count,
        upserted: result.upserted_id.map(Identifier::from),
    }
}

#[async_trait]
impl Connection for MongoConnection {
    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<Option<Document>> {
        self.collection(namespace)?
            .find_one(filter)
            .with_options(options::find_one(options)?)
            .await
            .map_err(classify)
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream> {
        Ok(self
            .collection(namespace)?
            .find(filter)
            .with_options(options::find(options)?)
            .await
            .map_err(classify)?
            .map_err(classify)
            .boxed())
    }

    async fn count_documents(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<u64> {
        self.collection(namespace)?
            .count_documents(filter)
            .with_options(options::count(options)?)
            .await
            .map_err(classify)
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
        options: OperationOptions,
    ) -> StoreResult<Identifier> {
        Ok(Identifier::from(
            self.collection(namespace)?
                .insert_one(document)
                .with_options(options::insert_one(options)?)
                .await
                .map_err(classify)?
                .inserted_id,
        ))
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        mut documents: Vec<Document>,
        options: OperationOptions,
    ) -> StoreResult<Vec<Identifier>> {
        let collection = self.collection(namespace)?;
        let options = options::insert_many(options)?;
        let ordered = options.ordered.unwrap_or(true);
        let ids = assign_ids(&mut documents);

        match collection.insert_many(documents).with_options(options).await {
            Ok(_) => Ok(ids),
            Err(error) => Err(classify_insert_many(error, ids, ordered)),
        }
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        self.collection(namespace)?
            .update_one(filter, update)
            .with_options(options::update(options)?)
            .await
            .map(summary)
            .map_err(classify)
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        self.collection(namespace)?
            .update_many(filter, update)
            .with_options(options::update(options)?)
            .await
            .map(summary)
            .map_err(classify)
    }

    async fn replace_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        replacement: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        self.collection(namespace)?
            .replace_one(filter, replacement)
            .with_options(options::replace(options)?)
            .await
            .map(summary)
            .map_err(classify)
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DeleteSummary> {
        self.collection(namespace)?
            .delete_one(filter)
            .with_options(options::delete(options)?)
            .await
            .map(|result| DeleteSummary {
                deleted: result.deleted_count,
            })
            .map_err(classify)
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DeleteSummary> {
        self.collection(namespace)?
            .delete_many(filter)
            .with_options(options::delete(options)?)
            .await
            .map(|result| DeleteSummary {
                deleted: result.deleted_count,
            })
            .map_err(classify)
    }

    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Pipeline,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream> {
        Ok(self
            .collection(namespace)?
            .aggregate(pipeline)
            .with_options(options::aggregate(options)?)
            .await
            .map_err(classify)?
            .map_err(classify)
            .boxed())
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreFailure::Closed);
        }

        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.client.clone().shutdown().await;
        info!(target: "docbridge::mongodb", "Client shut down");

        Ok(())
    }
}

/// Builder for [`MongoConnection`].
///
/// # Example
///
/// ```ignore
/// use docbridge_core::{config::ConnectSettings, connection::ConnectionBuilder};
/// use docbridge_mongodb::MongoConnection;
///
/// let connection = MongoConnection::builder("mongodb://localhost:27017")
///     .settings(ConnectSettings::new().with_app_name("reports"))
///     .connect()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct MongoConnectionBuilder {
    uri: String,
    settings: ConnectSettings,
}

impl MongoConnectionBuilder {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            settings: ConnectSettings::default(),
        }
    }

    /// Overrides client options parsed from the URI.
    pub fn settings(mut self, settings: ConnectSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn client_options(&self) -> StoreResult<ClientOptions> {
        let mut client_options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| StoreFailure::InvalidUri(e.to_string()))?;

        if let Some(app_name) = &self.settings.app_name {
            client_options.app_name = Some(app_name.clone());
        }
        if let Some(timeout) = self.settings.connect_timeout {
            client_options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.settings.server_selection_timeout {
            client_options.server_selection_timeout = Some(timeout);
        }

        Ok(client_options)
    }
}

#[async_trait]
impl ConnectionBuilder for MongoConnectionBuilder {
    type Connection = MongoConnection;

    /// Parses the URI and creates the driver client. The driver connects lazily, so an
    /// unreachable deployment only surfaces on the first call or ping.
    async fn build(self) -> StoreResult<Self::Connection> {
        let client_options = self.client_options().await?;
        let hosts = client_options.hosts.len();
        let client = Client::with_options(client_options).map_err(classify)?;

        debug!(target: "docbridge::mongodb", hosts, "Client created");

        Ok(MongoConnection::new(client))
    }
}
