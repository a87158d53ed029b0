//! In-process store connection.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use tracing::debug;

use docbridge_core::{
    connection::{Connection, ConnectionBuilder, DeleteSummary, DocumentStream, UpdateSummary},
    document::{Filter, ID_FIELD, Identifier, Namespace, Pipeline},
    error::{StoreFailure, StoreResult},
    options::OperationOptions,
};

use crate::{evaluator::matches, pipeline, update};

/// The URI scheme served by this backend.
pub const MEMORY_SCHEME: &str = "memory://";

type DatabaseMap = HashMap<String, HashMap<String, MemoryCollection>>;

/// One collection's documents in insertion order, indexed by `_id`.
#[derive(Debug, Default)]
struct MemoryCollection {
    documents: BTreeMap<u64, Document>,
    ids: HashMap<String, u64>,
    next_sequence: u64,
}

/// How a matched document is rewritten.
#[derive(Clone, Copy)]
enum Change<'a> {
    Operators(&'a Document),
    Replacement(&'a Document),
}

impl MemoryCollection {
    fn insert(&mut self, namespace: &Namespace, document: Document) -> StoreResult<Identifier> {
        let document = with_leading_id(document);
        let id = document.get(ID_FIELD).cloned().unwrap_or(Bson::Null);

        if matches!(id, Bson::Array(_)) {
            return Err(StoreFailure::Rejected("the _id field cannot be an array".to_string()));
        }

        let key = id_key(&id);
        if self.ids.contains_key(&key) {
            return Err(StoreFailure::DuplicateKey(format!(
                "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {} }}",
                namespace, id
            )));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.ids.insert(key, sequence);
        self.documents.insert(sequence, document);

        Ok(Identifier::from(id))
    }

    fn matching(&self, filter: &Document, limit: Option<usize>) -> StoreResult<Vec<u64>> {
        let mut found = Vec::new();

        for (sequence, document) in &self.documents {
            if limit.is_some_and(|limit| found.len() >= limit) {
                break;
            }
            if matches(document, filter)? {
                found.push(*sequence);
            }
        }

        Ok(found)
    }

    fn update(
        &mut self,
        namespace: &Namespace,
        filter: &Document,
        change: Change<'_>,
        multi: bool,
        upsert: bool,
    ) -> StoreResult<UpdateSummary> {
        if let Change::Operators(operators) = change {
            update::check_update(operators)?;
        }

        let targets = self.matching(filter, (!multi).then_some(1))?;
        let mut summary = UpdateSummary {
            matched: targets.len() as u64,
            ..UpdateSummary::default()
        };

        for sequence in targets {
            let Some(current) = self.documents.get(&sequence) else {
                continue;
            };

            let updated = match change {
                Change::Operators(operators) => {
                    let mut updated = current.clone();
                    update::apply_update(&mut updated, operators, false)?;
                    updated
                }
                Change::Replacement(replacement) => replace(current, replacement)?,
            };

            if &updated != current {
                summary.modified += 1;
                self.documents.insert(sequence, updated);
            }
        }

        if summary.matched == 0 && upsert {
            let document = match change {
                Change::Operators(operators) => {
                    let mut seeded = update::seed_from_filter(filter)?;
                    update::apply_update(&mut seeded, operators, true)?;
                    seeded
                }
                Change::Replacement(replacement) => {
                    let mut seeded = replacement.clone();
                    if let Some(id) = update::seed_from_filter(filter)?.get(ID_FIELD) {
                        if !seeded.contains_key(ID_FIELD) {
                            seeded.insert(ID_FIELD, id.clone());
                        }
                    }
                    seeded
                }
            };

            summary.upserted = Some(self.insert(namespace, document)?);
        }

        Ok(summary)
    }

    fn delete(&mut self, filter: &Document, multi: bool) -> StoreResult<DeleteSummary> {
        let targets = self.matching(filter, (!multi).then_some(1))?;

        for sequence in &targets {
            if let Some(removed) = self.documents.remove(sequence) {
                if let Some(id) = removed.get(ID_FIELD) {
                    self.ids.remove(&id_key(id));
                }
            }
        }

        Ok(DeleteSummary {
            deleted: targets.len() as u64,
        })
    }
}

/// Puts `_id` first, generating an object id when the document has none.
fn with_leading_id(document: Document) -> Document {
    let mut ordered = Document::new();
    let id = document
        .get(ID_FIELD)
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    ordered.insert(ID_FIELD, id);
    for (key, value) in document {
        if key != ID_FIELD {
            ordered.insert(key, value);
        }
    }

    ordered
}

fn replace(current: &Document, replacement: &Document) -> StoreResult<Document> {
    let id = current.get(ID_FIELD).cloned().unwrap_or(Bson::Null);

    if replacement.get(ID_FIELD).is_some_and(|supplied| *supplied != id) {
        return Err(StoreFailure::Rejected(
            "the _id field cannot be changed by a replacement".to_string(),
        ));
    }

    let mut replaced = replacement.clone();
    replaced.insert(ID_FIELD, id);
    Ok(with_leading_id(replaced))
}

/// Index key for an `_id`. Numbers of different widths with the same value collide, as they
/// do in the store's unique index. Integers keep their exact value.
fn id_key(id: &Bson) -> String {
    match id {
        Bson::Int32(number) => format!("n:{}", number),
        Bson::Int64(number) => format!("n:{}", number),
        Bson::Double(number) if is_whole_i64(*number) => format!("n:{}", *number as i64),
        Bson::Double(number) => format!("n:{:?}", number),
        Bson::String(value) => format!("s:{}", value),
        Bson::ObjectId(oid) => format!("o:{}", oid.to_hex()),
        other => format!("x:{}", other),
    }
}

fn is_whole_i64(number: f64) -> bool {
    number.fract() == 0.0 && number >= i64::MIN as f64 && number < i64::MAX as f64
}

fn rejected(error: impl ToString) -> StoreFailure {
    StoreFailure::Rejected(error.to_string())
}

/// A document store held in process memory.
///
/// Clones share the same data. Filters, update operators and aggregation stages follow the
/// store's query language for the subset implemented by this crate; anything outside it is
/// rejected the way a server rejects an unknown operator.
///
/// An optional artificial latency is applied before every call, which lets callers observe
/// cancellation and deadline behavior without a network.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    databases: Arc<RwLock<DatabaseMap>>,
    latency: Option<Duration>,
    closed: Arc<AtomicBool>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MemoryConnectionBuilder {
        MemoryConnectionBuilder::default()
    }

    async fn enter(&self, operation: &str, namespace: Option<&Namespace>) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreFailure::Closed);
        }

        let target = namespace.map(ToString::to_string).unwrap_or_default();
        debug!(target: "docbridge::memory", operation, namespace = %target, "Handling call");

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.closed.load(Ordering::Acquire) {
            return Err(StoreFailure::Closed);
        }

        Ok(())
    }

    async fn select(&self, namespace: &Namespace, filter: &Document, options: &OperationOptions) -> StoreResult<Vec<Document>> {
        let sort = options.sort().map_err(rejected)?;
        let projection = options.projection().map_err(rejected)?;
        let skip = options.skip().map_err(rejected)?.unwrap_or(0) as usize;
        let limit = options.limit().map_err(rejected)?.map(|limit| limit as usize);

        let databases = self.databases.read().await;
        let Some(collection) = databases
            .get(&namespace.database)
            .and_then(|collections| collections.get(&namespace.collection))
        else {
            return Ok(Vec::new());
        };

        let mut selected = Vec::new();
        for document in collection.documents.values() {
            if matches(document, filter)? {
                selected.push(document.clone());
            }
        }
        drop(databases);

        if let Some(sort) = sort {
            pipeline::sort(&mut selected, sort)?;
        }

        selected
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .map(|document| match projection {
                Some(projection) => pipeline::project(&document, projection),
                None => Ok(document),
            })
            .collect()
    }

    async fn write<T>(
        &self,
        namespace: &Namespace,
        apply: impl FnOnce(&mut MemoryCollection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut databases = self.databases.write().await;
        let collection = databases
            .entry(namespace.database.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default();

        apply(collection)
    }
}

fn into_stream(documents: Vec<Document>) -> DocumentStream {
    stream::iter(documents.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<Option<Document>> {
        self.enter("find_one", Some(namespace)).await?;

        let options = options.with("limit", 1);
        Ok(self
            .select(namespace, &filter, &options)
            .await?
            .into_iter()
            .next())
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<DocumentStream> {
        self.enter("find", Some(namespace)).await?;

        Ok(into_stream(self.select(namespace, &filter, &options).await?))
    }

    async fn count_documents(
        &self,
        namespace: &Namespace,
        filter: Filter,
        options: OperationOptions,
    ) -> StoreResult<u64> {
        self.enter("count_documents", Some(namespace)).await?;

        let counted = OperationOptions::new()
            .with("skip", options.skip().map_err(rejected)?.unwrap_or(0) as i64)
            .with("limit", options.limit().map_err(rejected)?.unwrap_or(0) as i64);

        Ok(self.select(namespace, &filter, &counted).await?.len() as u64)
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
        _options: OperationOptions,
    ) -> StoreResult<Identifier> {
        self.enter("insert_one", Some(namespace)).await?;

        self.write(namespace, |collection| collection.insert(namespace, document))
            .await
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        options: OperationOptions,
    ) -> StoreResult<Vec<Identifier>> {
        self.enter("insert_many", Some(namespace)).await?;

        let ordered = options.ordered().map_err(rejected)?;
        let attempted = documents.len();

        self.write(namespace, |collection| {
            let mut inserted = Vec::with_capacity(attempted);
            let mut failures = Vec::new();

            for (index, document) in documents.into_iter().enumerate() {
                match collection.insert(namespace, document) {
                    Ok(id) => inserted.push((index, id)),
                    Err(failure) => {
                        failures.push(format!("index {}: {}", index, failure));
                        if ordered {
                            break;
                        }
                    }
                }
            }

            if failures.is_empty() {
                return Ok(inserted.into_iter().map(|(_, id)| id).collect());
            }

            Err(StoreFailure::PartialWrite {
                attempted,
                inserted,
                message: failures.join("; "),
            })
        })
        .await
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        self.enter("update_one", Some(namespace)).await?;

        let upsert = options.upsert().map_err(rejected)?;
        self.write(namespace, |collection| {
            collection.update(namespace, &filter, Change::Operators(&update), false, upsert)
        })
        .await
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        update: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        self.enter("update_many", Some(namespace)).await?;

        let upsert = options.upsert().map_err(rejected)?;
        self.write(namespace, |collection| {
            collection.update(namespace, &filter, Change::Operators(&update), true, upsert)
        })
        .await
    }

    async fn replace_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        replacement: Document,
        options: OperationOptions,
    ) -> StoreResult<UpdateSummary> {
        self.enter("replace_one", Some(namespace)).await?;

        let upsert = options.upsert().map_err(rejected)?;
        self.write(namespace, |collection| {
            collection.update(namespace, &filter, Change::Replacement(&replacement), false, upsert)
        })
        .await
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: Filter,
        _options: OperationOptions,
    ) -> StoreResult<DeleteSummary> {
        self.enter("delete_one", Some(namespace)).await?;

        self.write(namespace, |collection| collection.delete(&filter, false))
            .await
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Filter,
        _options: OperationOptions,
    ) -> StoreResult<DeleteSummary> {
        self.enter("delete_many", Some(namespace)).await?;

        self.write(namespace, |collection| collection.delete(&filter, true))
            .await
    }

    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Pipeline,
        _options: OperationOptions,
    ) -> StoreResult<DocumentStream> {
        self.enter("aggregate", Some(namespace)).await?;

        let documents = self
            .select(namespace, &Document::new(), &OperationOptions::new())
            .await?;

        Ok(into_stream(pipeline::run(documents, &pipeline)?))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.enter("ping", None).await
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        debug!(target: "docbridge::memory", "Connection closed");

        Ok(())
    }
}

/// Builder for [`MemoryConnection`].
///
/// # Example
///
/// ```ignore
/// use docbridge_memory::MemoryConnection;
/// use docbridge_core::connection::ConnectionBuilder;
///
/// let connection = MemoryConnection::builder()
///     .latency(Duration::from_millis(50))
///     .connect()
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryConnectionBuilder {
    latency: Option<Duration>,
}

impl MemoryConnectionBuilder {
    /// Reads builder settings from a `memory://` URI.
    ///
    /// The only recognized query parameter is `latencyMs`, the artificial delay applied
    /// before each call.
    pub fn from_uri(uri: &str) -> StoreResult<Self> {
        let rest = uri
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| StoreFailure::InvalidUri(format!("expected a {} URI, got '{}'", MEMORY_SCHEME, uri)))?;

        let mut builder = Self::default();
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(builder);
        };

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            match pair.split_once('=') {
                Some(("latencyMs", value)) => {
                    let millis = value.parse::<u64>().map_err(|_| {
                        StoreFailure::InvalidUri(format!("latencyMs must be a whole number, got '{}'", value))
                    })?;
                    builder = builder.latency(Duration::from_millis(millis));
                }
                _ => {
                    return Err(StoreFailure::InvalidUri(format!(
                        "unsupported memory URI option '{}'",
                        pair
                    )));
                }
            }
        }

        Ok(builder)
    }

    /// Delays every call by `latency` before it touches the data.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl ConnectionBuilder for MemoryConnectionBuilder {
    type Connection = MemoryConnection;

    async fn build(self) -> StoreResult<Self::Connection> {
        Ok(MemoryConnection {
            latency: self.latency,
            ..MemoryConnection::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use futures::TryStreamExt;

    use super::*;

    fn namespace() -> Namespace {
        Namespace::new("test", "items")
    }

    #[tokio::test]
    async fn generated_ids_lead_the_document() {
        let connection = MemoryConnection::new();
        let id = connection
            .insert_one(&namespace(), doc! { "name": "a" }, OperationOptions::new())
            .await
            .unwrap();

        let stored = connection
            .find_one(&namespace(), doc! {}, OperationOptions::new())
            .await
            .unwrap()
            .unwrap();

        assert!(id.as_object_id().is_some());
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stored.get(ID_FIELD), Some(id.as_bson()));
    }

    #[tokio::test]
    async fn duplicate_ids_are_refused() {
        let connection = MemoryConnection::new();
        connection
            .insert_one(&namespace(), doc! { "_id": 1 }, OperationOptions::new())
            .await
            .unwrap();

        let failure = connection
            .insert_one(&namespace(), doc! { "_id": 1_i64 }, OperationOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(failure, StoreFailure::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn large_integer_ids_stay_distinct() {
        let connection = MemoryConnection::new();
        for id in [9_007_199_254_740_992_i64, 9_007_199_254_740_993_i64] {
            connection
                .insert_one(&namespace(), doc! { "_id": id }, OperationOptions::new())
                .await
                .unwrap();
        }

        connection
            .insert_one(&namespace(), doc! { "_id": 2.0 }, OperationOptions::new())
            .await
            .unwrap();

        let failure = connection
            .insert_one(&namespace(), doc! { "_id": 2 }, OperationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(failure, StoreFailure::DuplicateKey(_)));
        assert_ne!(id_key(&Bson::Double(2.5)), id_key(&Bson::Int32(2)));
    }

    #[tokio::test]
    async fn malformed_updates_fail_without_a_match() {
        let connection = MemoryConnection::new();

        let failure = connection
            .update_one(
                &namespace(),
                doc! { "missing": true },
                doc! { "$explode": { "a": 1 } },
                OperationOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(failure, StoreFailure::Rejected(_)));

        let failure = connection
            .update_many(
                &namespace(),
                doc! { "missing": true },
                doc! { "$inc": { "n": "one" } },
                OperationOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(failure, StoreFailure::Rejected(_)));
    }

    #[tokio::test]
    async fn unordered_inserts_continue_past_failures() {
        let connection = MemoryConnection::new();
        let failure = connection
            .insert_many(
                &namespace(),
                vec![doc! { "_id": 1 }, doc! { "_id": 1 }, doc! { "_id": 2 }],
                OperationOptions::new().with("ordered", false),
            )
            .await
            .unwrap_err();

        match failure {
            StoreFailure::PartialWrite { attempted, inserted, .. } => {
                assert_eq!(attempted, 3);
                assert_eq!(inserted.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0, 2]);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_applies_sort_skip_limit_and_projection() {
        let connection = MemoryConnection::new();
        for n in [3, 1, 4, 1, 5] {
            connection
                .insert_one(&namespace(), doc! { "n": n, "tag": "x" }, OperationOptions::new())
                .await
                .unwrap();
        }

        let options = OperationOptions::from(doc! {
            "sort": { "n": -1 },
            "skip": 1,
            "limit": 2,
            "projection": { "n": 1, "_id": 0 },
        });
        let found: Vec<Document> = connection
            .find(&namespace(), doc! { "n": { "$gte": 1 } }, options)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "n": 4 }, doc! { "n": 3 }]);
    }

    #[tokio::test]
    async fn upserts_seed_from_the_filter() {
        let connection = MemoryConnection::new();
        let summary = connection
            .update_one(
                &namespace(),
                doc! { "sku": "A1" },
                doc! { "$inc": { "qty": 2 } },
                OperationOptions::new().with("upsert", true),
            )
            .await
            .unwrap();

        assert_eq!(summary.matched, 0);
        assert!(summary.upserted.is_some());

        let stored = connection
            .find_one(&namespace(), doc! { "sku": "A1" }, OperationOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_i32("qty").unwrap(), 2);
    }

    #[tokio::test]
    async fn unchanged_matches_are_not_modifications() {
        let connection = MemoryConnection::new();
        connection
            .insert_one(&namespace(), doc! { "_id": 1, "a": 1 }, OperationOptions::new())
            .await
            .unwrap();

        let summary = connection
            .update_one(&namespace(), doc! { "_id": 1 }, doc! { "$set": { "a": 1 } }, OperationOptions::new())
            .await
            .unwrap();

        assert_eq!(summary, UpdateSummary { matched: 1, modified: 0, upserted: None });
    }

    #[tokio::test]
    async fn replacement_keeps_the_id() {
        let connection = MemoryConnection::new();
        connection
            .insert_one(&namespace(), doc! { "_id": 9, "a": 1, "b": 2 }, OperationOptions::new())
            .await
            .unwrap();

        connection
            .replace_one(&namespace(), doc! { "a": 1 }, doc! { "c": 3 }, OperationOptions::new())
            .await
            .unwrap();

        let stored = connection
            .find_one(&namespace(), doc! {}, OperationOptions::new())
            .await
            .unwrap();
        assert_eq!(stored, Some(doc! { "_id": 9, "c": 3 }));
    }

    #[tokio::test]
    async fn closed_connections_refuse_calls() {
        let connection = MemoryConnection::new();
        connection.close().await.unwrap();

        assert_eq!(connection.ping().await, Err(StoreFailure::Closed));
        assert_eq!(
            connection
                .count_documents(&namespace(), doc! {}, OperationOptions::new())
                .await,
            Err(StoreFailure::Closed)
        );
    }

    #[test]
    fn uri_options() {
        assert!(MemoryConnectionBuilder::from_uri("memory://").is_ok());
        assert_eq!(
            MemoryConnectionBuilder::from_uri("memory://local?latencyMs=25")
                .unwrap()
                .latency,
            Some(Duration::from_millis(25))
        );
        assert!(matches!(
            MemoryConnectionBuilder::from_uri("memory://?latencyMs=soon"),
            Err(StoreFailure::InvalidUri(_))
        ));
        assert!(matches!(
            MemoryConnectionBuilder::from_uri("mongodb://localhost"),
            Err(StoreFailure::InvalidUri(_))
        ));
    }
}
