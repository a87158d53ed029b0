use std::{collections::HashSet, time::Duration};

use bson::{Document, doc};
use futures::StreamExt;

use docbridge::{
    memory::MemoryConnection,
    prelude::*,
};

fn options() -> OperationOptions {
    OperationOptions::new()
}

async fn memory_adapter(collection: &str) -> SharedAdapter {
    open_adapter("memory://", "test", collection, ConnectSettings::new())
        .await
        .unwrap()
}

async fn slow_adapter(latency: Duration) -> DocumentAdapter<MemoryConnection> {
    let connection = MemoryConnection::builder()
        .latency(latency)
        .connect()
        .await
        .unwrap();

    DocumentAdapter::new(CollectionHandle::bind(connection, "test", "slow"))
}

fn without_id(mut document: Document) -> Document {
    document.remove("_id");
    document
}

#[tokio::test]
async fn find_one_without_match_is_empty() {
    let adapter = memory_adapter("empty").await;
    let scope = Scope::background();

    assert_eq!(adapter.find_one(&scope, doc! {}, options()).await, Ok(None));

    adapter
        .insert_one(&scope, doc! { "name": "a" }, options())
        .await
        .unwrap();
    assert_eq!(
        adapter
            .find_one(&scope, doc! { "name": "missing" }, options())
            .await,
        Ok(None)
    );
}

#[tokio::test]
async fn example_lifecycle() {
    let adapter = memory_adapter("lifecycle").await;
    let scope = Scope::with_timeout(Duration::from_secs(5));

    let id = adapter
        .insert_one(&scope, doc! { "name": "a" }, options())
        .await
        .unwrap();

    let found = adapter
        .find_one(&scope, doc! { "name": "a" }, options())
        .await
        .unwrap();
    assert_eq!(found, Some(doc! { "_id": &id, "name": "a" }));

    assert!(
        adapter
            .delete_one(&scope, doc! { "name": "a" }, options())
            .await
            .unwrap()
    );
    assert_eq!(
        adapter
            .find_one(&scope, doc! { "name": "a" }, options())
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn inserted_documents_round_trip() {
    let adapter = memory_adapter("round_trip").await;
    let scope = Scope::background();
    let original = doc! {
        "name": "widget",
        "price": 2.5,
        "tags": ["a", "b"],
        "dims": { "h": 1, "w": 2_i64 },
        "active": true,
        "note": null,
    };

    let id = adapter
        .insert_one(&scope, original.clone(), options())
        .await
        .unwrap();
    let stored = adapter
        .find_one(&scope, doc! { "_id": &id }, options())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stored.get("_id"), Some(id.as_bson()));
    assert_eq!(without_id(stored), original);
}

#[tokio::test]
async fn insert_many_returns_ordered_distinct_identifiers() {
    let adapter = memory_adapter("many").await;
    let scope = Scope::background();
    let documents: Vec<Document> = (0..50).map(|i| doc! { "i": i }).collect();

    let ids = adapter
        .insert_many(&scope, documents, options())
        .await
        .unwrap();

    assert_eq!(ids.len(), 50);
    assert_eq!(ids.iter().map(ToString::to_string).collect::<HashSet<_>>().len(), 50);

    for (index, id) in ids.iter().enumerate() {
        let stored = adapter
            .find_one(&scope, doc! { "_id": id }, options())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_i32("i").unwrap(), index as i32);
    }
}

#[tokio::test]
async fn caller_supplied_identifiers_are_kept() {
    let adapter = memory_adapter("supplied").await;
    let scope = Scope::background();

    let ids = adapter
        .insert_many(&scope, vec![doc! { "_id": "b" }, doc! { "_id": "a" }], options())
        .await
        .unwrap();

    assert_eq!(ids.iter().map(ToString::to_string).collect::<Vec<_>>(), vec!["b", "a"]);
}

#[tokio::test]
async fn updates_without_match_change_nothing() {
    let adapter = memory_adapter("no_match").await;
    let scope = Scope::background();
    adapter
        .insert_one(&scope, doc! { "n": 1 }, options())
        .await
        .unwrap();

    assert!(
        !adapter
            .update_one(&scope, doc! { "n": 2 }, doc! { "$set": { "x": 1 } }, options())
            .await
            .unwrap()
    );
    assert_eq!(
        adapter
            .update_many(&scope, doc! { "n": 2 }, doc! { "$set": { "x": 1 } }, options())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn matched_but_unchanged_is_not_modified() {
    let adapter = memory_adapter("unchanged").await;
    let scope = Scope::background();
    adapter
        .insert_many(&scope, vec![doc! { "n": 1, "x": 1 }, doc! { "n": 1, "x": 2 }], options())
        .await
        .unwrap();

    assert!(
        !adapter
            .update_one(&scope, doc! { "x": 1 }, doc! { "$set": { "x": 1 } }, options())
            .await
            .unwrap()
    );
    assert_eq!(
        adapter
            .update_many(&scope, doc! { "n": 1 }, doc! { "$set": { "x": 2 } }, options())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn upserts_report_a_modification() {
    let adapter = memory_adapter("upsert").await;
    let scope = Scope::background();

    assert!(
        adapter
            .update_one(
                &scope,
                doc! { "sku": "A1" },
                doc! { "$set": { "qty": 5 } },
                OperationOptions::new().with("upsert", true),
            )
            .await
            .unwrap()
    );
    assert_eq!(
        adapter
            .count_documents(&scope, doc! { "sku": "A1", "qty": 5 }, options())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn replace_and_delete_many() {
    let adapter = memory_adapter("replace").await;
    let scope = Scope::background();
    let ids = adapter
        .insert_many(
            &scope,
            vec![doc! { "k": 1, "v": "a" }, doc! { "k": 2, "v": "b" }, doc! { "k": 2, "v": "c" }],
            options(),
        )
        .await
        .unwrap();

    assert!(
        adapter
            .replace_one(&scope, doc! { "k": 1 }, doc! { "k": 1, "v": "z" }, options())
            .await
            .unwrap()
    );
    assert_eq!(
        adapter
            .find_one(&scope, doc! { "_id": &ids[0] }, options())
            .await
            .unwrap(),
        Some(doc! { "_id": &ids[0], "k": 1, "v": "z" })
    );

    assert_eq!(
        adapter
            .delete_many(&scope, doc! { "k": 2 }, options())
            .await
            .unwrap(),
        2
    );
    assert_eq!(adapter.count_documents(&scope, doc! {}, options()).await, Ok(1));
}

#[tokio::test]
async fn delete_one_is_idempotent() {
    let adapter = memory_adapter("idempotent").await;
    let scope = Scope::background();
    let id = adapter
        .insert_one(&scope, doc! { "n": 1 }, options())
        .await
        .unwrap();

    assert!(
        adapter
            .delete_one(&scope, doc! { "_id": &id }, options())
            .await
            .unwrap()
    );
    assert!(
        !adapter
            .delete_one(&scope, doc! { "_id": &id }, options())
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn aggregate_returns_every_document_without_truncation() {
    const TOTAL: i32 = 12_000;

    let adapter = memory_adapter("large").await;
    let scope = Scope::background();
    let documents: Vec<Document> = (0..TOTAL).map(|i| doc! { "i": i }).collect();
    adapter
        .insert_many(&scope, documents, options())
        .await
        .unwrap();

    let results = adapter
        .aggregate(&scope, vec![doc! { "$match": {} }], options())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(results.len(), TOTAL as usize);
    let seen: HashSet<i32> = results
        .iter()
        .map(|document| document.get_i32("i").unwrap())
        .collect();
    assert_eq!(seen.len(), TOTAL as usize);
}

#[tokio::test]
async fn aggregate_runs_stages_in_order() {
    let adapter = memory_adapter("stages").await;
    let scope = Scope::background();
    adapter
        .insert_many(
            &scope,
            (1..=10).map(|i| doc! { "n": i, "even": i % 2 == 0 }).collect(),
            options(),
        )
        .await
        .unwrap();

    let results = adapter
        .aggregate(
            &scope,
            vec![
                doc! { "$match": { "even": true } },
                doc! { "$sort": { "n": -1 } },
                doc! { "$limit": 2 },
                doc! { "$project": { "_id": 0, "n": 1 } },
            ],
            options(),
        )
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(results, vec![doc! { "n": 10 }, doc! { "n": 8 }]);
}

#[tokio::test]
async fn find_cursor_is_lazy_and_streamable() {
    let adapter = memory_adapter("cursor").await;
    let scope = Scope::background();
    adapter
        .insert_many(&scope, (0..5).map(|i| doc! { "i": i }).collect(), options())
        .await
        .unwrap();

    let mut cursor = adapter
        .find(&scope, doc! { "i": { "$gte": 1 } }, OperationOptions::new().with("sort", doc! { "i": -1 }))
        .await
        .unwrap();
    let first = cursor.next().await.unwrap().unwrap();
    assert_eq!(first.get_i32("i").unwrap(), 4);

    let rest: Vec<i32> = cursor
        .into_stream()
        .map(|document| document.unwrap().get_i32("i").unwrap())
        .collect()
        .await;
    assert_eq!(rest, vec![3, 2, 1]);
}

#[tokio::test]
async fn cursor_pulls_honor_the_opening_scope() {
    let adapter = memory_adapter("cursor_scope").await;
    let scope = Scope::background();
    adapter
        .insert_many(&scope, vec![doc! { "i": 1 }, doc! { "i": 2 }], options())
        .await
        .unwrap();

    let call_scope = scope.child();
    let mut cursor = adapter
        .find(&call_scope, doc! {}, options())
        .await
        .unwrap();
    call_scope.cancel();

    let error = cursor.next().await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Query);
    assert!(error.is_cancelled());
    assert!(cursor.next().await.is_none());
}

#[tokio::test]
async fn cancelling_a_read_fails_promptly() {
    let adapter = slow_adapter(Duration::from_secs(30)).await;
    let scope = Scope::background();

    let (result, _) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(adapter.find_one(&scope, doc! {}, options()), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            scope.cancel();
        })
    })
    .await
    .expect("cancelled call did not return");

    let error = result.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Query);
    assert!(error.is_cancelled());
    assert_eq!(error.cause(), Some(&StoreFailure::Cancelled));
}

#[tokio::test]
async fn cancelling_a_write_fails_promptly() {
    let adapter = slow_adapter(Duration::from_secs(30)).await;
    let scope = Scope::background();

    let (result, _) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(adapter.insert_one(&scope, doc! { "n": 1 }, options()), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            scope.cancel();
        })
    })
    .await
    .expect("cancelled call did not return");

    let error = result.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Write);
    assert!(error.is_cancelled());
}

#[tokio::test]
async fn expired_deadlines_fail_every_operation() {
    let adapter = slow_adapter(Duration::from_secs(30)).await;
    let scope = Scope::with_timeout(Duration::from_millis(50));

    let read = tokio::time::timeout(Duration::from_secs(5), adapter.count_documents(&scope, doc! {}, options()))
        .await
        .expect("deadline was not enforced")
        .unwrap_err();
    assert_eq!(read.kind(), ErrorKind::Query);
    assert_eq!(read.cause(), Some(&StoreFailure::DeadlineExceeded));

    let write = adapter
        .delete_many(&scope, doc! {}, options())
        .await
        .unwrap_err();
    assert_eq!(write.kind(), ErrorKind::Write);
    assert!(write.is_cancelled());

    let ping = adapter.ping(&scope).await.unwrap_err();
    assert_eq!(ping.kind(), ErrorKind::Query);
    assert!(ping.is_cancelled());
}

#[tokio::test]
async fn duplicate_identifiers_are_write_errors() {
    let adapter = memory_adapter("duplicate").await;
    let scope = Scope::background();
    adapter
        .insert_one(&scope, doc! { "_id": 7 }, options())
        .await
        .unwrap();

    let error = adapter
        .insert_one(&scope, doc! { "_id": 7 }, options())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Write);
    assert!(matches!(error.cause(), Some(StoreFailure::DuplicateKey(_))));
    assert_eq!(error.context().operation, Operation::InsertOne);
    assert_eq!(error.context().namespace, Some(Namespace::new("test", "duplicate")));
}

#[tokio::test]
async fn partial_inserts_are_surfaced() {
    let adapter = memory_adapter("partial").await;
    let scope = Scope::background();

    let error = adapter
        .insert_many(
            &scope,
            vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 1 }, doc! { "_id": 3 }],
            options(),
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Write);
    match error.cause() {
        Some(StoreFailure::PartialWrite { attempted, inserted, .. }) => {
            assert_eq!(*attempted, 4);
            assert_eq!(inserted.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0, 1]);
        }
        other => panic!("expected a partial write, got {other:?}"),
    }
    assert_eq!(adapter.count_documents(&scope, doc! {}, options()).await, Ok(2));
}

#[tokio::test]
async fn structurally_invalid_input_never_reaches_the_store() {
    let adapter = memory_adapter("invalid").await;
    let scope = Scope::background();
    adapter
        .insert_one(&scope, doc! { "n": 1 }, options())
        .await
        .unwrap();

    let empty = adapter
        .insert_many(&scope, Vec::new(), options())
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Configuration);
    assert!(empty.cause().is_none());

    let plain_update = adapter
        .update_many(&scope, doc! {}, doc! { "n": 2 }, options())
        .await
        .unwrap_err();
    assert_eq!(plain_update.kind(), ErrorKind::Configuration);

    let operator_replacement = adapter
        .replace_one(&scope, doc! {}, doc! { "$set": { "n": 2 } }, options())
        .await
        .unwrap_err();
    assert_eq!(operator_replacement.kind(), ErrorKind::Configuration);

    assert_eq!(adapter.count_documents(&scope, doc! { "n": 1 }, options()).await, Ok(1));
}

#[tokio::test]
async fn store_rejections_follow_the_operation_side() {
    let adapter = memory_adapter("rejections").await;
    let scope = Scope::background();

    let query = adapter
        .aggregate(&scope, vec![doc! { "$teleport": {} }], options())
        .await
        .unwrap_err();
    assert_eq!(query.kind(), ErrorKind::Query);
    assert!(matches!(query.cause(), Some(StoreFailure::Rejected(_))));

    let filter = adapter
        .find(&scope, doc! { "n": { "$almost": 1 } }, options())
        .await
        .unwrap_err();
    assert_eq!(filter.kind(), ErrorKind::Query);

    let unknown = adapter
        .update_one(&scope, doc! { "n": "absent" }, doc! { "$explode": { "n": 1 } }, options())
        .await
        .unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::Write);
    assert!(matches!(unknown.cause(), Some(StoreFailure::Rejected(_))));

    adapter
        .insert_one(&scope, doc! { "n": "text" }, options())
        .await
        .unwrap();

    let write = adapter
        .update_one(&scope, doc! {}, doc! { "$inc": { "n": 1 } }, options())
        .await
        .unwrap_err();
    assert_eq!(write.kind(), ErrorKind::Write);
}

#[tokio::test]
async fn closed_connections_report_connection_errors() {
    let adapter = memory_adapter("closed").await;
    let scope = Scope::background();

    adapter.ping(&scope).await.unwrap();
    adapter.close(&scope).await.unwrap();

    let ping = adapter.ping(&scope).await.unwrap_err();
    assert_eq!(ping.kind(), ErrorKind::Connection);

    let find = adapter
        .find_one(&scope, doc! {}, options())
        .await
        .unwrap_err();
    assert_eq!(find.kind(), ErrorKind::Connection);
    assert_eq!(find.cause(), Some(&StoreFailure::Closed));
}

#[tokio::test]
async fn handles_share_one_connection() {
    let connection = MemoryConnection::new();
    let scope = Scope::background();
    let users = DocumentAdapter::new(CollectionHandle::bind(&connection, "app", "users"));
    let orders = DocumentAdapter::new(CollectionHandle::bind(&connection, "app", "orders"));

    let (left, right) = tokio::join!(
        users.insert_one(&scope, doc! { "name": "a" }, options()),
        orders.insert_one(&scope, doc! { "item": "b" }, options()),
    );
    left.unwrap();
    right.unwrap();

    assert_eq!(users.count_documents(&scope, doc! {}, options()).await, Ok(1));
    assert_eq!(orders.count_documents(&scope, doc! {}, options()).await, Ok(1));
    assert_eq!(users.handle().collection_name(), "users");
}

#[tokio::test]
async fn malformed_memory_uris_fail_to_connect() {
    let error = open_adapter("memory://?latencyMs=later", "test", "c", ConnectSettings::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Connection);
    assert_eq!(error.context().operation, Operation::Connect);
}

#[cfg(feature = "mongodb")]
#[tokio::test]
async fn unreachable_mongodb_fails_ping_with_connection_error() {
    let adapter = open_adapter(
        "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200",
        "test",
        "c",
        ConnectSettings::new(),
    )
    .await
    .unwrap();

    let error = adapter.ping(&Scope::background()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Connection);
    assert!(matches!(error.cause(), Some(StoreFailure::Unreachable(_))));
}
