//! Binding a connection to a database and collection.

use crate::{connection::Connection, document::Namespace};

/// A connection paired with the collection its calls target.
///
/// The handle does not own the store session. Bind it to a borrowed connection
/// (`&MyConnection`) to tie its lifetime to the owner, or to a shared `Arc` when several
/// handles and the owner live independently. Binding performs no I/O and does not check that
/// the collection exists; stores create collections on first write.
///
/// # Type Parameters
///
/// * `C` - The connection type, usually a reference or `Arc` to the owned connection
#[derive(Debug, Clone)]
pub struct CollectionHandle<C: Connection> {
    connection: C,
    namespace: Namespace,
}

impl<C: Connection> CollectionHandle<C> {
    pub fn bind(connection: C, database: &str, collection: &str) -> Self {
        Self {
            connection,
            namespace: Namespace::new(database, collection),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn database_name(&self) -> &str {
        &self.namespace.database
    }

    pub fn collection_name(&self) -> &str {
        &self.namespace.collection
    }
}
