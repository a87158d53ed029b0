//! Documents, identifiers and namespaces.
//!
//! Every value that crosses the adapter boundary is expressed with these types or with
//! [`bson`] values; nothing here depends on a store driver.

use std::fmt;

use bson::{Bson, oid::ObjectId};

pub use bson::Document;

/// Match criteria for stored documents. An empty filter matches every document.
pub type Filter = Document;

/// An ordered sequence of aggregation stages; stages run in sequence.
pub type Pipeline = Vec<Document>;

/// The field every stored document is keyed by.
pub const ID_FIELD: &str = "_id";

/// A database and collection name pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// The `_id` value of a stored document.
///
/// Generated by the store when the inserted document does not supply one, otherwise the
/// caller's own value. Uniqueness is the store's guarantee, not the adapter's.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier(Bson);

impl Identifier {
    /// A fresh object id, as a store assigns to documents without an `_id`.
    pub fn generate() -> Self {
        Self(Bson::ObjectId(ObjectId::new()))
    }

    pub fn as_bson(&self) -> &Bson {
        &self.0
    }

    pub fn into_bson(self) -> Bson {
        self.0
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        self.0.as_object_id()
    }
}

impl From<Bson> for Identifier {
    fn from(value: Bson) -> Self {
        Self(value)
    }
}

impl From<ObjectId> for Identifier {
    fn from(value: ObjectId) -> Self {
        Self(Bson::ObjectId(value))
    }
}

impl From<Identifier> for Bson {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Bson::ObjectId(oid) => write!(f, "{}", oid.to_hex()),
            Bson::String(value) => f.write_str(value),
            other => write!(f, "{}", other),
        }
    }
}

/// Checks that `update` is an operator document: non-empty, every top-level key `$`-prefixed.
pub fn check_update_spec(update: &Document) -> Result<(), String> {
    if update.is_empty() {
        return Err("update document must not be empty".to_string());
    }

    match update.keys().find(|key| !key.starts_with('$')) {
        Some(key) => Err(format!(
            "update document may only contain operators, found field '{}'",
            key
        )),
        None => Ok(()),
    }
}

/// Checks that `replacement` is a plain document without top-level operators.
pub fn check_replacement(replacement: &Document) -> Result<(), String> {
    match replacement.keys().find(|key| key.starts_with('$')) {
        Some(key) => Err(format!(
            "replacement document may not contain operators, found '{}'",
            key
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn update_specs_require_operators() {
        assert!(check_update_spec(&doc! { "$set": { "a": 1 } }).is_ok());
        assert!(check_update_spec(&doc! {}).is_err());
        assert!(check_update_spec(&doc! { "$set": { "a": 1 }, "b": 2 }).is_err());
    }

    #[test]
    fn replacements_reject_operators() {
        assert!(check_replacement(&doc! { "a": 1 }).is_ok());
        assert!(check_replacement(&doc! {}).is_ok());
        assert!(check_replacement(&doc! { "$set": { "a": 1 } }).is_err());
    }

    #[test]
    fn object_id_identifiers_display_as_hex() {
        let oid = ObjectId::new();
        let id = Identifier::from(oid);

        assert_eq!(id.to_string(), oid.to_hex());
        assert_eq!(id.as_object_id(), Some(oid));
        assert_eq!(Bson::from(&id), Bson::ObjectId(oid));
        assert_eq!(doc! { "_id": &id }, doc! { "_id": oid });
    }

    #[test]
    fn namespaces_display_dotted() {
        assert_eq!(Namespace::new("history", "accounts").to_string(), "history.accounts");
    }
}
