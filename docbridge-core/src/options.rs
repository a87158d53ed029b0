//! Per-call configuration objects.
//!
//! Options are a plain document of option names to values, named the way the store names
//! them (`sort`, `projection`, `limit`, `skip`, `upsert`, ...). The adapter does not validate
//! them; each backend decides what it understands. The typed accessors below are for backends
//! that interpret options themselves.

use bson::{Bson, Document};
use serde_json::Value;
use thiserror::Error;

use crate::value::json_to_document;

/// A recognized option carried a value of the wrong shape.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Option '{key}' must be {expected}")]
pub struct InvalidOption {
    pub key: &'static str,
    pub expected: &'static str,
}

/// A loosely-typed options document passed through to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOptions(Document);

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a host JSON value. `null` means no options.
    pub fn from_json(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::default()),
            other => json_to_document(other).map(Self),
        }
    }

    /// Adds or replaces one option.
    pub fn with(mut self, key: &str, value: impl Into<Bson>) -> Self {
        self.0.insert(key, value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.0.get(key)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    pub fn sort(&self) -> Result<Option<&Document>, InvalidOption> {
        self.document("sort")
    }

    pub fn projection(&self) -> Result<Option<&Document>, InvalidOption> {
        self.document("projection")
    }

    /// The result limit. Zero and negative limits follow the store's convention of
    /// "no limit" and "single batch" respectively, so only the magnitude is returned.
    pub fn limit(&self) -> Result<Option<u64>, InvalidOption> {
        Ok(self
            .integer("limit")?
            .filter(|limit| *limit != 0)
            .map(i64::unsigned_abs))
    }

    pub fn skip(&self) -> Result<Option<u64>, InvalidOption> {
        match self.integer("skip")? {
            Some(skip) if skip < 0 => Err(InvalidOption {
                key: "skip",
                expected: "a non-negative integer",
            }),
            skip => Ok(skip.map(|skip| skip as u64)),
        }
    }

    pub fn upsert(&self) -> Result<bool, InvalidOption> {
        Ok(self.boolean("upsert")?.unwrap_or(false))
    }

    /// Whether a multi-document insert stops at the first failure. Defaults to `true`.
    pub fn ordered(&self) -> Result<bool, InvalidOption> {
        Ok(self.boolean("ordered")?.unwrap_or(true))
    }

    fn document(&self, key: &'static str) -> Result<Option<&Document>, InvalidOption> {
        match self.0.get(key) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::Document(document)) => Ok(Some(document)),
            Some(_) => Err(InvalidOption {
                key,
                expected: "a document",
            }),
        }
    }

    fn integer(&self, key: &'static str) -> Result<Option<i64>, InvalidOption> {
        match self.0.get(key) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::Int32(value)) => Ok(Some(*value as i64)),
            Some(Bson::Int64(value)) => Ok(Some(*value)),
            Some(Bson::Double(value)) if value.fract() == 0.0 => Ok(Some(*value as i64)),
            Some(_) => Err(InvalidOption {
                key,
                expected: "an integer",
            }),
        }
    }

    fn boolean(&self, key: &'static str) -> Result<Option<bool>, InvalidOption> {
        match self.0.get(key) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::Boolean(value)) => Ok(Some(*value)),
            Some(_) => Err(InvalidOption {
                key,
                expected: "a boolean",
            }),
        }
    }
}

impl From<Document> for OperationOptions {
    fn from(document: Document) -> Self {
        Self(document)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_recognized_options() {
        let options = OperationOptions::from(doc! {
            "sort": { "created_at": -1 },
            "limit": 10,
            "skip": 5i64,
            "upsert": true,
        });

        assert_eq!(options.sort().unwrap(), Some(&doc! { "created_at": -1 }));
        assert_eq!(options.limit().unwrap(), Some(10));
        assert_eq!(options.skip().unwrap(), Some(5));
        assert!(options.upsert().unwrap());
        assert!(options.ordered().unwrap());
        assert_eq!(options.projection().unwrap(), None);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let options = OperationOptions::new().with("limit", 0);

        assert_eq!(options.limit().unwrap(), None);
    }

    #[test]
    fn ill_typed_options_are_reported() {
        let options = OperationOptions::new()
            .with("limit", "ten")
            .with("upsert", 1);

        assert_eq!(
            options.limit().unwrap_err().to_string(),
            "Option 'limit' must be an integer"
        );
        assert!(options.upsert().is_err());
        assert!(OperationOptions::new().with("skip", -1).skip().is_err());
    }

    #[test]
    fn unknown_keys_are_kept() {
        let options = OperationOptions::from_json(json!({ "allowDiskUse": true, "custom": 1 })).unwrap();

        assert_eq!(options.get("custom"), Some(&Bson::Int32(1)));
        assert_eq!(options.into_document().len(), 2);
        assert!(OperationOptions::from_json(Value::Null).unwrap().is_empty());
        assert!(OperationOptions::from_json(json!("limit")).is_err());
    }
}
