//! Conversion between host JSON values and BSON documents.
//!
//! Hosts hand the adapter plain JSON. Object ids and datetimes travel in their extended JSON
//! shapes (`{"$oid": "..."}` and `{"$date": <millis>}`) so that identifiers returned by an
//! insert can be fed straight back into a filter.

use bson::{Bson, DateTime, Document, oid::ObjectId};
use serde_json::{Map, Number, Value};

/// Converts a JSON value into BSON.
pub fn json_to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(value) => Bson::Boolean(value),
        Value::Number(number) => number_to_bson(&number),
        Value::String(value) => Bson::String(value),
        Value::Array(values) => Bson::Array(values.into_iter().map(json_to_bson).collect()),
        Value::Object(map) => match extended_scalar(&map) {
            Some(scalar) => scalar,
            None => Bson::Document(
                map.into_iter()
                    .map(|(key, value)| (key, json_to_bson(value)))
                    .collect(),
            ),
        },
    }
}

/// Converts a JSON object into a document. Any other JSON shape is an error.
pub fn json_to_document(value: Value) -> Result<Document, String> {
    match json_to_bson(value) {
        Bson::Document(document) => Ok(document),
        other => Err(format!("expected an object, found {}", json_kind(&other))),
    }
}

/// Converts a JSON array of objects into documents, in order.
pub fn json_to_documents(value: Value) -> Result<Vec<Document>, String> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                json_to_document(value).map_err(|e| format!("element {}: {}", index, e))
            })
            .collect(),
        other => Err(format!("expected an array, found {}", json_type_name(&other))),
    }
}

/// Converts a BSON value into JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(value) => Value::Bool(value),
        Bson::Int32(value) => Value::Number(value.into()),
        Bson::Int64(value) => Value::Number(value.into()),
        Bson::Double(value) => Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(value) => Value::String(value),
        Bson::Array(values) => Value::Array(values.into_iter().map(bson_to_json).collect()),
        Bson::Document(document) => document_to_json(document),
        Bson::ObjectId(oid) => {
            let mut map = Map::new();
            map.insert("$oid".to_string(), Value::String(oid.to_hex()));
            Value::Object(map)
        }
        Bson::DateTime(datetime) => {
            let mut map = Map::new();
            map.insert("$date".to_string(), Value::Number(datetime.timestamp_millis().into()));
            Value::Object(map)
        }
        other => serde_json::to_value(&other).unwrap_or_else(|_| Value::String(other.to_string())),
    }
}

/// Converts a document into a JSON object.
pub fn document_to_json(document: Document) -> Value {
    Value::Object(
        document
            .into_iter()
            .map(|(key, value)| (key, bson_to_json(value)))
            .collect(),
    )
}

fn number_to_bson(number: &Number) -> Bson {
    if let Some(value) = number.as_i64() {
        return match i32::try_from(value) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(value),
        };
    }

    Bson::Double(number.as_f64().unwrap_or(f64::NAN))
}

fn extended_scalar(map: &Map<String, Value>) -> Option<Bson> {
    if map.len() != 1 {
        return None;
    }

    match map.iter().next()? {
        (key, Value::String(hex)) if key == "$oid" => {
            ObjectId::parse_str(hex).ok().map(Bson::ObjectId)
        }
        (key, Value::Number(millis)) if key == "$date" => {
            millis.as_i64().map(|millis| Bson::DateTime(DateTime::from_millis(millis)))
        }
        _ => None,
    }
}

fn json_kind(value: &Bson) -> &'static str {
    match value {
        Bson::Null => "null",
        Bson::Boolean(_) => "a boolean",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => "a number",
        Bson::String(_) => "a string",
        Bson::Array(_) => "an array",
        _ => "a scalar",
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
