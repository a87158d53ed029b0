//! Filter evaluation and value ordering for in-memory documents.
//!
//! Filters use the store's query language: field conditions combined implicitly with AND,
//! operator documents such as `{ "$gt": 5 }`, and the `$and`, `$or` and `$nor` combinators.
//! Field names may be dotted paths into embedded documents or array positions.

use std::cmp::Ordering;

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docbridge_core::error::{StoreFailure, StoreResult};

/// Comparable view of a BSON value.
///
/// Numbers of any width compare by value. Values of different kinds order by the store's
/// canonical type order, which is what `sort` uses; range operators only compare values of
/// the same kind.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(Vec<(&'a str, Comparable<'a>)>),
    Array(Vec<Comparable<'a>>),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(array) => Comparable::Array(array.iter().map(Comparable::from).collect()),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other(_) => 10,
        }
    }

    /// Total order used for sorting.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => {
                for (left, right) in a.iter().zip(b) {
                    match left.total_cmp(right) {
                        Ordering::Equal => continue,
                        ordering => return ordering,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::Map(a), Comparable::Map(b)) => {
                for ((left_key, left), (right_key, right)) in a.iter().zip(b) {
                    match left
                        .rank()
                        .cmp(&right.rank())
                        .then_with(|| left_key.cmp(right_key))
                        .then_with(|| left.total_cmp(right))
                    {
                        Ordering::Equal => continue,
                        ordering => return ordering,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::Other(a), Comparable::Other(b)) => a.to_string().cmp(&b.to_string()),
            (left, right) => left.rank().cmp(&right.rank()),
        }
    }

    /// Ordering used by range operators: `None` when the kinds differ.
    fn range_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.rank() != other.rank() || matches!(self, Comparable::Other(_)) {
            return None;
        }

        Some(self.total_cmp(other))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            (left, right) => left.rank() == right.rank() && left.total_cmp(right) == Ordering::Equal,
        }
    }
}

/// Resolves a dotted path. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Whether `document` satisfies `filter`. An empty filter matches everything.
pub(crate) fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(document, key, condition)?,
            "$nor" => !any_clause(document, key, condition)?,
            operator if operator.starts_with('$') => {
                return Err(StoreFailure::Rejected(format!(
                    "unknown top level operator: {}",
                    operator
                )));
            }
            field => field_matches(lookup(document, field), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let invalid = || StoreFailure::Rejected(format!("{} must be a nonempty array of documents", operator));

    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_document().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

fn any_clause(document: &Document, operator: &str, condition: &Bson) -> StoreResult<bool> {
    for clause in clauses(operator, condition)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }

    Ok(false)
}

/// An operator document is a non-empty document whose first key starts with `$`.
pub(crate) fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(document) => document.keys().next().is_some_and(|key| key.starts_with('$')),
        _ => false,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(condition) => {
            for (operator, argument) in operators {
                if !operator_matches(value, operator, argument)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(value, condition)),
    }
}

fn operator_matches(value: Option<&Bson>, operator: &str, argument: &Bson) -> StoreResult<bool> {
    match operator {
        "$eq" => Ok(equals(value, argument)),
        "$ne" => Ok(!equals(value, argument)),
        "$gt" => Ok(compares(value, argument, |ordering| ordering == Ordering::Greater)),
        "$gte" => Ok(compares(value, argument, |ordering| ordering != Ordering::Less)),
        "$lt" => Ok(compares(value, argument, |ordering| ordering == Ordering::Less)),
        "$lte" => Ok(compares(value, argument, |ordering| ordering != Ordering::Greater)),
        "$in" => Ok(candidates(operator, argument)?
            .iter()
            .any(|candidate| equals(value, candidate))),
        "$nin" => Ok(!candidates(operator, argument)?
            .iter()
            .any(|candidate| equals(value, candidate))),
        "$exists" => Ok(truthy(argument) == value.is_some()),
        "$size" => {
            let size = match argument {
                Bson::Int32(size) => *size as i64,
                Bson::Int64(size) => *size,
                Bson::Double(size) if size.fract() == 0.0 => *size as i64,
                _ => return Err(StoreFailure::Rejected("$size needs a number".to_string())),
            };
            Ok(matches!(value, Some(Bson::Array(items)) if items.len() as i64 == size))
        }
        "$not" => match argument {
            Bson::Document(_) if is_operator_document(argument) => {
                Ok(!field_matches(value, argument)?)
            }
            _ => Err(StoreFailure::Rejected("$not needs an operator document".to_string())),
        },
        other => Err(StoreFailure::Rejected(format!("unknown operator: {}", other))),
    }
}

fn candidates<'a>(operator: &str, argument: &'a Bson) -> StoreResult<&'a Vec<Bson>> {
    argument
        .as_array()
        .ok_or_else(|| StoreFailure::Rejected(format!("{} needs an array", operator)))
}

/// Equality as the store applies it: a null condition also matches a missing field, and an
/// array field matches when any element does.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let expected_value = Comparable::from(expected);

    match value {
        None => expected_value == Comparable::Null,
        Some(value) => {
            Comparable::from(value) == expected_value
                || matches!(value, Bson::Array(items) if items
                    .iter()
                    .any(|item| Comparable::from(item) == expected_value))
        }
    }
}

fn compares(value: Option<&Bson>, bound: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let bound = Comparable::from(bound);
    let check = |candidate: &Bson| {
        Comparable::from(candidate)
            .range_cmp(&bound)
            .is_some_and(&accept)
    };

    check(value) || matches!(value, Bson::Array(items) if items.iter().any(check))
}

pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(number) => *number != 0,
        Bson::Int64(number) => *number != 0,
        Bson::Double(number) => *number != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn sample() -> Document {
        doc! {
            "name": "widget",
            "qty": 12,
            "price": 2.5,
            "tags": ["red", "blue"],
            "dims": { "h": 10, "w": 4 },
            "note": null,
        }
    }

    #[test]
    fn implicit_equality_and_dotted_paths() {
        let document = sample();

        assert!(matches(&document, &doc! {}).unwrap());
        assert!(matches(&document, &doc! { "name": "widget", "dims.h": 10 }).unwrap());
        assert!(matches(&document, &doc! { "qty": 12.0 }).unwrap());
        assert!(!matches(&document, &doc! { "name": "gadget" }).unwrap());
        assert!(matches(&document, &doc! { "tags.1": "blue" }).unwrap());
    }

    #[test]
    fn arrays_match_any_element() {
        let document = sample();

        assert!(matches(&document, &doc! { "tags": "red" }).unwrap());
        assert!(matches(&document, &doc! { "tags": ["red", "blue"] }).unwrap());
        assert!(!matches(&document, &doc! { "tags": ["blue", "red"] }).unwrap());
        assert!(matches(&document, &doc! { "tags": { "$size": 2 } }).unwrap());
    }

    #[test]
    fn range_operators_stay_within_a_type() {
        let document = sample();

        assert!(matches(&document, &doc! { "qty": { "$gt": 10, "$lte": 12 } }).unwrap());
        assert!(!matches(&document, &doc! { "qty": { "$gt": "a" } }).unwrap());
        assert!(matches(&document, &doc! { "price": { "$lt": 3 } }).unwrap());
        assert!(!matches(&document, &doc! { "missing": { "$lt": 3 } }).unwrap());
    }

    #[test]
    fn null_matches_missing_fields() {
        let document = sample();

        assert!(matches(&document, &doc! { "note": null }).unwrap());
        assert!(matches(&document, &doc! { "absent": null }).unwrap());
        assert!(matches(&document, &doc! { "absent": { "$exists": false } }).unwrap());
        assert!(!matches(&document, &doc! { "note": { "$exists": false } }).unwrap());
    }

    #[test]
    fn combinators() {
        let document = sample();

        assert!(matches(&document, &doc! { "$or": [{ "qty": 1 }, { "name": "widget" }] }).unwrap());
        assert!(!matches(&document, &doc! { "$nor": [{ "qty": 12 }] }).unwrap());
        assert!(matches(&document, &doc! { "$and": [{ "qty": { "$in": [1, 12] } }, { "name": { "$nin": ["x"] } }] }).unwrap());
        assert!(matches(&document, &doc! { "qty": { "$not": { "$gt": 20 } } }).unwrap());
    }

    #[test]
    fn malformed_filters_are_rejected() {
        let document = sample();

        assert!(matches!(
            matches(&document, &doc! { "qty": { "$near": 1 } }),
            Err(StoreFailure::Rejected(_))
        ));
        assert!(matches!(
            matches(&document, &doc! { "$or": [] }),
            Err(StoreFailure::Rejected(_))
        ));
        assert!(matches!(
            matches(&document, &doc! { "qty": { "$in": 5 } }),
            Err(StoreFailure::Rejected(_))
        ));
    }

    #[test]
    fn sort_order_spans_types() {
        let null = Bson::Null;
        let number = Bson::Int32(5);
        let text = Bson::String("a".to_string());

        assert_eq!(Comparable::from(&null).total_cmp(&Comparable::from(&number)), Ordering::Less);
        assert_eq!(Comparable::from(&text).total_cmp(&Comparable::from(&number)), Ordering::Greater);
    }
}
