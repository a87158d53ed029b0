//! Sorting, projection and aggregation stages over in-memory documents.

use std::cmp::Ordering;

use bson::{Bson, Document};

use docbridge_core::{
    document::ID_FIELD,
    error::{StoreFailure, StoreResult},
};

use crate::{
    evaluator::{Comparable, lookup, matches, truthy},
    update::{remove_path, set_path},
};

/// Runs aggregation stages in order over `documents`.
///
/// Supported stages are `$match`, `$sort`, `$skip`, `$limit`, `$project`, `$unset` and
/// `$count`. Any other stage is rejected.
pub(crate) fn run(mut documents: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (name, argument) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(StoreFailure::Rejected(
                    "a pipeline stage specification object must contain exactly one field".to_string(),
                ));
            }
        };

        documents = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, argument)?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$sort" => {
                sort(&mut documents, stage_document(name, argument)?)?;
                documents
            }
            "$skip" => {
                let skip = stage_count(name, argument)?;
                documents.into_iter().skip(skip).collect()
            }
            "$limit" => match stage_count(name, argument)? {
                0 => {
                    return Err(StoreFailure::Rejected("the limit must be positive".to_string()));
                }
                limit => documents.into_iter().take(limit).collect(),
            },
            "$project" => {
                let projection = stage_document(name, argument)?;
                documents
                    .iter()
                    .map(|document| project(document, projection))
                    .collect::<StoreResult<Vec<_>>>()?
            }
            "$unset" => {
                let fields = match argument {
                    Bson::String(field) => vec![field.as_str()],
                    Bson::Array(fields) => fields
                        .iter()
                        .map(|field| {
                            field.as_str().ok_or_else(|| {
                                StoreFailure::Rejected("$unset fields must be strings".to_string())
                            })
                        })
                        .collect::<StoreResult<Vec<_>>>()?,
                    _ => {
                        return Err(StoreFailure::Rejected(
                            "$unset specification must be a string or an array".to_string(),
                        ));
                    }
                };
                for document in documents.iter_mut() {
                    for field in &fields {
                        remove_path(document, field);
                    }
                }
                documents
            }
            "$count" => {
                let field = argument
                    .as_str()
                    .filter(|field| !field.is_empty() && !field.starts_with('$'))
                    .ok_or_else(|| {
                        StoreFailure::Rejected("the count field must be a non-empty string".to_string())
                    })?;
                match documents.len() {
                    0 => Vec::new(),
                    count => {
                        let mut counted = Document::new();
                        counted.insert(field, count as i64);
                        vec![counted]
                    }
                }
            }
            other => {
                return Err(StoreFailure::Rejected(format!(
                    "unrecognized pipeline stage name: '{}'",
                    other
                )));
            }
        };
    }

    Ok(documents)
}

fn stage_document<'a>(name: &str, argument: &'a Bson) -> StoreResult<&'a Document> {
    argument
        .as_document()
        .ok_or_else(|| StoreFailure::Rejected(format!("the {} stage takes a document", name)))
}

fn stage_count(name: &str, argument: &Bson) -> StoreResult<usize> {
    let count = match argument {
        Bson::Int32(count) => *count as i64,
        Bson::Int64(count) => *count,
        Bson::Double(count) if count.fract() == 0.0 => *count as i64,
        _ => -1,
    };

    usize::try_from(count)
        .map_err(|_| StoreFailure::Rejected(format!("the {} stage takes a non-negative integer", name)))
}

/// Sorts by a `{ field: 1 | -1 }` specification. Missing fields sort as null; ties keep
/// their original order.
pub(crate) fn sort(documents: &mut [Document], specification: &Document) -> StoreResult<()> {
    let keys = specification
        .iter()
        .map(|(field, direction)| match direction {
            Bson::Int32(1) | Bson::Int64(1) => Ok((field.as_str(), false)),
            Bson::Int32(-1) | Bson::Int64(-1) => Ok((field.as_str(), true)),
            Bson::Double(value) if *value == 1.0 => Ok((field.as_str(), false)),
            Bson::Double(value) if *value == -1.0 => Ok((field.as_str(), true)),
            _ => Err(StoreFailure::Rejected(format!(
                "invalid sort direction for '{}', expected 1 or -1",
                field
            ))),
        })
        .collect::<StoreResult<Vec<_>>>()?;

    let null = Bson::Null;
    documents.sort_by(|left, right| {
        for (field, descending) in &keys {
            let left_value = Comparable::from(lookup(left, field).unwrap_or(&null));
            let right_value = Comparable::from(lookup(right, field).unwrap_or(&null));

            match left_value.total_cmp(&right_value) {
                Ordering::Equal => continue,
                ordering if *descending => return ordering.reverse(),
                ordering => return ordering,
            }
        }
        Ordering::Equal
    });

    Ok(())
}

/// Applies an inclusion or exclusion projection. `_id` is kept unless excluded explicitly.
pub(crate) fn project(document: &Document, projection: &Document) -> StoreResult<Document> {
    let include_id = projection.get(ID_FIELD).is_none_or(truthy);
    let mut included = Vec::new();
    let mut excluded = Vec::new();

    for (field, flag) in projection.iter().filter(|(field, _)| field.as_str() != ID_FIELD) {
        if truthy(flag) {
            included.push(field.as_str());
        } else {
            excluded.push(field.as_str());
        }
    }

    if !included.is_empty() && !excluded.is_empty() {
        return Err(StoreFailure::Rejected(
            "cannot mix inclusion and exclusion in a projection".to_string(),
        ));
    }

    if included.is_empty() {
        let mut projected = document.clone();
        for field in excluded {
            remove_path(&mut projected, field);
        }
        if !include_id {
            projected.remove(ID_FIELD);
        }
        return Ok(projected);
    }

    let mut projected = Document::new();
    if include_id {
        if let Some(id) = document.get(ID_FIELD) {
            projected.insert(ID_FIELD, id.clone());
        }
    }
    for field in included {
        if let Some(value) = lookup(document, field) {
            set_path(&mut projected, field, value.clone())?;
        }
    }

    Ok(projected)
}
