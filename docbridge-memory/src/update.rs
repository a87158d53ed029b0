//! Update operators and upsert seeding.

use bson::{Bson, Document};

use docbridge_core::{
    document::ID_FIELD,
    error::{StoreFailure, StoreResult},
};

use crate::evaluator::is_operator_document;

const MODIFIERS: [&str; 6] = ["$set", "$setOnInsert", "$unset", "$inc", "$push", "$rename"];

/// Checks modifier names and operand shapes without touching any document.
///
/// Runs before matching so a malformed update fails even when nothing matches.
pub(crate) fn check_update(update: &Document) -> StoreResult<()> {
    for (operator, fields) in update {
        if !MODIFIERS.contains(&operator.as_str()) {
            return Err(StoreFailure::Rejected(format!("unknown modifier: {}", operator)));
        }

        let fields = fields.as_document().ok_or_else(|| {
            StoreFailure::Rejected(format!("modifier {} expects a document", operator))
        })?;

        for (path, value) in fields {
            match operator.as_str() {
                "$inc" if !is_number(value) => {
                    return Err(StoreFailure::Rejected(format!(
                        "cannot increment '{}' with a non-numeric argument",
                        path
                    )));
                }
                "$rename" if value.as_str().is_none() => {
                    return Err(StoreFailure::Rejected(format!(
                        "$rename target for '{}' must be a string",
                        path
                    )));
                }
                "$push" => {
                    if let Bson::Document(modifiers) = value {
                        if modifiers.contains_key("$each") && modifiers.get_array("$each").is_err() {
                            return Err(StoreFailure::Rejected("$each must be an array".to_string()));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Ok(())
}

/// Applies an operator document to `document`.
///
/// `inserting` is set when the target is a fresh upsert document, which is the only time
/// `$setOnInsert` takes effect. The `_id` field cannot be changed.
pub(crate) fn apply_update(document: &mut Document, update: &Document, inserting: bool) -> StoreResult<()> {
    check_update(update)?;
    let original_id = document.get(ID_FIELD).cloned();

    for (operator, fields) in update {
        let Some(fields) = fields.as_document() else {
            continue;
        };

        for (path, value) in fields {
            match operator.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" if inserting => set_path(document, path, value.clone())?,
                "$setOnInsert" => {}
                "$unset" => {
                    remove_path(document, path);
                }
                "$inc" => increment(document, path, value)?,
                "$push" => push(document, path, value)?,
                "$rename" => {
                    let target = value.as_str().ok_or_else(|| {
                        StoreFailure::Rejected(format!("$rename target for '{}' must be a string", path))
                    })?;
                    if let Some(moved) = remove_path(document, path) {
                        set_path(document, target, moved)?;
                    }
                }
                other => {
                    return Err(StoreFailure::Rejected(format!("unknown modifier: {}", other)));
                }
            }
        }
    }

    if !inserting && document.get(ID_FIELD) != original_id.as_ref() {
        return Err(StoreFailure::Rejected(
            "performing an update on the path '_id' would modify the immutable field '_id'"
                .to_string(),
        ));
    }

    Ok(())
}

/// Builds the base document for an upsert from the equality conditions of `filter`.
pub(crate) fn seed_from_filter(filter: &Document) -> StoreResult<Document> {
    let mut seed = Document::new();
    collect_equalities(filter, &mut seed)?;
    Ok(seed)
}

fn collect_equalities(filter: &Document, seed: &mut Document) -> StoreResult<()> {
    for (key, condition) in filter {
        if key == "$and" {
            for clause in condition.as_array().into_iter().flatten() {
                if let Some(clause) = clause.as_document() {
                    collect_equalities(clause, seed)?;
                }
            }
        } else if key.starts_with('$') {
            continue;
        } else if is_operator_document(condition) {
            if let Some(value) = condition.as_document().and_then(|operators| operators.get("$eq")) {
                set_path(seed, key, value.clone())?;
            }
        } else {
            set_path(seed, key, condition.clone())?;
        }
    }

    Ok(())
}

/// Sets a dotted path, creating embedded documents as needed.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));

            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(StoreFailure::Rejected(format!(
                    "cannot create field '{}' in element {{{}: {}}}",
                    rest, head, child
                ))),
            }
        }
    }
}

/// Removes a dotted path, returning the removed value.
pub(crate) fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => remove_path(inner, rest),
            _ => None,
        },
    }
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(inner) => get_path(inner, rest),
            _ => None,
        },
    }
}

fn increment(document: &mut Document, path: &str, amount: &Bson) -> StoreResult<()> {
    let updated = match (get_path(document, path), amount) {
        (None, amount) if is_number(amount) => amount.clone(),
        (Some(Bson::Int32(current)), Bson::Int32(amount)) => current
            .checked_add(*amount)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*current as i64 + *amount as i64)),
        (Some(Bson::Int32(current)), Bson::Int64(amount)) => checked_int64(path, *current as i64, *amount)?,
        (Some(Bson::Int64(current)), Bson::Int32(amount)) => checked_int64(path, *current, *amount as i64)?,
        (Some(Bson::Int64(current)), Bson::Int64(amount)) => checked_int64(path, *current, *amount)?,
        (Some(current), amount) if is_number(current) && is_number(amount) => {
            Bson::Double(as_f64(current) + as_f64(amount))
        }
        _ => {
            return Err(StoreFailure::Rejected(format!(
                "cannot apply $inc to field '{}' with a non-numeric operand",
                path
            )));
        }
    };

    set_path(document, path, updated)
}

fn checked_int64(path: &str, current: i64, amount: i64) -> StoreResult<Bson> {
    current.checked_add(amount).map(Bson::Int64).ok_or_else(|| {
        StoreFailure::Rejected(format!(
            "failed to apply $inc to field '{}': integer overflow",
            path
        ))
    })
}

fn push(document: &mut Document, path: &str, value: &Bson) -> StoreResult<()> {
    let additions = match value {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => modifiers
            .get_array("$each")
            .map_err(|_| StoreFailure::Rejected("$each must be an array".to_string()))?
            .clone(),
        single => vec![single.clone()],
    };

    let mut items = match get_path(document, path) {
        None => Vec::new(),
        Some(Bson::Array(items)) => items.clone(),
        Some(_) => {
            return Err(StoreFailure::Rejected(format!(
                "the field '{}' must be an array to apply $push",
                path
            )));
        }
    };
    items.extend(additions);

    set_path(document, path, Bson::Array(items))
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(number) => *number as f64,
        Bson::Int64(number) => *number as f64,
        Bson::Double(number) => *number,
        _ => 0.0,
    }
}
