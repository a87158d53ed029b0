//! Classification of driver errors into backend failures.

use mongodb::error::{Error, ErrorKind, WriteFailure};

use docbridge_core::{document::Identifier, error::StoreFailure};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Maps a driver error onto the driver-free failure the adapter classifies.
pub(crate) fn classify(error: Error) -> StoreFailure {
    let message = error.to_string();

    match *error.kind {
        ErrorKind::Authentication { .. } => StoreFailure::Authentication(message),
        ErrorKind::ServerSelection { .. }
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::Io(_) => StoreFailure::Unreachable(message),
        ErrorKind::InvalidArgument { .. } => StoreFailure::Rejected(message),
        ErrorKind::InvalidResponse { .. } => StoreFailure::Decode(message),
        ErrorKind::Command(ref command) if command.code == DUPLICATE_KEY => {
            StoreFailure::DuplicateKey(command.message.clone())
        }
        ErrorKind::Command(_) => StoreFailure::Rejected(message),
        ErrorKind::Write(WriteFailure::WriteError(ref write)) if write.code == DUPLICATE_KEY => {
            StoreFailure::DuplicateKey(write.message.clone())
        }
        ErrorKind::Write(_) => StoreFailure::Rejected(message),
        _ => StoreFailure::Other(message),
    }
}

/// Maps a failed multi-document insert.
///
/// `ids` are the identifiers assigned to the batch before it was sent, in input order. The
/// driver does not expose which documents it wrote, so they are derived from the indices of
/// the per-document write errors.
pub(crate) fn classify_insert_many(error: Error, ids: Vec<Identifier>, ordered: bool) -> StoreFailure {
    let failed: Vec<usize> = match *error.kind {
        ErrorKind::InsertMany(ref failure) => failure
            .write_errors
            .iter()
            .flatten()
            .map(|write| write.index)
            .collect(),
        _ => return classify(error),
    };

    partial_write(ids, &failed, ordered, error.to_string())
}

fn partial_write(ids: Vec<Identifier>, failed: &[usize], ordered: bool, message: String) -> StoreFailure {
    let attempted = ids.len();
    // An ordered batch stops at its first failure.
    let stop = if ordered {
        failed.iter().copied().min().unwrap_or(attempted)
    } else {
        attempted
    };

    StoreFailure::PartialWrite {
        attempted,
        inserted: ids
            .into_iter()
            .enumerate()
            .take(stop)
            .filter(|(index, _)| !failed.contains(index))
            .collect(),
        message,
    }
}
