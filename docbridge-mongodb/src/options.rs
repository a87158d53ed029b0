//! Decoding loosely-typed option documents into the driver's option structs.
//!
//! Option documents use the server's camelCase names (`sort`, `projection`, `limit`,
//! `upsert`, `ordered`, `allowDiskUse`, ...). Keys the driver does not know are ignored.

use mongodb::options::{
    AggregateOptions, CountOptions, DeleteOptions, FindOneOptions, FindOptions, InsertManyOptions,
    InsertOneOptions, ReplaceOptions, UpdateOptions,
};
use serde::de::DeserializeOwned;

use docbridge_core::{error::StoreFailure, error::StoreResult, options::OperationOptions};

/// Decodes `options` into a driver options struct. Empty options decode to the defaults.
pub(crate) fn decode<T>(options: OperationOptions) -> StoreResult<T>
where
    T: DeserializeOwned + Default,
{
    if options.is_empty() {
        return Ok(T::default());
    }

    bson::deserialize_from_document(options.into_document())
        .map_err(|error| StoreFailure::Rejected(format!("invalid options: {}", error)))
}

pub(crate) fn find(options: OperationOptions) -> StoreResult<FindOptions> {
    decode(options)
}

pub(crate) fn find_one(options: OperationOptions) -> StoreResult<FindOneOptions> {
    decode(options)
}

pub(crate) fn count(options: OperationOptions) -> StoreResult<CountOptions> {
    decode(options)
}

pub(crate) fn insert_one(options: OperationOptions) -> StoreResult<InsertOneOptions> {
    decode(options)
}

pub(crate) fn insert_many(options: OperationOptions) -> StoreResult<InsertManyOptions> {
    decode(options)
}

pub(crate) fn update(options: OperationOptions) -> StoreResult<UpdateOptions> {
    decode(options)
}

pub(crate) fn replace(options: OperationOptions) -> StoreResult<ReplaceOptions> {
    decode(options)
}

pub(crate) fn delete(options: OperationOptions) -> StoreResult<DeleteOptions> {
    decode(options)
}

pub(crate) fn aggregate(options: OperationOptions) -> StoreResult<AggregateOptions> {
    decode(options)
}
