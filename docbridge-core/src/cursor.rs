//! Lazy result sequences returned by `find` and `aggregate`.

use bson::Document;
use futures::{Stream, StreamExt, stream};

use crate::{
    connection::DocumentStream,
    error::AdapterResult,
    scope::Scope,
    translate::ResultTranslator,
};

/// A single-use cursor over the documents produced by one call.
///
/// Documents are pulled from the store on demand, each pull bounded by the scope of the call
/// that opened the cursor. Nothing caps the number of documents a cursor yields. Reissue the
/// call to start over.
pub struct DocumentCursor {
    stream: DocumentStream,
    scope: Scope,
    translator: ResultTranslator,
    finished: bool,
}

impl DocumentCursor {
    pub(crate) fn new(stream: DocumentStream, scope: Scope, translator: ResultTranslator) -> Self {
        Self {
            stream,
            scope,
            translator,
            finished: false,
        }
    }

    /// Pulls the next document. Returns `None` once the cursor is exhausted; after a failure
    /// the cursor yields nothing more.
    pub async fn next(&mut self) -> Option<AdapterResult<Document>> {
        if self.finished {
            return None;
        }

        let stream = &mut self.stream;
        let pulled = self
            .scope
            .run(async move { Ok(stream.next().await) })
            .await;

        match pulled {
            Ok(Some(Ok(document))) => Some(Ok(document)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Ok(Some(Err(failure))) | Err(failure) => {
                self.finished = true;
                Some(Err(self.translator.failure(failure)))
            }
        }
    }

    /// Drains the cursor into a vector.
    pub async fn collect(mut self) -> AdapterResult<Vec<Document>> {
        let mut documents = Vec::new();

        while let Some(document) = self.next().await {
            documents.push(document?);
        }

        Ok(documents)
    }

    /// Adapts the cursor into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = AdapterResult<Document>> + Send {
        stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
    }
}

impl std::fmt::Debug for DocumentCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCursor")
            .field("scope", &self.scope)
            .field("context", self.translator.context())
            .field("finished", &self.finished)
            .finish()
    }
}
