//! services/api/src/adapters/vector.rs
//!
//! This module contains the vector-store adapter, which implements the
//! `VectorSearchService` port against Qdrant. Collections are created lazily
//! and idempotently; querying a collection that does not exist yet returns an
//! empty result instead of failing the caller.

use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    self, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use autofix_core::domain::{ChunkRecord, ScoredChunk};
use autofix_core::ports::{EmbeddingService, PortError, PortResult, VectorSearchService};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A vector-store adapter that implements the `VectorSearchService` port.
///
/// Embeddings are produced by the injected `EmbeddingService`; the same
/// service instance is used at add-time and query-time, so vectors in one
/// collection always come from one embedding model.
pub struct QdrantVectorSearch {
    client: Qdrant,
    embedder: Arc<dyn EmbeddingService>,
    dimension: u64,
}

impl QdrantVectorSearch {
    /// Creates a new `QdrantVectorSearch`.
    pub fn new(client: Qdrant, embedder: Arc<dyn EmbeddingService>, dimension: u64) -> Self {
        Self {
            client,
            embedder,
            dimension,
        }
    }

    async fn collection_exists(&self, name: &str) -> PortResult<bool> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))
    }
}

//=========================================================================================
// `VectorSearchService` Trait Implementation
//=========================================================================================

#[async_trait]
impl VectorSearchService for QdrantVectorSearch {
    async fn ensure_collection(&self, name: &str) -> PortResult<()> {
        if self.collection_exists(name).await? {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    self.dimension,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;
        info!(collection = name, "Collection ready");
        Ok(())
    }

    async fn add(&self, collection: &str, chunks: Vec<ChunkRecord>) -> PortResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        // Adding to an unknown collection implicitly creates it.
        self.ensure_collection(collection).await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let points: Vec<PointStruct> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let payload = Payload::try_from(json!({
                    "text": chunk.text,
                    "metadata": chunk.metadata,
                }))
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
                Ok(PointStruct::new(
                    chunk.id.to_string(),
                    embedding,
                    payload,
                ))
            })
            .collect::<PortResult<_>>()?;

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;
        info!(collection, count, "Added documents to collection");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        top_n: usize,
    ) -> PortResult<Vec<ScoredChunk>> {
        if !self.collection_exists(collection).await? {
            warn!(collection, "Query against unknown collection");
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(text).await?;

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector, top_n as u64).with_payload(true),
            )
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        results
            .result
            .into_iter()
            .map(|point| {
                let id = point
                    .id
                    .as_ref()
                    .and_then(point_id_to_uuid)
                    .ok_or_else(|| PortError::Unexpected("Missing point id".to_string()))?;

                let mut payload = point.payload;
                let text = match payload.remove("text").map(qdrant_value_to_json) {
                    Some(serde_json::Value::String(s)) => s,
                    _ => String::new(),
                };
                let metadata = payload
                    .remove("metadata")
                    .map(qdrant_value_to_json)
                    .unwrap_or(serde_json::Value::Null);

                Ok(ScoredChunk {
                    id,
                    text,
                    score: point.score,
                    metadata,
                })
            })
            .collect()
    }
}

//=========================================================================================
// Payload Conversion Helpers
//=========================================================================================

fn point_id_to_uuid(point_id: &qdrant::PointId) -> Option<Uuid> {
    match &point_id.point_id_options {
        Some(qdrant::point_id::PointIdOptions::Uuid(uuid_str)) => Uuid::parse_str(uuid_str).ok(),
        Some(qdrant::point_id::PointIdOptions::Num(num)) => Some(Uuid::from_u128(*num as u128)),
        None => None,
    }
}

fn qdrant_value_to_json(val: QdrantValue) -> serde_json::Value {
    use qdrant::value::Kind;

    match val.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(f)) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(qdrant_value_to_json).collect(),
        ),
        Some(Kind::StructValue(object)) => serde_json::Value::Object(
            object
                .fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::value::Kind;

    #[test]
    fn point_ids_map_from_uuid_and_num_variants() {
        let uuid = Uuid::new_v4();
        let point_id = qdrant::PointId {
            point_id_options: Some(qdrant::point_id::PointIdOptions::Uuid(uuid.to_string())),
        };
        assert_eq!(point_id_to_uuid(&point_id), Some(uuid));

        let numeric = qdrant::PointId {
            point_id_options: Some(qdrant::point_id::PointIdOptions::Num(7)),
        };
        assert_eq!(point_id_to_uuid(&numeric), Some(Uuid::from_u128(7)));

        let empty = qdrant::PointId {
            point_id_options: None,
        };
        assert_eq!(point_id_to_uuid(&empty), None);
    }

    #[test]
    fn qdrant_values_convert_to_json() {
        let s = QdrantValue {
            kind: Some(Kind::StringValue("hello".to_string())),
        };
        assert_eq!(qdrant_value_to_json(s), serde_json::json!("hello"));

        let list = QdrantValue {
            kind: Some(Kind::ListValue(qdrant::ListValue {
                values: vec![
                    QdrantValue {
                        kind: Some(Kind::IntegerValue(1)),
                    },
                    QdrantValue {
                        kind: Some(Kind::BoolValue(true)),
                    },
                ],
            })),
        };
        assert_eq!(qdrant_value_to_json(list), serde_json::json!([1, true]));

        let missing = QdrantValue { kind: None };
        assert_eq!(qdrant_value_to_json(missing), serde_json::Value::Null);
    }
}
