//! LanceDB Vector Store - 컬렉션 단위 영속 벡터 저장소
//!
//! 컬렉션 하나가 `<persist_dir>/<collection>.lance` 테이블 하나입니다.
//!
//! - 빌드: 임베딩 → 스테이징 디렉토리에 기록 → 완성된 테이블을 교체
//! - 로드: 기존 테이블 열기 (없으면 `IndexNotFound`)
//!
//! 빌드가 실패하거나 취소되면 스테이징만 지우므로 기존 인덱스는 그대로 남습니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;
use tokio_util::sync::CancellationToken;

use super::chunker::{Chunk, ChunkMetadata};
use super::lock::IndexLock;
use super::vector::{rank_records, RetrievedChunk, SearchType, StoredVector, VectorStore};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 기본 저장 경로
pub const DEFAULT_PERSIST_DIRECTORY: &str = "./indexes/lancedb";

/// 기본 컬렉션 이름
pub const DEFAULT_COLLECTION_NAME: &str = "rag_documents";

/// 임베딩 배치 크기 기본값
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// 동시 임베딩 배치 수 기본값
pub const DEFAULT_CONCURRENCY: usize = 4;

const COL_ID: &str = "id";
const COL_SEQ: &str = "seq";
const COL_TEXT: &str = "text";
const COL_METADATA: &str = "metadata";
const COL_VECTOR: &str = "vector";

// ============================================================================
// IngestOptions
// ============================================================================

/// 빌드 옵션
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// 임베딩 요청당 청크 수
    pub batch_size: usize,
    /// 동시에 진행하는 임베딩 배치 수
    pub concurrency: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 검색은 저장된 벡터 전체를 읽어 코사인 유사도로 정렬합니다.
/// 동점은 삽입 순서로 결정되어 결과가 항상 재현 가능합니다.
pub struct LanceVectorStore {
    table: Table,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    dimension: usize,
    persist_dir: PathBuf,
}

impl LanceVectorStore {
    /// 청크를 임베딩해 새 인덱스 생성 (기존 컬렉션은 교체)
    ///
    /// # Arguments
    /// * `chunks` - 저장할 청크 (비어 있으면 안 됨)
    /// * `embedder` - 임베딩 프로바이더
    /// * `persist_dir` - 저장 디렉토리 (없으면 생성)
    /// * `collection` - 컬렉션 이름
    /// * `options` - 배치/동시성 옵션
    /// * `cancel` - 배치 사이에 확인하는 취소 토큰
    pub async fn create_from_documents(
        chunks: &[Chunk],
        embedder: Arc<dyn EmbeddingProvider>,
        persist_dir: &Path,
        collection: &str,
        options: IngestOptions,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        validate_collection_name(collection)?;
        if chunks.is_empty() {
            return Err(RagError::InvalidConfig(
                "cannot build an index from zero chunks".to_string(),
            ));
        }
        if options.batch_size == 0 || options.concurrency == 0 {
            return Err(RagError::InvalidConfig(
                "batch_size and concurrency must be greater than 0".to_string(),
            ));
        }

        tokio::fs::create_dir_all(persist_dir)
            .await
            .map_err(|e| RagError::io(persist_dir, e))?;

        let _lock = IndexLock::acquire(persist_dir, collection)?;

        let staging_dir = persist_dir.join(format!(
            ".staging-{}-{}",
            collection,
            uuid::Uuid::new_v4()
        ));

        tracing::info!(
            "Building collection '{}' from {} chunks ({} per batch)",
            collection,
            chunks.len(),
            options.batch_size
        );

        let built = write_staging(chunks, &embedder, &staging_dir, collection, options, cancel).await;

        let dimension = match built {
            Ok(dimension) => dimension,
            Err(e) => {
                remove_dir_quietly(&staging_dir).await;
                return Err(e);
            }
        };

        if let Err(e) = promote(&staging_dir, persist_dir, collection).await {
            remove_dir_quietly(&staging_dir).await;
            return Err(e);
        }
        remove_dir_quietly(&staging_dir).await;

        let db = connect(persist_dir).await?;
        let table = db.open_table(collection).execute().await?;

        tracing::info!(
            "Collection '{}' persisted to {:?} (dimension {})",
            collection,
            persist_dir,
            dimension
        );

        Ok(Self {
            table,
            embedder,
            collection: collection.to_string(),
            dimension,
            persist_dir: persist_dir.to_path_buf(),
        })
    }

    /// 저장된 인덱스 열기
    ///
    /// # Errors
    /// * `IndexNotFound` - 디렉토리나 컬렉션 테이블이 없음
    pub async fn open_existing(
        persist_dir: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: &str,
    ) -> Result<Self> {
        validate_collection_name(collection)?;

        let not_found = || RagError::IndexNotFound {
            path: persist_dir.to_path_buf(),
            collection: collection.to_string(),
        };

        // 로드 모드는 디렉토리를 만들지 않음
        if !persist_dir.is_dir() {
            return Err(not_found());
        }

        let db = connect(persist_dir).await?;
        let names = db.table_names().execute().await?;
        if !names.iter().any(|n| n == collection) {
            return Err(not_found());
        }

        let table = db.open_table(collection).execute().await?;
        let schema = table.schema().await?;
        let dimension = vector_dimension(&schema).ok_or_else(|| {
            RagError::InvalidConfig(format!(
                "collection '{}' has no fixed-size '{}' column",
                collection, COL_VECTOR
            ))
        })?;

        if dimension != embedder.dimension() {
            tracing::warn!(
                "Collection '{}' was built with dimension {}, current embedder '{}' produces {}",
                collection,
                dimension,
                embedder.name(),
                embedder.dimension()
            );
        }

        tracing::info!("Loaded collection '{}' from {:?}", collection, persist_dir);

        Ok(Self {
            table,
            embedder,
            collection: collection.to_string(),
            dimension,
            persist_dir: persist_dir.to_path_buf(),
        })
    }

    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    /// 저장된 모든 레코드 읽기
    async fn scan(&self) -> Result<Vec<StoredVector>> {
        let total = self.table.count_rows(None).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .limit(total)
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut records = Vec::with_capacity(total);
        for batch in &batches {
            records.extend(batch_to_records(batch)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        search_type: SearchType,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_vector = self.embedder.embed_query(query).await?;
        if query_vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let records = self.scan().await?;
        let results = rank_records(&query_vector, records, top_k, search_type);

        tracing::debug!(
            "Search in '{}' returned {} result(s)",
            self.collection,
            results.len()
        );
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.count_rows(None).await?)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn collection_name(&self) -> &str {
        &self.collection
    }
}

// ============================================================================
// Build helpers
// ============================================================================

/// 임베딩하여 스테이징 테이블에 기록, 차원 반환
async fn write_staging(
    chunks: &[Chunk],
    embedder: &Arc<dyn EmbeddingProvider>,
    staging_dir: &Path,
    collection: &str,
    options: IngestOptions,
    cancel: &CancellationToken,
) -> Result<usize> {
    if cancel.is_cancelled() {
        return Err(RagError::Cancelled);
    }

    let dimension = embedder.dimension();
    let db = connect(staging_dir).await?;
    let schema = create_schema(dimension)?;

    // 순서를 유지하며 최대 concurrency개 배치를 동시에 임베딩
    let mut embedded = futures::stream::iter(chunks.chunks(options.batch_size).enumerate())
        .map(|(batch_idx, batch)| {
            let embedder = Arc::clone(embedder);
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            async move {
                let vectors = embedder.embed_batch(&texts).await?;
                Ok::<_, RagError>((batch_idx, vectors))
            }
        })
        .buffered(options.concurrency);

    let mut table: Option<Table> = None;
    let mut written = 0usize;

    while let Some(result) = embedded.next().await {
        if cancel.is_cancelled() {
            tracing::info!("Index build for '{}' cancelled", collection);
            return Err(RagError::Cancelled);
        }

        let (batch_idx, vectors) = result?;
        let start = batch_idx * options.batch_size;
        let end = (start + options.batch_size).min(chunks.len());
        let batch_chunks = &chunks[start..end];

        if vectors.len() != batch_chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch_chunks.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let record_batch = chunks_to_batch(&schema, batch_chunks, &vectors, start as i64, dimension)?;
        let reader = RecordBatchIterator::new(vec![Ok(record_batch)], schema.clone());

        match &table {
            None => {
                table = Some(db.create_table(collection, reader).execute().await?);
            }
            Some(t) => {
                t.add(reader).execute().await?;
            }
        }

        written += batch_chunks.len();
        tracing::debug!("Embedded batch {} ({}/{} chunks)", batch_idx, written, chunks.len());
    }

    Ok(dimension)
}

/// 스테이징 테이블을 실제 위치로 교체
async fn promote(staging_dir: &Path, persist_dir: &Path, collection: &str) -> Result<()> {
    let table_dir = format!("{}.lance", collection);
    let staged = staging_dir.join(&table_dir);
    let live = persist_dir.join(&table_dir);
    let backup = persist_dir.join(format!(".backup-{}-{}", collection, uuid::Uuid::new_v4()));

    let had_previous = tokio::fs::try_exists(&live)
        .await
        .map_err(|e| RagError::io(&live, e))?;

    if had_previous {
        tokio::fs::rename(&live, &backup)
            .await
            .map_err(|e| RagError::io(&live, e))?;
    }

    if let Err(e) = tokio::fs::rename(&staged, &live).await {
        // 이전 인덱스 복구
        if had_previous {
            let _ = tokio::fs::rename(&backup, &live).await;
        }
        return Err(RagError::io(&staged, e));
    }

    if had_previous {
        remove_dir_quietly(&backup).await;
    }
    Ok(())
}

async fn remove_dir_quietly(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {:?}: {}", path, e),
    }
}

async fn connect(path: &Path) -> Result<Connection> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RagError::InvalidConfig(format!("non UTF-8 path: {:?}", path)))?;

    Ok(lancedb::connect(path_str).execute().await?)
}

/// 테이블 이름으로 쓸 수 있는 컬렉션 이름인지 확인
fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(RagError::InvalidConfig(format!(
            "invalid collection name '{}' (use letters, digits, '_', '-', '.')",
            name
        )))
    }
}

// ============================================================================
// Arrow conversion
// ============================================================================

/// 벡터 테이블 스키마 생성
fn create_schema(dimension: usize) -> Result<SchemaRef> {
    let dim = i32::try_from(dimension)
        .map_err(|_| RagError::InvalidConfig(format!("dimension too large: {}", dimension)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new(COL_ID, DataType::Utf8, false),
        Field::new(COL_SEQ, DataType::Int64, false),
        Field::new(COL_TEXT, DataType::Utf8, false),
        Field::new(COL_METADATA, DataType::Utf8, false),
        Field::new(
            COL_VECTOR,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            false,
        ),
    ])))
}

/// 스키마에서 벡터 차원 읽기
fn vector_dimension(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(COL_VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
        _ => None,
    }
}

/// 청크들을 Arrow RecordBatch로 변환
fn chunks_to_batch(
    schema: &SchemaRef,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    first_seq: i64,
    dimension: usize,
) -> Result<RecordBatch> {
    let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    let seqs: Vec<i64> = (0..chunks.len() as i64).map(|i| first_seq + i).collect();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let metadata: Vec<String> = chunks
        .iter()
        .map(|c| serde_json::to_string(&c.metadata))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| RagError::CorruptIndex(format!("failed to serialize metadata: {}", e)))?;

    let flat: Vec<f32> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_list = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
        None,
    )?;

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(Int64Array::from(seqs)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(vector_list),
        ],
    )?;

    Ok(batch)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| RagError::CorruptIndex(format!("missing or mistyped column '{}'", name)))
}

/// RecordBatch에서 저장 레코드 추출
fn batch_to_records(batch: &RecordBatch) -> Result<Vec<StoredVector>> {
    let ids = column::<StringArray>(batch, COL_ID)?;
    let seqs = column::<Int64Array>(batch, COL_SEQ)?;
    let texts = column::<StringArray>(batch, COL_TEXT)?;
    let metadata = column::<StringArray>(batch, COL_METADATA)?;
    let vectors = column::<FixedSizeListArray>(batch, COL_VECTOR)?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let meta: ChunkMetadata = serde_json::from_str(metadata.value(i)).map_err(|e| {
            RagError::CorruptIndex(format!("corrupt metadata for '{}': {}", ids.value(i), e))
        })?;

        let values = vectors.value(i);
        let vector = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.values().to_vec())
            .ok_or_else(|| RagError::CorruptIndex("vector column is not Float32".to_string()))?;

        records.push(StoredVector {
            seq: seqs.value(i),
            chunk_id: ids.value(i).to_string(),
            text: texts.value(i).to_string(),
            metadata: meta,
            vector,
        });
    }

    Ok(records)
}

// ============================================================================
// Tests
// ============================================================================
