//! Per-run embedding index over a page's sections, and context retrieval.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use pagewise_shared::{PagewiseError, Result, Section};

use crate::embedder::Embedder;
use crate::index::{FlatL2Index, IndexBuilder, Neighbor};

/// Separator placed between retrieved texts.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Embeddings and similarity index for one batch of sections.
///
/// Built once per pipeline run and never updated. Position `i` of the index
/// corresponds to `sections[i]`.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    index: FlatL2Index,
    texts: Vec<String>,
    model_id: String,
}

impl EmbeddingIndex {
    /// Embed every section's content and index the vectors.
    ///
    /// An empty section list produces an empty index without calling the backend.
    #[instrument(skip_all, fields(sections = sections.len(), model = embedder.model_id()))]
    pub async fn build<E: Embedder>(embedder: &E, sections: &[Section]) -> Result<Self> {
        let texts: Vec<String> = sections.iter().map(|s| s.content.clone()).collect();

        if texts.is_empty() {
            return Ok(Self::empty(embedder.model_id()));
        }

        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(PagewiseError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut builder = IndexBuilder::with_dimension(dimension, vectors.len());
        for vector in &vectors {
            builder
                .add(vector)
                .map_err(|e| PagewiseError::Embedding(e.to_string()))?;
        }
        let index = builder.finish();

        info!(vectors = index.len(), dimension = index.dimension(), "embedding index built");

        Ok(Self {
            index,
            texts,
            model_id: embedder.model_id().to_string(),
        })
    }

    /// An index with no vectors. Every query against it returns no context.
    pub fn empty(model_id: impl Into<String>) -> Self {
        Self {
            index: IndexBuilder::new().finish(),
            texts: Vec::new(),
            model_id: model_id.into(),
        }
    }

    /// Indexed texts, in section order.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Stored embedding for section `position`.
    pub fn embedding(&self, position: usize) -> Option<&[f32]> {
        self.index.vector(position)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Model the vectors were produced with.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Nearest stored sections to an already-embedded query.
    pub fn search(&self, query: &[f32], top: usize) -> Result<Vec<Neighbor>> {
        self.index.search(query, top)
    }
}

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

/// Retrieves the most similar section texts for a query.
///
/// Cheap to clone; the index and embedder are shared.
pub struct Retriever<E> {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<E>,
}

impl<E> Clone for Retriever<E> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            embedder: Arc::clone(&self.embedder),
        }
    }
}

impl<E: Embedder> Retriever<E> {
    /// Pair an index with the embedder used for queries.
    ///
    /// Fails if the embedder's model differs from the one the index was built with.
    pub fn new(index: Arc<EmbeddingIndex>, embedder: Arc<E>) -> Result<Self> {
        if index.model_id() != embedder.model_id() {
            return Err(PagewiseError::Index(format!(
                "index built with '{}' cannot be queried with '{}'",
                index.model_id(),
                embedder.model_id()
            )));
        }
        Ok(Self { index, embedder })
    }

    /// The `top` nearest sections to `query_text`, closest first.
    pub async fn neighbors(&self, query_text: &str, top: usize) -> Result<Vec<Neighbor>> {
        if self.index.is_empty() || top == 0 {
            return Ok(Vec::new());
        }
        let query = self.embed_query(query_text).await?;
        self.index.search(&query, top)
    }

    /// Texts of the `top` nearest sections joined by [`CONTEXT_SEPARATOR`].
    pub async fn query(&self, query_text: &str, top: usize) -> Result<String> {
        let hits = self.neighbors(query_text, top).await?;
        let texts = self.index.texts();
        Ok(hits
            .iter()
            .map(|hit| texts[hit.position].as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR))
    }

    /// Embed a query, reusing the stored vector when the text is already indexed.
    async fn embed_query(&self, query_text: &str) -> Result<Vec<f32>> {
        if let Some(position) = self.index.texts().iter().position(|t| t == query_text) {
            if let Some(stored) = self.index.embedding(position) {
                debug!(position, "query matches an indexed text, reusing its embedding");
                return Ok(stored.to_vec());
            }
        }

        let mut vectors = self.embedder.embed_batch(&[query_text.to_string()]).await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(PagewiseError::Embedding(
                "expected exactly one embedding for the query".into(),
            )),
        }
    }
}
