//! Caller-facing question answering session.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use rag_chunk::{chunk_documents, load_documents, RecursiveChunker};
use rag_core::{
    Chunk, EvalQuestion, EvalRecord, LanguageModel, QueryOutcome, RagConfig, RagError,
    RankedChunk, RelevanceScorer, Result, RetrievalMode, Stats,
};
use rag_embed::Embedder;
use rag_generate::{
    select_within_budget, GroundedGenerator, GroundingPolicy, QueryRewriter, CONTEXT_SEPARATOR,
};
use rag_query::{HybridRetriever, Reranker, RetrievalEngine};
use rag_store::{index_embeddings, ChunkIndex, KeywordSource, VectorSource};

/// Chunks embedded per model call at ingestion.
const EMBED_BATCH_SIZE: usize = 32;

/// Ingests a corpus once and answers questions over it.
pub struct RagSession {
    config: RagConfig,
    index: Arc<ChunkIndex>,
    embedder: Arc<dyn Embedder>,
    engine: RetrievalEngine,

    /// Absent until a language model is attached; retrieval works without it.
    generator: Option<GroundedGenerator>,

    rewriter: Option<QueryRewriter>,
}

impl RagSession {
    /// Create a session with an empty index.
    ///
    /// `scorer` is `None` when reranking is disabled.
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        scorer: Option<Arc<dyn RelevanceScorer>>,
    ) -> Result<Self> {
        config.validate()?;

        let index = Arc::new(ChunkIndex::open(embedder.dimension())?);

        let retriever = HybridRetriever::new(
            Arc::new(KeywordSource::new(index.clone())),
            Arc::new(VectorSource::new(index.clone(), embedder.clone())),
            config.retry.clone(),
        );
        let reranker = scorer.map(|s| Reranker::new(s, config.retry.clone()));
        let engine = RetrievalEngine::new(retriever, reranker, config.retrieval.clone());

        Ok(Self {
            config,
            index,
            embedder,
            engine,
            generator: None,
            rewriter: None,
        })
    }

    /// Attach the language model used for answers and query rewriting.
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Result<Self> {
        let policy = GroundingPolicy::from_config(&self.config.grounding)?;

        if self.config.retrieval.rewrite_query {
            self.rewriter = Some(QueryRewriter::new(model.clone(), self.config.retry.clone()));
        }
        self.generator = Some(GroundedGenerator::new(
            model,
            policy,
            &self.config.generation,
            self.config.retry.clone(),
        ));

        Ok(self)
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Load, chunk and index every supported file under `path`.
    pub async fn ingest_dir(&self, path: &Path) -> Result<usize> {
        let documents = load_documents(path)?;
        let chunker = RecursiveChunker::new();
        let chunks = chunk_documents(
            &documents,
            &chunker,
            &self.config.chunking.to_chunk_config(),
        )?;
        self.ingest_chunks(chunks).await
    }

    /// Index chunks for lexical and dense search.
    ///
    /// Chunks without text are skipped. If embedding fails the chunks stay
    /// searchable by keyword only.
    pub async fn ingest_chunks(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let start = Instant::now();

        let chunks: Vec<Chunk> = chunks.into_iter().filter(|c| c.has_content()).collect();
        self.index.insert_chunks(&chunks)?;

        if self.index.vec_enabled() {
            if let Err(e) =
                index_embeddings(&self.index, self.embedder.as_ref(), &chunks, EMBED_BATCH_SIZE)
                    .await
            {
                warn!(error = %e, "Embedding failed, dense search will miss these chunks");
            }
        }

        info!(
            "Indexed {} chunks in {}ms",
            chunks.len(),
            start.elapsed().as_millis()
        );
        Ok(chunks.len())
    }

    pub fn stats(&self) -> Result<Stats> {
        self.index.stats()
    }

    /// Answer `question` with the configured retrieval mode.
    pub async fn ask(&self, question: &str) -> Result<QueryOutcome> {
        self.ask_with_mode(question, self.config.retrieval.mode).await
    }

    /// Answer `question`, retrieving with `mode`.
    pub async fn ask_with_mode(&self, question: &str, mode: RetrievalMode) -> Result<QueryOutcome> {
        let start = Instant::now();
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| RagError::config("no language model configured"))?;

        self.ensure_corpus(question)?;

        let query = self.search_query(question).await;
        let top = self.engine.top(&query, mode).await?;
        let ranked: Vec<&str> = top.iter().map(|r| r.chunk.text()).collect();
        let contexts: Vec<String> =
            select_within_budget(&ranked, self.config.retrieval.max_context_chars)
                .into_iter()
                .map(str::to_string)
                .collect();

        let context = contexts.join(CONTEXT_SEPARATOR);
        debug!(
            retrieved = ranked.len(),
            chunks = contexts.len(),
            context_chars = context.chars().count(),
            "Context assembled"
        );

        let answer = generator.generate(question, &context).await?;
        let latency_ms = start.elapsed().as_millis() as u64;
        info!(
            latency_ms,
            fallback = answer.is_fallback(),
            "Query answered"
        );

        Ok(QueryOutcome {
            question: question.to_string(),
            fallback: answer.fallback_reason(),
            answer: answer.into_text(),
            contexts,
            latency_ms,
        })
    }

    /// Ranked chunks for `question`, at most `limit`, without generating.
    pub async fn retrieve(&self, question: &str, limit: usize) -> Result<Vec<RankedChunk>> {
        self.ensure_corpus(question)?;

        let mut ranked = self
            .engine
            .rank(question, self.config.retrieval.mode)
            .await?;
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Answer every question and pair the result with its reference answer.
    pub async fn evaluate(
        &self,
        questions: &[EvalQuestion],
        mode: RetrievalMode,
    ) -> Result<Vec<EvalRecord>> {
        let mut records = Vec::with_capacity(questions.len());

        for (i, q) in questions.iter().enumerate() {
            let outcome = self.ask_with_mode(&q.question, mode).await?;
            debug!(done = i + 1, total = questions.len(), "Evaluated question");
            records.push(EvalRecord {
                question: outcome.question,
                answer: outcome.answer,
                contexts: outcome.contexts,
                ground_truth: q.ground_truth.clone(),
            });
        }

        info!(questions = records.len(), ?mode, "Evaluation finished");
        Ok(records)
    }

    fn ensure_corpus(&self, question: &str) -> Result<()> {
        if question.trim().is_empty() {
            return Err(RagError::invalid_argument("question must not be empty"));
        }
        if self.index.chunk_count()? == 0 {
            return Err(RagError::EmptyCorpus);
        }
        Ok(())
    }

    /// The rewritten query when rewriting is on; the question otherwise.
    ///
    /// A failed rewrite falls back to the question.
    async fn search_query(&self, question: &str) -> String {
        let Some(rewriter) = &self.rewriter else {
            return question.to_string();
        };

        match rewriter.rewrite(question).await {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "Query rewrite failed, searching with the question");
                question.to_string()
            }
        }
    }
}
