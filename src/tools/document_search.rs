//! Retrieval-augmented search over the company report PDF
//!
//! The corpus is fixed at setup: text is extracted once, split into
//! overlapping chunks and embedded. Each question embeds the query, takes the
//! nearest chunks by cosine similarity and asks the model to answer from them.

use super::{parse_input, Tool, ToolContext, ToolError, ToolOutput, PDF_TOOL_NAME};
use crate::llm::{complete_text, EmbeddingService, LlmService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
/// Chunks retrieved per question
const TOP_K: usize = 4;

/// Locations tried, in order, when no explicit corpus path is configured
pub const DEFAULT_CORPUS_CANDIDATES: [&str; 2] = [
    "./tools/pdf_data/report_2023_2024.pdf",
    "./data/report_2023_2024.pdf",
];

/// Pick the corpus file: the explicit path when given, else the first candidate that exists
pub fn resolve_corpus_path(explicit: Option<&Path>, candidates: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    candidates.iter().map(PathBuf::from).find(|p| p.is_file())
}

/// Boundaries tried in order: paragraphs, lines, words, then characters
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Split text into chunks of at most `chunk_size` characters, each sharing up
/// to `overlap` trailing characters with the previous one.
///
/// Paragraph breaks are preferred over line breaks, line breaks over spaces.
/// A piece with no usable boundary is cut by character.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    split_on(text, &SEPARATORS, chunk_size.max(1), overlap)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_on(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let index = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(*sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(index).copied().unwrap_or_default();
    let finer = separators.get(index + 1..).unwrap_or_default();

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut chunks = Vec::new();
    let mut fitting: Vec<String> = Vec::new();
    for piece in pieces {
        if char_len(&piece) <= chunk_size {
            fitting.push(piece);
            continue;
        }
        chunks.extend(merge_pieces(&fitting, separator, chunk_size, overlap));
        fitting.clear();
        if finer.is_empty() {
            chunks.push(piece);
        } else {
            chunks.extend(split_on(&piece, finer, chunk_size, overlap));
        }
    }
    chunks.extend(merge_pieces(&fitting, separator, chunk_size, overlap));
    chunks
}

/// Greedily pack pieces joined by `separator`, carrying up to `overlap` characters forward
fn merge_pieces(pieces: &[String], separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    fn emit(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
        let chunk = window.iter().copied().collect::<Vec<_>>().join(separator);
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
    }

    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for piece in pieces {
        let len = char_len(piece);
        if !window.is_empty() && total + sep_len + len > chunk_size {
            emit(&mut chunks, &window, separator);
            while !window.is_empty() && (total > overlap || total + sep_len + len > chunk_size) {
                if let Some(first) = window.pop_front() {
                    total -= char_len(first) + if window.is_empty() { 0 } else { sep_len };
                }
            }
        }
        total += len + if window.is_empty() { 0 } else { sep_len };
        window.push_back(piece);
    }
    emit(&mut chunks, &window, separator);
    chunks
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// One retrievable chunk of the corpus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub page_content: String,
    pub metadata: PassageMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassageMetadata {
    pub source: String,
    /// Zero-based page the chunk was cut from
    pub page: usize,
    pub chunk_index: usize,
}

/// In-memory vector index over the corpus chunks
pub struct DocumentIndex {
    passages: Vec<Passage>,
    vectors: Vec<Vec<f32>>,
}

impl DocumentIndex {
    /// Chunk each page and embed the chunks
    pub async fn build(
        source: &str,
        pages: &[String],
        embedder: &dyn EmbeddingService,
    ) -> Result<Self, ToolError> {
        let mut passages = Vec::new();
        for (page, text) in pages.iter().enumerate() {
            for page_content in split_text(text, CHUNK_SIZE, CHUNK_OVERLAP) {
                passages.push(Passage {
                    page_content,
                    metadata: PassageMetadata {
                        source: source.to_string(),
                        page,
                        chunk_index: passages.len(),
                    },
                });
            }
        }
        if passages.is_empty() {
            return Err(ToolError::Document(format!("{source} contains no extractable text")));
        }

        let chunks: Vec<String> = passages.iter().map(|p| p.page_content.clone()).collect();
        let vectors = embedder.embed(&chunks).await?;
        if vectors.len() != passages.len() {
            return Err(ToolError::Decode(format!(
                "Expected {} embeddings, got {}",
                passages.len(),
                vectors.len()
            )));
        }

        Ok(Self { passages, vectors })
    }

    /// Extract the PDF's pages off the async runtime, then build the index
    pub async fn from_pdf(path: &Path, embedder: &dyn EmbeddingService) -> Result<Self, ToolError> {
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned))
            .await
            .map_err(|e| ToolError::Document(format!("PDF extraction task failed: {e}")))?
            .map_err(|e| ToolError::Document(format!("Failed to read {}: {e}", path.display())))?;

        let index = Self::build(&path.display().to_string(), &pages, embedder).await?;
        tracing::info!(
            path = %path.display(),
            pages = pages.len(),
            chunks = index.chunk_count(),
            "Document index built"
        );
        Ok(index)
    }

    pub fn chunk_count(&self) -> usize {
        self.passages.len()
    }

    /// The `k` passages closest to `query`, best first
    pub fn search(&self, query: &[f32], k: usize) -> Vec<&Passage> {
        let mut scored: Vec<(f32, &Passage)> = self
            .vectors
            .iter()
            .map(|v| cosine_similarity(query, v))
            .zip(&self.passages)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(k).map(|(_, p)| p).collect()
    }
}

fn rag_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end.\n\
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
         Keep the answer as concise as possible.\n\n\
         Context: {context}\n\n\
         Question: {question}\n\n\
         Helpful Answer:"
    )
}

#[derive(Debug, Deserialize)]
struct DocumentQuestion {
    question: String,
}

#[derive(Serialize)]
struct SearchResult<'a> {
    retrieved_documents: Vec<&'a Passage>,
    answer: String,
    total_documents: usize,
}

struct Retriever {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn EmbeddingService>,
    llm: Arc<dyn LlmService>,
}

/// Document search tool. Always registered; without an index every call reports it.
pub struct DocumentSearchTool {
    retriever: Option<Retriever>,
}

impl DocumentSearchTool {
    pub fn new(
        index: Arc<DocumentIndex>,
        embedder: Arc<dyn EmbeddingService>,
        llm: Arc<dyn LlmService>,
    ) -> Self {
        Self {
            retriever: Some(Retriever { index, embedder, llm }),
        }
    }

    pub fn uninitialized() -> Self {
        Self { retriever: None }
    }

    async fn search(retriever: &Retriever, input: Value) -> Result<String, ToolError> {
        let question = parse_input::<DocumentQuestion>(input)?.question;

        let query = retriever
            .embedder
            .embed(std::slice::from_ref(&question))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::Decode("No embedding returned for question".to_string()))?;

        let passages = retriever.index.search(&query, TOP_K);
        let context = passages
            .iter()
            .map(|p| p.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let answer = complete_text(retriever.llm.as_ref(), rag_prompt(&context, &question)).await?;

        serde_json::to_string_pretty(&SearchResult {
            total_documents: passages.len(),
            retrieved_documents: passages,
            answer,
        })
        .map_err(|e| ToolError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        PDF_TOOL_NAME
    }

    fn description(&self) -> String {
        "Search the pharmaceutical company report (PDF) for information and generate an answer. Returns JSON containing both the retrieved passages and the generated answer.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["question"],
            "properties": {
                "question": {
                    "type": "string",
                    "description": "Question about the PDF content"
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let Some(retriever) = &self.retriever else {
            return ToolOutput::error(
                "Error: PDF vector store not initialized. The PDF file may not have been loaded successfully during initialization.",
            );
        };

        match Self::search(retriever, input).await {
            Ok(output) => ToolOutput::success(output),
            Err(e) => ToolOutput::error(format!("Error searching PDF: {e}")),
        }
    }
}
