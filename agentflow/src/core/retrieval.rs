//! Keyword-overlap retrieval over design and contract documents.
//!
//! Documents are split into heading-delimited chunks. A query is reduced to a
//! term multiset and every chunk is scored by term frequency overlap, boosted
//! when query terms appear in the chunk heading and when the chunk comes from
//! a contract document. Scoring is deterministic and purely lexical.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::checks::truncate_chars;
use super::task::Task;

static HEADING_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,3}\s").expect("heading start regex is valid"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,3})\s*(.+?)(?:\n|$)").expect("heading regex is valid"));
static TERM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z][a-z0-9_]+\b").expect("term regex is valid"));

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "this", "that", "these",
    "those", "it", "its", "they", "them", "we", "you", "your", "our", "their", "what", "which",
    "who", "when", "where", "why", "how", "all", "each", "every", "both", "few", "more", "most",
    "other", "some", "such", "no", "not", "only", "own", "same", "so", "than", "too", "very",
    "can", "just", "now", "also", "use", "using", "used",
];

static STOPWORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOPWORDS.iter().copied().collect());

/// Section label for text that precedes the first heading.
pub const INTRODUCTION_SECTION: &str = "Introduction";
/// Section label for a document that yields no chunks.
pub const FULL_DOCUMENT_SECTION: &str = "Full Document";

const HEADER_BOOST: f64 = 1.5;
const CONTRACT_BOOST: f64 = 1.2;
const CHARS_PER_TOKEN: usize = 4;

/// Category of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Design,
    Contract,
}

impl SourceKind {
    fn label(self) -> &'static str {
        match self {
            SourceKind::Design => "DESIGN",
            SourceKind::Contract => "CONTRACT",
        }
    }
}

/// Identity of the document a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkSource {
    pub kind: SourceKind,
    /// Document name without extension.
    pub name: String,
}

impl fmt::Display for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.name)
    }
}

/// A document handed to the retriever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub kind: SourceKind,
    pub name: String,
    pub content: String,
}

/// A heading-delimited piece of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub source: ChunkSource,
    pub section: String,
    pub content: String,
    /// Relevance to the last query. Only meaningful on retrieval results.
    pub score: f64,
}

/// Term multiset with a cached total occurrence count. Ordered so scoring
/// sums in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermCounts {
    counts: BTreeMap<String, usize>,
    total: usize,
}

impl TermCounts {
    pub fn get(&self, term: &str) -> usize {
        self.counts.get(term).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(term, count)| (term.as_str(), *count))
    }
}

/// Lowercase `text` and count its significant terms.
///
/// Terms start with a letter, continue with letters, digits or underscores,
/// are longer than two characters, and are not stopwords.
pub fn extract_terms(text: &str) -> TermCounts {
    let lower = text.to_lowercase();
    let mut terms = TermCounts::default();
    for found in TERM_RE.find_iter(&lower) {
        let word = found.as_str();
        if word.len() <= 2 || STOPWORD_SET.contains(word) {
            continue;
        }
        *terms.counts.entry(word.to_string()).or_insert(0) += 1;
        terms.total += 1;
    }
    terms
}

/// Split a document into chunks at lines that start a level 1-3 heading.
pub fn chunk_document(doc: &SourceDocument) -> Vec<DocumentChunk> {
    let source = ChunkSource {
        kind: doc.kind,
        name: doc.name.clone(),
    };
    let mut chunks: Vec<DocumentChunk> = split_at_headings(&doc.content)
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .map(|piece| DocumentChunk {
            source: source.clone(),
            section: section_name(piece),
            content: piece.trim().to_string(),
            score: 0.0,
        })
        .collect();

    if chunks.is_empty() {
        chunks.push(DocumentChunk {
            source,
            section: FULL_DOCUMENT_SECTION.to_string(),
            content: doc.content.trim().to_string(),
            score: 0.0,
        });
    }
    chunks
}

fn split_at_headings(content: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in content.match_indices('\n') {
        let rest = &content[idx + 1..];
        if HEADING_START_RE.is_match(rest) {
            pieces.push(&content[start..idx]);
            start = idx + 1;
        }
    }
    pieces.push(&content[start..]);
    pieces
}

fn section_name(piece: &str) -> String {
    HEADING_RE
        .captures(piece)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| INTRODUCTION_SECTION.to_string())
}

/// Score a chunk against query terms.
///
/// `chunk_terms` must be the terms of the chunk's section and content.
pub fn score_chunk(chunk: &DocumentChunk, chunk_terms: &TermCounts, query: &TermCounts) -> f64 {
    if chunk_terms.is_empty() || query.is_empty() {
        return 0.0;
    }
    let total = chunk_terms.total() as f64;
    let mut score = 0.0;
    for (term, query_count) in query.iter() {
        let tf = chunk_terms.get(term);
        if tf > 0 {
            score += (tf as f64 / total) * query_count as f64;
        }
    }

    let section = chunk.section.to_lowercase();
    for (term, _) in query.iter() {
        if section.contains(term) {
            score *= HEADER_BOOST;
        }
    }

    if chunk.source.kind == SourceKind::Contract {
        score *= CONTRACT_BOOST;
    }
    score
}

/// Chunked corpus with precomputed per-chunk terms.
#[derive(Debug, Clone, Default)]
pub struct ContextRetriever {
    chunks: Vec<DocumentChunk>,
    terms: Vec<TermCounts>,
}

impl ContextRetriever {
    /// Chunk `documents` in the order given.
    pub fn new(documents: &[SourceDocument]) -> Self {
        let chunks: Vec<DocumentChunk> = documents.iter().flat_map(chunk_document).collect();
        let terms = chunks
            .iter()
            .map(|chunk| extract_terms(&format!("{} {}", chunk.section, chunk.content)))
            .collect();
        Self { chunks, terms }
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total characters of chunk content across the corpus.
    pub fn total_chars(&self) -> usize {
        self.chunks.iter().map(|c| c.content.chars().count()).sum()
    }

    /// Select up to `max_chunks` relevant chunks within roughly `max_tokens`.
    ///
    /// Only the top `2 * max_chunks` candidates are considered. Zero-score
    /// chunks are never returned; a chunk that would overflow the character
    /// budget is skipped and the scan continues.
    pub fn retrieve(&self, query: &str, max_chunks: usize, max_tokens: usize) -> Vec<DocumentChunk> {
        if self.chunks.is_empty() || max_chunks == 0 {
            return Vec::new();
        }
        let query_terms = extract_terms(query);
        let mut ranked: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .zip(&self.terms)
            .map(|(chunk, terms)| score_chunk(chunk, terms, &query_terms))
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let char_limit = max_tokens.saturating_mul(CHARS_PER_TOKEN);
        let mut total_chars = 0usize;
        let mut selected = Vec::new();
        for (idx, score) in ranked.into_iter().take(max_chunks.saturating_mul(2)) {
            if score <= 0.0 {
                continue;
            }
            let chunk = &self.chunks[idx];
            let chars = chunk.content.chars().count();
            if total_chars + chars > char_limit {
                continue;
            }
            total_chars += chars;
            selected.push(DocumentChunk {
                score,
                ..chunk.clone()
            });
            if selected.len() >= max_chunks {
                break;
            }
        }
        selected
    }

    /// Every chunk rendered in corpus order.
    pub fn full_context(&self) -> Option<String> {
        (!self.chunks.is_empty()).then(|| render_chunks(&self.chunks))
    }
}

/// Render chunks grouped by contiguous source: one `## source` heading per
/// run and a `### section` heading per chunk.
pub fn render_chunks(chunks: &[DocumentChunk]) -> String {
    let mut out = String::new();
    let mut current: Option<&ChunkSource> = None;
    for chunk in chunks {
        if current != Some(&chunk.source) {
            if current.is_some() {
                out.push_str("\n---\n\n");
            }
            out.push_str(&format!("## {}\n\n", chunk.source));
            current = Some(&chunk.source);
        }
        out.push_str(&format!("### {}\n\n{}\n\n", chunk.section, chunk.content));
    }
    out.trim_end().to_string()
}

/// Query text for a task: title, description, the first `prompt_chars`
/// characters of the prompt, both contracts, and every acceptance criterion.
pub fn task_query(task: &Task, prompt_chars: usize) -> String {
    let mut parts: Vec<&str> = vec![
        task.title.as_str(),
        task.description.as_str(),
        truncate_chars(&task.prompt, prompt_chars),
    ];
    parts.extend(task.input_contract.as_deref());
    parts.extend(task.output_contract.as_deref());
    parts.extend(task.acceptance_criteria.iter().map(String::as_str));
    parts.retain(|part| !part.is_empty());
    parts.join(" ")
}

/// How design material is supplied to tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextMode {
    /// No documents loaded.
    Empty,
    /// Small corpus: the same rendered corpus for every task.
    Full(String),
    /// Large corpus: per-task retrieval.
    Retrieval,
}

impl ContextMode {
    /// `Full` when the corpus is at most `threshold_chars` characters.
    pub fn select(retriever: &ContextRetriever, threshold_chars: usize) -> Self {
        let total = retriever.total_chars();
        if retriever.is_empty() || total == 0 {
            return ContextMode::Empty;
        }
        if total <= threshold_chars {
            match retriever.full_context() {
                Some(full) => ContextMode::Full(full),
                None => ContextMode::Empty,
            }
        } else {
            ContextMode::Retrieval
        }
    }

    pub fn is_retrieval(&self) -> bool {
        matches!(self, ContextMode::Retrieval)
    }
}

/// Retrieval limits used when building per-task context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalLimits {
    pub max_chunks: usize,
    pub max_tokens: usize,
    pub query_prompt_chars: usize,
}

/// Design context provider: an explicitly owned retriever plus the mode
/// chosen for its corpus.
#[derive(Debug, Clone)]
pub struct DesignContext {
    retriever: ContextRetriever,
    mode: ContextMode,
    limits: RetrievalLimits,
}

impl DesignContext {
    pub fn new(retriever: ContextRetriever, threshold_chars: usize, limits: RetrievalLimits) -> Self {
        let mode = ContextMode::select(&retriever, threshold_chars);
        Self {
            retriever,
            mode,
            limits,
        }
    }

    pub fn mode(&self) -> &ContextMode {
        &self.mode
    }

    pub fn retriever(&self) -> &ContextRetriever {
        &self.retriever
    }

    /// Design material for one task, with its section heading.
    pub fn for_task(&self, task: &Task) -> Option<String> {
        match &self.mode {
            ContextMode::Empty => None,
            ContextMode::Full(full) => Some(format!("# DESIGN CONTEXT\n\n{full}")),
            ContextMode::Retrieval => {
                let query = task_query(task, self.limits.query_prompt_chars);
                let chunks = self
                    .retriever
                    .retrieve(&query, self.limits.max_chunks, self.limits.max_tokens);
                (!chunks.is_empty())
                    .then(|| format!("# RELEVANT DESIGN CONTEXT\n\n{}", render_chunks(&chunks)))
            }
        }
    }

    /// Ranked design material for an ad hoc query, regardless of corpus size.
    pub fn for_query(&self, query: &str, max_chunks: usize, max_tokens: usize) -> Option<String> {
        let chunks = self.retriever.retrieve(query, max_chunks, max_tokens);
        (!chunks.is_empty())
            .then(|| format!("# RELEVANT DESIGN CONTEXT\n\n{}", render_chunks(&chunks)))
    }
}
