
use itertools::Itertools;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::corpus::CorpusDocument;

/// Heading path assigned to content that appears before the first heading
const PRELUDE_HEADING: &str = "Introduction";

/// A retrieval-sized passage of a runbook document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Identifier of the owning document
    pub document_id: String,
    /// Position of this chunk within the document
    pub ordinal: usize,
    /// The chunk text
    pub content: String,
    /// Heading path for this chunk (e.g. "Disk Full Runbook > Escalation Criteria")
    pub heading_path: String,
    /// Estimated token count
    pub token_count: usize,
    /// Whether this chunk contains fenced code blocks
    pub has_code_blocks: bool,
}

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    pub target_chunk_size: usize,
    /// Maximum chunk size in tokens before forced splitting
    pub max_chunk_size: usize,
    /// Minimum chunk size in tokens (smaller chunks will be merged)
    pub min_chunk_size: usize,
    /// Overlap size in tokens between adjacent chunks
    pub overlap_size: usize,
    /// Whether to preserve fenced code blocks as single units
    pub preserve_code_blocks: bool,
    /// Whether to break at sentence boundaries when possible
    pub sentence_boundary_splitting: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_chunk_size: 650,
            max_chunk_size: 1000,
            min_chunk_size: 100,
            overlap_size: 50,
            preserve_code_blocks: true,
            sentence_boundary_splitting: true,
        }
    }
}

/// A markdown section delimited by headings
#[derive(Debug, Clone)]
struct MarkdownSection {
    heading_path: String,
    content: String,
    has_code_blocks: bool,
}

/// Chunk a runbook document into embedding-ready pieces.
///
/// Deterministic and pure: the same document and config always produce the
/// same chunks. Splits at heading boundaries first, then paragraphs, then
/// sentences; fenced code blocks are never split. Always terminates; a
/// document smaller than the minimum chunk size yields exactly one chunk.
#[inline]
pub fn chunk_document(document: &CorpusDocument, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    let sections = split_into_sections(&document.content);

    let mut chunks = Vec::new();
    for section in &sections {
        chunk_section(section, config, &mut chunks);
    }

    let mut chunks = post_process_chunks(chunks, config);

    for (ordinal, chunk) in chunks.iter_mut().enumerate() {
        chunk.document_id = document.id.clone();
        chunk.ordinal = ordinal;
    }

    debug!(
        "Chunked document '{}' into {} chunks",
        document.id,
        chunks.len()
    );

    chunks
}

/// Split raw markdown into heading-delimited sections.
///
/// Heading detection goes through the markdown parser so that heading-like
/// lines inside fenced code blocks are not treated as structure. Each
/// section's content includes its heading line, so concatenating section
/// contents preserves the document text.
fn split_into_sections(content: &str) -> Vec<MarkdownSection> {
    struct HeadingMark {
        start: usize,
        level: HeadingLevel,
        text: String,
    }

    let mut marks: Vec<HeadingMark> = Vec::new();
    let mut pending: Option<HeadingMark> = None;

    for (event, range) in Parser::new_ext(content, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                pending = Some(HeadingMark {
                    start: range.start,
                    level,
                    text: String::new(),
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(mark) = pending.as_mut() {
                    mark.text.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mark) = pending.take() {
                    marks.push(mark);
                }
            }
            _ => {}
        }
    }

    let mut sections = Vec::new();

    let first_start = marks.first().map_or(content.len(), |mark| mark.start);
    let prelude = content.get(..first_start).unwrap_or_default();
    if !prelude.trim().is_empty() {
        sections.push(MarkdownSection {
            heading_path: PRELUDE_HEADING.to_string(),
            content: prelude.trim_end().to_string(),
            has_code_blocks: contains_code_block(prelude),
        });
    }

    // Heading paths accumulate on a stack: a level-N heading closes all open
    // headings at level >= N
    let mut stack: Vec<(HeadingLevel, String)> = Vec::new();

    for (i, mark) in marks.iter().enumerate() {
        while stack
            .last()
            .is_some_and(|(level, _)| *level >= mark.level)
        {
            stack.pop();
        }
        stack.push((mark.level, mark.text.trim().to_string()));

        let end = marks
            .get(i + 1)
            .map_or(content.len(), |next| next.start);
        let section_text = content.get(mark.start..end).unwrap_or_default();
        if section_text.trim().is_empty() {
            continue;
        }

        sections.push(MarkdownSection {
            heading_path: stack.iter().map(|(_, text)| text.as_str()).join(" > "),
            content: section_text.trim_end().to_string(),
            has_code_blocks: contains_code_block(section_text),
        });
    }

    sections
}

/// Chunk a single section, splitting oversized content
fn chunk_section(section: &MarkdownSection, config: &ChunkingConfig, chunks: &mut Vec<DocumentChunk>) {
    let content = &section.content;

    if content.trim().is_empty() {
        return;
    }

    let token_count = estimate_token_count(content);

    if token_count <= config.target_chunk_size {
        chunks.push(make_chunk(content.clone(), section, token_count));
        return;
    }

    let splits = if section.has_code_blocks && config.preserve_code_blocks {
        split_with_code_preservation(content, config)
    } else {
        split_by_semantics(content, config)
    };

    for split in splits {
        if split.trim().is_empty() {
            continue;
        }
        let split_tokens = estimate_token_count(&split);
        chunks.push(make_chunk(split, section, split_tokens));
    }
}

fn make_chunk(content: String, section: &MarkdownSection, token_count: usize) -> DocumentChunk {
    let has_code_blocks = section.has_code_blocks && contains_code_block(&content);
    DocumentChunk {
        document_id: String::new(),
        ordinal: 0,
        content,
        heading_path: section.heading_path.clone(),
        token_count,
        has_code_blocks,
    }
}

/// Split content on line boundaries while never breaking inside a fenced
/// code block
fn split_with_code_preservation(content: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut in_code_block = false;
    let mut current_token_count = 0;

    for line in content.lines() {
        let line_with_newline = format!("{}\n", line);
        let line_tokens = estimate_token_count(&line_with_newline);

        // Split check uses the pre-toggle fence state: a boundary before an
        // opening fence is fine, a boundary before a closing fence would cut
        // the block in half
        if !in_code_block
            && current_token_count + line_tokens > config.max_chunk_size
            && !current_split.trim().is_empty()
        {
            splits.push(current_split.trim().to_string());
            current_split.clear();
            current_token_count = 0;
        }

        if line.trim().starts_with("```") {
            in_code_block = !in_code_block;
        }

        current_split.push_str(&line_with_newline);
        current_token_count += line_tokens;
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    splits
}

/// Split content at paragraph boundaries, falling back to sentences and
/// finally words for oversized paragraphs
fn split_by_semantics(content: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    for paragraph in content.split("\n\n") {
        if paragraph.trim().is_empty() {
            continue;
        }

        let paragraph_tokens = estimate_token_count(paragraph);

        if paragraph_tokens > config.max_chunk_size {
            let sub_splits = if config.sentence_boundary_splitting {
                split_by_sentences(paragraph, config)
            } else {
                split_by_words(paragraph, config)
            };

            for sub_split in sub_splits {
                let sub_tokens = estimate_token_count(&sub_split);
                if current_token_count + sub_tokens > config.target_chunk_size
                    && !current_split.trim().is_empty()
                {
                    splits.push(current_split.trim().to_string());
                    current_split.clear();
                    current_token_count = 0;
                }
                current_split.push_str(&sub_split);
                current_split.push_str("\n\n");
                current_token_count += sub_tokens;
            }
        } else {
            if current_token_count + paragraph_tokens > config.target_chunk_size
                && !current_split.trim().is_empty()
            {
                splits.push(current_split.trim().to_string());
                current_split.clear();
                current_token_count = 0;
            }

            current_split.push_str(paragraph.trim_end());
            current_split.push_str("\n\n");
            current_token_count += paragraph_tokens;
        }
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    splits
}

/// Group sentences into chunks bounded by the target size
fn split_by_sentences(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let sentences = sentence_bounds(text);

    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    for sentence in sentences {
        let sentence_tokens = estimate_token_count(sentence);

        if current_token_count + sentence_tokens > config.target_chunk_size
            && !current_split.trim().is_empty()
        {
            splits.push(current_split.trim().to_string());
            current_split.clear();
            current_token_count = 0;
        }

        current_split.push_str(sentence);
        current_split.push(' ');
        current_token_count += sentence_tokens;
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    splits
}

/// Slice text into sentences at `.`/`!`/`?` followed by whitespace.
///
/// Slicing the original text (rather than re-joining split parts) keeps the
/// sentence punctuation intact.
fn sentence_bounds(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut bounds = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut j = i + 1;
            while j < bytes.len() && matches!(bytes[j], b'.' | b'!' | b'?') {
                j += 1;
            }
            if j >= bytes.len() || bytes[j].is_ascii_whitespace() {
                let piece = text.get(start..j).unwrap_or_default().trim();
                if !piece.is_empty() {
                    bounds.push(piece);
                }
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    let tail = text.get(start..).unwrap_or_default().trim();
    if !tail.is_empty() {
        bounds.push(tail);
    }

    bounds
}

/// Split text by words as a last resort
fn split_by_words(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    for word in text.split_whitespace() {
        let word_with_space = format!("{} ", word);
        let word_tokens = estimate_token_count(&word_with_space);

        if current_token_count + word_tokens > config.target_chunk_size
            && !current_split.trim().is_empty()
        {
            splits.push(current_split.trim().to_string());
            current_split.clear();
            current_token_count = 0;
        }

        current_split.push_str(&word_with_space);
        current_token_count += word_tokens;
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    splits
}

/// Merge undersized chunks into same-section neighbors and add overlap
fn post_process_chunks(chunks: Vec<DocumentChunk>, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    if chunks.is_empty() {
        return chunks;
    }

    let mut processed = Vec::new();
    let mut pending_merge: Option<DocumentChunk> = None;

    for chunk in chunks {
        if let Some(mut pending) = pending_merge.take() {
            if chunk.token_count < config.min_chunk_size
                && pending.token_count + chunk.token_count <= config.max_chunk_size
                && pending.heading_path == chunk.heading_path
            {
                pending.content.push_str("\n\n");
                pending.content.push_str(&chunk.content);
                pending.token_count += chunk.token_count;
                pending.has_code_blocks = pending.has_code_blocks || chunk.has_code_blocks;
                pending_merge = Some(pending);
                continue;
            }
            processed.push(pending);
        }

        if chunk.token_count < config.min_chunk_size {
            pending_merge = Some(chunk);
        } else {
            processed.push(chunk);
        }
    }

    if let Some(pending) = pending_merge {
        processed.push(pending);
    }

    if config.overlap_size > 0 {
        add_overlap(&mut processed, config);
    }

    processed
}

/// Prepend the tail of each chunk to its same-section successor so that a
/// step referring to output in the previous passage stays retrievable
fn add_overlap(chunks: &mut [DocumentChunk], config: &ChunkingConfig) {
    let mut i = 1;
    while i < chunks.len() {
        let (left, right) = chunks.split_at_mut(i);
        let prev_chunk = &left[i - 1];
        let curr_chunk = &mut right[0];

        if prev_chunk.heading_path == curr_chunk.heading_path {
            let overlap_text = extract_overlap_text(&prev_chunk.content, config.overlap_size);
            if !overlap_text.is_empty() {
                curr_chunk.content = format!("{}\n\n{}", overlap_text, curr_chunk.content);
                curr_chunk.token_count += estimate_token_count(&overlap_text);
            }
        }
        i += 1;
    }
}

/// Extract overlap text from the end of a chunk
fn extract_overlap_text(content: &str, overlap_tokens: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let word_count = (overlap_tokens as f64 * 0.75) as usize;

    if words.len() <= word_count {
        return String::new();
    }

    words[words.len() - word_count.min(words.len())..].join(" ")
}

/// Estimate token count using a simple heuristic.
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text, plus a little
    // for punctuation
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}

fn contains_code_block(text: &str) -> bool {
    text.contains("```")
}
