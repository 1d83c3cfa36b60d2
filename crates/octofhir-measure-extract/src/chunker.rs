//! Boundary-aware document chunking
//!
//! Long documents are split into overlapping chunks that end on paragraph,
//! line or sentence boundaries when one is available. Each chunk records the
//! population section markers it contains so detail passes only run against
//! chunks that mention their population.

use octofhir_measure_diagnostics::Span;
use octofhir_measure_ir::PopulationType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SECTION_MARKER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(initial\s+(?:patient\s+)?population|denominator(?:\s+(exclusion|exception)s?)?|numerator(?:\s+(exclusion)s?)?)\b",
    )
    .ok()
});

static HEADING: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(#{1,6}\s+\S.*|[A-Z][A-Z0-9 /&,:()-]{3,}:?)$").ok());

/// Chunk sizes are measured in bytes and cut on character boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkConfig {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub overlap: usize,
    /// Prefix each chunk with the nearest heading above its start
    pub preserve_headers: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 4_000,
            max_chunk_size: 15_000,
            overlap: 1_000,
            preserve_headers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub index: usize,
    /// Range of the original document this chunk covers
    pub span: Span,
    /// Heading carried over from before the chunk start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub text: String,
    /// Population types whose section markers occur in the chunk
    pub markers: Vec<PopulationType>,
}

impl DocumentChunk {
    pub fn has_marker(&self, population_type: PopulationType) -> bool {
        self.markers.contains(&population_type)
    }
}

/// Split `document` into overlapping chunks
pub fn chunk_document(document: &str, config: &ChunkConfig) -> Vec<DocumentChunk> {
    let max = config.max_chunk_size.max(1);
    let min = config.min_chunk_size.min(max);
    let overlap = config.overlap.min(max / 2);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < document.len() {
        let hard_end = floor_boundary(document, (start + max).min(document.len()));
        let end = if hard_end == document.len() {
            hard_end
        } else {
            break_point(document, start + min, hard_end)
        };

        let body = &document[start..end];
        let header = if config.preserve_headers && start > 0 {
            heading_before(document, start).filter(|h| !body.starts_with(h.as_str()))
        } else {
            None
        };
        let text = match &header {
            Some(h) => format!("{h}\n{body}"),
            None => body.to_string(),
        };
        chunks.push(DocumentChunk {
            index: chunks.len(),
            span: Span::new(start, end),
            markers: section_markers(body),
            header,
            text,
        });

        if end == document.len() {
            break;
        }
        let next = ceil_boundary(document, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }
    chunks
}

/// Population types mentioned in `text`, in population order
pub fn section_markers(text: &str) -> Vec<PopulationType> {
    let Some(re) = SECTION_MARKER.as_ref() else {
        return Vec::new();
    };
    let mut found: Vec<PopulationType> = Vec::new();
    for caps in re.captures_iter(text) {
        let phrase = caps.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
        let ty = if phrase.starts_with("initial") {
            PopulationType::InitialPopulation
        } else if phrase.starts_with("denominator") {
            match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
                Some("exclusion") => PopulationType::DenominatorExclusion,
                Some("exception") => PopulationType::DenominatorException,
                _ => PopulationType::Denominator,
            }
        } else if caps.get(3).is_some() {
            PopulationType::NumeratorExclusion
        } else {
            PopulationType::Numerator
        };
        if !found.contains(&ty) {
            found.push(ty);
        }
    }
    found.sort();
    found
}

/// Best cut in `[lower, upper)`: paragraph, then line, then sentence end
fn break_point(document: &str, lower: usize, upper: usize) -> usize {
    let lower = ceil_boundary(document, lower.min(upper));
    let window = &document[lower..upper];
    let cut = window
        .rfind("\n\n")
        .map(|i| i + 2)
        .or_else(|| window.rfind('\n').map(|i| i + 1))
        .or_else(|| window.rfind(". ").map(|i| i + 2));
    match cut {
        Some(offset) if offset > 0 => lower + offset,
        _ => upper,
    }
}

fn heading_before(document: &str, position: usize) -> Option<String> {
    let re = HEADING.as_ref()?;
    document[..position]
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| re.is_match(line))
        .map(str::to_string)
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
