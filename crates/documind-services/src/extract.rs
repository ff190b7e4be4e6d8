//! Text reconstruction from an analysis result.
//!
//! Pure function, no I/O. Tiers are tried in order and the first one that
//! yields non-empty text wins: the flat text field, the layout block tree,
//! paragraph offsets into the text buffer, token offsets into the text
//! buffer, and finally an empty string. Empty text is a valid degraded
//! outcome.

use documind_core::models::{ExtractedContent, ExtractionTier};

use crate::ocr::{AnalysisResult, LayoutBlock, TextAnchor};

/// Resolve one anchor against the shared text buffer. Segment offsets are
/// tried first; an inline content field stands in when no offset resolves
/// (some responses carry one or the other). Missing, unparsable, inverted,
/// or out-of-range offsets are skipped; partial OCR results are expected
/// occasionally.
fn resolve_anchor(anchor: &TextAnchor, text: &str) -> String {
    let mut resolved = String::new();
    for segment in &anchor.text_segments {
        // Absent start means zero; absent end means an empty segment.
        let start = match &segment.start_index {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => n,
                Err(_) => continue,
            },
            None => 0,
        };
        let end = match &segment.end_index {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => n,
                Err(_) => continue,
            },
            None => continue,
        };
        if start >= end || end > text.len() {
            continue;
        }
        if let Some(slice) = text.get(start..end) {
            resolved.push_str(slice);
        }
    }
    if resolved.is_empty() {
        if let Some(content) = &anchor.content {
            resolved.push_str(content);
        }
    }
    resolved
}

fn collect_blocks(blocks: &[LayoutBlock], out: &mut Vec<String>) {
    for block in blocks {
        if let Some(text_block) = &block.text_block {
            if let Some(text) = &text_block.text {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
            collect_blocks(&text_block.blocks, out);
        }
    }
}

pub fn extract_content(result: &AnalysisResult) -> ExtractedContent {
    let document = &result.document;
    let pages = document.pages.len();
    let entities = document.entities.len();
    let buffer = document.text.as_deref().unwrap_or("");

    // Tier 1: the service already flattened the text.
    if !buffer.trim().is_empty() {
        return ExtractedContent {
            text: buffer.to_string(),
            pages,
            entities,
            tier: ExtractionTier::Direct,
        };
    }

    // Tier 2: layout-aware responses carry a block tree instead of a text
    // buffer.
    if let Some(layout) = &document.document_layout {
        let mut parts = Vec::new();
        collect_blocks(&layout.blocks, &mut parts);
        if !parts.is_empty() {
            return ExtractedContent {
                text: parts.join("\n"),
                pages,
                entities,
                tier: ExtractionTier::Layout,
            };
        }
    }

    // Tiers 3 and 4 resolve offsets into the text buffer, which some
    // responses populate even when the flat field is empty.
    let mut paragraphs = Vec::new();
    for page in &document.pages {
        for paragraph in &page.paragraphs {
            let text = resolve_anchor(&paragraph.layout.text_anchor, buffer);
            if !text.trim().is_empty() {
                paragraphs.push(text.trim().to_string());
            }
        }
    }
    if !paragraphs.is_empty() {
        return ExtractedContent {
            text: paragraphs.join("\n"),
            pages,
            entities,
            tier: ExtractionTier::Paragraph,
        };
    }

    let mut tokens = Vec::new();
    for page in &document.pages {
        for token in &page.tokens {
            let text = resolve_anchor(&token.layout.text_anchor, buffer);
            if !text.trim().is_empty() {
                tokens.push(text.trim().to_string());
            }
        }
    }
    if !tokens.is_empty() {
        return ExtractedContent {
            text: tokens.join(" "),
            pages,
            entities,
            tier: ExtractionTier::Token,
        };
    }

    tracing::warn!(pages = pages, "No text recovered from analysis result");
    ExtractedContent {
        text: String::new(),
        pages,
        entities,
        tier: ExtractionTier::None,
    }
}
