//! Paper chunking.
//!
//! Splits one plain-text paper into [`PaperChunk`]s. Two strategies:
//!
//! - **fixed**: windows of `chunk_size` characters advancing by
//!   `chunk_size - chunk_overlap`; a window end is pulled back to the last
//!   whitespace in its final quarter so words are not cut, and the next
//!   window start is pushed forward to a word start.
//! - **paragraph**: blank-line separated paragraphs are packed into chunks
//!   up to `chunk_size`; a paragraph larger than that is split with the
//!   fixed strategy. When the last packed paragraph fits in the overlap
//!   it is repeated at the head of the next chunk.
//!
//! Every non-whitespace character of the paper lands in at least one
//! chunk. Each chunk records the section heading in force, the
//! form-feed page on which it starts, and the algorithm blocks and
//! numbered equations it contains.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::{PaperChunk, Passages};
use crate::config::{ChunkingStrategy, CorpusConfig};
use crate::constants::corpus::{MAX_FORMULA_CHARS, MAX_HEADING_CHARS, PAGE_BREAK, SECTION_HEADINGS};
use crate::types::ChunkId;

/// "1.", "2.3", "IV." style heading numbering
static NUMBERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)*|[IVX]+)\.?\s+").expect("numbering pattern is valid")
});

/// "3 Proposed Method", "4.1 Complexity Analysis"
static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(?:\.\d+)*\.?\s+[A-Z][A-Za-z0-9 ,:&()/-]{2,}$")
        .expect("numbered heading pattern is valid")
});

/// "Algorithm 2:", "Procedure 1 :", "Pseudocode 3:"
static ALGORITHM_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(algorithm|procedure|pseudocode)\s+(\d+)\s*:")
        .expect("algorithm block pattern is valid")
});

/// "(Eq. 4)" anywhere, or a bare "(3)" closing the line
static EQUATION_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\s*eq\.?\s*\d+\s*\)|\(\d+\)\s*$")
        .expect("equation number pattern is valid")
});

#[derive(Debug, Clone)]
pub struct Chunker {
    strategy: ChunkingStrategy,
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// `size` is clamped to at least 1 and `overlap` to below `size`.
    pub fn new(strategy: ChunkingStrategy, size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            strategy,
            size,
            overlap: overlap.min(size - 1),
        }
    }

    pub fn from_config(config: &CorpusConfig) -> Self {
        Self::new(config.chunking, config.chunk_size, config.chunk_overlap)
    }

    /// Chunk one paper. Indices are contiguous from 0; whitespace-only
    /// text yields no chunks.
    pub fn chunk(&self, paper_id: &str, text: &str) -> Vec<PaperChunk> {
        let spans = match self.strategy {
            ChunkingStrategy::Fixed => fixed_spans(text, 0, text.len(), self.size, self.overlap),
            ChunkingStrategy::Paragraph => self.paragraph_spans(text),
        };

        let layout = Layout::scan(text);
        spans
            .into_iter()
            .filter_map(|(start, end)| {
                let content = text[start..end].replace(PAGE_BREAK, "\n");
                let content = content.trim();
                (!content.is_empty()).then(|| (start, content.to_string()))
            })
            .enumerate()
            .map(|(index, (start, content))| PaperChunk {
                id: ChunkId::new(paper_id, index),
                sha256: sha256_hex(&content),
                section: layout.section_at(start).map(str::to_string),
                page: layout.page_at(start),
                passages: find_passages(&content),
                text: content,
            })
            .collect()
    }

    fn paragraph_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut current: Option<(usize, usize)> = None;
        let mut last_para: Option<(usize, usize)> = None;
        let mut paras_in_current = 0usize;

        for (p_start, p_end) in paragraphs(text) {
            let para_len = char_len(text, p_start, p_end);

            if para_len > self.size {
                if let Some(span) = current.take() {
                    spans.push(span);
                }
                spans.extend(fixed_spans(text, p_start, p_end, self.size, self.overlap));
                last_para = None;
                paras_in_current = 0;
                continue;
            }

            match current {
                Some((c_start, _)) if char_len(text, c_start, p_end) <= self.size => {
                    current = Some((c_start, p_end));
                    paras_in_current += 1;
                }
                Some(span) => {
                    spans.push(span);
                    // Carry the previous paragraph as overlap when it fits
                    current = match last_para {
                        Some((l_start, l_end))
                            if paras_in_current > 1
                                && char_len(text, l_start, l_end) <= self.overlap
                                && char_len(text, l_start, p_end) <= self.size =>
                        {
                            paras_in_current = 2;
                            Some((l_start, p_end))
                        }
                        _ => {
                            paras_in_current = 1;
                            Some((p_start, p_end))
                        }
                    };
                }
                None => {
                    current = Some((p_start, p_end));
                    paras_in_current = 1;
                }
            }
            last_para = Some((p_start, p_end));
        }

        if let Some(span) = current {
            spans.push(span);
        }
        spans
    }
}

/// Byte spans of fixed-size character windows over `text[from..to]`
fn fixed_spans(
    text: &str,
    from: usize,
    to: usize,
    size: usize,
    overlap: usize,
) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = text[from..to]
        .char_indices()
        .map(|(i, c)| (from + i, c))
        .collect();
    let n = chars.len();
    let byte_at = |i: usize| if i < n { chars[i].0 } else { to };

    let mut spans = Vec::new();
    let mut start = 0usize;

    loop {
        while start < n && chars[start].1.is_whitespace() {
            start += 1;
        }
        if start >= n {
            break;
        }

        let mut end = (start + size).min(n);
        if end < n {
            let floor = start + size * 3 / 4;
            if let Some(ws) = (floor.max(start + 1)..end)
                .rev()
                .find(|&i| chars[i].1.is_whitespace())
            {
                end = ws;
            }
        }
        spans.push((byte_at(start), byte_at(end)));
        if end >= n {
            break;
        }

        let mut next = end.saturating_sub(overlap).max(start + 1);
        if next < end
            && !chars[next - 1].1.is_whitespace()
            && let Some(ws) = (next..end).find(|&i| chars[i].1.is_whitespace())
        {
            next = ws;
        }
        start = next;
    }
    spans
}

/// Byte spans of blank-line separated paragraphs
fn paragraphs(text: &str) -> Vec<(usize, usize)> {
    let mut paras = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if line.trim().is_empty() {
            if let Some(span) = current.take() {
                paras.push(span);
            }
            continue;
        }
        let line_end = line_start + line.trim_end().len();
        let content_start = line_start + (line.len() - line.trim_start().len());
        current = match current {
            Some((s, _)) => Some((s, line_end)),
            None => Some((content_start, line_end)),
        };
    }
    if let Some(span) = current {
        paras.push(span);
    }
    paras
}

fn char_len(text: &str, start: usize, end: usize) -> usize {
    text[start..end].chars().count()
}

pub(crate) fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Section headings and page breaks of one paper, by byte offset
struct Layout {
    sections: Vec<(usize, String)>,
    page_breaks: Vec<usize>,
}

impl Layout {
    fn scan(text: &str) -> Self {
        let page_breaks = text
            .char_indices()
            .filter(|&(_, c)| c == PAGE_BREAK)
            .map(|(i, _)| i)
            .collect();

        let mut sections = Vec::new();
        let mut offset = 0usize;
        for line in text.split_inclusive('\n') {
            if let Some(heading) = heading_of(line) {
                sections.push((offset, heading));
            }
            offset += line.len();
        }

        Self {
            sections,
            page_breaks,
        }
    }

    fn section_at(&self, pos: usize) -> Option<&str> {
        let idx = self.sections.partition_point(|(offset, _)| *offset <= pos);
        idx.checked_sub(1).map(|i| self.sections[i].1.as_str())
    }

    /// 1-based page
    fn page_at(&self, pos: usize) -> usize {
        1 + self.page_breaks.partition_point(|&b| b < pos)
    }
}

/// Algorithm labels and equation-numbered lines, first occurrence order
pub fn find_passages(text: &str) -> Passages {
    let mut passages = Passages::default();
    for caps in ALGORITHM_BLOCK.captures_iter(text) {
        let label = format!("{} {}", &caps[1], &caps[2]);
        if !passages.algorithms.iter().any(|a| a.eq_ignore_ascii_case(&label)) {
            passages.algorithms.push(label);
        }
    }
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty()
            && line.chars().count() <= MAX_FORMULA_CHARS
            && EQUATION_NUMBER.is_match(&line)
            && !passages.formulas.contains(&line)
        {
            passages.formulas.push(line);
        }
    }
    passages
}

/// Heading named by a line, if the line is one
fn heading_of(line: &str) -> Option<String> {
    let trimmed = line.trim_matches(|c: char| c.is_whitespace() || c == PAGE_BREAK);
    if trimmed.is_empty() || trimmed.chars().count() > MAX_HEADING_CHARS {
        return None;
    }

    let unnumbered = NUMBERING.replace(trimmed, "");
    let bare = unnumbered.trim_end_matches(':').trim();
    if let Some(known) = SECTION_HEADINGS
        .iter()
        .find(|h| h.eq_ignore_ascii_case(bare))
    {
        return Some((*known).to_string());
    }

    (NUMBERED_HEADING.is_match(trimmed) && !trimmed.ends_with('.')).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PAPER: &str = "Abstract\nWe study sorting.\n\n1. Introduction\nSorting is old.\n\n\u{000C}2 Proposed Method\nWe merge runs.\n\nReferences\n[1] Knuth.";

    #[test]
    fn test_fixed_chunks_respect_size_and_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = Chunker::new(ChunkingStrategy::Fixed, 20, 6).chunk("p", text);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id.index, i);
            assert!(chunk.text.chars().count() <= 20, "{:?}", chunk.text);
        }
        assert!(chunks[0].text.starts_with("alpha"));
        assert!(chunks.last().unwrap().text.ends_with("kappa"));
    }

    #[test]
    fn test_fixed_windows_overlap() {
        let text = "aaaa bbbb cccc dddd eeee ffff gggg";
        let chunks = Chunker::new(ChunkingStrategy::Fixed, 15, 5).chunk("p", text);
        assert_eq!(chunks[0].text, "aaaa bbbb cccc");
        assert_eq!(chunks[1].text, "cccc dddd eeee");
    }

    #[test]
    fn test_paragraph_chunks_pack_paragraphs() {
        let text = "First para.\n\nSecond para.\n\nThird paragraph is longer.";
        let chunks = Chunker::new(ChunkingStrategy::Paragraph, 30, 0).chunk("p", text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "First para.\n\nSecond para.");
        assert_eq!(chunks[1].text, "Third paragraph is longer.");
    }

    #[test]
    fn test_paragraph_overlap_repeats_last_paragraph() {
        let text = "One.\n\nTwo.\n\nThree.";
        let chunks = Chunker::new(ChunkingStrategy::Paragraph, 14, 5).chunk("p", text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "One.\n\nTwo.");
        assert_eq!(chunks[1].text, "Two.\n\nThree.");
    }

    #[test]
    fn test_oversized_paragraph_is_split() {
        let text = "word ".repeat(30);
        let chunks = Chunker::new(ChunkingStrategy::Paragraph, 25, 0).chunk("p", &text);
        assert!(chunks.len() >= 6);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 25));
    }

    #[test]
    fn test_sections_and_pages() {
        let chunks = Chunker::new(ChunkingStrategy::Paragraph, 40, 0).chunk("smith2020", PAPER);

        let meta: Vec<_> = chunks
            .iter()
            .map(|c| (c.section.as_deref(), c.page))
            .collect();
        assert_eq!(
            meta,
            vec![
                (Some("Abstract"), 1),
                (Some("Introduction"), 1),
                (Some("2 Proposed Method"), 2),
                (Some("References"), 2),
            ]
        );
        assert!(!chunks[2].text.contains('\u{000C}'));
    }

    #[test]
    fn test_heading_detection() {
        assert_eq!(heading_of("Introduction\n").as_deref(), Some("Introduction"));
        assert_eq!(heading_of("3. RESULTS").as_deref(), Some("Results"));
        assert_eq!(heading_of("IV. Discussion:").as_deref(), Some("Discussion"));
        assert_eq!(
            heading_of("4.1 Complexity Analysis").as_deref(),
            Some("4.1 Complexity Analysis")
        );
        assert_eq!(heading_of("We introduce a method."), None);
        assert_eq!(heading_of("3 sorted values were kept."), None);
    }

    #[test]
    fn test_passages_tag_algorithms_and_equations() {
        let text = "Methods\n\
                    Algorithm 1: Shoelace area\n\
                    A = 1/2 |sum (x_i y_{i+1} - x_{i+1} y_i)|   (3)\n\
                    The bound follows from (Eq. 4) and the triangle inequality.\n\
                    see ALGORITHM 1: again\n\
                    Dijkstra [12] showed the greedy choice is safe.\n";
        let chunks = Chunker::new(ChunkingStrategy::Fixed, 1000, 0).chunk("p", text);
        assert_eq!(chunks.len(), 1);

        let passages = &chunks[0].passages;
        assert_eq!(passages.algorithms, vec!["Algorithm 1"]);
        assert_eq!(passages.formulas.len(), 2);
        assert!(passages.formulas[0].ends_with("(3)"));
        assert!(passages.formulas[1].contains("(Eq. 4)"));
    }

    #[test]
    fn test_plain_prose_has_no_passages() {
        let passages = find_passages("We sort the input (in place) and report the median.");
        assert!(passages.is_empty());
    }

    #[test]
    fn test_empty_and_blank_text() {
        let chunker = Chunker::new(ChunkingStrategy::Fixed, 10, 2);
        assert!(chunker.chunk("p", "").is_empty());
        assert!(chunker.chunk("p", " \n\n\u{000C} ").is_empty());
    }

    #[test]
    fn test_chunk_hash_matches_text() {
        let chunks = Chunker::new(ChunkingStrategy::Fixed, 100, 0).chunk("p", "hello");
        assert_eq!(chunks[0].sha256, sha256_hex("hello"));
    }

    proptest! {
        #[test]
        fn prop_fixed_chunks_cover_all_text(
            text in "[a-z \n]{0,300}",
            size in 4usize..60,
            overlap_pct in 0usize..90,
        ) {
            let overlap = size * overlap_pct / 100;
            let spans = fixed_spans(&text, 0, text.len(), size, overlap.min(size - 1));

            for (i, c) in text.char_indices() {
                if !c.is_whitespace() {
                    prop_assert!(spans.iter().any(|&(s, e)| s <= i && i < e));
                }
            }
            for &(s, e) in &spans {
                prop_assert!(text[s..e].chars().count() <= size);
            }
        }

        #[test]
        fn prop_paragraph_chunks_cover_all_text(
            paras in proptest::collection::vec("[a-z ]{1,40}", 0..12),
            size in 8usize..80,
        ) {
            let text = paras.join("\n\n");
            let chunker = Chunker::new(ChunkingStrategy::Paragraph, size, size / 3);
            let spans = chunker.paragraph_spans(&text);

            for (i, c) in text.char_indices() {
                if !c.is_whitespace() {
                    prop_assert!(spans.iter().any(|&(s, e)| s <= i && i < e));
                }
            }
            for &(s, e) in &spans {
                prop_assert!(text[s..e].chars().count() <= size);
            }
        }
    }
}
