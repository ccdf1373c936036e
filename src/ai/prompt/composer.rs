//! Prompt Composer
//!
//! Turns a unit plus its retrieved chunks into one bounded prompt.
//! The unit's signature and body are never truncated; retrieved chunks
//! are dropped lowest-score first until the prompt fits the budget.

use serde::Serialize;
use tracing::debug;

use super::template::{PromptTemplate, render};
use crate::ai::tokenizer::PromptMeasure;
use crate::config::{BudgetUnit, PromptConfig};
use crate::corpus::Passages;
use crate::constants::prompt::{DESCRIBE_PROMPT, RELEVANCE_PROMPT};
use crate::retrieval::{RetrievalResult, ScoredChunk};
use crate::types::{ChunkId, IndexId, PaperdocError, Result, SourceUnit, UnitId};

/// Bounded prompt text plus the metadata needed to trace it
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub text: String,
    pub unit: UnitId,
    /// Chunks interpolated into `text`, highest score first
    pub chunks: Vec<ChunkId>,
    /// Index the chunks came from
    pub index: IndexId,
    pub template_version: String,
}

impl Prompt {
    pub fn is_grounded(&self) -> bool {
        !self.chunks.is_empty()
    }
}

/// Composes prompts under a fixed budget
#[derive(Debug, Clone)]
pub struct Composer {
    template: PromptTemplate,
    budget: usize,
    measure: PromptMeasure,
}

impl Composer {
    pub fn new(template: PromptTemplate, budget: usize, unit: BudgetUnit) -> Self {
        Self {
            template,
            budget,
            measure: PromptMeasure::new(unit),
        }
    }

    pub fn from_config(config: &PromptConfig) -> Result<Self> {
        Ok(Self::new(
            PromptTemplate::from_config(config)?,
            config.budget,
            config.budget_unit,
        ))
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Compose the documentation prompt for `unit`.
    ///
    /// Returns `UnitTooLarge` when even the ungrounded prompt exceeds the
    /// budget.
    pub fn compose(&self, unit: &SourceUnit, retrieval: &RetrievalResult) -> Result<Prompt> {
        let fields = UnitFields::new(unit);

        let ungrounded = render(self.template.ungrounded(), &fields.vars(""));
        let base_size = self.measure.measure(&ungrounded);
        if base_size > self.budget {
            return Err(PaperdocError::UnitTooLarge {
                unit: unit.id.to_string(),
                size: base_size,
                budget: self.budget,
                unit_of_measure: self.measure.unit().as_str(),
            });
        }

        let mut kept: Vec<&ScoredChunk> = retrieval.hits.iter().collect();
        while !kept.is_empty() {
            let text = render(self.template.grounded(), &fields.vars(&format_context(&kept)));
            if self.measure.measure(&text) <= self.budget {
                debug!(
                    unit = %unit.id,
                    chunks = kept.len(),
                    dropped = retrieval.len() - kept.len(),
                    "Composed grounded prompt"
                );
                return Ok(Prompt {
                    text,
                    unit: unit.id.clone(),
                    chunks: kept.iter().map(|h| h.chunk.id.clone()).collect(),
                    index: retrieval.index,
                    template_version: self.template.version().to_string(),
                });
            }
            kept.pop();
        }

        debug!(unit = %unit.id, dropped = retrieval.len(), "Composed ungrounded prompt");
        Ok(Prompt {
            text: ungrounded,
            unit: unit.id.clone(),
            chunks: Vec::new(),
            index: retrieval.index,
            template_version: self.template.version().to_string(),
        })
    }

    /// Prompt asking for a short description used as a retrieval query
    pub fn describe_prompt(&self, unit: &SourceUnit) -> String {
        render(DESCRIBE_PROMPT, &UnitFields::new(unit).vars(""))
    }

    /// Prompt asking whether retrieved chunks are relevant to `unit`
    pub fn relevance_prompt(&self, unit: &SourceUnit, retrieval: &RetrievalResult) -> String {
        let hits: Vec<&ScoredChunk> = retrieval.hits.iter().collect();
        render(
            RELEVANCE_PROMPT,
            &UnitFields::new(unit).vars(&format_context(&hits)),
        )
    }
}

/// Owned renderings of unit fields for interpolation
struct UnitFields {
    qualified_name: String,
    name: String,
    file: String,
    lines: String,
    signature: String,
    return_type: String,
    parameters: String,
    hints: String,
    doc_comment: String,
    code: String,
}

impl UnitFields {
    fn new(unit: &SourceUnit) -> Self {
        let hints = unit.hints();
        Self {
            qualified_name: unit.qualified_name().to_string(),
            name: unit.name.clone(),
            file: unit.file().to_string(),
            lines: format!("{}-{}", unit.id.start_line, unit.id.end_line),
            signature: unit.signature.clone(),
            return_type: unit.return_type.clone().unwrap_or_else(|| "void".to_string()),
            parameters: unit.parameter_list(),
            hints: if hints.is_empty() { "none".to_string() } else { hints },
            doc_comment: unit.doc_comment.clone().unwrap_or_else(|| "none".to_string()),
            code: unit.code(),
        }
    }

    fn vars<'a>(&'a self, context: &'a str) -> [(&'static str, &'a str); 11] {
        [
            ("qualified_name", self.qualified_name.as_str()),
            ("name", self.name.as_str()),
            ("file", self.file.as_str()),
            ("lines", self.lines.as_str()),
            ("signature", self.signature.as_str()),
            ("return_type", self.return_type.as_str()),
            ("parameters", self.parameters.as_str()),
            ("hints", self.hints.as_str()),
            ("doc_comment", self.doc_comment.as_str()),
            ("code", self.code.as_str()),
            ("context", context),
        ]
    }
}

/// Numbered excerpts with their paper, section, and page
fn format_context(hits: &[&ScoredChunk]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let chunk = &hit.chunk;
            let section = chunk
                .section
                .as_deref()
                .map(|s| format!(", {}", s))
                .unwrap_or_default();
            format!(
                "[{}] {}{}, p. {}{}\n{}",
                i + 1,
                chunk.id.paper_id,
                section,
                chunk.page,
                passage_note(&chunk.passages),
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// ` (contains Algorithm 1; 2 numbered equations)`, or nothing
fn passage_note(passages: &Passages) -> String {
    if passages.is_empty() {
        return String::new();
    }
    let mut parts = passages.algorithms.clone();
    match passages.formulas.len() {
        0 => {}
        1 => parts.push("1 numbered equation".to_string()),
        n => parts.push(format!("{} numbered equations", n)),
    }
    format!(" (contains {})", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::PaperChunk;
    use crate::types::unit::fixtures;

    fn hit(paper: &str, index: usize, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: PaperChunk {
                id: ChunkId::new(paper, index),
                text: text.to_string(),
                section: Some("Methods".to_string()),
                page: 3,
                sha256: String::new(),
                passages: Passages::default(),
            },
            score,
        }
    }

    fn retrieval(hits: Vec<ScoredChunk>) -> RetrievalResult {
        RetrievalResult {
            index: IndexId::new(),
            hits,
        }
    }

    fn composer(budget: usize) -> Composer {
        Composer::new(PromptTemplate::builtin(), budget, BudgetUnit::Chars)
    }

    #[test]
    fn test_empty_retrieval_is_ungrounded() {
        let unit = fixtures::unit("a.cpp", "geo::area", "{ return w * h; }");
        let result = retrieval(Vec::new());
        let prompt = composer(10_000).compose(&unit, &result).unwrap();

        assert!(!prompt.is_grounded());
        assert_eq!(prompt.index, result.index);
        assert!(prompt.text.contains("return w * h"));
        assert!(!prompt.text.contains("Relevant Academic Paper Context"));
        assert_eq!(prompt.template_version, PromptTemplate::builtin().version());
    }

    #[test]
    fn test_grounded_prompt_lists_chunks() {
        let unit = fixtures::unit("a.cpp", "geo::area", "{ return w * h; }");
        let prompt = composer(10_000)
            .compose(
                &unit,
                &retrieval(vec![hit("shoelace", 0, "The shoelace formula.", 0.9)]),
            )
            .unwrap();

        assert_eq!(prompt.chunks, vec![ChunkId::new("shoelace", 0)]);
        assert!(prompt.text.contains("[1] shoelace, Methods, p. 3"));
        assert!(prompt.text.contains("The shoelace formula."));
    }

    #[test]
    fn test_context_notes_algorithm_and_equation_passages() {
        let unit = fixtures::unit("a.cpp", "geo::area", "{ return w * h; }");
        let mut tagged = hit("shoelace", 0, "Algorithm 1: Shoelace", 0.9);
        tagged.chunk.passages = Passages {
            algorithms: vec!["Algorithm 1".to_string()],
            formulas: vec!["A = 1/2 |x y' - x' y| (1)".to_string(), "B = A (2)".to_string()],
        };
        let prompt = composer(10_000)
            .compose(&unit, &retrieval(vec![tagged, hit("plain", 0, "Prose.", 0.5)]))
            .unwrap();

        assert!(prompt.text.contains(
            "[1] shoelace, Methods, p. 3 (contains Algorithm 1; 2 numbered equations)"
        ));
        assert!(prompt.text.contains("[2] plain, Methods, p. 3\n"));
    }

    #[test]
    fn test_drops_lowest_score_first() {
        let unit = fixtures::unit("a.cpp", "f", "{ return 1; }");
        let big = "x".repeat(400);
        let result = retrieval(vec![
            hit("high", 0, &big, 0.9),
            hit("mid", 0, &big, 0.5),
            hit("low", 0, &big, 0.1),
        ]);
        let base = composer(usize::MAX)
            .compose(&unit, &retrieval(Vec::new()))
            .unwrap()
            .text
            .chars()
            .count();
        let composer = composer(base + 1200);

        let prompt = composer.compose(&unit, &result).unwrap();
        assert_eq!(
            prompt.chunks,
            vec![ChunkId::new("high", 0), ChunkId::new("mid", 0)]
        );
        assert!(prompt.text.chars().count() <= composer.budget());
    }

    #[test]
    fn test_falls_back_to_ungrounded_when_no_chunk_fits() {
        let unit = fixtures::unit("a.cpp", "f", "{ return 1; }");
        let base = composer(usize::MAX)
            .compose(&unit, &retrieval(Vec::new()))
            .unwrap()
            .text
            .chars()
            .count();
        let prompt = composer(base)
            .compose(&unit, &retrieval(vec![hit("p", 0, &"y".repeat(500), 1.0)]))
            .unwrap();
        assert!(!prompt.is_grounded());
    }

    #[test]
    fn test_body_over_budget_is_unit_too_large() {
        let body = format!("{{ {} }}", "int x = 0; ".repeat(100));
        let unit = fixtures::unit("a.cpp", "huge", &body);
        let err = composer(200)
            .compose(&unit, &retrieval(Vec::new()))
            .unwrap_err();

        match err {
            PaperdocError::UnitTooLarge {
                budget,
                unit_of_measure,
                size,
                ..
            } => {
                assert_eq!(budget, 200);
                assert_eq!(unit_of_measure, "chars");
                assert!(size > 200);
            }
            other => panic!("expected UnitTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_code_never_truncated() {
        let body = format!("{{ {} }}", "step(); ".repeat(50));
        let unit = fixtures::unit("a.cpp", "f", &body);
        let prompt = composer(50_000)
            .compose(&unit, &retrieval(vec![hit("p", 0, "text", 1.0)]))
            .unwrap();
        assert!(prompt.text.contains(&unit.code()));
    }

    #[test]
    fn test_token_budget() {
        let unit = fixtures::unit("a.cpp", "f", "{ return 1; }");
        let composer = Composer::new(PromptTemplate::builtin(), 20, BudgetUnit::Tokens);
        let err = composer.compose(&unit, &retrieval(Vec::new())).unwrap_err();
        assert!(matches!(
            err,
            PaperdocError::UnitTooLarge {
                unit_of_measure: "tokens",
                ..
            }
        ));
    }

    #[test]
    fn test_aux_prompts() {
        let unit = fixtures::unit("a.cpp", "geo::area", "{ return w * h; }");
        let composer = composer(10_000);
        assert!(composer.describe_prompt(&unit).contains("geo::area"));

        let relevance =
            composer.relevance_prompt(&unit, &retrieval(vec![hit("p", 0, "Polygon area.", 1.0)]));
        assert!(relevance.contains("Polygon area."));
        assert!(relevance.contains("NOT_RELEVANT"));
    }
}
