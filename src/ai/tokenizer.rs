//! Token Counting
//!
//! Token estimation for prompt budgets. Providers tokenize differently,
//! so counts are estimates; the code-aware estimator errs high on source
//! text.

use crate::config::BudgetUnit;

/// Token estimation method
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TokenEstimator {
    /// Simple character-based estimation (4 chars = 1 token)
    CharBased,
    /// Word-based estimation (0.75 tokens per word on average)
    WordBased,
    /// Code-aware estimation (accounts for syntax, keywords)
    #[default]
    CodeAware,
}

/// Token counter for context management
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter {
    estimator: TokenEstimator,
}

impl TokenCounter {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Estimate token count for a string
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.estimator {
            TokenEstimator::CharBased => text.chars().count().div_ceil(4),
            TokenEstimator::WordBased => {
                let word_count = text.split_whitespace().count();
                (word_count as f32 * 0.75).ceil() as usize + 1
            }
            TokenEstimator::CodeAware => self.count_code_aware(text),
        }
    }

    /// Code-aware counting
    /// - Punctuation and operators are individual tokens
    /// - Words cost by length
    fn count_code_aware(&self, text: &str) -> usize {
        let mut tokens = 0;
        let mut current_word = String::new();

        for ch in text.chars() {
            match ch {
                '(' | ')' | '{' | '}' | '[' | ']' | ';' | ':' | ',' | '.' | '+' | '-' | '*'
                | '/' | '=' | '<' | '>' | '!' | '&' | '|' | '@' | '#' | '$' | '%' | '^' | '~'
                | '?' | '\\' => {
                    if !current_word.is_empty() {
                        tokens += estimate_word_tokens(&current_word);
                        current_word.clear();
                    }
                    tokens += 1;
                }
                c if c.is_whitespace() => {
                    if !current_word.is_empty() {
                        tokens += estimate_word_tokens(&current_word);
                        current_word.clear();
                    }
                }
                _ => current_word.push(ch),
            }
        }

        if !current_word.is_empty() {
            tokens += estimate_word_tokens(&current_word);
        }

        tokens.max(1)
    }

    /// Check if content fits within token budget
    pub fn fits_budget(&self, text: &str, budget: usize) -> bool {
        self.count(text) <= budget
    }
}

/// Estimate tokens for a single word
fn estimate_word_tokens(word: &str) -> usize {
    let len = word.len();
    if len <= 4 {
        1
    } else if len <= 8 {
        2
    } else {
        len.div_ceil(4)
    }
}

/// Measures prompt text in the configured budget unit
#[derive(Debug, Clone, Copy)]
pub struct PromptMeasure {
    unit: BudgetUnit,
    counter: TokenCounter,
}

impl PromptMeasure {
    pub fn new(unit: BudgetUnit) -> Self {
        Self {
            unit,
            counter: TokenCounter::default(),
        }
    }

    pub fn unit(&self) -> BudgetUnit {
        self.unit
    }

    pub fn measure(&self, text: &str) -> usize {
        match self.unit {
            BudgetUnit::Chars => text.chars().count(),
            BudgetUnit::Tokens => self.counter.count(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_based_counting() {
        let counter = TokenCounter::new(TokenEstimator::CharBased);
        assert_eq!(counter.count("hello world!"), 3);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_code_aware_counts_punctuation() {
        let counter = TokenCounter::default();
        // int f ( ) { return(2) 1 ; }
        assert_eq!(counter.count("int f() { return 1; }"), 10);
    }

    #[test]
    fn test_long_identifiers_cost_more() {
        let counter = TokenCounter::default();
        assert!(counter.count("computeShortestPathTree") > counter.count("tree"));
    }

    #[test]
    fn test_fits_budget() {
        let counter = TokenCounter::new(TokenEstimator::CharBased);
        assert!(counter.fits_budget("abcd", 1));
        assert!(!counter.fits_budget("abcde", 1));
    }

    #[test]
    fn test_prompt_measure_units() {
        assert_eq!(PromptMeasure::new(BudgetUnit::Chars).measure("héllo"), 5);
        assert_eq!(PromptMeasure::new(BudgetUnit::Tokens).measure("a b c"), 3);
    }
}
