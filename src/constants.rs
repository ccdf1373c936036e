//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Source unit extraction constants
pub mod extraction {
    /// Body keywords that mark a unit as algorithmic
    pub const ALGORITHM_KEYWORDS: &[&str] = &[
        "sort",
        "search",
        "hash",
        "tree",
        "graph",
        "dynamic programming",
        "dp",
    ];

    /// Body keywords that mark a unit as mathematical
    pub const MATH_KEYWORDS: &[&str] = &["sqrt", "pow", "matrix", "vector", "eigen", "sin", "cos", "tan"];

    /// Identifiers followed by `(` that never name a function definition
    pub const NON_FUNCTION_KEYWORDS: &[&str] = &[
        "if",
        "for",
        "while",
        "switch",
        "catch",
        "return",
        "sizeof",
        "alignof",
        "decltype",
        "noexcept",
        "throw",
        "static_assert",
        "alignas",
        "__attribute__",
        "__declspec",
        "defined",
        "new",
        "delete",
    ];

    /// Characters of body text used in extraction dumps
    pub const BODY_PREVIEW_CHARS: usize = 500;
}

/// Paper corpus constants
pub mod corpus {
    /// Page separator emitted by pdftotext
    pub const PAGE_BREAK: char = '\u{000C}';

    /// Well-known paper section headings
    pub const SECTION_HEADINGS: &[&str] = &[
        "Abstract",
        "Introduction",
        "Background",
        "Related Work",
        "Methods",
        "Methodology",
        "Results",
        "Evaluation",
        "Discussion",
        "Conclusion",
        "Conclusions",
        "References",
    ];

    /// Longest line still considered a heading
    pub const MAX_HEADING_CHARS: usize = 80;

    /// Longest line still recorded as a numbered equation
    pub const MAX_FORMULA_CHARS: usize = 240;

    /// Hashing embedder: characters per n-gram feature
    pub const HASH_NGRAM: usize = 3;
}

/// Lexical scoring constants (Okapi BM25)
pub mod bm25 {
    /// Term frequency saturation
    pub const K1: f32 = 1.2;

    /// Length normalization
    pub const B: f32 = 0.75;

    /// Tokens shorter than this are ignored
    pub const MIN_TOKEN_CHARS: usize = 2;

    /// Words carrying no retrieval signal
    pub const STOPWORDS: &[&str] = &[
        "the", "and", "for", "with", "that", "this", "are", "was", "from", "into", "not", "but",
        "its", "our", "can", "has", "have", "been", "which", "their", "these", "those", "then",
        "than", "also", "such", "via", "per", "all", "any", "each", "other", "const", "void",
        "int", "auto", "return", "std", "static", "inline", "unsigned", "size_t", "bool",
        "true", "false", "nullptr", "template", "typename",
    ];
}

/// Prompt composition constants
pub mod prompt {
    /// Built-in template version recorded in prompt metadata
    pub const BUILTIN_TEMPLATE_VERSION: &str = "builtin-1";

    /// Default system prompt for chat-style backends
    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a C++ documentation expert. You write precise, \
        technical documentation and explain the algorithms and mathematics behind the code.";

    /// Prompt asking for a short semantic description used as a retrieval query
    pub const DESCRIBE_PROMPT: &str = "Describe what the following C++ function does in one or two \
        sentences, naming the algorithm or mathematical technique it implements. Reply with the \
        description only.\n\nFunction: {{qualified_name}}\nSignature: {{signature}}\n\n{{code}}";

    /// Prompt asking whether retrieved context is relevant to a unit
    pub const RELEVANCE_PROMPT: &str = "Given a C++ function and excerpts from academic papers, \
        answer RELEVANT if the excerpts describe the algorithm or mathematics the function \
        implements, otherwise answer NOT_RELEVANT. Reply with one word.\n\nFunction: \
        {{qualified_name}}\nSignature: {{signature}}\n\n{{code}}\n\nExcerpts:\n{{context}}";

    /// Marker the relevance gate looks for
    pub const NOT_RELEVANT_MARKER: &str = "NOT_RELEVANT";

    /// Output tokens requested for auxiliary calls (describe, relevance gate)
    pub const AUX_MAX_OUTPUT_TOKENS: u32 = 200;
}

/// Gateway retry constants
pub mod gateway {
    /// Jitter ceiling as a fraction of the base delay
    pub const JITTER_FRACTION: u64 = 4;

    /// Upper bound for a provider-advertised Retry-After (seconds)
    pub const MAX_RETRY_AFTER_SECS: u64 = 300;
}

/// Artifact output constants
pub mod output {
    /// Subdirectory of the output root holding unit artifacts
    pub const FUNCTIONS_DIR: &str = "functions";

    /// Hex characters of the identity hash appended to artifact names
    pub const IDENTITY_HASH_HEX: usize = 12;

    /// Longest sanitized name component before truncation
    pub const MAX_NAME_CHARS: usize = 120;
}

/// HTTP/Network constants
pub mod network {
    /// Default local inference endpoint
    pub const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434";

    /// Default OpenAI-compatible endpoint
    pub const OPENAI_DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

    /// Default Gemini endpoint
    pub const GEMINI_DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

    /// Health check timeout (seconds)
    pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;
}
