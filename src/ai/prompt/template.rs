//! Prompt Templates
//!
//! Grounded and ungrounded documentation templates with `{{placeholder}}`
//! interpolation. Interpolation is a single left-to-right pass: values are
//! inserted verbatim and never re-scanned, so code containing `{{` is safe.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::config::PromptConfig;
use crate::constants::prompt::BUILTIN_TEMPLATE_VERSION;
use crate::types::{PaperdocError, Result};

/// Placeholders a template may reference
pub const PLACEHOLDERS: &[&str] = &[
    "qualified_name",
    "name",
    "file",
    "lines",
    "signature",
    "return_type",
    "parameters",
    "hints",
    "doc_comment",
    "code",
    "context",
];

const GROUNDED: &str = r#"Generate professional markdown documentation for the following C++ function.
The documentation should bridge the gap between the code implementation and the concepts from the provided academic paper context.

**Function Details:**
- **Name:** `{{qualified_name}}`
- **Location:** `{{file}}` lines {{lines}}
- **Parameters:** `{{parameters}}`
- **Return Type:** `{{return_type}}`
- **Hints:** {{hints}}

**Existing Comment:**
{{doc_comment}}

**Function Source:**
```cpp
{{code}}
```

**Relevant Academic Paper Context:**
---
{{context}}
---

**Documentation Requirements:**
1. **Purpose:** A clear, concise description of what the function does.
2. **Algorithm:** Describe the algorithm used, linking it to the paper's concepts.
3. **Parameters:** List and explain each parameter.
4. **Academic Foundation:** Explicitly cite how the implementation relates to the paper, referring to excerpts by their [n] labels.

**Output Format (Markdown):**
"#;

const UNGROUNDED: &str = r#"Generate professional markdown documentation for the following C++ function.
Focus on the code implementation and algorithmic concepts.

**Function Details:**
- **Name:** `{{qualified_name}}`
- **Location:** `{{file}}` lines {{lines}}
- **Parameters:** `{{parameters}}`
- **Return Type:** `{{return_type}}`
- **Hints:** {{hints}}

**Existing Comment:**
{{doc_comment}}

**Function Source:**
```cpp
{{code}}
```

**Documentation Requirements:**
1. **Purpose:** A clear, concise description of what the function does.
2. **Algorithm:** Describe the algorithm used.
3. **Parameters:** List and explain each parameter.
4. **Implementation Notes:** Key implementation details and considerations.

**Output Format (Markdown):**
"#;

/// Grounded/ungrounded template pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    version: String,
    grounded: String,
    ungrounded: String,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    version: String,
    grounded: String,
    ungrounded: String,
}

impl PromptTemplate {
    pub fn builtin() -> Self {
        Self {
            version: BUILTIN_TEMPLATE_VERSION.to_string(),
            grounded: GROUNDED.to_string(),
            ungrounded: UNGROUNDED.to_string(),
        }
    }

    /// Validate and build a template pair
    pub fn new(
        version: impl Into<String>,
        grounded: impl Into<String>,
        ungrounded: impl Into<String>,
    ) -> Result<Self> {
        let template = Self {
            version: version.into(),
            grounded: grounded.into(),
            ungrounded: ungrounded.into(),
        };
        template.validate()?;
        Ok(template)
    }

    /// Parse a TOML template file with `version`, `grounded`, `ungrounded`
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TemplateFile = toml::from_str(content)
            .map_err(|e| PaperdocError::Template(format!("Invalid template file: {}", e)))?;
        Self::new(file.version, file.grounded, file.ungrounded)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PaperdocError::Template(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Configured template file, or the built-in pair
    pub fn from_config(config: &PromptConfig) -> Result<Self> {
        match &config.template_path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn grounded(&self) -> &str {
        &self.grounded
    }

    pub fn ungrounded(&self) -> &str {
        &self.ungrounded
    }

    fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(PaperdocError::Template(
                "Template version must not be empty".to_string(),
            ));
        }
        for (label, body) in [("grounded", &self.grounded), ("ungrounded", &self.ungrounded)] {
            let names = placeholders(body)?;
            if let Some(unknown) = names.iter().find(|n| !PLACEHOLDERS.contains(n)) {
                return Err(PaperdocError::Template(format!(
                    "Unknown placeholder {{{{{}}}}} in {} template",
                    unknown, label
                )));
            }
            if !names.contains("code") {
                return Err(PaperdocError::Template(format!(
                    "The {} template must include {{{{code}}}}",
                    label
                )));
            }
        }
        if !placeholders(&self.grounded)?.contains("context") {
            return Err(PaperdocError::Template(
                "The grounded template must include {{context}}".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Placeholder names referenced by `template`
pub fn placeholders(template: &str) -> Result<BTreeSet<&str>> {
    let mut names = BTreeSet::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let close = after.find("}}").ok_or_else(|| {
            PaperdocError::Template(format!(
                "Unclosed placeholder near '{}'",
                after.chars().take(20).collect::<String>()
            ))
        })?;
        names.insert(after[..close].trim());
        rest = &after[close + 2..];
    }
    Ok(names)
}

/// Substitute `{{name}}` with values from `vars`; unmatched names render empty
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + vars.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let name = after[..close].trim();
                if let Some((_, value)) = vars.iter().find(|(k, _)| *k == name) {
                    out.push_str(value);
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_valid() {
        let builtin = PromptTemplate::builtin();
        assert!(builtin.validate().is_ok());
        assert_eq!(builtin.version(), BUILTIN_TEMPLATE_VERSION);
    }

    #[test]
    fn test_render_substitutes_once() {
        let out = render("fn {{name}}: {{code}}", &[("name", "f"), ("code", "{{name}}")]);
        assert_eq!(out, "fn f: {{name}}");
    }

    #[test]
    fn test_render_missing_value_is_empty() {
        assert_eq!(render("a{{ hints }}b", &[]), "ab");
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let err = PromptTemplate::new("v1", "{{code}} {{context}} {{author}}", "{{code}}").unwrap_err();
        assert!(err.to_string().contains("author"));
    }

    #[test]
    fn test_grounded_requires_context() {
        assert!(PromptTemplate::new("v1", "{{code}}", "{{code}}").is_err());
        assert!(PromptTemplate::new("v1", "{{code}} {{context}}", "{{name}}").is_err());
    }

    #[test]
    fn test_unclosed_placeholder_rejected() {
        assert!(placeholders("{{code").is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
version = "custom-2"
grounded = """
Explain {{qualified_name}}:
{{code}}
Papers: {{context}}
"""
ungrounded = "Explain {{qualified_name}}: {{code}}"
"#;
        let template = PromptTemplate::from_toml_str(toml).unwrap();
        assert_eq!(template.version(), "custom-2");
        assert!(template.grounded().contains("Papers:"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("template.toml");
        std::fs::write(
            &path,
            "version = \"f\"\ngrounded = \"{{code}}{{context}}\"\nungrounded = \"{{code}}\"\n",
        )
        .unwrap();
        let config = PromptConfig {
            template_path: Some(path),
            ..Default::default()
        };
        assert_eq!(PromptTemplate::from_config(&config).unwrap().version(), "f");
    }
}
