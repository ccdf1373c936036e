use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a documentable unit.
///
/// Two units are the same unit iff every field matches; the derived ordering
/// (file, then qualified name, then position) keys the run report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    /// Path relative to the source root, `/`-separated
    pub file: String,
    /// Fully-qualified name, e.g. `geo::Polygon::area`
    pub qualified_name: String,
    /// 1-based line of the first signature line
    pub start_line: usize,
    /// 1-based line of the closing brace
    pub end_line: usize,
    /// Byte offset of the signature start
    pub start_byte: usize,
    /// Byte offset one past the closing brace
    pub end_byte: usize,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@L{}-L{}",
            self.file, self.qualified_name, self.start_line, self.end_line
        )
    }
}

/// Function parameter as written in the signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub param_type: String,
    pub name: String,
}

/// A function-level code span eligible for documentation.
///
/// Immutable once extracted; shared read-only by every downstream stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    pub id: UnitId,
    /// Unqualified name (`area`, `~Polygon`, `operator+`)
    pub name: String,
    /// Signature text as written, whitespace-normalized
    pub signature: String,
    /// Body text including the outer braces
    pub body: String,
    /// Comment block immediately preceding the signature
    pub doc_comment: Option<String>,
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
    /// Enclosing namespace path (`a::b`)
    pub namespace: Option<String>,
    /// Enclosing or qualifying class
    pub class_name: Option<String>,
    /// Algorithm keywords found in the body
    pub algorithm_keywords: Vec<String>,
    /// Body mentions mathematical operations
    pub uses_math: bool,
}

impl SourceUnit {
    pub fn qualified_name(&self) -> &str {
        &self.id.qualified_name
    }

    pub fn file(&self) -> &str {
        &self.id.file
    }

    /// Signature plus body, the text that must never be truncated
    pub fn code(&self) -> String {
        format!("{}\n{}", self.signature, self.body)
    }

    /// One-line hint summary for prompts
    pub fn hints(&self) -> String {
        let mut hints = Vec::new();
        if let Some(class) = &self.class_name {
            hints.push(format!("member of class {}", class));
        }
        if let Some(ns) = &self.namespace {
            hints.push(format!("in namespace {}", ns));
        }
        if !self.algorithm_keywords.is_empty() {
            hints.push(format!(
                "algorithm keywords: {}",
                self.algorithm_keywords.join(", ")
            ));
        }
        if self.uses_math {
            hints.push("uses mathematical operations".to_string());
        }
        hints.join("; ")
    }

    /// Parameters rendered as `type name` pairs
    pub fn parameter_list(&self) -> String {
        self.parameters
            .iter()
            .map(|p| {
                if p.name.is_empty() {
                    p.param_type.clone()
                } else {
                    format!("{} {}", p.param_type, p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Minimal unit for tests outside the extractor
    pub fn unit(file: &str, qualified_name: &str, body: &str) -> SourceUnit {
        let name = qualified_name
            .rsplit("::")
            .next()
            .unwrap_or(qualified_name)
            .to_string();
        SourceUnit {
            id: UnitId {
                file: file.to_string(),
                qualified_name: qualified_name.to_string(),
                start_line: 1,
                end_line: 1 + body.lines().count(),
                start_byte: 0,
                end_byte: body.len(),
            },
            signature: format!("void {}()", qualified_name),
            name,
            body: body.to_string(),
            doc_comment: None,
            return_type: Some("void".to_string()),
            parameters: Vec::new(),
            namespace: None,
            class_name: None,
            algorithm_keywords: Vec::new(),
            uses_math: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_display() {
        let unit = fixtures::unit("src/geo.cpp", "geo::area", "{ return 0; }");
        assert_eq!(unit.id.to_string(), "src/geo.cpp:geo::area@L1-L2");
    }

    #[test]
    fn test_hints() {
        let mut unit = fixtures::unit("a.cpp", "m::Solver::solve", "{}");
        unit.class_name = Some("Solver".to_string());
        unit.algorithm_keywords = vec!["sort".to_string()];
        unit.uses_math = true;
        let hints = unit.hints();
        assert!(hints.contains("member of class Solver"));
        assert!(hints.contains("algorithm keywords: sort"));
        assert!(hints.contains("mathematical"));
    }

    #[test]
    fn test_parameter_list() {
        let mut unit = fixtures::unit("a.cpp", "f", "{}");
        unit.parameters = vec![
            Parameter {
                param_type: "const std::vector<int>&".to_string(),
                name: "xs".to_string(),
            },
            Parameter {
                param_type: "int".to_string(),
                name: String::new(),
            },
        ];
        assert_eq!(unit.parameter_list(), "const std::vector<int>& xs, int");
    }
}
