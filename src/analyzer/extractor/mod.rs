//! Source Unit Extractor
//!
//! Structural (not semantic) extraction of function definitions from C++
//! source. Comments and literals are masked, braces are matched once per
//! file, and the text before each top-level `{` is classified with a
//! tolerant signature grammar. Function bodies are consumed whole, so
//! lambdas and local classes stay part of their enclosing unit.
//!
//! Files with unterminated comments, literals, or unbalanced braces
//! contribute no units and one skipped-file entry.

mod lexer;
mod signature;

use std::collections::VecDeque;

use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::analyzer::scanner::{FileScanner, ScannedFile, SkippedFile};
use crate::config::SourcesConfig;
use crate::constants::extraction::{ALGORITHM_KEYWORDS, MATH_KEYWORDS};
use crate::types::{FailureKind, Result, SourceUnit, UnitId};

use lexer::Lexed;
use signature::{FunctionHeader, Header};

/// Why a file was skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("unterminated block comment starting at line {line}")]
    UnterminatedComment { line: usize },

    #[error("unterminated string or character literal at line {line}")]
    UnterminatedLiteral { line: usize },

    #[error("unbalanced braces near line {line}")]
    UnbalancedBraces { line: usize },
}

#[derive(Debug, Clone)]
enum Scope {
    Namespace(Vec<String>),
    Class(Option<String>),
    Transparent,
}

/// Access labels that end a member declaration sequence
const ACCESS_LABELS: &[&str] = &[
    "public",
    "private",
    "protected",
    "signals",
    "Q_SIGNALS",
    "public slots",
    "private slots",
    "protected slots",
    "public Q_SLOTS",
    "private Q_SLOTS",
    "protected Q_SLOTS",
];

/// Extract every function definition from one file.
///
/// `file` is the root-relative path recorded in unit identities.
pub fn extract_units(file: &str, source: &str) -> std::result::Result<Vec<SourceUnit>, ExtractionError> {
    let lexed = Lexed::new(source)?;
    let masked = lexed.masked();
    let bytes = masked.as_bytes();

    let mut scopes: Vec<Scope> = Vec::new();
    let mut units = Vec::new();
    let mut segment = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b';' => segment = i + 1,
            b'}' => {
                scopes.pop();
                segment = i + 1;
            }
            b':' if is_access_label(masked, segment, i, &scopes) => segment = i + 1,
            b'{' => {
                let close = lexed
                    .matching_brace(i)
                    .ok_or(ExtractionError::UnbalancedBraces {
                        line: lexed.line_of(i),
                    })?;
                let header = &masked[segment..i];

                match signature::classify(header) {
                    Header::Function(function) => {
                        if function.has_init_list(header) && ends_with_member_name(header) {
                            // brace initializer inside a constructor init list
                            i = close + 1;
                            continue;
                        }
                        units.push(build_unit(file, &lexed, &scopes, segment, i, close, &function));
                        segment = close + 1;
                        i = close + 1;
                        continue;
                    }
                    Header::Namespace(names) => scopes.push(Scope::Namespace(names)),
                    Header::Class(name) => scopes.push(Scope::Class(name)),
                    Header::Transparent => scopes.push(Scope::Transparent),
                    Header::Other => {
                        segment = close + 1;
                        i = close + 1;
                        continue;
                    }
                }
                segment = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    Ok(units)
}

fn is_access_label(masked: &str, segment: usize, colon: usize, scopes: &[Scope]) -> bool {
    let bytes = masked.as_bytes();
    if !matches!(scopes.last(), Some(Scope::Class(_)))
        || bytes.get(colon + 1) == Some(&b':')
        || (colon > 0 && bytes[colon - 1] == b':')
    {
        return false;
    }
    let label = lexer::collapse_whitespace(&masked[segment..colon]);
    ACCESS_LABELS.contains(&label.as_str())
}

fn ends_with_member_name(header: &str) -> bool {
    header
        .trim_end()
        .bytes()
        .last()
        .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'>')
}

fn build_unit(
    file: &str,
    lexed: &Lexed<'_>,
    scopes: &[Scope],
    segment: usize,
    open: usize,
    close: usize,
    function: &FunctionHeader,
) -> SourceUnit {
    let source = lexed.source();
    let masked = lexed.masked();
    let header = &masked[segment..open];

    let sig_start = segment
        + header
            .bytes()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(0);

    let declared = signature::split_qualified(&function.declared_name);
    let name = declared
        .last()
        .cloned()
        .unwrap_or_else(|| function.declared_name.clone());

    let mut namespaces: Vec<String> = Vec::new();
    let mut qualified: Vec<String> = Vec::new();
    let mut enclosing_class = None;
    for scope in scopes {
        match scope {
            Scope::Namespace(names) => {
                namespaces.extend(names.iter().cloned());
                qualified.extend(names.iter().cloned());
            }
            Scope::Class(Some(class)) => {
                qualified.push(class.clone());
                enclosing_class = Some(class.clone());
            }
            Scope::Class(None) | Scope::Transparent => {}
        }
    }
    qualified.extend(declared.iter().cloned());

    let (class_name, namespace) = if declared.len() >= 2 {
        let class = signature::strip_template_args(&declared[declared.len() - 2]);
        let namespace = if !namespaces.is_empty() {
            Some(namespaces.join("::"))
        } else if declared.len() >= 3 {
            Some(declared[..declared.len() - 2].join("::"))
        } else {
            None
        };
        (Some(class), namespace)
    } else {
        (
            enclosing_class,
            (!namespaces.is_empty()).then(|| namespaces.join("::")),
        )
    };

    let body = source[open..=close].to_string();
    let lowered = body.to_lowercase();

    SourceUnit {
        id: UnitId {
            file: file.to_string(),
            qualified_name: qualified.join("::"),
            start_line: lexed.line_of(sig_start),
            end_line: lexed.line_of(close),
            start_byte: sig_start,
            end_byte: close + 1,
        },
        name,
        signature: lexed.code_text(sig_start, open),
        doc_comment: lexed.doc_comment_before(segment, sig_start),
        return_type: signature::return_type(header, function),
        parameters: signature::parse_parameters(
            &lexed.code_text(segment + function.params.0, segment + function.params.1),
        ),
        namespace,
        class_name,
        algorithm_keywords: algorithm_keywords(&lowered),
        uses_math: MATH_KEYWORDS.iter().any(|k| lowered.contains(k)),
        body,
    }
}

/// Algorithm keywords present in a lowercased body.
///
/// Multi-letter keywords match anywhere (so `quickSort` counts as sort);
/// `dp` must be a whole identifier or an `_`-separated part of one.
fn algorithm_keywords(lowered: &str) -> Vec<String> {
    ALGORITHM_KEYWORDS
        .iter()
        .filter(|keyword| {
            if keyword.len() > 2 {
                lowered.contains(*keyword)
            } else {
                lowered
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|w| w == **keyword)
            }
        })
        .map(|k| k.to_string())
        .collect()
}

// =============================================================================
// Tree-level extraction
// =============================================================================

/// Produces units for a whole source tree
pub struct UnitExtractor {
    scanner: FileScanner,
}

impl UnitExtractor {
    pub fn new(config: &SourcesConfig) -> Self {
        Self {
            scanner: FileScanner::new(&config.root)
                .with_extensions(&config.extensions)
                .with_exclude(&config.exclude)
                .with_max_file_size(config.max_file_size as u64),
        }
    }

    pub fn from_scanner(scanner: FileScanner) -> Self {
        Self { scanner }
    }

    /// Start a fresh pass over the tree.
    ///
    /// Fails only if the root cannot be enumerated. Each call re-scans, so
    /// the stream is restartable.
    pub fn units(&self) -> Result<UnitStream> {
        let scan = self.scanner.scan()?;
        debug!(
            root = %self.scanner.root().display(),
            files = scan.files.len(),
            "Source tree enumerated"
        );
        Ok(UnitStream {
            files: scan.files.into_iter(),
            pending: VecDeque::new(),
            skipped: scan.skipped,
            files_read: 0,
        })
    }

    /// Drain a full pass into memory
    pub fn extract_all(&self) -> Result<Extraction> {
        let mut stream = self.units()?;
        let units: Vec<SourceUnit> = stream.by_ref().collect();
        Ok(Extraction {
            units,
            files_read: stream.files_read,
            skipped: stream.skipped,
        })
    }
}

/// Result of a complete extraction pass
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub units: Vec<SourceUnit>,
    pub files_read: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Lazy unit sequence; files are read and parsed on demand
pub struct UnitStream {
    files: std::vec::IntoIter<ScannedFile>,
    pending: VecDeque<SourceUnit>,
    skipped: Vec<SkippedFile>,
    files_read: usize,
}

impl UnitStream {
    /// Files skipped so far (unreadable, oversized, malformed)
    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn files_read(&self) -> usize {
        self.files_read
    }

    /// Read and parse on a blocking thread, handing units to an async stream.
    ///
    /// At most `buffer` extracted units wait in the channel. The handle
    /// resolves to the drained stream once the receiver has seen every unit
    /// (or was dropped), so skipped files can be read afterwards. Must be
    /// called inside a tokio runtime.
    pub fn spawn(
        self,
        buffer: usize,
    ) -> (
        impl Stream<Item = SourceUnit> + Send + 'static,
        JoinHandle<UnitStream>,
    ) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::task::spawn_blocking(move || {
            let mut stream = self;
            for unit in stream.by_ref() {
                if tx.blocking_send(unit).is_err() {
                    debug!("Unit receiver dropped; stopping extraction");
                    break;
                }
            }
            stream
        });
        let units = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|unit| (unit, rx))
        });
        (units, handle)
    }

    fn load(&mut self, file: ScannedFile) {
        let bytes = match std::fs::read(&file.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %file.relative, error = %e, "Skipping unreadable file");
                self.skipped.push(SkippedFile {
                    path: file.relative,
                    reason: e.to_string(),
                });
                return;
            }
        };
        self.files_read += 1;

        let source = String::from_utf8_lossy(&bytes);
        match extract_units(&file.relative, &source) {
            Ok(units) => {
                debug!(path = %file.relative, units = units.len(), "Extracted units");
                self.pending.extend(units);
            }
            Err(e) => {
                warn!(
                    path = %file.relative,
                    kind = %FailureKind::ExtractionSkipped,
                    error = %e,
                    "Skipping malformed file"
                );
                self.skipped.push(SkippedFile {
                    path: file.relative,
                    reason: format!("{}: {}", FailureKind::ExtractionSkipped, e),
                });
            }
        }
    }
}

impl Iterator for UnitStream {
    type Item = SourceUnit;

    fn next(&mut self) -> Option<SourceUnit> {
        loop {
            if let Some(unit) = self.pending.pop_front() {
                return Some(unit);
            }
            let file = self.files.next()?;
            self.load(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(units: &[SourceUnit]) -> Vec<&str> {
        units.iter().map(|u| u.qualified_name()).collect()
    }

    const GEOMETRY: &str = r#"
#include <cmath>
#include <vector>

namespace geo {

/// Euclidean distance between two points.
double distance(double x1, double y1, double x2, double y2) {
    auto sq = [](double v) { return v * v; };
    return std::sqrt(sq(x2 - x1) + sq(y2 - y1));
}

class Polygon : public Shape {
public:
    Polygon(std::vector<Point> pts) : points_{std::move(pts)}, cached_{} {
        struct Local { int x; };
    }

    ~Polygon() override {}

    double area() const {
        double a = 0;
        for (size_t i = 0; i < points_.size(); ++i) { a += cross(i); }
        return a / 2;
    }

    int count() const;

private:
    std::vector<Point> points_;
    int cached_;
};

int Polygon::count() const { return static_cast<int>(points_.size()); }

enum class Kind { Convex, Concave };

}  // namespace geo

extern "C" {
int c_entry(const char* s) { return s[0] == '}'; }
}
"#;

    #[test]
    fn test_extracts_all_function_like_constructs() {
        let units = extract_units("src/geo.cpp", GEOMETRY).unwrap();
        assert_eq!(
            names(&units),
            vec![
                "geo::distance",
                "geo::Polygon::Polygon",
                "geo::Polygon::~Polygon",
                "geo::Polygon::area",
                "geo::Polygon::count",
                "c_entry",
            ]
        );
    }

    #[test]
    fn test_unit_attributes() {
        let units = extract_units("src/geo.cpp", GEOMETRY).unwrap();
        let distance = &units[0];
        assert_eq!(distance.name, "distance");
        assert_eq!(
            distance.signature,
            "double distance(double x1, double y1, double x2, double y2)"
        );
        assert_eq!(distance.return_type.as_deref(), Some("double"));
        assert_eq!(distance.parameters.len(), 4);
        assert_eq!(distance.parameters[2].name, "x2");
        assert_eq!(distance.namespace.as_deref(), Some("geo"));
        assert_eq!(distance.class_name, None);
        assert_eq!(
            distance.doc_comment.as_deref(),
            Some("Euclidean distance between two points.")
        );
        assert!(distance.uses_math);
        // the lambda is part of the body
        assert!(distance.body.contains("auto sq"));
        assert!(distance.body.starts_with('{') && distance.body.ends_with('}'));
        assert_eq!(distance.id.start_line, 8);
        assert_eq!(distance.id.end_line, 11);
        assert_eq!(
            &GEOMETRY[distance.id.start_byte..distance.id.end_byte],
            "double distance(double x1, double y1, double x2, double y2) {\n    auto sq = [](double v) { return v * v; };\n    return std::sqrt(sq(x2 - x1) + sq(y2 - y1));\n}"
        );

        let ctor = &units[1];
        assert_eq!(ctor.class_name.as_deref(), Some("Polygon"));
        assert_eq!(ctor.return_type, None);
        assert!(ctor.body.contains("struct Local"));

        let count = &units[4];
        assert_eq!(count.class_name.as_deref(), Some("Polygon"));
        assert_eq!(count.namespace.as_deref(), Some("geo"));
    }

    #[test]
    fn test_out_of_class_definitions_without_namespace_block() {
        let src = "int lib::Graph::shortest_path(int from, int to) {\n  // dijkstra search\n  return dp[to];\n}\n";
        let units = extract_units("g.cpp", src).unwrap();
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.qualified_name(), "lib::Graph::shortest_path");
        assert_eq!(unit.class_name.as_deref(), Some("Graph"));
        assert_eq!(unit.namespace.as_deref(), Some("lib"));
        assert_eq!(unit.algorithm_keywords, vec!["search", "dp"]);
    }

    #[test]
    fn test_templates_and_operators() {
        let src = r#"
template <typename T>
T Matrix<T>::trace() const { T t{}; return t; }

bool operator==(const Vec& a, const Vec& b) { return a.x == b.x; }

template <>
int convert<int>(double d) { return static_cast<int>(d); }
"#;
        let units = extract_units("m.hpp", src).unwrap();
        assert_eq!(
            names(&units),
            vec!["Matrix<T>::trace", "operator==", "convert<int>"]
        );
        assert_eq!(units[0].class_name.as_deref(), Some("Matrix"));
    }

    #[test]
    fn test_declarations_and_initializers_are_not_units() {
        let src = r#"
int declared_only(int x);
static const int table[] = { 1, 2, 3 };
auto handler = [](int v) { return v + 1; };
std::vector<int> values{1, 2, 3};
struct Config { int depth = 3; bool enabled{true}; };
"#;
        let units = extract_units("d.cpp", src).unwrap();
        assert!(units.is_empty(), "unexpected units: {:?}", names(&units));
    }

    #[test]
    fn test_malformed_files_are_errors() {
        assert!(matches!(
            extract_units("bad.cpp", "void f() {\n  if (x) {\n}\n"),
            Err(ExtractionError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            extract_units("bad.cpp", "void f() { /* open"),
            Err(ExtractionError::UnterminatedComment { line: 1 })
        ));
    }

    #[test]
    fn test_braces_in_comments_and_strings_are_ignored() {
        let src = "void f() {\n  // }\n  const char* s = \"{{\";\n  char c = '}';\n}\nvoid g() {}\n";
        let units = extract_units("s.cpp", src).unwrap();
        assert_eq!(names(&units), vec!["f", "g"]);
    }

    #[test]
    fn test_macro_signatures_extracted_as_written() {
        let src = "TEST(Sorting, HandlesEmpty) {\n  EXPECT_TRUE(sort({}).empty());\n}\n";
        let units = extract_units("t.cpp", src).unwrap();
        assert_eq!(names(&units), vec!["TEST"]);
        assert_eq!(units[0].signature, "TEST(Sorting, HandlesEmpty)");
    }

    #[test]
    fn test_non_ascii_identifiers_do_not_stop_extraction() {
        let src = "类型 compute(int x) { return x; }\nint ok() { return 1; }\n";
        let units = extract_units("u.cpp", src).unwrap();
        assert_eq!(names(&units), vec!["compute", "ok"]);
        assert_eq!(units[0].return_type.as_deref(), Some("类型"));

        let src = "// Maße in Millimetern\nint Größe::wert() const { return 0; }\ndouble fläche(double r) { return r * r; }\n";
        let units = extract_units("m.cpp", src).unwrap();
        assert_eq!(names(&units), vec!["Größe::wert", "fläche"]);
        assert_eq!(units[0].class_name.as_deref(), Some("Größe"));
    }

    #[test]
    fn test_stream_skips_malformed_file_and_continues() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.cpp"), "int a() { return 1; }\n").unwrap();
        fs::write(temp.path().join("b.cpp"), "int b() { return 2;\n").unwrap();
        fs::write(temp.path().join("c.cpp"), "int c() { return 3; }\n").unwrap();

        let config = SourcesConfig {
            root: temp.path().to_path_buf(),
            ..SourcesConfig::default()
        };
        let extractor = UnitExtractor::new(&config);

        let mut stream = extractor.units().unwrap();
        let first: Vec<_> = stream.by_ref().map(|u| u.id.qualified_name).collect();
        assert_eq!(first, vec!["a", "c"]);
        assert_eq!(stream.skipped().len(), 1);
        assert_eq!(stream.skipped()[0].path, "b.cpp");
        assert!(stream.skipped()[0].reason.starts_with("ExtractionSkipped"));

        // restartable: a second pass yields the same units
        let again = extractor.extract_all().unwrap();
        assert_eq!(again.units.len(), 2);
        assert_eq!(again.files_read, 3);
    }

    #[tokio::test]
    async fn test_spawned_stream_yields_units_off_the_runtime() {
        use futures::StreamExt;

        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.cpp"), "int a() { return 1; }\nint b() { return 2; }\n").unwrap();
        fs::write(temp.path().join("bad.cpp"), "int c() { return 3;\n").unwrap();
        fs::write(temp.path().join("d.cpp"), "int d() { return 4; }\n").unwrap();
        let config = SourcesConfig {
            root: temp.path().to_path_buf(),
            ..SourcesConfig::default()
        };

        let stream = UnitExtractor::new(&config).units().unwrap();
        let (units, handle) = stream.spawn(1);
        let names: Vec<String> = units.map(|u| u.id.qualified_name).collect().await;
        let drained = handle.await.unwrap();

        assert_eq!(names, vec!["a", "b", "d"]);
        assert_eq!(drained.files_read(), 3);
        assert_eq!(drained.skipped().len(), 1);
        assert_eq!(drained.skipped()[0].path, "bad.cpp");
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = SourcesConfig {
            root: temp.path().join("missing"),
            ..SourcesConfig::default()
        };
        assert!(UnitExtractor::new(&config).units().is_err());
    }
}
