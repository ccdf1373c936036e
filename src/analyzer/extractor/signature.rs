//! Tolerant classification of the text preceding a `{`.
//!
//! Headers are masked text (no comments or literals). Offsets returned are
//! relative to the header slice passed in.

use crate::constants::extraction::NON_FUNCTION_KEYWORDS;
use crate::types::Parameter;

use super::lexer::collapse_whitespace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Header {
    /// `namespace a::b`; empty for anonymous namespaces
    Namespace(Vec<String>),
    /// `class`/`struct`/`union`; `None` for anonymous types
    Class(Option<String>),
    /// `extern "C"` linkage block
    Transparent,
    Function(FunctionHeader),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct FunctionHeader {
    /// Name as declared, whitespace-normalized (`Foo<T>::bar`, `operator()`)
    pub declared_name: String,
    /// Start of the declaration proper (after template/attribute prefixes)
    pub decl_start: usize,
    pub name_start: usize,
    /// Inside of the parameter parentheses
    pub params: (usize, usize),
    /// Text after the closing parenthesis
    pub tail_start: usize,
}

impl FunctionHeader {
    /// Constructor initializer list follows the parameters
    pub fn has_init_list(&self, header: &str) -> bool {
        let tail = header[self.tail_start..].trim_start();
        tail.starts_with(':') && !tail.starts_with("::")
    }
}

const TAIL_WORDS: &[&str] = &[
    "const",
    "volatile",
    "noexcept",
    "override",
    "final",
    "throw",
    "requires",
    "try",
    "mutable",
    "__attribute__",
];

const DECL_SPECIFIERS: &[&str] = &[
    "static",
    "inline",
    "virtual",
    "explicit",
    "constexpr",
    "consteval",
    "constinit",
    "friend",
    "extern",
];

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.starts_with(word)
        && !text[word.len()..]
            .bytes()
            .next()
            .is_some_and(is_ident_byte)
}

pub(super) fn classify(header: &str) -> Header {
    let bytes = header.as_bytes();
    let Some(first) = bytes.iter().position(|b| !b.is_ascii_whitespace()) else {
        return Header::Other;
    };
    let decl_start = skip_prefixes(header, first);
    let decl = header[decl_start..].trim_end();

    let inline_namespace = starts_with_word(decl, "inline")
        && starts_with_word(decl["inline".len()..].trim_start(), "namespace");
    if starts_with_word(decl, "namespace") || inline_namespace {
        let after = &decl[decl.find("namespace").map_or(0, |p| p + "namespace".len())..];
        let names = after
            .split("::")
            .map(|part| {
                let part = part.trim();
                part.strip_prefix("inline ").unwrap_or(part).trim().to_string()
            })
            .filter(|part| !part.is_empty())
            .collect();
        return Header::Namespace(names);
    }

    if decl == "extern" {
        return Header::Transparent;
    }

    if starts_with_word(decl, "enum") {
        return Header::Other;
    }

    for (open, close) in paren_groups(header, decl_start) {
        if let Some(function) = function_at(header, decl_start, open, close) {
            return Header::Function(function);
        }
    }

    if !decl.contains('=')
        && let Some(name) = class_name(decl)
    {
        return Header::Class(name);
    }

    Header::Other
}

/// Skip `template <...>` and `[[...]]` prefixes
fn skip_prefixes(header: &str, mut pos: usize) -> usize {
    let bytes = header.as_bytes();
    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let rest = &header[pos..];
        if starts_with_word(rest, "template") {
            let mut p = pos + "template".len();
            while p < bytes.len() && bytes[p].is_ascii_whitespace() {
                p += 1;
            }
            if bytes.get(p) != Some(&b'<') {
                return pos;
            }
            match skip_angles_forward(bytes, p) {
                Some(end) => pos = end,
                None => return pos,
            }
        } else if rest.starts_with("[[") {
            match rest.find("]]") {
                Some(end) => pos += end + 2,
                None => return pos,
            }
        } else {
            return pos;
        }
    }
}

/// Position after the `>` matching the `<` at `open`
fn skip_angles_forward(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut parens = 0i32;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => parens += 1,
            b')' => parens -= 1,
            b'<' if parens == 0 => depth += 1,
            b'>' if parens == 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Position of the `<` matching the `>` just before `end`
fn skip_angles_backward(bytes: &[u8], end: usize) -> Option<usize> {
    let mut depth = 0i32;
    for i in (0..end).rev() {
        match bytes[i] {
            b'>' => depth += 1,
            b'<' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b';' | b'{' | b'}' => return None,
            _ => {}
        }
    }
    None
}

/// Top-level parenthesis groups as (open, close) offsets
fn paren_groups(header: &str, from: usize) -> Vec<(usize, usize)> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut open = 0;
    for (i, b) in header.bytes().enumerate().skip(from) {
        match b {
            b'(' => {
                if depth == 0 {
                    open = i;
                }
                depth += 1;
            }
            b')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    groups.push((open, i));
                }
            }
            _ => {}
        }
    }
    groups
}

fn skip_ws_back(bytes: &[u8], mut pos: usize) -> usize {
    while pos > 0 && bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    pos
}

fn ident_start(bytes: &[u8], end: usize) -> usize {
    let mut start = end;
    while start > 0 && is_ident_byte(bytes[start - 1]) {
        start -= 1;
    }
    start
}

/// Last whole-word `operator` in `header[from..to]`
fn find_operator(header: &str, from: usize, to: usize) -> Option<usize> {
    let bytes = header.as_bytes();
    let slice = &header[from..to];
    slice.rmatch_indices("operator").map(|(p, _)| from + p).find(|&p| {
        let before_ok = p == 0 || !is_ident_byte(bytes[p - 1]);
        let after = p + "operator".len();
        let after_ok = after >= bytes.len() || !is_ident_byte(bytes[after]);
        before_ok && after_ok
    })
}

fn function_at(header: &str, decl_start: usize, open: usize, close: usize) -> Option<FunctionHeader> {
    let bytes = header.as_bytes();
    let mut params = (open + 1, close);
    let mut tail_start = close + 1;
    let name_end;
    let mut name_start;

    if let Some(op) = find_operator(header, decl_start, open)
        && header[op + "operator".len()..open]
            .bytes()
            .all(|b| !matches!(b, b';' | b'{' | b'}' | b'(' | b')'))
    {
        let between = header[op + "operator".len()..open].trim();
        if between.is_empty() {
            // operator() takes its parameters from the next group
            if close != open + 1 && !header[open + 1..close].trim().is_empty() {
                return None;
            }
            let next_open = header[close + 1..].find('(').map(|p| close + 1 + p)?;
            if !header[close + 1..next_open].trim().is_empty() {
                return None;
            }
            let next_close = paren_groups(header, next_open).first()?.1;
            params = (next_open + 1, next_close);
            tail_start = next_close + 1;
            name_end = close + 1;
        } else {
            name_end = open;
        }
        name_start = op;
    } else {
        let end = skip_ws_back(bytes, open);
        if end == 0 {
            return None;
        }
        let mut ident_end = end;
        if bytes[end - 1] == b'>' {
            // explicit specialization: f<int>(...)
            ident_end = skip_ws_back(bytes, skip_angles_backward(bytes, end)?);
        }
        let start = ident_start(bytes, ident_end);
        if start == ident_end || bytes[start].is_ascii_digit() {
            return None;
        }
        let ident = &header[start..ident_end];
        if NON_FUNCTION_KEYWORDS.contains(&ident) {
            return None;
        }
        name_end = end;
        name_start = start;
        let before = skip_ws_back(bytes, name_start);
        if before > 0 && bytes[before - 1] == b'~' {
            name_start = before - 1;
        }
    }

    // Qualification: Outer<T>::Inner::name
    loop {
        let k = skip_ws_back(bytes, name_start);
        if k >= 2 && bytes[k - 2..k] == *b"::" {
            let mut p = skip_ws_back(bytes, k - 2);
            if p > 0 && bytes[p - 1] == b'>' {
                match skip_angles_backward(bytes, p) {
                    Some(lt) => p = skip_ws_back(bytes, lt),
                    None => break,
                }
            }
            let s = ident_start(bytes, p);
            if s < p && s >= decl_start {
                name_start = s;
                continue;
            }
            name_start = k - 2;
        }
        break;
    }

    if name_start < decl_start {
        return None;
    }

    let prefix = header[decl_start..name_start].trim_end();
    if prefix.contains('=')
        || prefix.contains('{')
        || prefix.contains('}')
        || prefix.ends_with('.')
        || prefix.ends_with("->")
        || prefix
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .any(|w| w == "return" || w == "new")
    {
        return None;
    }

    if !valid_tail(header[tail_start..].trim()) {
        return None;
    }

    Some(FunctionHeader {
        declared_name: normalize_name(&header[name_start..name_end]),
        decl_start,
        name_start,
        params,
        tail_start,
    })
}

fn valid_tail(tail: &str) -> bool {
    if tail.is_empty() {
        return true;
    }
    if tail.starts_with('&')
        || tail.starts_with("->")
        || tail.starts_with("[[")
        || (tail.starts_with(':') && !tail.starts_with("::"))
    {
        return true;
    }
    if TAIL_WORDS.iter().any(|w| starts_with_word(tail, w)) {
        return true;
    }
    // Trailing macro such as Q_DECL_OVERRIDE
    let word: String = tail
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    word.len() >= 2
        && word
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Drop whitespace except where it separates two identifier characters
fn normalize_name(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    let chars: Vec<char> = collapsed.chars().collect();
    let mut out = String::with_capacity(collapsed.len());
    for (i, c) in chars.iter().enumerate() {
        if *c == ' ' {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let ident = |c: &char| c.is_alphanumeric() || *c == '_';
            if prev.as_ref().is_some_and(ident) && next.is_some_and(ident) {
                out.push(' ');
            }
            continue;
        }
        out.push(*c);
    }
    out.trim_start_matches("::").to_string()
}

/// Split a qualified name on top-level `::`
pub(super) fn split_qualified(name: &str) -> Vec<String> {
    if let Some(op) = name.find("operator")
        && (op == 0 || name[..op].ends_with("::"))
    {
        let mut parts = split_qualified(name[..op].trim_end_matches("::"));
        parts.push(name[op..].to_string());
        return parts;
    }

    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ':' if depth <= 0 && chars.peek() == Some(&':') => {
                chars.next();
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);
    if depth != 0 {
        return vec![name.to_string()];
    }
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Strip template arguments: `Foo<T>` -> `Foo`
pub(super) fn strip_template_args(name: &str) -> String {
    if name.starts_with("operator") {
        return name.to_string();
    }
    match name.find('<') {
        Some(p) => name[..p].trim().to_string(),
        None => name.to_string(),
    }
}

fn class_name(decl: &str) -> Option<Option<String>> {
    let keyword_end = decl
        .match_indices(|c: char| c.is_alphabetic())
        .map(|(p, _)| p)
        .find(|&p| {
            let before_ok = p == 0 || !is_ident_byte(decl.as_bytes()[p - 1]);
            before_ok
                && ["class", "struct", "union"]
                    .iter()
                    .any(|kw| starts_with_word(&decl[p..], kw))
        })
        .map(|p| {
            let rest = &decl[p..];
            p + rest
                .find(|c: char| !c.is_alphanumeric() && c != '_')
                .unwrap_or(rest.len())
        })?;

    let mut rest = &decl[keyword_end..];
    // base clause
    let bytes = rest.as_bytes();
    let mut cut = rest.len();
    for i in 0..bytes.len() {
        if bytes[i] == b':'
            && bytes.get(i + 1) != Some(&b':')
            && (i == 0 || bytes[i - 1] != b':')
        {
            cut = i;
            break;
        }
    }
    rest = &rest[..cut];

    let cleaned = remove_groups(rest);
    let name = cleaned
        .split_whitespace()
        .filter(|w| *w != "final" && *w != "alignas" && !w.starts_with("__attribute__"))
        .next_back()
        .map(strip_template_args);
    Some(name.filter(|n| !n.is_empty() && n.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ':')))
}

/// Remove `[[...]]`, `(...)` and `<...>` groups
fn remove_groups(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0i32;
    for c in text.chars() {
        match c {
            '(' | '[' | '<' => depth += 1,
            ')' | ']' | '>' => depth -= 1,
            _ if depth <= 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Return type from the declaration prefix (`None` for constructors and destructors)
pub(super) fn return_type(header: &str, function: &FunctionHeader) -> Option<String> {
    let prefix = strip_attributes(&header[function.decl_start..function.name_start]);
    let kept: Vec<&str> = prefix
        .split_whitespace()
        .filter(|w| !DECL_SPECIFIERS.contains(w))
        .collect();
    let mut ret = normalize_type(&kept.join(" "));

    if ret == "auto" || ret.is_empty() {
        let tail = &header[function.tail_start..];
        if let Some(arrow) = tail.find("->") {
            let trailing = tail[arrow + 2..]
                .split(" requires ")
                .next()
                .unwrap_or_default();
            let trailing = normalize_type(trailing);
            let trailing = trailing
                .trim_end_matches("override")
                .trim_end_matches("final")
                .trim();
            if !trailing.is_empty() {
                ret = trailing.to_string();
            }
        }
    }

    (!ret.is_empty()).then_some(ret)
}

/// Remove `__attribute__((...))`, `__declspec(...)`, `alignas(...)` and `[[...]]`
fn strip_attributes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let next = ["__attribute__", "__declspec", "alignas", "[["]
            .iter()
            .filter_map(|kw| rest.find(kw).map(|p| (p, *kw)))
            .min_by_key(|(p, _)| *p);
        let Some((pos, kw)) = next else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..pos]);
        let after = &rest[pos + kw.len()..];
        if kw == "[[" {
            rest = after.find("]]").map_or("", |end| &after[end + 2..]);
            continue;
        }
        let Some(open) = after.find('(') else {
            return out;
        };
        let mut depth = 0i32;
        let mut end = after.len();
        for (i, c) in after.char_indices().skip_while(|(i, _)| *i < open) {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        rest = &after[end..];
    }
}

fn normalize_type(text: &str) -> String {
    collapse_whitespace(text)
        .replace(" ::", "::")
        .replace(":: ", "::")
        .replace("< ", "<")
        .replace(" >", ">")
        .replace(" *", "*")
        .replace(" &", "&")
}

/// Parse `type name` pairs from parameter list text
pub(super) fn parse_parameters(text: &str) -> Vec<Parameter> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '<' | '(' | '[' | '{' => depth += 1,
            '>' | ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);

    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && *p != "void")
        .map(parse_parameter)
        .collect()
}

fn parse_parameter(param: &str) -> Parameter {
    // Drop default value at top level
    let mut depth = 0i32;
    let mut end = param.len();
    for (i, c) in param.char_indices() {
        match c {
            '<' | '(' | '[' | '{' => depth += 1,
            '>' | ')' | ']' | '}' => depth -= 1,
            '=' if depth == 0 => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    let mut decl = param[..end].trim().to_string();

    // Array suffix belongs to the type
    let mut array_suffix = String::new();
    while decl.ends_with(']') {
        match decl.rfind('[') {
            Some(open) => {
                array_suffix.insert_str(0, &decl[open..]);
                decl = decl[..open].trim_end().to_string();
            }
            None => break,
        }
    }

    let bytes = decl.as_bytes();
    let start = ident_start(bytes, bytes.len());
    let name = &decl[start..];
    let type_part = decl[..start].trim_end();
    let is_name = !name.is_empty()
        && !name.as_bytes()[0].is_ascii_digit()
        && !type_part.is_empty()
        && !type_part.ends_with("::")
        && !matches!(
            name,
            "int" | "char" | "long" | "short" | "double" | "float" | "bool" | "unsigned" | "signed" | "const"
        );

    if is_name {
        Parameter {
            param_type: normalize_type(&format!("{}{}", type_part, array_suffix)),
            name: name.to_string(),
        }
    } else {
        Parameter {
            param_type: normalize_type(&format!("{}{}", decl, array_suffix)),
            name: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(header: &str) -> FunctionHeader {
        match classify(header) {
            Header::Function(f) => f,
            other => panic!("expected function for {:?}, got {:?}", header, other),
        }
    }

    #[test]
    fn test_plain_function() {
        let f = function("int add(int a, int b) ");
        assert_eq!(f.declared_name, "add");
    }

    #[test]
    fn test_qualified_template_member() {
        let f = function("template <typename T>\nT Matrix<T>::determinant() const ");
        assert_eq!(f.declared_name, "Matrix<T>::determinant");
    }

    #[test]
    fn test_destructor_and_operators() {
        assert_eq!(function("Foo::~Foo() ").declared_name, "Foo::~Foo");
        assert_eq!(
            function("bool operator<(const A& a, const A& b) ").declared_name,
            "operator<"
        );
        let call = function("int Foo::operator()(int x) const ");
        assert_eq!(call.declared_name, "Foo::operator()");
        let header = "int Foo::operator()(int x) const ";
        assert_eq!(&header[call.params.0..call.params.1], "int x");
        assert_eq!(
            function("explicit operator bool() const ").declared_name,
            "operator bool"
        );
    }

    #[test]
    fn test_constructor_init_list() {
        let header = "Foo::Foo(int n) : size_(n), data_";
        let f = function(header);
        assert_eq!(f.declared_name, "Foo::Foo");
        assert!(f.has_init_list(header));
    }

    #[test]
    fn test_attribute_prefixes_and_trailing_return() {
        let header = "__attribute__((always_inline)) inline auto f(int x) -> std::vector<int> ";
        let f = function(header);
        assert_eq!(f.declared_name, "f");
        assert_eq!(return_type(header, &f).as_deref(), Some("std::vector<int>"));
    }

    #[test]
    fn test_macro_prefix_and_suffix() {
        assert_eq!(function("EXPORT_API(x) void run() ").declared_name, "run");
        assert_eq!(function("void paint() Q_DECL_OVERRIDE ").declared_name, "paint");
        assert_eq!(function("TEST(Sorting, Handles) ").declared_name, "TEST");
    }

    #[test]
    fn test_non_functions() {
        assert_eq!(classify("auto lam = [](int x) "), Header::Other);
        assert_eq!(classify("enum class Color : uint8_t "), Header::Other);
        assert_eq!(classify("int values[] = "), Header::Other);
        assert_eq!(classify("std::vector<int> v"), Header::Other);
        assert_eq!(classify("extern"), Header::Transparent);
    }

    #[test]
    fn test_namespaces() {
        assert_eq!(
            classify("namespace geo::detail "),
            Header::Namespace(vec!["geo".to_string(), "detail".to_string()])
        );
        assert_eq!(classify("namespace "), Header::Namespace(vec![]));
        assert_eq!(
            classify("inline namespace v1 "),
            Header::Namespace(vec!["v1".to_string()])
        );
    }

    #[test]
    fn test_classes() {
        assert_eq!(
            classify("class Solver final : public Base<int> "),
            Header::Class(Some("Solver".to_string()))
        );
        assert_eq!(
            classify("template <typename T> struct Point<T*> "),
            Header::Class(Some("Point".to_string()))
        );
        assert_eq!(
            classify("class alignas(16) Vec4 "),
            Header::Class(Some("Vec4".to_string()))
        );
        assert_eq!(classify("struct "), Header::Class(None));
    }

    #[test]
    fn test_return_type() {
        let header = "static inline const std::vector<double> & weights(int n) ";
        let f = function(header);
        assert_eq!(
            return_type(header, &f).as_deref(),
            Some("const std::vector<double>&")
        );
        let ctor = "Foo::Foo() ";
        assert_eq!(return_type(ctor, &function(ctor)), None);
    }

    #[test]
    fn test_parse_parameters() {
        let params = parse_parameters(
            "const std::map<int, double>& m, int n = 3, double xs[4], void (*cb)(int), ...",
        );
        assert_eq!(params.len(), 5);
        assert_eq!(params[0].param_type, "const std::map<int, double>&");
        assert_eq!(params[0].name, "m");
        assert_eq!(params[1].name, "n");
        assert_eq!(params[2].param_type, "double[4]");
        assert_eq!(params[2].name, "xs");
        assert_eq!(params[3].name, "");
        assert_eq!(params[4].param_type, "...");
        assert!(parse_parameters("void").is_empty());
        assert_eq!(parse_parameters("int").len(), 1);
        assert_eq!(parse_parameters("int")[0].name, "");
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(
            split_qualified("ns::Foo<std::pair<A, B>>::bar"),
            vec!["ns", "Foo<std::pair<A, B>>", "bar"]
        );
        assert_eq!(split_qualified("operator<"), vec!["operator<"]);
    }
}
