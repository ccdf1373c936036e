//! Comment/literal masking and brace matching.
//!
//! The masked view has the same byte length as the source: comments, string
//! and character literals, and preprocessor lines are blanked (newlines kept),
//! so every offset found in the masked text is valid in the original.

use std::collections::HashMap;

use super::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteClass {
    Code,
    Comment,
    Literal,
    Directive,
}

#[derive(Debug, Clone, Copy)]
struct Comment {
    start: usize,
    end: usize,
}

pub(super) struct Lexed<'a> {
    source: &'a str,
    masked: String,
    classes: Vec<ByteClass>,
    comments: Vec<Comment>,
    braces: HashMap<usize, usize>,
    line_starts: Vec<usize>,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

impl<'a> Lexed<'a> {
    pub fn new(source: &'a str) -> Result<Self, ExtractionError> {
        let line_starts = std::iter::once(0)
            .chain(
                source
                    .bytes()
                    .enumerate()
                    .filter(|(_, b)| *b == b'\n')
                    .map(|(i, _)| i + 1),
            )
            .collect();

        let mut lexed = Self {
            source,
            masked: String::new(),
            classes: vec![ByteClass::Code; source.len()],
            comments: Vec::new(),
            braces: HashMap::new(),
            line_starts,
        };
        lexed.classify()?;
        lexed.build_mask();
        lexed.match_braces()?;
        Ok(lexed)
    }

    pub fn masked(&self) -> &str {
        &self.masked
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// 1-based line containing `byte`
    pub fn line_of(&self, byte: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= byte)
    }

    /// Offset of the `}` closing the `{` at `open`
    pub fn matching_brace(&self, open: usize) -> Option<usize> {
        self.braces.get(&open).copied()
    }

    /// Source text of `start..end` without comments or directives, whitespace collapsed
    pub fn code_text(&self, start: usize, end: usize) -> String {
        let mut text = String::with_capacity(end.saturating_sub(start));
        let Some(slice) = self.source.get(start..end) else {
            return text;
        };
        for (offset, ch) in slice.char_indices() {
            match self.classes[start + offset] {
                ByteClass::Code | ByteClass::Literal => text.push(ch),
                ByteClass::Comment | ByteClass::Directive => text.push(' '),
            }
        }
        collapse_whitespace(&text)
    }

    /// Comment block immediately preceding `pos`, searched no earlier than `floor`.
    ///
    /// Comments are attached when separated from the next comment (or from
    /// `pos`) by whitespace containing at most one newline.
    pub fn doc_comment_before(&self, floor: usize, pos: usize) -> Option<String> {
        let bytes = self.source.as_bytes();
        let mut attached = Vec::new();
        let mut cursor = pos;

        for comment in self.comments.iter().rev() {
            if comment.end > cursor {
                continue;
            }
            if comment.start < floor {
                break;
            }
            let gap = &bytes[comment.end..cursor];
            let newlines = gap.iter().filter(|b| **b == b'\n').count();
            if newlines > 1 || gap.iter().any(|b| !b.is_ascii_whitespace()) {
                break;
            }
            attached.push(*comment);
            cursor = comment.start;
        }

        if attached.is_empty() {
            return None;
        }
        attached.reverse();

        let lines: Vec<String> = attached
            .iter()
            .flat_map(|c| strip_comment_markers(&self.source[c.start..c.end]))
            .collect();
        let text = lines.join("\n").trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    fn classify(&mut self) -> Result<(), ExtractionError> {
        let bytes = self.source.as_bytes();
        let n = bytes.len();
        let mut i = 0;
        let mut at_line_start = true;

        while i < n {
            let c = bytes[i];
            if c == b'\n' {
                at_line_start = true;
                i += 1;
                continue;
            }
            if c.is_ascii_whitespace() {
                i += 1;
                continue;
            }

            let was_line_start = at_line_start;
            at_line_start = false;

            match c {
                b'#' if was_line_start => {
                    let mut j = i;
                    while j < n {
                        if bytes[j] == b'\n' {
                            let continued = bytes[i..j]
                                .iter()
                                .rev()
                                .find(|b| **b != b'\r')
                                .is_some_and(|b| *b == b'\\');
                            if !continued {
                                break;
                            }
                        }
                        j += 1;
                    }
                    self.mark(i, j, ByteClass::Directive);
                    i = j;
                }
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    let end = memchr_newline(bytes, i);
                    self.mark(i, end, ByteClass::Comment);
                    self.comments.push(Comment { start: i, end });
                    i = end;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    let end = find(bytes, i + 2, b"*/")
                        .map(|p| p + 2)
                        .ok_or(ExtractionError::UnterminatedComment {
                            line: self.line_of(i),
                        })?;
                    self.mark(i, end, ByteClass::Comment);
                    self.comments.push(Comment { start: i, end });
                    i = end;
                }
                b'"' => {
                    let prefix_start = ident_run_start(bytes, i);
                    let prefix = &self.source[prefix_start..i];
                    let end = if matches!(prefix, "R" | "u8R" | "uR" | "UR" | "LR") {
                        self.raw_string_end(i)?
                    } else {
                        self.quoted_end(i, b'"')?
                    };
                    self.mark(prefix_start, end, ByteClass::Literal);
                    i = end;
                }
                b'\'' => {
                    let run_start = ident_run_start(bytes, i);
                    if run_start < i && bytes[run_start].is_ascii_digit() {
                        // digit separator: 1'000'000
                        i += 1;
                    } else {
                        let end = self.quoted_end(i, b'\'')?;
                        self.mark(i, end, ByteClass::Literal);
                        i = end;
                    }
                }
                _ => i += 1,
            }
        }
        Ok(())
    }

    /// End (exclusive) of a quoted literal opening at `open`
    fn quoted_end(&self, open: usize, quote: u8) -> Result<usize, ExtractionError> {
        let bytes = self.source.as_bytes();
        let mut j = open + 1;
        while j < bytes.len() {
            match bytes[j] {
                b'\\' => j += 2,
                b'\n' => break,
                b if b == quote => return Ok(j + 1),
                _ => j += 1,
            }
        }
        Err(ExtractionError::UnterminatedLiteral {
            line: self.line_of(open),
        })
    }

    /// End (exclusive) of a raw string literal whose quote is at `quote`
    fn raw_string_end(&self, quote: usize) -> Result<usize, ExtractionError> {
        let bytes = self.source.as_bytes();
        let unterminated = ExtractionError::UnterminatedLiteral {
            line: self.line_of(quote),
        };
        let paren = bytes[quote + 1..]
            .iter()
            .take(17)
            .position(|b| *b == b'(')
            .map(|p| quote + 1 + p)
            .ok_or(unterminated.clone())?;
        let mut closing = Vec::with_capacity(paren - quote + 1);
        closing.push(b')');
        closing.extend_from_slice(&bytes[quote + 1..paren]);
        closing.push(b'"');
        find(bytes, paren + 1, &closing)
            .map(|p| p + closing.len())
            .ok_or(unterminated)
    }

    fn mark(&mut self, start: usize, end: usize, class: ByteClass) {
        for slot in &mut self.classes[start..end] {
            *slot = class;
        }
    }

    fn build_mask(&mut self) {
        let bytes = self.source.as_bytes();
        let masked: Vec<u8> = bytes
            .iter()
            .zip(&self.classes)
            .map(|(b, class)| match class {
                ByteClass::Code => *b,
                _ if *b == b'\n' => b'\n',
                _ => b' ',
            })
            .collect();
        // Non-code bytes become ASCII; code bytes keep whole UTF-8 sequences
        self.masked = String::from_utf8(masked)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    }

    fn match_braces(&mut self) -> Result<(), ExtractionError> {
        let mut stack = Vec::new();
        for (i, b) in self.masked.bytes().enumerate() {
            match b {
                b'{' => stack.push(i),
                b'}' => {
                    let open = stack.pop().ok_or(ExtractionError::UnbalancedBraces {
                        line: self.line_of(i),
                    })?;
                    self.braces.insert(open, i);
                }
                _ => {}
            }
        }
        match stack.last() {
            Some(&open) => Err(ExtractionError::UnbalancedBraces {
                line: self.line_of(open),
            }),
            None => Ok(()),
        }
    }
}

fn ident_run_start(bytes: &[u8], end: usize) -> usize {
    let mut start = end;
    while start > 0 && is_ident_byte(bytes[start - 1]) {
        start -= 1;
    }
    start
}

fn memchr_newline(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|p| from + p)
        .unwrap_or(bytes.len())
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

fn strip_comment_markers(comment: &str) -> Vec<String> {
    if let Some(body) = comment.strip_prefix("/*") {
        let body = body.strip_suffix("*/").unwrap_or(body);
        let body = body.strip_prefix(['*', '!']).unwrap_or(body);
        body.lines()
            .map(|line| {
                let line = line.trim();
                line.strip_prefix('*').unwrap_or(line).trim().to_string()
            })
            .collect()
    } else {
        let line = comment.trim_start_matches('/');
        let line = line.strip_prefix('!').unwrap_or(line);
        vec![line.trim().to_string()]
    }
}

pub(super) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
