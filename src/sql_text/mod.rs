//! Quote- and comment-aware helpers over raw SQL text.
//!
//! The scanner is deliberately lexical: it knows string literals, quoted identifiers,
//! comments, parameters, and statement terminators, but nothing about the grammar beyond
//! recognising `CREATE TRIGGER ... BEGIN ... END` bodies so their inner semicolons do
//! not split the statement.

mod parsers;
mod scanner;

use scanner::{Token, TokenKind, tokenize};

/// Split a multi-statement SQL string into its individual statements.
///
/// Statements are returned trimmed and without their terminating `;`. Segments that contain
/// only whitespace or comments are dropped.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<&str> {
    let tokens = tokenize(sql);
    let mut statements = Vec::new();
    let mut start = 0;
    let mut tracker = TriggerTracker::default();

    for token in &tokens {
        match token.kind {
            TokenKind::Semicolon if tracker.semicolon_ends_statement() => {
                push_statement(&mut statements, sql, &tokens, start, token.start);
                start = token.end;
                tracker = TriggerTracker::default();
            }
            TokenKind::Semicolon => tracker.observe_semicolon(),
            TokenKind::Word => tracker.observe_word(token.text(sql)),
            _ if token.is_significant() => tracker.observe_other(),
            _ => {}
        }
    }
    push_statement(&mut statements, sql, &tokens, start, sql.len());
    statements
}

fn push_statement<'a>(
    statements: &mut Vec<&'a str>,
    sql: &'a str,
    tokens: &[Token],
    start: usize,
    end: usize,
) {
    let has_content = tokens
        .iter()
        .any(|t| t.start >= start && t.end <= end && t.is_significant());
    if has_content {
        statements.push(sql[start..end].trim());
    }
}

/// Tracks whether the statement being scanned is a trigger definition whose body is still open.
#[derive(Default)]
struct TriggerTracker {
    leading_words: Vec<String>,
    in_body: bool,
    body_closed: bool,
    after_semicolon: bool,
}

impl TriggerTracker {
    fn is_trigger(&self) -> bool {
        let words: Vec<&str> = self.leading_words.iter().map(String::as_str).collect();
        matches!(
            words.as_slice(),
            ["CREATE", "TRIGGER", ..] | ["CREATE", "TEMP" | "TEMPORARY", "TRIGGER", ..]
        )
    }

    fn semicolon_ends_statement(&self) -> bool {
        !self.is_trigger() || !self.in_body || self.body_closed
    }

    fn observe_word(&mut self, word: &str) {
        let upper = word.to_ascii_uppercase();
        if self.is_trigger() {
            if !self.in_body && upper == "BEGIN" {
                self.in_body = true;
            } else if self.in_body && self.after_semicolon && upper == "END" {
                self.body_closed = true;
            }
        }
        if self.leading_words.len() < 3 {
            self.leading_words.push(upper);
        }
        self.after_semicolon = false;
    }

    fn observe_semicolon(&mut self) {
        self.after_semicolon = true;
    }

    fn observe_other(&mut self) {
        if self.leading_words.len() < 3 {
            self.leading_words.push(String::new());
        }
        self.after_semicolon = false;
    }
}

/// Collapse runs of whitespace and comments outside literals into single spaces, trim the
/// result, and drop trailing statement terminators.
#[must_use]
pub fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;
    for token in tokenize(sql) {
        if token.is_significant() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push_str(token.text(sql));
        } else {
            pending_space = true;
        }
    }
    while out.ends_with(';') || out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Discover the parameter slots of the first statement in `sql`, following SQLite's numbering.
///
/// Entry `i` describes parameter `i + 1`: `Some(name)` for named parameters (including the
/// sigil), `None` for anonymous `?` slots or gaps left by `?NNN`.
#[must_use]
pub fn parameter_slots(sql: &str) -> Vec<Option<String>> {
    let first = split_statements(sql).into_iter().next().unwrap_or("");
    let mut slots: Vec<Option<String>> = Vec::new();

    for token in tokenize(first) {
        if token.kind != TokenKind::Param {
            continue;
        }
        let text = token.text(first);
        if text == "?" {
            slots.push(None);
        } else if let Some(digits) = text.strip_prefix('?') {
            if let Ok(n) = digits.parse::<usize>()
                && n > slots.len()
            {
                slots.resize(n, None);
            }
        } else if !slots.iter().any(|s| s.as_deref() == Some(text)) {
            slots.push(Some(text.to_owned()));
        }
    }
    slots
}
