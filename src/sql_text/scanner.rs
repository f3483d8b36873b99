use super::parsers::{
    is_block_comment_end, is_block_comment_start, is_line_comment_start, is_word_byte, scan_digits,
    scan_quoted, scan_word,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TokenKind {
    Whitespace,
    Comment,
    /// `'...'` string literal
    Literal,
    /// `"..."`, `` `...` `` or `[...]` identifier
    QuotedIdent,
    Word,
    /// `?`, `?NNN`, `:name`, `@name`, `$name`
    Param,
    Semicolon,
    Other,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Token {
    pub(super) kind: TokenKind,
    pub(super) start: usize,
    pub(super) end: usize,
}

impl Token {
    pub(super) fn is_significant(&self) -> bool {
        !matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub(super) fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }
}

/// Split SQL text into lexical tokens. Unterminated literals and comments run to the end.
pub(super) fn tokenize(sql: &str) -> Vec<Token> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        let (kind, end) = match b {
            _ if b.is_ascii_whitespace() => {
                let mut end = idx + 1;
                while end < bytes.len() && bytes[end].is_ascii_whitespace() {
                    end += 1;
                }
                (TokenKind::Whitespace, end)
            }
            _ if is_line_comment_start(bytes, idx) => {
                let mut end = idx + 2;
                while end < bytes.len() && bytes[end] != b'\n' {
                    end += 1;
                }
                (TokenKind::Comment, end)
            }
            _ if is_block_comment_start(bytes, idx) => {
                let mut end = idx + 2;
                while end < bytes.len() && !is_block_comment_end(bytes, end) {
                    end += 1;
                }
                (TokenKind::Comment, (end + 2).min(bytes.len()))
            }
            b'\'' => (TokenKind::Literal, scan_quoted(bytes, idx, b'\'')),
            b'"' => (TokenKind::QuotedIdent, scan_quoted(bytes, idx, b'"')),
            b'`' => (TokenKind::QuotedIdent, scan_quoted(bytes, idx, b'`')),
            b'[' => (TokenKind::QuotedIdent, scan_quoted(bytes, idx, b']')),
            b';' => (TokenKind::Semicolon, idx + 1),
            b'?' => (TokenKind::Param, scan_digits(bytes, idx + 1)),
            b':' | b'@' | b'$' if bytes.get(idx + 1).copied().is_some_and(is_word_byte) => {
                (TokenKind::Param, scan_word(bytes, idx + 1))
            }
            _ if is_word_byte(b) => (TokenKind::Word, scan_word(bytes, idx)),
            _ => (TokenKind::Other, idx + 1),
        };
        tokens.push(Token {
            kind,
            start: idx,
            end,
        });
        idx = end;
    }

    tokens
}
