//! Savepoints for the portable engine.
//!
//! Turso rejects `SAVEPOINT`, `RELEASE` and `ROLLBACK TO`, so the worker intercepts them.
//! While a transaction is open every successful write is journaled; rolling back to a
//! savepoint rolls back the whole transaction, reopens it, and replays the journal up to
//! the savepoint's mark.

use crate::sql_text::collapse_whitespace;

/// Transaction control statement recognised by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Control {
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    Release(String),
    RollbackTo(String),
}

impl Control {
    /// Classify one statement; `None` for anything that is not transaction control.
    pub(crate) fn parse(sql: &str) -> Option<Self> {
        let normalized = collapse_whitespace(sql.trim().trim_end_matches(';'));
        let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
        let keyword = |idx: usize, expected: &str| {
            words
                .get(idx)
                .is_some_and(|word| word.eq_ignore_ascii_case(expected))
        };

        let first = words.first()?.to_ascii_uppercase();
        match first.as_str() {
            "BEGIN" => Some(Control::Begin),
            "COMMIT" | "END" => Some(Control::Commit),
            "SAVEPOINT" => savepoint_name(&words[1..]).map(Control::Savepoint),
            "RELEASE" => {
                let skip = if keyword(1, "SAVEPOINT") { 2 } else { 1 };
                savepoint_name(&words[skip..]).map(Control::Release)
            }
            "ROLLBACK" => {
                let mut idx = 1;
                if keyword(idx, "TRANSACTION") {
                    idx += 1;
                }
                if !keyword(idx, "TO") {
                    return Some(Control::Rollback);
                }
                idx += 1;
                if keyword(idx, "SAVEPOINT") {
                    idx += 1;
                }
                savepoint_name(&words[idx.min(words.len())..]).map(Control::RollbackTo)
            }
            _ => None,
        }
    }
}

fn savepoint_name(rest: &[&str]) -> Option<String> {
    match rest {
        [name] => Some(unquote(name).to_string()),
        _ => None,
    }
}

fn unquote(name: &str) -> &str {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(b'"'), Some(b'"')) | (Some(b'`'), Some(b'`')) | (Some(b'\''), Some(b'\''))
        | (Some(b'['), Some(b']'))
            if name.len() >= 2 =>
        {
            &name[1..name.len() - 1]
        }
        _ => name,
    }
}

/// Whether a statement can change the database and therefore needs journaling.
pub(crate) fn is_write(sql: &str) -> bool {
    let upper = collapse_whitespace(sql.trim()).to_ascii_uppercase();
    match upper.split(' ').next().unwrap_or_default() {
        "" | "SELECT" | "VALUES" | "EXPLAIN" => false,
        "WITH" => [" INSERT ", " UPDATE ", " DELETE ", " REPLACE "]
            .iter()
            .any(|keyword| upper.contains(keyword)),
        _ => true,
    }
}

/// A write executed inside the open transaction.
#[derive(Debug, Clone)]
pub(crate) struct JournalEntry {
    pub sql: String,
    pub params: Vec<turso::Value>,
}

#[derive(Debug)]
struct Mark {
    name: String,
    journal_len: usize,
    opened_transaction: bool,
}

/// What the worker must do after `ROLLBACK TO`.
pub(crate) struct Restore {
    pub begin_sql: String,
    pub replay: Vec<JournalEntry>,
}

/// Journaled writes and savepoint marks of the current transaction.
#[derive(Debug, Default)]
pub(crate) struct TransactionJournal {
    begin_sql: Option<String>,
    entries: Vec<JournalEntry>,
    savepoints: Vec<Mark>,
}

impl TransactionJournal {
    /// Forget everything; the transaction ended.
    pub(crate) fn clear(&mut self) {
        self.begin_sql = None;
        self.entries.clear();
        self.savepoints.clear();
    }

    pub(crate) fn begin(&mut self, begin_sql: &str) {
        self.clear();
        self.begin_sql = Some(begin_sql.to_string());
    }

    pub(crate) fn is_active(&self) -> bool {
        self.begin_sql.is_some()
    }

    pub(crate) fn savepoint_depth(&self) -> usize {
        self.savepoints.len()
    }

    pub(crate) fn record(&mut self, sql: String, params: Vec<turso::Value>) {
        if self.is_active() {
            self.entries.push(JournalEntry { sql, params });
        }
    }

    pub(crate) fn push_savepoint(&mut self, name: String, opened_transaction: bool) {
        self.savepoints.push(Mark {
            name,
            journal_len: self.entries.len(),
            opened_transaction,
        });
    }

    /// Innermost savepoint called `name`; SQLite matches names case-insensitively.
    fn find(&self, name: &str) -> Option<usize> {
        self.savepoints
            .iter()
            .rposition(|mark| mark.name.eq_ignore_ascii_case(name))
    }

    /// Drop `name` and every savepoint above it. Returns `Some(true)` when the savepoint
    /// opened the transaction, which must then be committed.
    pub(crate) fn release(&mut self, name: &str) -> Option<bool> {
        let idx = self.find(name)?;
        let opened = self.savepoints[idx].opened_transaction;
        self.savepoints.truncate(idx);
        Some(opened)
    }

    /// Discard the writes made after `name` was set. The savepoint itself stays open.
    pub(crate) fn rollback_to(&mut self, name: &str) -> Option<Restore> {
        let begin_sql = self.begin_sql.clone()?;
        let idx = self.find(name)?;
        self.savepoints.truncate(idx + 1);
        self.entries.truncate(self.savepoints[idx].journal_len);
        Some(Restore {
            begin_sql,
            replay: self.entries.clone(),
        })
    }
}
