//! Deterministic hashing of SQL text for callers that build their own cache keys.
//!
//! The statement cache itself keys on the literal SQL string; these helpers exist for
//! callers who want whitespace-insensitive keys and are willing to normalise first.

use crate::sql_text::collapse_whitespace;

const DJB2_SEED: u32 = 5381;

/// djb2 over the UTF-16 code units of `input` (`hash * 33 + unit`, wrapping at 32 bits).
#[must_use]
pub fn djb2_hash(input: &str) -> u32 {
    input.encode_utf16().fold(DJB2_SEED, |hash, unit| {
        hash.wrapping_mul(33).wrapping_add(u32::from(unit))
    })
}

/// Normalise SQL text: whitespace and comments outside literals collapse to one space,
/// leading/trailing space and trailing `;` are removed. Literal contents are untouched.
#[must_use]
pub fn normalize_sql(sql: &str) -> String {
    collapse_whitespace(sql)
}

/// Key derived from normalised SQL: the djb2 hash in hex plus the normalised length.
///
/// Pairing the hash with the length makes accidental collisions between common statements
/// far less likely than the 32-bit hash alone.
#[must_use]
pub fn sql_cache_key(sql: &str) -> String {
    let normalized = normalize_sql(sql);
    format!("{:08x}:{}", djb2_hash(&normalized), normalized.encode_utf16().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn djb2_matches_known_values() {
        assert_eq!(djb2_hash(""), 5381);
        // 5381 * 33 + 'a'
        assert_eq!(djb2_hash("a"), 177_670);
        assert_eq!(djb2_hash("SELECT 1"), djb2_hash("SELECT 1"));
    }

    #[test]
    fn djb2_wraps_instead_of_overflowing() {
        let long = "x".repeat(10_000);
        assert_eq!(djb2_hash(&long), djb2_hash(&long));
    }

    #[test]
    fn distinct_statements_get_distinct_keys() {
        let statements = [
            "SELECT * FROM symbols",
            "SELECT * FROM symbols WHERE id = ?",
            "SELECT * FROM files",
            "INSERT INTO symbols (name) VALUES (?)",
            "DELETE FROM symbols WHERE id = ?",
            "UPDATE symbols SET name = ? WHERE id = ?",
            "SELECT count(*) FROM symbols",
            "SELECT name FROM symbols ORDER BY name",
        ];
        let keys: HashSet<String> = statements.iter().map(|s| sql_cache_key(s)).collect();
        assert_eq!(keys.len(), statements.len());
    }

    #[test]
    fn whitespace_variants_share_a_key() {
        assert_eq!(
            sql_cache_key("SELECT *\n  FROM t;"),
            sql_cache_key("SELECT * FROM t")
        );
        assert_ne!(sql_cache_key("SELECT 'a  b'"), sql_cache_key("SELECT 'a b'"));
    }
}
