//! Allow-list validation for anything that is spliced into SQL text.
//!
//! Identifiers (tables, columns, schemas, roles), interval literals and index
//! methods cannot be bound as parameters, so they are checked here before
//! interpolation. Data values never go through this module: they are always
//! bound.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();
static INTERVAL_RE: OnceLock<Regex> = OnceLock::new();

fn identifier_regex() -> &'static Regex {
    IDENTIFIER_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

fn interval_regex() -> &'static Regex {
    INTERVAL_RE.get_or_init(|| {
        Regex::new(r"(?i)^[0-9]+\s+(second|minute|hour|day|week|month|year)s?$")
            .expect("valid regex")
    })
}

/// Rejection of an identifier, interval or index method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// An empty identifier.
    #[error("Identifier cannot be empty")]
    Empty,

    /// An identifier outside the allowed character set.
    #[error(
        "Invalid identifier: {0:?}. Must start with a letter or underscore and contain only letters, digits, and underscores."
    )]
    Invalid(String),

    /// An empty interval string.
    #[error("Interval cannot be empty")]
    EmptyInterval,

    /// An interval that is not `<number> <unit>`.
    #[error(
        "Invalid interval: {0:?}. Expected format: '<number> <unit>' where unit is second, minute, hour, day, week, month, or year."
    )]
    InvalidInterval(String),

    /// An index method outside the supported set.
    #[error("Invalid index method: {0:?}. Must be one of: {methods}", methods = IndexMethod::NAMES_SORTED.join(", "))]
    InvalidIndexMethod(String),
}

/// Validates a SQL identifier and hands it back unchanged.
///
/// No case folding, quoting or reserved-word check is done.
pub fn validate_identifier(name: &str) -> Result<&str, IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if !identifier_regex().is_match(name) {
        return Err(IdentifierError::Invalid(name.to_string()));
    }
    Ok(name)
}

/// Validates several identifiers at once. `None` entries are skipped.
pub fn validate_identifiers(names: &[Option<&str>]) -> Result<(), IdentifierError> {
    for name in names.iter().flatten() {
        validate_identifier(name)?;
    }
    Ok(())
}

/// Validates a Postgres interval literal such as `"7 days"` or `"1 WEEK"`.
///
/// Returns the trimmed interval, which is what gets interpolated.
pub fn validate_interval(interval: &str) -> Result<&str, IdentifierError> {
    if interval.is_empty() {
        return Err(IdentifierError::EmptyInterval);
    }
    let trimmed = interval.trim();
    if !interval_regex().is_match(trimmed) {
        return Err(IdentifierError::InvalidInterval(interval.to_string()));
    }
    Ok(trimmed)
}

/// Validates an index access method name, case-insensitively.
pub fn validate_index_method(method: &str) -> Result<IndexMethod, IdentifierError> {
    method.parse()
}

/// Postgres index access methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexMethod {
    /// B-tree, the default
    #[default]
    Btree,
    /// Hash
    Hash,
    /// GiST
    Gist,
    /// SP-GiST
    Spgist,
    /// GIN
    Gin,
    /// BRIN
    Brin,
}

impl IndexMethod {
    const NAMES_SORTED: [&'static str; 6] = ["brin", "btree", "gin", "gist", "hash", "spgist"];

    /// Lowercase name as used after `USING`.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMethod::Btree => "btree",
            IndexMethod::Hash => "hash",
            IndexMethod::Gist => "gist",
            IndexMethod::Spgist => "spgist",
            IndexMethod::Gin => "gin",
            IndexMethod::Brin => "brin",
        }
    }
}

impl FromStr for IndexMethod {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "btree" => Ok(IndexMethod::Btree),
            "hash" => Ok(IndexMethod::Hash),
            "gist" => Ok(IndexMethod::Gist),
            "spgist" => Ok(IndexMethod::Spgist),
            "gin" => Ok(IndexMethod::Gin),
            "brin" => Ok(IndexMethod::Brin),
            _ => Err(IdentifierError::InvalidIndexMethod(s.to_string())),
        }
    }
}

impl fmt::Display for IndexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quotes a string literal by doubling single quotes.
///
/// Prefer bound parameters; this is for the few places Postgres only accepts
/// a literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
