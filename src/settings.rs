//! Default settings shared by the CLI and the reconciliation engine.

use std::time::Duration;

/// Column holding the source file name. Always the first input column by convention.
pub const FILENAME_COLUMN: &str = "filename";

/// Columns understood by the engine (other names are carried through untouched).
pub const AVAILABLE_COLUMNS: &[&str] = &[
    "filename", "query", "title", "year", "genre", "country", "director", "actor", "match",
];

/// Input/output columns used when `-c` is not given.
pub const DEFAULT_COLUMNS: &[&str] = &[
    "filename", "title", "year", "genre", "genre", "country", "country", "director", "actor",
    "actor", "match",
];

/// When all of these are filled in a record, no search is made.
pub const DEFAULT_SKIPPING_COLUMNS: &[&str] = &["director", "title", "year"];

/// Columns whose value is repeated on every row of a record instead of being consumed.
pub const FLAT_COLUMNS: &[&str] = &["title", "filename"];

/// Catalog request budget.
pub const CSFD_MAX_REQUESTS_PER_MINUTE: u32 = 60;

pub const CSFD_SEARCH_URL: &str = "https://www.csfd.cz/hledat/";

pub const CRAWLER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/81.0.4044.129 Safari/537.36";

pub const CSFD_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Built-in stop words stripped from file-name queries.
pub const DEFAULT_STOPWORDS: &str = include_str!("../assets/stopwords.txt");

/// Parse a comma-separated column list: trimmed, lower-cased, empty entries dropped.
/// Order and duplicates are kept.
pub fn parse_columns(value: &str) -> Vec<String> {
    value
        .trim()
        .to_lowercase()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Map a declared column name onto the field it reads from and writes to.
///
/// `raw_query` is an alias of `filename`, and numbered variants of the
/// multi-valued fields (`genre2`, `actor1`, ...) name the base field: each
/// declaration consumes the next stored value.
pub fn canonical_column(name: &str) -> &str {
    match name {
        "raw_query" => FILENAME_COLUMN,
        "genre1" | "genre2" => "genre",
        "country1" | "country2" => "country",
        "director1" | "director2" => "director",
        "actor1" | "actor2" => "actor",
        other => other,
    }
}

/// Declared columns the engine does not know; their cells are carried through
/// unchanged and never searched or filled.
pub fn unknown_columns(columns: &[String]) -> Vec<&str> {
    columns
        .iter()
        .map(String::as_str)
        .filter(|name| !AVAILABLE_COLUMNS.contains(&canonical_column(name)))
        .collect()
}

pub fn default_columns() -> Vec<String> {
    DEFAULT_COLUMNS.iter().map(|s| s.to_string()).collect()
}

pub fn default_skipping_columns() -> Vec<String> {
    DEFAULT_SKIPPING_COLUMNS.iter().map(|s| s.to_string()).collect()
}
