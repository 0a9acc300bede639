//! Core data models for movie record reconciliation.
//!
//! This module contains the field container, the input record, the catalog
//! candidate, the merged output row and the run statistics.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::settings::canonical_column;

// ============================================================================
// Field Values
// ============================================================================

/// Maximum number of values kept per field (`<field>` and `<field>2`).
pub const FIELD_CAPACITY: usize = 2;

/// Small ordered sequence of values for one field.
///
/// Holds at most [`FIELD_CAPACITY`] values; anything pushed past that is
/// dropped. Values are consumed front-first by the row projector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldValues {
    values: Vec<String>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the first [`FIELD_CAPACITY`] values, keeping empty strings out.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::new();
        for value in values {
            field.push(value);
        }
        field
    }

    pub fn single(value: impl Into<String>) -> Self {
        Self::from_values([value])
    }

    /// Append a value. Returns `false` when the value was empty or the field is full.
    pub fn push(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.is_empty() || self.values.len() >= FIELD_CAPACITY {
            return false;
        }
        self.values.push(value);
        true
    }

    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// Remove and return the first value.
    pub fn pop_front(&mut self) -> Option<String> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

// ============================================================================
// Input Record
// ============================================================================

/// Errors raised while turning an input row into a [`Record`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The row has more fields than there are declared columns.
    #[error("input row {line} has {found} fields but only {expected} columns are declared")]
    TooManyFields {
        expected: usize,
        found: usize,
        line: u64,
    },
}

/// One input row keyed by canonical column name.
///
/// Repeated column declarations accumulate into the same field in
/// declaration order. Empty cells are not stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    fields: FxHashMap<String, FieldValues>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from one input row using the declared column list.
    ///
    /// Rows shorter than the column list are accepted (trailing columns are
    /// absent). Rows longer than the column list are malformed.
    pub fn from_row<S: AsRef<str>>(
        columns: &[String],
        row: &[S],
        line: u64,
    ) -> Result<Self, RecordError> {
        if row.len() > columns.len() {
            return Err(RecordError::TooManyFields {
                expected: columns.len(),
                found: row.len(),
                line,
            });
        }

        let mut record = Self::new();
        for (column, cell) in columns.iter().zip(row) {
            record.push(column, cell.as_ref());
        }
        Ok(record)
    }

    /// Add a value to the field named by `column` (canonicalised).
    ///
    /// The value is stored as given; blank cells are not stored.
    pub fn push(&mut self, column: &str, value: &str) {
        let field = self.fields.entry(canonical_column(column).to_string()).or_default();
        if !value.trim().is_empty() {
            field.push(value);
        }
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.push(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValues> {
        self.fields.get(canonical_column(column))
    }

    /// First stored value of a field.
    pub fn first(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FieldValues::first)
    }

    /// True when the field holds at least one non-empty value.
    pub fn has_value(&self, column: &str) -> bool {
        self.get(column).is_some_and(|f| !f.is_empty())
    }
}

// ============================================================================
// Catalog Candidate
// ============================================================================

/// One search result as returned by the catalog client.
///
/// Multi-valued source data is already split into primary and secondary values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateRecord {
    pub title: String,
    pub genre: String,
    pub genre2: String,
    pub country: String,
    pub country2: String,
    pub director: String,
    pub actor: String,
    pub actor2: String,
    pub year: String,
}

impl CandidateRecord {
    /// All candidate values in field order.
    pub fn values(&self) -> [&str; 9] {
        [
            self.title.as_str(),
            self.genre.as_str(),
            self.genre2.as_str(),
            self.country.as_str(),
            self.country2.as_str(),
            self.director.as_str(),
            self.actor.as_str(),
            self.actor2.as_str(),
            self.year.as_str(),
        ]
    }

    /// Candidate data grouped into record fields.
    pub fn fields(&self) -> [(&'static str, FieldValues); 6] {
        [
            ("title", FieldValues::single(self.title.as_str())),
            ("year", FieldValues::single(self.year.as_str())),
            ("genre", FieldValues::from_values([self.genre.as_str(), self.genre2.as_str()])),
            (
                "country",
                FieldValues::from_values([self.country.as_str(), self.country2.as_str()]),
            ),
            ("director", FieldValues::single(self.director.as_str())),
            ("actor", FieldValues::from_values([self.actor.as_str(), self.actor2.as_str()])),
        ]
    }
}

// ============================================================================
// Merged Output Row
// ============================================================================

/// A record combined with (at most) one candidate and a final `match` value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergedRow {
    fields: FxHashMap<String, FieldValues>,
}

impl MergedRow {
    /// The record alone, unmodified.
    pub fn from_record(record: &Record) -> Self {
        Self {
            fields: record.fields.clone(),
        }
    }

    /// Field-wise union of a record and a candidate.
    ///
    /// Every catalog field of the candidate replaces the record's field of the
    /// same name, even when the candidate has no value for it.
    pub fn merge(record: &Record, candidate: &CandidateRecord) -> Self {
        let mut row = Self::from_record(record);
        for (name, values) in candidate.fields() {
            row.fields.insert(name.to_string(), values);
        }
        row
    }

    /// Replace the `match` field.
    pub fn with_match(mut self, value: impl Into<String>) -> Self {
        self.fields.insert("match".to_string(), FieldValues::single(value));
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValues> {
        self.fields.get(canonical_column(column))
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut FieldValues> {
        self.fields.get_mut(canonical_column(column))
    }

    pub fn first(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FieldValues::first)
    }
}

// ============================================================================
// Outcomes and Statistics
// ============================================================================

/// Terminal outcome of one input record. Exactly one per record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// All skip columns were filled; no search.
    Skip,
    /// No usable query could be built; nothing emitted.
    Drop,
    /// A perfect candidate was found.
    Match,
    /// Candidates were listed (or the catalog was unreachable).
    Parse,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Skip => "skip",
            Outcome::Drop => "drop",
            Outcome::Match => "match",
            Outcome::Parse => "parse",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run counters. `read` and one outcome counter move once per record,
/// `write` once per emitted row.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub read: u64,
    pub write: u64,
    pub parse: u64,
    #[serde(rename = "match")]
    pub matched: u64,
    pub skip: u64,
    pub drop: u64,
}

impl Stats {
    pub fn record_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skip => self.skip += 1,
            Outcome::Drop => self.drop += 1,
            Outcome::Match => self.matched += 1,
            Outcome::Parse => self.parse += 1,
        }
    }

    /// Sum of the outcome counters; equals `read` once every record finished.
    pub fn outcomes(&self) -> u64 {
        self.skip + self.drop + self.matched + self.parse
    }

    pub fn rows(&self) -> [(&'static str, u64); 6] {
        [
            ("read", self.read),
            ("write", self.write),
            ("parse", self.parse),
            ("match", self.matched),
            ("skip", self.skip),
            ("drop", self.drop),
        ]
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.rows() {
            writeln!(f, "  {:<8}{:>10}", name, value)?;
        }
        Ok(())
    }
}
