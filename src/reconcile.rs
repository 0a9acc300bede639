//! Record reconciliation engine.
//!
//! Each input record goes through
//! `Start -> (Skip | BuildQuery) -> (Drop | Search) -> (Match | Parse) -> Emit`.
//! Records are processed one at a time; the only blocking step is the
//! catalog call, which is always preceded by the rate limiter.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ConnectivityError};
use crate::models::{CandidateRecord, MergedRow, Outcome, Record, Stats};
use crate::normalize::{token_set, tokenize, StopWords};
use crate::projection::{project, RowSink};
use crate::scoring::{MatchScorer, PERFECT_MATCH};
use crate::settings::{default_columns, default_skipping_columns, FILENAME_COLUMN};
use crate::throttle::RateLimiter;

/// Per-run engine configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Output column order handed to the projector.
    pub columns: Vec<String>,
    /// When every one of these is filled, the record is passed through unsearched.
    pub skipping_columns: Vec<String>,
    /// Applied to file-name queries only.
    pub stopwords: StopWords,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            skipping_columns: default_skipping_columns(),
            stopwords: StopWords::default(),
        }
    }
}

/// How a run over an input stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Exhausted,
    /// The stop flag was raised; remaining records were not read.
    Interrupted,
}

/// Result of reconciling one record, before projection.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub outcome: Outcome,
    /// Query sent to the catalog; `None` for skipped and dropped records.
    pub query: Option<String>,
    pub rows: Vec<MergedRow>,
}

impl Reconciliation {
    fn new(outcome: Outcome, query: Option<String>, rows: Vec<MergedRow>) -> Self {
        Self {
            outcome,
            query,
            rows,
        }
    }
}

pub struct Reconciler<C: Catalog> {
    catalog: C,
    limiter: RateLimiter,
    scorer: MatchScorer,
    config: ReconcileConfig,
    stats: Stats,
}

impl<C: Catalog> Reconciler<C> {
    pub fn new(catalog: C, limiter: RateLimiter, config: ReconcileConfig) -> Self {
        Self {
            catalog,
            limiter,
            scorer: MatchScorer::new(),
            config,
            stats: Stats::default(),
        }
    }

    /// Replace the scorer (tests pin the current year this way).
    pub fn with_scorer(mut self, scorer: MatchScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn into_stats(self) -> Stats {
        self.stats
    }

    /// True when the skip list is non-empty and every listed column is filled.
    pub fn is_skipped(&self, record: &Record) -> bool {
        !self.config.skipping_columns.is_empty()
            && self
                .config
                .skipping_columns
                .iter()
                .all(|column| record.has_value(column))
    }

    /// Search query for a record, in priority order:
    /// explicit `query` verbatim, then title + year (+ director), then the
    /// file name without stop words. `None` when nothing usable remains.
    pub fn build_query(&self, record: &Record) -> Option<String> {
        if let Some(query) = record.first("query").filter(|q| !q.trim().is_empty()) {
            return Some(query.trim().to_string());
        }

        if record.has_value("title") && record.has_value("year") {
            let text = ["title", "year", "director"]
                .iter()
                .filter_map(|column| record.get(column))
                .flat_map(|field| field.iter())
                .collect::<Vec<_>>()
                .join(" ");
            let query = tokenize(&text, None).join(" ");
            if !query.is_empty() {
                return Some(query);
            }
        }

        if let Some(filename) = record.first(FILENAME_COLUMN) {
            let query = tokenize(filename, Some(&self.config.stopwords)).join(" ");
            if !query.is_empty() {
                return Some(query);
            }
        }

        None
    }

    /// Decide the outcome and the merged rows for one record.
    ///
    /// Connectivity failures are logged and turned into an unmodified
    /// passthrough row. Stats are not touched here.
    pub fn reconcile(&mut self, record: &Record) -> Reconciliation {
        if self.is_skipped(record) {
            debug!("skip columns filled, no search");
            let row = MergedRow::from_record(record).with_match(PERFECT_MATCH.to_string());
            return Reconciliation::new(Outcome::Skip, None, vec![row]);
        }

        let Some(query) = self.build_query(record) else {
            warn!(
                filename = record.first(FILENAME_COLUMN).unwrap_or_default(),
                "no usable query, record dropped"
            );
            return Reconciliation::new(Outcome::Drop, None, Vec::new());
        };

        let candidates = match self.search(&query) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(%query, error = %e, "catalog search failed, passing record through");
                let row = MergedRow::from_record(record);
                return Reconciliation::new(Outcome::Parse, Some(query), vec![row]);
            }
        };
        info!(%query, results = candidates.len(), "catalog search");

        let query_tokens = token_set(&query);
        let mut rows = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let score = self.scorer.score(&query_tokens, record, candidate);
            if score.is_perfect {
                debug!(title = %candidate.title, year = %candidate.year, "perfect match");
                let row = MergedRow::merge(record, candidate).with_match(score.match_value());
                return Reconciliation::new(Outcome::Match, Some(query), vec![row]);
            }
            debug!(
                title = %candidate.title,
                year = %candidate.year,
                similarity = score.similarity,
                "candidate added"
            );
            rows.push(MergedRow::merge(record, candidate).with_match(score.match_value()));
        }

        Reconciliation::new(Outcome::Parse, Some(query), rows)
    }

    /// Reconcile one record and write its rows to `sink`.
    ///
    /// All rows of the record are produced before the first one is written.
    pub fn process<S: RowSink>(&mut self, record: &Record, sink: &mut S) -> Result<Outcome> {
        self.stats.read += 1;
        let reconciliation = self.reconcile(record);
        self.stats.record_outcome(reconciliation.outcome);
        debug!(
            outcome = %reconciliation.outcome,
            query = reconciliation.query.as_deref().unwrap_or_default(),
            rows = reconciliation.rows.len(),
            "record reconciled"
        );

        for row in reconciliation.rows {
            let cells = project(row, &self.config.columns);
            debug!(?cells, "row written");
            sink.write_row(&cells)?;
            self.stats.write += 1;
        }
        Ok(reconciliation.outcome)
    }

    /// Process every row of a CSV input in order.
    ///
    /// `stop` is checked before each record is read and again once it has
    /// been read, so a record that has started is always written completely
    /// and a record read after the stop is discarded. `on_record` is called
    /// after each processed record.
    pub fn process_csv<R, S, F>(
        &mut self,
        reader: &mut csv::Reader<R>,
        sink: &mut S,
        stop: &AtomicBool,
        mut on_record: F,
    ) -> Result<RunEnd>
    where
        R: io::Read,
        S: RowSink,
        F: FnMut(Outcome),
    {
        let mut row = csv::StringRecord::new();
        loop {
            if stop.load(Ordering::SeqCst) {
                warn!(read = self.stats.read, "interrupted, no more records are read");
                return Ok(RunEnd::Interrupted);
            }
            if !reader.read_record(&mut row).context("Failed to read input row")? {
                return Ok(RunEnd::Exhausted);
            }
            // the read may have blocked on stdin while the stop was requested
            if stop.load(Ordering::SeqCst) {
                warn!(read = self.stats.read, "interrupted, last read record discarded");
                return Ok(RunEnd::Interrupted);
            }
            let line = row.position().map_or(self.stats.read + 1, |p| p.line());
            let cells: Vec<&str> = row.iter().collect();
            let record = Record::from_row(&self.config.columns, &cells, line)?;
            let outcome = self.process(&record, sink)?;
            on_record(outcome);
        }
    }

    fn search(&mut self, query: &str) -> Result<Vec<CandidateRecord>, ConnectivityError> {
        self.limiter.throttle();
        self.catalog.search(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::parse_stopwords;

    /// Catalog answering every query with the same candidates.
    struct FixedCatalog {
        candidates: Vec<CandidateRecord>,
        queries: Vec<String>,
    }

    impl Catalog for FixedCatalog {
        fn search(&mut self, query: &str) -> Result<Vec<CandidateRecord>, ConnectivityError> {
            self.queries.push(query.to_string());
            Ok(self.candidates.clone())
        }
    }

    fn reconciler(candidates: Vec<CandidateRecord>) -> Reconciler<FixedCatalog> {
        let catalog = FixedCatalog {
            candidates,
            queries: Vec::new(),
        };
        let config = ReconcileConfig {
            stopwords: parse_stopwords("dvdrip\ncz"),
            ..Default::default()
        };
        Reconciler::new(catalog, RateLimiter::per_minute(0), config)
            .with_scorer(MatchScorer::with_current_year(2026))
    }

    #[test]
    fn test_build_query_priority() {
        let engine = reconciler(Vec::new());

        let record = Record::new()
            .with("query", "Exact Query")
            .with("title", "Pelíšky")
            .with("year", "1999");
        assert_eq!(engine.build_query(&record).as_deref(), Some("Exact Query"));

        let record = Record::new()
            .with("filename", "x.avi")
            .with("title", "Pelíšky")
            .with("year", "1999")
            .with("director", "Jan Hřebejk");
        assert_eq!(engine.build_query(&record).as_deref(), Some("pelisky 1999 jan hrebejk"));

        // title without year falls through to the file name
        let record = Record::new()
            .with("filename", "Pelisky.CZ.DVDRip.avi")
            .with("title", "Pelíšky");
        assert_eq!(engine.build_query(&record).as_deref(), Some("pelisky"));
    }

    #[test]
    fn test_build_query_nothing_usable() {
        let engine = reconciler(Vec::new());
        assert_eq!(engine.build_query(&Record::new()), None);
        let record = Record::new().with("filename", "dvdrip.avi");
        assert_eq!(engine.build_query(&record), None);
    }

    #[test]
    fn test_is_skipped() {
        let engine = reconciler(Vec::new());
        let full = Record::new()
            .with("title", "Alien")
            .with("year", "1979")
            .with("director", "Ridley Scott");
        assert!(engine.is_skipped(&full));
        let partial = Record::new().with("title", "Alien").with("year", "1979");
        assert!(!engine.is_skipped(&partial));
    }

    #[test]
    fn test_empty_skip_list_never_skips() {
        let mut engine = reconciler(Vec::new());
        engine.config.skipping_columns.clear();
        assert!(!engine.is_skipped(&Record::new()));
    }

    #[test]
    fn test_empty_results_is_parse() {
        let mut engine = reconciler(Vec::new());
        let mut sink: Vec<Vec<String>> = Vec::new();
        let record = Record::new().with("filename", "Neznamy.Film.avi");
        let outcome = engine.process(&record, &mut sink).unwrap();
        assert_eq!(outcome, Outcome::Parse);
        assert!(sink.is_empty());
        assert_eq!(engine.stats().parse, 1);
        assert_eq!(engine.stats().write, 0);
        assert_eq!(engine.catalog.queries, vec!["neznamy film"]);
    }

    #[test]
    fn test_reconcile_reports_query() {
        let mut engine = reconciler(Vec::new());
        let record = Record::new().with("filename", "Neznamy.Film.CZ.avi");
        assert_eq!(engine.reconcile(&record).query.as_deref(), Some("neznamy film"));

        let curated = Record::new()
            .with("title", "Alien")
            .with("year", "1979")
            .with("director", "Ridley Scott");
        assert_eq!(engine.reconcile(&curated).query, None);
        assert_eq!(engine.reconcile(&Record::new()).query, None);
    }

    /// Raises the stop flag while the input is being read.
    struct StopWhileReading<'a> {
        input: &'a [u8],
        stop: &'a AtomicBool,
    }

    impl io::Read for StopWhileReading<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.stop.store(true, Ordering::SeqCst);
            io::Read::read(&mut self.input, buf)
        }
    }

    #[test]
    fn test_stop_during_read_discards_record() {
        let stop = AtomicBool::new(false);
        let input = StopWhileReading {
            input: b"Alien.1979.avi\n",
            stop: &stop,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(input);
        let mut engine = reconciler(Vec::new());
        let mut sink: Vec<Vec<String>> = Vec::new();
        let end = engine
            .process_csv(&mut reader, &mut sink, &stop, |_| {})
            .unwrap();
        assert_eq!(end, RunEnd::Interrupted);
        assert_eq!(engine.stats().read, 0);
        assert!(engine.catalog.queries.is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_drop_emits_nothing() {
        let mut engine = reconciler(Vec::new());
        let mut sink: Vec<Vec<String>> = Vec::new();
        let outcome = engine.process(&Record::new(), &mut sink).unwrap();
        assert_eq!(outcome, Outcome::Drop);
        assert!(sink.is_empty());
        assert!(engine.catalog.queries.is_empty());
        assert_eq!(engine.stats().drop, 1);
        assert_eq!(engine.stats().read, 1);
    }
}
