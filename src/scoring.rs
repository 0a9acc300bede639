//! Match scoring between an input record and a catalog candidate.
//!
//! A candidate gets a fuzzy title similarity (0-99) and a perfect-match
//! verdict. Perfect matches are reported as 100.

use chrono::Datelike;
use rustc_hash::FxHashSet;
use strsim::jaro_winkler;

use crate::models::{CandidateRecord, Record};
use crate::normalize::{fold_to_ascii, tokenize};

// ============================================================================
// Score Thresholds
// ============================================================================

/// Year of the first motion picture; older "years" are treated as noise.
pub const FIRST_MOVIE_YEAR: i32 = 1878;

/// Match value of a verified perfect match.
pub const PERFECT_MATCH: u8 = 100;

/// Highest value a fuzzy similarity can reach.
pub const MAX_SIMILARITY: u8 = 99;

/// Single-digit tokens are left out of the comparison (sequel numbers etc.).
const DIGIT_TOKENS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

// ============================================================================
// Match Score
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchScore {
    /// Rounded Jaro-Winkler similarity of query and title, 0-99.
    pub similarity: u8,
    pub is_perfect: bool,
}

impl MatchScore {
    /// Value written to the `match` column.
    pub fn match_value(&self) -> String {
        if self.is_perfect {
            PERFECT_MATCH.to_string()
        } else {
            self.similarity.to_string()
        }
    }
}

/// Similarity of two strings as a rounded percentage capped at [`MAX_SIMILARITY`].
pub fn similarity_pct(a: &str, b: &str) -> u8 {
    let pct = (jaro_winkler(a, b) * 100.0).round() as u8;
    pct.min(MAX_SIMILARITY)
}

fn sorted_join<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    let mut tokens: Vec<&str> = tokens.collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens.join(" ")
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores candidates against a record. The current year bounds plausible
/// release years.
#[derive(Debug, Clone)]
pub struct MatchScorer {
    current_year: i32,
}

impl Default for MatchScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchScorer {
    pub fn new() -> Self {
        Self::with_current_year(chrono::Local::now().year())
    }

    pub fn with_current_year(current_year: i32) -> Self {
        Self { current_year }
    }

    /// True for a numeric year in `[FIRST_MOVIE_YEAR, current_year)`.
    pub fn is_plausible_year(&self, year: &str) -> bool {
        !year.is_empty()
            && year.chars().all(|c| c.is_ascii_digit())
            && year
                .parse::<i32>()
                .is_ok_and(|y| (FIRST_MOVIE_YEAR..self.current_year).contains(&y))
    }

    /// Score one candidate.
    ///
    /// Perfect when either
    /// - the candidate year is shared by query and candidate, is plausible,
    ///   and every query token appears among the candidate tokens; or
    /// - title and year both equal the record's own values.
    pub fn score(
        &self,
        query_tokens: &FxHashSet<String>,
        record: &Record,
        candidate: &CandidateRecord,
    ) -> MatchScore {
        let mut result_tokens: FxHashSet<String> = tokenize(&candidate.values().join(" "), None)
            .into_iter()
            .collect();

        // the record's previous score must not match itself
        if let Some(previous) = record.first("match") {
            for token in tokenize(previous, None) {
                result_tokens.remove(&token);
            }
        }

        let mut query_tokens = query_tokens.clone();
        for digit in DIGIT_TOKENS {
            query_tokens.remove(digit);
            result_tokens.remove(digit);
        }

        let year = fold_to_ascii(candidate.year.trim());

        let query_string = sorted_join(
            query_tokens
                .iter()
                .map(String::as_str)
                .filter(|t| *t != year),
        );
        let title_tokens = tokenize(&candidate.title, None);
        let title_string = sorted_join(title_tokens.iter().map(String::as_str));
        let similarity = similarity_pct(&query_string, &title_string);

        let shared_year = query_tokens.contains(&year) && result_tokens.contains(&year);
        let explained = shared_year
            && self.is_plausible_year(&year)
            && query_tokens.is_subset(&result_tokens);

        let curated = !candidate.title.is_empty()
            && !candidate.year.is_empty()
            && record.first("title").map(str::trim) == Some(candidate.title.as_str())
            && record.first("year").map(str::trim) == Some(candidate.year.as_str());

        MatchScore {
            similarity,
            is_perfect: explained || curated,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::token_set;

    fn scorer() -> MatchScorer {
        MatchScorer::with_current_year(2026)
    }

    fn fantomas() -> CandidateRecord {
        CandidateRecord {
            title: "Fantomas".into(),
            genre: "Komedie".into(),
            genre2: "Krimi".into(),
            country: "Francie".into(),
            country2: "Itálie".into(),
            director: "André Hunebelle".into(),
            actor: "Jean Marais".into(),
            actor2: "Louis de Funès".into(),
            year: "1964".into(),
        }
    }

    #[test]
    fn test_curated_record_is_perfect() {
        let record = Record::new().with("title", "Fantomas").with("year", "1964");
        let score = scorer().score(&token_set("unrelated words"), &record, &fantomas());
        assert!(score.is_perfect);
        assert_eq!(score.match_value(), "100");
    }

    #[test]
    fn test_curated_record_ignores_cell_padding() {
        let record = Record::new().with("title", " Fantomas ").with("year", "1964 ");
        let score = scorer().score(&token_set("unrelated"), &record, &fantomas());
        assert!(score.is_perfect);
    }

    #[test]
    fn test_explained_query_is_perfect() {
        let record = Record::new().with("filename", "fantomas.1964.avi");
        let score = scorer().score(&token_set("fantomas 1964 hunebelle"), &record, &fantomas());
        assert!(score.is_perfect);
    }

    #[test]
    fn test_unexplained_token_is_not_perfect() {
        let record = Record::new();
        let score = scorer().score(&token_set("fantomas 1964 bond"), &record, &fantomas());
        assert!(!score.is_perfect);
        assert!(score.similarity <= MAX_SIMILARITY);
    }

    #[test]
    fn test_year_must_be_shared() {
        let record = Record::new();
        let score = scorer().score(&token_set("fantomas"), &record, &fantomas());
        assert!(!score.is_perfect);
    }

    #[test]
    fn test_future_year_is_not_plausible() {
        let candidate = CandidateRecord {
            title: "Avatar".into(),
            year: "2026".into(),
            ..Default::default()
        };
        let score = scorer().score(&token_set("avatar 2026"), &Record::new(), &candidate);
        assert!(!score.is_perfect);
        assert!(scorer().is_plausible_year("2025"));
        assert!(!scorer().is_plausible_year("1877"));
        assert!(!scorer().is_plausible_year("19a4"));
    }

    #[test]
    fn test_single_digits_are_ignored() {
        // "2" is absent from the candidate but dropped before the subset check
        let candidate = CandidateRecord {
            title: "Supersmradi".into(),
            year: "1997".into(),
            ..Default::default()
        };
        let score = scorer().score(&token_set("supersmradi 2 1997"), &Record::new(), &candidate);
        assert!(score.is_perfect);
    }

    #[test]
    fn test_previous_match_value_is_not_counted() {
        // query token "87" only occurs as the record's old match value
        let candidate = CandidateRecord {
            title: "Alien 87".into(),
            year: "1979".into(),
            ..Default::default()
        };
        let record = Record::new().with("match", "87");
        let score = scorer().score(&token_set("alien 87 1979"), &record, &candidate);
        assert!(!score.is_perfect);
    }

    #[test]
    fn test_similarity_is_capped() {
        let candidate = CandidateRecord {
            title: "Alien".into(),
            year: "1979".into(),
            ..Default::default()
        };
        let score = scorer().score(&token_set("alien 1979"), &Record::new(), &candidate);
        assert_eq!(score.similarity, MAX_SIMILARITY);
        assert!(score.is_perfect);
        assert_eq!(score.match_value(), "100");
    }

    #[test]
    fn test_similarity_pct() {
        assert_eq!(similarity_pct("alien", "alien"), 99);
        assert_eq!(similarity_pct("abc", "xyz"), 0);
        assert!(similarity_pct("pelisky", "pelicky") > 80);
    }
}
