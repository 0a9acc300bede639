//! Text normalization for catalog queries and match scoring.
//!
//! Everything compared by the matcher goes through [`tokenize`], so the
//! query side and the catalog side always agree on folding and splitting.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// A base name followed by a 2-4 character extension: "Supersmradi.Mp4", "dir/film.avi".
pub static FILE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.+\.\w{2,4}$").unwrap());

/// Any maximal run of non-word characters.
pub static DIVIDERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]+").unwrap());

/// Set of (folded) stop words.
pub type StopWords = FxHashSet<String>;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lower-case ASCII.
/// e.g., "Příliš Žluťoučký" → "prilis zlutoucky"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Drop the directory part and the extension of a file-name-like string.
/// Input is expected to be folded already.
fn file_stem(source: &str) -> &str {
    let base = source.rsplit(['/', '\\']).next().unwrap_or(source);
    match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    }
}

// ============================================================================
// TOKENIZATION
// ============================================================================

/// Split free text into comparable tokens.
///
/// The trimmed text is folded to lower-case ASCII; a file-name-like input loses its
/// directory and extension; the rest is split on non-word runs. Tokens found
/// in `stopwords` are dropped. Order is kept and duplicates are not removed.
///
/// A text without word characters yields an empty vector.
pub fn tokenize(text: &str, stopwords: Option<&StopWords>) -> Vec<String> {
    let folded = fold_to_ascii(text.trim());
    let source = if FILE_NAME.is_match(&folded) {
        file_stem(&folded)
    } else {
        folded.as_str()
    };

    DIVIDERS
        .split(source)
        .filter(|t| !t.is_empty())
        .filter(|t| stopwords.map_or(true, |sw| !sw.contains(*t)))
        .map(str::to_string)
        .collect()
}

/// Tokenize and collect into a set.
pub fn token_set(text: &str) -> FxHashSet<String> {
    tokenize(text, None).into_iter().collect()
}

/// Build a stop-word set from newline-separated text. Blank lines are ignored
/// and every word is folded the same way tokens are.
pub fn parse_stopwords(text: &str) -> StopWords {
    text.lines()
        .map(|line| fold_to_ascii(line.trim()))
        .filter(|w| !w.is_empty())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Fantomas se zlobí"), "fantomas se zlobi");
        assert_eq!(fold_to_ascii("Malí Géniové"), "mali geniove");
        assert_eq!(fold_to_ascii("ŽÁNR"), "zanr");
    }

    #[test]
    fn test_tokenize_strips_extension() {
        assert_eq!(tokenize("Supersmradi.Mp4", None), vec!["supersmradi"]);
        assert_eq!(tokenize("/data/films/Alien.1979.mkv", None), vec!["alien", "1979"]);
        assert_eq!(tokenize(r"C:\films\Pelíšky.avi", None), vec!["pelisky"]);
    }

    #[test]
    fn test_tokenize_ignores_surrounding_whitespace() {
        assert_eq!(tokenize("  Alien.1979.mkv \t", None), vec!["alien", "1979"]);
    }

    #[test]
    fn test_tokenize_plain_text() {
        assert_eq!(
            tokenize("Supersmradi - Malí Géniové 2", None),
            vec!["supersmradi", "mali", "geniove", "2"]
        );
        // Not a file name: the part after the dot is too long
        assert_eq!(tokenize("Mr. Bean's Holiday", None), vec!["mr", "bean", "s", "holiday"]);
    }

    #[test]
    fn test_tokenize_keeps_duplicates_and_order() {
        assert_eq!(tokenize("a b a", None), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_tokenize_no_word_characters() {
        assert!(tokenize("--- ...", None).is_empty());
        assert!(tokenize("", None).is_empty());
    }

    #[test]
    fn test_tokenize_with_stopwords() {
        let stopwords = parse_stopwords("dvdrip\nCZ\n\n");
        assert_eq!(
            tokenize("Pelisky.CZ.DVDRip.XviD.avi", Some(&stopwords)),
            vec!["pelisky", "xvid"]
        );
    }

    #[test]
    fn test_parse_stopwords_folds() {
        let stopwords = parse_stopwords("  Titulky \nČeský\n");
        assert!(stopwords.contains("titulky"));
        assert!(stopwords.contains("cesky"));
        assert_eq!(stopwords.len(), 2);
    }

    #[test]
    fn test_token_set() {
        let set = token_set("Alien alien 1979");
        assert_eq!(set.len(), 2);
        assert!(set.contains("alien"));
    }
}
