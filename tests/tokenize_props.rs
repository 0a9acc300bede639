//! Property tests for the tokenizer.

use movies_metadata::normalize::{parse_stopwords, tokenize};
use proptest::prelude::*;

fn title_like() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-zA-Z0-9]{1,8}",
            Just("Pelíšky".to_string()),
            Just("Žluťoučký".to_string()),
            Just("Malí".to_string()),
            Just("dvdrip".to_string()),
            Just("CZ".to_string()),
        ],
        0..6,
    )
    .prop_flat_map(|words| {
        (Just(words), prop_oneof![Just(" "), Just("."), Just(" - "), Just("_")])
    })
    .prop_map(|(words, sep)| words.join(sep))
}

proptest! {
    #[test]
    fn test_tokenize_is_idempotent(text in title_like()) {
        let tokens = tokenize(&text, None);
        prop_assert_eq!(tokenize(&tokens.join(" "), None), tokens);
    }

    #[test]
    fn test_tokenize_arbitrary_input_is_idempotent(text in "\\PC{0,40}") {
        let tokens = tokenize(&text, None);
        let again = tokenize(&tokens.join(" "), None);
        prop_assert_eq!(again, tokens);
    }

    #[test]
    fn test_stopwords_only_remove_tokens(text in title_like()) {
        let stopwords = parse_stopwords("dvdrip\ncz\nmali");
        let all = tokenize(&text, None);
        let filtered = tokenize(&text, Some(&stopwords));
        for token in &filtered {
            prop_assert!(all.contains(token));
            prop_assert!(!stopwords.contains(token));
        }
    }
}
