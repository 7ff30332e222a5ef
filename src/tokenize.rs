//! Tokenization shared by the embedding model and query keyword extraction.
//!
//! Tokens are lowercased, stripped of non-word characters, and anything of
//! two characters or fewer is dropped. Stop words are only removed for
//! query keyword extraction; vocabulary building keeps them (their IDF
//! collapses toward zero on its own as they show up in every chunk).

/// Minimum token length kept by the tokenizer.
pub const MIN_TOKEN_LEN: usize = 3;

/// Stop words excluded from query keywords. Sorted for binary search.
const STOP_WORDS: &[&str] = &[
    "again", "and", "are", "been", "being", "but", "can", "could", "did",
    "does", "down", "else", "for", "further", "had", "has", "have", "her",
    "here", "hers", "him", "his", "how", "its", "just", "may", "might",
    "mine", "must", "now", "off", "once", "our", "ours", "out", "over",
    "shall", "she", "should", "than", "that", "the", "their", "theirs",
    "them", "then", "there", "these", "they", "this", "those", "too",
    "under", "very", "was", "were", "what", "when", "where", "which", "who",
    "whom", "why", "will", "with", "would", "you", "your", "yours",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Split text into normalized tokens.
///
/// Lowercases, treats any run of non-word characters as a separator, and
/// drops tokens shorter than [`MIN_TOKEN_LEN`].
///
/// # Examples
///
/// ```
/// use rulepedia::tokenize::tokenize;
///
/// let tokens = tokenize("Roll 2d10: the Difficulty is 6!");
/// assert_eq!(tokens, vec!["roll", "2d10", "the", "difficulty"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// Extract search keywords from a query: normalized tokens minus stop
/// words, deduplicated in first-appearance order.
pub fn query_keywords(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| !is_stop_word(t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_words_are_sorted() {
        for pair in STOP_WORDS.windows(2) {
            assert!(pair[0] < pair[1], "{} >= {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("Fire DAMAGE, ignites."),
            vec!["fire", "damage", "ignites"]
        );
    }

    #[test]
    fn drops_short_tokens() {
        assert_eq!(tokenize("a an to die"), vec!["die"]);
    }

    #[test]
    fn empty_text_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("!!! ... ??").is_empty());
    }

    #[test]
    fn keywords_exclude_stop_words() {
        let kw = query_keywords("what is the fire damage rule");
        assert_eq!(kw, vec!["fire", "damage", "rule"]);
    }

    #[test]
    fn keywords_are_deduplicated() {
        let kw = query_keywords("fire fire fire damage");
        assert_eq!(kw, vec!["fire", "damage"]);
    }

    #[test]
    fn query_of_only_stop_words_has_no_keywords() {
        assert!(query_keywords("what was that").is_empty());
    }
}
