use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Score awarded when one normalized description contains the other as whole words.
const CONTAINMENT_SCORE: f64 = 0.9;

/// Lowercases, strips diacritics, turns punctuation into spaces and collapses whitespace.
pub fn normalize_description(value: &str) -> String {
    let folded: String = value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity in [0, 1] between two descriptions after normalization.
pub fn description_similarity(left: &str, right: &str) -> f64 {
    let left = normalize_description(left);
    let right = normalize_description(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    if left == right {
        return 1.0;
    }

    let jaro = strsim::jaro_winkler(&left, &right);
    let containment = if contains_words(&left, &right) || contains_words(&right, &left) {
        CONTAINMENT_SCORE
    } else {
        0.0
    };
    jaro.max(containment)
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    if needle.len() < 3 {
        return false;
    }
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}
