//! Levenshtein distance and the bounded similarity derived from it.

use crate::text::normalize;

/// Unit-cost edit distance (insert, delete, substitute; no transposition) over chars.
///
/// Operates on the strings as given; [`similarity`] normalizes first.
pub fn distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    char_distance(&a, &b)
}

fn char_distance(a: &[char], b: &[char]) -> usize {
    // Rows walk `b`, columns walk `a`; only the previous row is kept.
    let mut previous: Vec<usize> = (0..=a.len()).collect();
    let mut current = vec![0; a.len() + 1];

    for (j, b_char) in b.iter().enumerate() {
        current[0] = j + 1;
        for (i, a_char) in a.iter().enumerate() {
            let substitution = previous[i] + usize::from(a_char != b_char);
            current[i + 1] = (previous[i + 1] + 1)
                .min(current[i] + 1)
                .min(substitution);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[a.len()]
}

/// `1 - distance / max(len)` over normalized forms, in `[0, 1]`.
///
/// Both empty scores 1, exactly one empty scores 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }

    let longest = a.len().max(b.len());
    #[allow(clippy::cast_precision_loss)]
    let score = 1.0 - char_distance(&a, &b) as f64 / longest as f64;
    score.clamp(0.0, 1.0)
}
