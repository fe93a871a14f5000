//! Orthographic normalization of Arabic question text.
//!
//! Rules run in a fixed order; later rules assume tashkeel and tatweel are gone:
//! 1. strip tashkeel (U+064B..=U+065F) and the superscript alif (U+0670)
//! 2. fold alif with madda / hamza above / hamza below to bare alif
//! 3. fold alif maqsura to ya
//! 4. strip tatweel
//! 5. trim surrounding whitespace and lowercase

const SUPERSCRIPT_ALIF: char = '\u{0670}';
const TATWEEL: char = '\u{0640}';
const BARE_ALIF: char = '\u{0627}';
const ALIF_MAQSURA: char = '\u{0649}';
const YA: char = '\u{064A}';

fn is_tashkeel(ch: char) -> bool {
    matches!(ch, '\u{064B}'..='\u{065F}') || ch == SUPERSCRIPT_ALIF
}

fn fold_alif(ch: char) -> char {
    match ch {
        // madda, hamza above, hamza below
        '\u{0622}' | '\u{0623}' | '\u{0625}' => BARE_ALIF,
        other => other,
    }
}

fn fold_maqsura(ch: char) -> char {
    if ch == ALIF_MAQSURA {
        YA
    } else {
        ch
    }
}

/// Canonical comparison form of `text`. Pure and idempotent.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .filter(|ch| !is_tashkeel(*ch))
        .map(fold_alif)
        .map(fold_maqsura)
        .filter(|ch| *ch != TATWEEL)
        .collect();
    folded.trim().to_lowercase()
}
