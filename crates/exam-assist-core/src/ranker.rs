//! Brute-force fuzzy ranking of the cached corpus.
//!
//! Every call scores every item, so cost grows with corpus size times text length.
//! That is fine for an exam bank of a few thousand questions; anything larger
//! wants an index in front of this.

use exam_assist_client::types::QuestionItem;

use crate::{scoring::similarity, state::SuggestedQuestion, text::normalize};

pub const DEFAULT_THRESHOLD: f64 = 0.4;
pub const DEFAULT_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankOptions {
    /// Items scoring below this are dropped.
    pub threshold: f64,
    pub limit: usize,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Closest corpus questions to `query`, best first, ties in corpus order.
pub fn rank(query: &str, corpus: &[QuestionItem], options: RankOptions) -> Vec<SuggestedQuestion> {
    if corpus.is_empty() || normalize(query).is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<SuggestedQuestion> = corpus
        .iter()
        .map(|item| SuggestedQuestion {
            text: item.text.clone(),
            similarity: similarity(query, &item.text),
        })
        .filter(|suggestion| suggestion.similarity >= options.threshold)
        .collect();

    // `sort_by` is stable, which keeps corpus order between equal scores.
    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    ranked.truncate(options.limit);
    ranked
}
