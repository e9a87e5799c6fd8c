use crate::models::Question;
use crate::shuffle::{is_permutation, shuffle, shuffled_indices, IndexSource};
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUESTION_COUNT: usize = 20;

/// A question plus the order its choices are displayed in.
///
/// `permutation[d]` is the original index of the choice shown at display
/// position `d`. Absent when the question has fewer than two choices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShuffledQuestion {
    pub question: Question,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permutation: Option<Vec<usize>>,
}

impl ShuffledQuestion {
    pub fn unshuffled(question: Question) -> Self {
        Self { question, permutation: None }
    }

    pub fn choice_count(&self) -> usize {
        self.question.choices.len()
    }

    pub fn display_choices(&self) -> Vec<&str> {
        (0..self.choice_count())
            .filter_map(|d| self.choice_at(d))
            .collect()
    }

    pub fn choice_at(&self, display: usize) -> Option<&str> {
        let original = match &self.permutation {
            Some(perm) => *perm.get(display)?,
            None => display,
        };
        self.question.choices.get(original).map(String::as_str)
    }

    pub fn has_valid_permutation(&self) -> bool {
        match &self.permutation {
            Some(perm) => is_permutation(perm, self.choice_count()),
            None => true,
        }
    }
}

/// Picks up to `count` questions from `pool` without replacement and shuffles
/// the choices of each one.
pub fn randomize<S: IndexSource + ?Sized>(
    pool: &[Question],
    count: usize,
    source: &mut S,
) -> Vec<ShuffledQuestion> {
    let mut selected = shuffle(pool, source);
    selected.truncate(count);
    selected
        .into_iter()
        .map(|question| {
            let n = question.choices.len();
            let permutation = (n > 1).then(|| shuffled_indices(n, source));
            ShuffledQuestion { question, permutation }
        })
        .collect()
}
