use crate::error::QuizError;
use crate::randomizer::ShuffledQuestion;

/// Translates a display index into the original index the validation service
/// knows about.
pub fn to_original_index(question: &ShuffledQuestion, display: usize) -> Result<usize, QuizError> {
    match &question.permutation {
        Some(perm) => perm.get(display).copied().ok_or_else(|| {
            QuizError::Invariant(format!(
                "display index {display} out of range for question {} with {} choices",
                question.question.id,
                perm.len()
            ))
        }),
        None if question.choice_count() == 0 || display < question.choice_count() => Ok(display),
        None => Err(QuizError::Invariant(format!(
            "display index {display} out of range for question {} with {} choices",
            question.question.id,
            question.choice_count()
        ))),
    }
}
