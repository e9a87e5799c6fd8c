use crate::session::QuizSession;
use serde::{Deserialize, Serialize};

/// Minimum share of correct answers, in percent, for a passed outcome.
pub const DEFAULT_PASS_PERCENT: u32 = 70;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub score: usize,
    pub total: usize,
    pub answered: usize,
    pub percentage: u32,
    pub outcome: Outcome,
    /// Ids of questions answered incorrectly, in session order.
    pub missed: Vec<i64>,
}

/// `round(100 * score / total)`, halves rounded up.
pub fn percentage(score: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((200 * score + total) / (2 * total)) as u32
}

pub fn passes(score: usize, total: usize, pass_percent: u32) -> bool {
    total > 0 && score * 100 >= total * pass_percent as usize
}

pub fn summarize(session: &QuizSession, pass_percent: u32) -> ScoreSummary {
    let total = session.questions.len();
    let missed = session
        .questions
        .iter()
        .zip(&session.results)
        .filter(|(_, result)| **result == Some(false))
        .map(|(q, _)| q.question.id)
        .collect();
    ScoreSummary {
        score: session.score,
        total,
        answered: session.answered_count(),
        percentage: percentage(session.score, total),
        outcome: if passes(session.score, total, pass_percent) {
            Outcome::Passed
        } else {
            Outcome::Failed
        },
        missed,
    }
}
