use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    OpenEnded,
}

/// A question as stored in a content module. `correct_answer_index` points into
/// the original, unshuffled `choices`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub topic: String,
    #[serde(rename = "type")]
    pub q_type: QuestionType,
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Copy of the question without the answer key, as served to clients.
    pub fn public_view(&self) -> Question {
        Question {
            correct_answer_index: None,
            explanation: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// One static content file: a titled pool of questions for a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentModule {
    #[serde(skip)]
    pub module: String,
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub issue: String,
}

pub fn validate_pool(questions: &[Question]) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let mut ids = HashSet::new();

    for (i, q) in questions.iter().enumerate() {
        if !ids.insert(q.id) {
            issues.push(ValidationIssue {
                field: format!("questions[{i}].id"),
                issue: "must be unique".into(),
            });
        }
        if q.prompt.trim().is_empty() {
            issues.push(ValidationIssue {
                field: format!("questions[{i}].prompt"),
                issue: "must not be empty".into(),
            });
        }

        match q.q_type {
            QuestionType::OpenEnded => {
                if q.correct_answer_index.is_some() {
                    issues.push(ValidationIssue {
                        field: format!("questions[{i}].correctAnswerIndex"),
                        issue: "must be absent for open-ended question".into(),
                    });
                }
            }
            QuestionType::MultipleChoice => {
                if q.choices.is_empty() {
                    issues.push(ValidationIssue {
                        field: format!("questions[{i}].choices"),
                        issue: "is required for multiple-choice".into(),
                    });
                }
                for (j, choice) in q.choices.iter().enumerate() {
                    if choice.trim().is_empty() {
                        issues.push(ValidationIssue {
                            field: format!("questions[{i}].choices[{j}]"),
                            issue: "must not be empty".into(),
                        });
                    }
                }
                match q.correct_answer_index {
                    None => issues.push(ValidationIssue {
                        field: format!("questions[{i}].correctAnswerIndex"),
                        issue: "is required for multiple-choice".into(),
                    }),
                    Some(idx) if idx >= q.choices.len() => issues.push(ValidationIssue {
                        field: format!("questions[{i}].correctAnswerIndex"),
                        issue: "must reference an existing choice".into(),
                    }),
                    Some(_) => {}
                }
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Server-side answer check. `answer_index` is an original index.
pub fn check_answer(question: &Question, answer_index: Option<usize>) -> AnswerResult {
    let is_correct = match question.q_type {
        QuestionType::OpenEnded => true,
        QuestionType::MultipleChoice => match (question.correct_answer_index, answer_index) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        },
    };
    AnswerResult {
        is_correct,
        explanation: question.explanation.clone(),
    }
}

#[cfg(test)]
pub(crate) fn mc_question(id: i64, choices: &[&str], correct: usize) -> Question {
    Question {
        id,
        topic: "node".into(),
        q_type: QuestionType::MultipleChoice,
        prompt: format!("question {id}"),
        choices: choices.iter().map(|c| c.to_string()).collect(),
        correct_answer_index: Some(correct),
        explanation: Some(format!("explanation {id}")),
    }
}

#[cfg(test)]
pub(crate) fn open_question(id: i64) -> Question {
    Question {
        id,
        topic: "node".into(),
        q_type: QuestionType::OpenEnded,
        prompt: format!("describe {id}"),
        choices: Vec::new(),
        correct_answer_index: None,
        explanation: None,
    }
}
