use crate::content::ContentRegistry;
use crate::error::QuizError;
use crate::models::{check_answer, AnswerResult, Question};
use futures::future::BoxFuture;
use std::sync::Arc;

pub trait QuestionSource: Send + Sync {
    /// All questions for `module`. An unknown module yields an empty pool.
    fn fetch_pool(&self, module: &str) -> BoxFuture<'static, Result<Vec<Question>, QuizError>>;
}

pub trait AnswerValidator: Send + Sync {
    /// `answer_index` is an original index, `None` for open-ended answers.
    fn validate(
        &self,
        module: &str,
        question_id: i64,
        answer_index: Option<usize>,
    ) -> BoxFuture<'static, Result<AnswerResult, QuizError>>;
}

/// In-process content, used when no content service is configured.
#[derive(Clone)]
pub struct LocalContent {
    registry: Arc<ContentRegistry>,
}

impl LocalContent {
    pub fn new(registry: Arc<ContentRegistry>) -> Self {
        Self { registry }
    }
}

impl QuestionSource for LocalContent {
    fn fetch_pool(&self, module: &str) -> BoxFuture<'static, Result<Vec<Question>, QuizError>> {
        let pool: Vec<Question> = self
            .registry
            .pool(module)
            .map(|p| p.iter().map(Question::public_view).collect())
            .unwrap_or_default();
        Box::pin(async move { Ok(pool) })
    }
}

impl AnswerValidator for LocalContent {
    fn validate(
        &self,
        module: &str,
        question_id: i64,
        answer_index: Option<usize>,
    ) -> BoxFuture<'static, Result<AnswerResult, QuizError>> {
        let result = self
            .registry
            .question(module, question_id)
            .map(|q| check_answer(q, answer_index))
            .ok_or_else(|| {
                QuizError::Permanent(format!("question {question_id} not found in module {module}"))
            });
        Box::pin(async move { result })
    }
}
