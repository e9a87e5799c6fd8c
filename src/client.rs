use crate::collaborators::{AnswerValidator, QuestionSource};
use crate::content::is_valid_module_key;
use crate::error::QuizError;
use crate::models::{AnswerResult, Question};
use futures::future::BoxFuture;
use http::StatusCode;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Full jitter: uniform in `0..=ceiling(attempt)`.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        Duration::from_millis(rng.gen_range(0..=ceiling))
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, QuizError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QuizError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let wait = self.delay(attempt, &mut rand::thread_rng());
                    warn!(attempt = attempt + 1, wait_ms = wait.as_millis() as u64, "{} failed, retrying: {}", what, err);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PoolResponse {
    questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    module: &'a str,
    question_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer_index: Option<usize>,
}

#[derive(Clone)]
pub struct HttpContentClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpContentClient {
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy, timeout: Duration) -> Result<Self, QuizError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuizError::Permanent(format!("cannot build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn fetch_pool_once(&self, module: &str) -> Result<Vec<Question>, QuizError> {
        let url = format!("{}/api/v1/modules/{}/questions", self.base_url, module);
        let resp = self.http.get(&url).send().await.map_err(transport_error)?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(module, "module not found, treating as empty pool");
            return Ok(Vec::new());
        }
        let resp = check_status(resp).await?;
        let body: PoolResponse = resp
            .json()
            .await
            .map_err(|e| QuizError::Permanent(format!("malformed pool response: {e}")))?;
        Ok(body.questions)
    }

    async fn validate_once(
        &self,
        module: &str,
        question_id: i64,
        answer_index: Option<usize>,
    ) -> Result<AnswerResult, QuizError> {
        let url = format!("{}/api/v1/answers/validate", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&ValidateRequest { module, question_id, answer_index })
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| QuizError::Permanent(format!("malformed validation response: {e}")))
    }
}

fn check_module(module: &str) -> Result<(), QuizError> {
    if is_valid_module_key(module) {
        Ok(())
    } else {
        Err(QuizError::Permanent(format!("invalid module key '{module}'")))
    }
}

fn transport_error(err: reqwest::Error) -> QuizError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        QuizError::Transient(err.to_string())
    } else {
        QuizError::Permanent(err.to_string())
    }
}

/// Maps a non-success status to the error the caller should see.
pub fn status_error(status: StatusCode, detail: &str) -> Option<QuizError> {
    if status.is_success() {
        return None;
    }
    let message = format!("{} {}", status, detail.trim()).trim_end().to_string();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
        Some(QuizError::Transient(message))
    } else {
        Some(QuizError::Permanent(message))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, QuizError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, &body).unwrap_or_else(|| QuizError::Permanent(status.to_string())))
}

impl QuestionSource for HttpContentClient {
    fn fetch_pool(&self, module: &str) -> BoxFuture<'static, Result<Vec<Question>, QuizError>> {
        let this = self.clone();
        let module = module.to_string();
        Box::pin(async move {
            check_module(&module)?;
            this.retry
                .run("question pool fetch", || this.fetch_pool_once(&module))
                .await
        })
    }
}

impl AnswerValidator for HttpContentClient {
    fn validate(
        &self,
        module: &str,
        question_id: i64,
        answer_index: Option<usize>,
    ) -> BoxFuture<'static, Result<AnswerResult, QuizError>> {
        let this = self.clone();
        let module = module.to_string();
        Box::pin(async move {
            check_module(&module)?;
            this.retry
                .run("answer validation", || this.validate_once(&module, question_id, answer_index))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn ceiling_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(0), Duration::from_millis(200));
        assert_eq!(policy.ceiling(1), Duration::from_millis(400));
        assert_eq!(policy.ceiling(3), Duration::from_millis(1600));
        assert_eq!(policy.ceiling(10), Duration::from_secs(5));
        assert_eq!(policy.ceiling(40), Duration::from_secs(5));
    }

    #[test]
    fn jittered_delay_within_ceiling() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(4);
        for attempt in 0..8 {
            assert!(policy.delay(attempt, &mut rng) <= policy.ceiling(attempt));
        }
    }

    #[test]
    fn status_classification() {
        assert!(status_error(StatusCode::OK, "").is_none());
        for status in [StatusCode::BAD_GATEWAY, StatusCode::SERVICE_UNAVAILABLE, StatusCode::TOO_MANY_REQUESTS] {
            assert!(status_error(status, "").unwrap().is_retryable());
        }
        assert!(!status_error(StatusCode::BAD_REQUEST, "").unwrap().is_retryable());
        assert_eq!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, " bad index "),
            Some(QuizError::Permanent("422 Unprocessable Entity bad index".into()))
        );
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(4)
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(QuizError::Transient("503".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(3)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(QuizError::Transient("timeout".into())) }
            })
            .await;
        assert!(matches!(result, Err(QuizError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(5)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(QuizError::Permanent("400".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn module_keys_are_checked_before_any_request() {
        let client = HttpContentClient::new("http://127.0.0.1:9", fast_policy(3), Duration::from_secs(2)).unwrap();
        for module in ["a?b", "x/../y", "Node"] {
            let err = client.fetch_pool(module).await.unwrap_err();
            assert!(matches!(err, QuizError::Permanent(ref m) if m.contains("invalid module key")), "{err:?}");
        }
        let err = client.validate("a#b", 1, Some(0)).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        // nothing listens on port 9 (discard) in the test environment
        let client = HttpContentClient::new("http://127.0.0.1:9", fast_policy(2), Duration::from_secs(2)).unwrap();
        let err = client.fetch_pool("node").await.unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
