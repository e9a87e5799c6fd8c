use crate::client::RetryPolicy;
use crate::randomizer::DEFAULT_QUESTION_COUNT;
use crate::scoring::DEFAULT_PASS_PERCENT;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizSettings {
    pub question_count: usize,
    pub pass_percent: u32,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            question_count: DEFAULT_QUESTION_COUNT,
            pass_percent: DEFAULT_PASS_PERCENT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub content_dir: PathBuf,
    pub session_dir: PathBuf,
    pub min_visible_questions: usize,
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub quiz: QuizSettings,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let retry_defaults = RetryPolicy::default();

        Self {
            host: text("QUIZ_HOST", "0.0.0.0"),
            port: parse_or(&lookup, "QUIZ_PORT", 8080),
            content_dir: PathBuf::from(text("QUIZ_CONTENT_DIR", "./content")),
            session_dir: PathBuf::from(text("QUIZ_SESSION_DIR", "./.sessions")),
            min_visible_questions: parse_or(&lookup, "QUIZ_MIN_VISIBLE_QUESTIONS", 1),
            api_base_url: text("QUIZ_API_BASE_URL", "http://127.0.0.1:8080"),
            http_timeout: Duration::from_secs(parse_or(&lookup, "QUIZ_HTTP_TIMEOUT_SECS", 10)),
            quiz: QuizSettings {
                question_count: parse_or(&lookup, "QUIZ_QUESTION_COUNT", DEFAULT_QUESTION_COUNT).max(1),
                pass_percent: parse_or(&lookup, "QUIZ_PASS_PERCENT", DEFAULT_PASS_PERCENT).min(100),
            },
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "QUIZ_RETRY_ATTEMPTS", retry_defaults.max_attempts).max(1),
                base_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "QUIZ_RETRY_BASE_MS",
                    retry_defaults.base_delay.as_millis() as u64,
                )),
                max_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "QUIZ_RETRY_MAX_MS",
                    retry_defaults.max_delay.as_millis() as u64,
                )),
            },
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid value {:?} for {}", raw, key);
            default
        }),
        _ => default,
    }
}
