pub mod client;
pub mod collaborators;
pub mod config;
pub mod content;
pub mod error;
pub mod handlers;
pub mod mapper;
pub mod models;
pub mod randomizer;
pub mod routes;
pub mod scoring;
pub mod session;
pub mod shuffle;
pub mod state;
pub mod storage;
pub mod telemetry;

use config::Settings;
use std::sync::Arc;

pub fn build_state(settings: &Settings) -> anyhow::Result<state::AppState> {
    let schema_raw = include_str!("../contracts/question_pool.schema.json");
    let schema: serde_json::Value = serde_json::from_str(schema_raw)?;
    let registry = content::ContentRegistry::load_dir(
        &settings.content_dir,
        &schema,
        settings.min_visible_questions,
    )?;
    Ok(state::AppState::new(registry))
}

/// A runner for `module` that talks to the configured content service and
/// keeps its snapshot under the session directory.
pub fn build_runner(settings: &Settings, module: &str) -> Result<session::QuizRunner, error::QuizError> {
    let client = Arc::new(client::HttpContentClient::new(
        settings.api_base_url.clone(),
        settings.retry,
        settings.http_timeout,
    )?);
    let store = Arc::new(storage::FileSessionStore::new(settings.session_dir.clone()));
    Ok(session::QuizRunner::new(module, settings.quiz, client.clone(), client, store))
}
