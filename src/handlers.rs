use crate::content::{is_valid_module_key, ModuleSummary, MODULE_KEY_RE};
use crate::error::{AppError, ErrorDetail};
use crate::models::{check_answer, AnswerResult, Question};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[derive(Debug, Serialize)]
pub struct ModuleList {
    pub modules: Vec<ModuleSummary>,
}

pub async fn list_modules(State(state): State<AppState>) -> Json<ModuleList> {
    Json(ModuleList {
        modules: state.registry.visible_modules(),
    })
}

#[derive(Debug, Serialize)]
pub struct PoolOut {
    pub module: String,
    pub questions: Vec<Question>,
}

pub async fn module_questions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(module): Path<String>,
) -> Result<Json<PoolOut>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if !is_valid_module_key(&module) {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "invalid module key",
            req_id,
        ));
    }
    let pool = state
        .registry
        .pool(&module)
        .ok_or_else(|| AppError::not_found("module not found", req_id))?;
    Ok(Json(PoolOut {
        questions: pool.iter().map(Question::public_view).collect(),
        module,
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAnswerPayload {
    #[validate(regex(path = *MODULE_KEY_RE, message = "invalid module key"))]
    pub module: String,
    pub question_id: i64,
    #[validate(range(max = 1024))]
    pub answer_index: Option<usize>,
}

pub async fn validate_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ValidateAnswerPayload>,
) -> Result<Json<AnswerResult>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if let Err(errors) = payload.validate() {
        let details = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| ErrorDetail {
                field: field.to_string(),
                issue: errs
                    .iter()
                    .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "invalid answer payload",
            req_id,
        )
        .with_details(details));
    }

    let question = state
        .registry
        .question(&payload.module, payload.question_id)
        .ok_or_else(|| AppError::not_found("question not found", req_id))?;
    let result = check_answer(question, payload.answer_index);
    info!(
        module = %payload.module,
        question_id = payload.question_id,
        correct = result.is_correct,
        "answer validated"
    );
    Ok(Json(result))
}
