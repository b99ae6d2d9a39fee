//! API handlers. Internal error text is logged, never returned.

use super::SharedState;
use crate::prediction::PredictionRequest;
use crate::runtime::ScriptError;
use crate::types::{ChatTurn, ReviewRecord};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{error, warn};

const GENERIC_FAILURE: &str = "Failed to process request.";

fn generic_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": GENERIC_FAILURE })),
    )
        .into_response()
}

/// "30 seconds", "10 minutes".
fn describe_timeout(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        format!("{minutes} minute{}", if minutes == 1 { "" } else { "s" })
    } else {
        format!("{secs} second{}", if secs == 1 { "" } else { "s" })
    }
}

/// `POST /api/chat` with a `[{ role, content }]` body.
pub(super) async fn chat(State(state): State<SharedState>, body: Bytes) -> Response {
    let turns: Vec<ChatTurn> = match serde_json::from_slice(&body) {
        Ok(turns) => turns,
        Err(e) => {
            warn!(error = %e, "Rejected chat body");
            return generic_failure();
        }
    };
    match state.pipeline.answer_conversation(&turns).await {
        Ok(outcome) => Json(json!({ "content": outcome.content })).into_response(),
        Err(e) => {
            error!(error = %e, "Chat request failed");
            generic_failure()
        }
    }
}

fn missing_prediction_fields() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Missing required fields: professorName, subject, reviews" })),
    )
        .into_response()
}

/// Validated `/api/predict` body.
fn parse_predict_body(body: &Value) -> Option<PredictionRequest> {
    let professor = body.get("professorName")?.as_str().filter(|s| !s.is_empty())?;
    let subject = body.get("subject")?.as_str().filter(|s| !s.is_empty())?;
    let reviews = body
        .get("reviews")?
        .as_array()?
        .iter()
        .map(|r| r.as_str().map(str::to_string))
        .collect::<Option<Vec<String>>>()?;
    Some(PredictionRequest {
        professor: professor.to_string(),
        subject: subject.to_string(),
        reviews,
    })
}

/// `POST /api/predict` with `{ professorName, subject, reviews }`.
pub(super) async fn predict(State(state): State<SharedState>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Rejected prediction body");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to process prediction request" })),
            )
                .into_response();
        }
    };
    let Some(request) = parse_predict_body(&body) else {
        return missing_prediction_fields();
    };

    match state.predictor.predict(&request, state.predict_timeout).await {
        Ok(prediction) => {
            Json(json!({ "success": true, "prediction": prediction })).into_response()
        }
        Err(ScriptError::InvalidOutput { message }) => {
            warn!(%message, "Prediction output was not valid JSON");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to parse prediction results" })),
            )
                .into_response()
        }
        Err(ScriptError::Exited { code, stderr }) => {
            warn!(?code, stderr = %stderr.trim(), "Prediction script failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Prediction failed", "code": code })),
            )
                .into_response()
        }
        Err(ScriptError::Timeout { timeout }) => (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({
                "success": false,
                "error": format!("Prediction timeout after {}", describe_timeout(timeout)),
            })),
        )
            .into_response(),
        Err(e @ ScriptError::Spawn { .. }) => {
            error!(error = %e, "Could not start prediction script");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to process prediction request" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    reviews: Vec<ReviewRecord>,
}

/// `POST /api/uploadreview` with `{ reviews: [...] }`.
pub(super) async fn upload_reviews(State(state): State<SharedState>, body: Bytes) -> Response {
    let upload: UploadBody = match serde_json::from_slice(&body) {
        Ok(upload) => upload,
        Err(e) => {
            warn!(error = %e, "Rejected upload body");
            return generic_failure();
        }
    };

    if let Err(e) = state.corpus.append(upload.reviews.clone()).await {
        error!(error = %e, "Failed to store uploaded reviews");
        return generic_failure();
    }

    if let Some(indexer) = &state.indexer
        && let Err(e) = indexer.index_new(&upload.reviews).await
    {
        warn!(error = %e, "Indexing uploaded reviews failed");
    }

    Json(json!({ "message": "Reviews uploaded successfully." })).into_response()
}

/// `POST /api/reindex`: re-embed the whole corpus.
pub(super) async fn reindex(State(state): State<SharedState>) -> Response {
    let Some(indexer) = &state.indexer else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": state.reindex_requirement })),
        )
            .into_response();
    };
    let snapshot = state.corpus.snapshot();
    match indexer.reindex(&snapshot).await {
        Ok(upserted) => {
            Json(json!({ "message": "Reindex complete", "upserted": upserted })).into_response()
        }
        Err(e) => {
            error!(error = %e, "Reindex failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to reindex" })),
            )
                .into_response()
        }
    }
}

/// `POST /api/train`: run the training script.
pub(super) async fn train(State(state): State<SharedState>) -> Response {
    match state.trainer.train().await {
        Ok(output) => Json(json!({
            "success": true,
            "message": "Model training completed successfully",
            "output": output.stdout,
        }))
        .into_response(),
        Err(ScriptError::Exited { code, stderr }) => {
            warn!(?code, stderr = %stderr.trim(), "Training script failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Training failed", "code": code })),
            )
                .into_response()
        }
        Err(ScriptError::Timeout { timeout }) => (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({
                "success": false,
                "error": format!("Training timeout after {}", describe_timeout(timeout)),
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Could not run training script");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to start training process" })),
            )
                .into_response()
        }
    }
}
