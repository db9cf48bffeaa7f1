use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{Response, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info};

use super::models::{ApiResponse, ErrorResponse, HealthResponse};
use super::page;
use super::state::{Backend, ServerState};
use super::translate::{interaction_status, process_upload, read_upload};
use crate::pipeline::Interaction;

pub async fn run_server(state: ServerState, addr: String) -> Result<()> {
    let app = router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address {}", addr))?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<ServerState>) -> Router {
    let body_limit = state.settings.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/translate", post(translate_page))
        .route("/api/translate", post(translate_api))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.backend {
        Backend::Ready(_) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Backend::Halted(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "halted" }),
        ),
    }
}

fn html_page(status: StatusCode, rendered: Result<String>) -> Response<Body> {
    match rendered {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!("failed to render page: {:#}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page").into_response()
        }
    }
}

async fn index(State(state): State<Arc<ServerState>>) -> Response<Body> {
    match &state.backend {
        Backend::Ready(_) => html_page(
            StatusCode::OK,
            page::render_interaction(&Interaction::Idle, &state.settings),
        ),
        Backend::Halted(err) => html_page(
            StatusCode::SERVICE_UNAVAILABLE,
            page::render_halted(&err.user_message()),
        ),
    }
}

async fn translate_page(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> Response<Body> {
    let pipeline = match &state.backend {
        Backend::Ready(pipeline) => pipeline,
        Backend::Halted(err) => {
            return html_page(
                StatusCode::SERVICE_UNAVAILABLE,
                page::render_halted(&err.user_message()),
            );
        }
    };
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(err) => return html_page(err.status, page::render_request_error(&err.message)),
    };
    let interaction = process_upload(pipeline, upload).await;
    html_page(
        interaction_status(&interaction),
        page::render_interaction(&interaction, &state.settings),
    )
}

async fn translate_api(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> Result<Json<ApiResponse>, (StatusCode, Json<ErrorResponse>)> {
    let pipeline = match &state.backend {
        Backend::Ready(pipeline) => pipeline,
        Backend::Halted(err) => {
            return Err((
                err.status(),
                Json(ErrorResponse {
                    error: err.user_message(),
                    kind: err.kind().to_string(),
                    retryable: err.is_retryable(),
                }),
            ));
        }
    };
    let upload = read_upload(multipart).await.map_err(|err| {
        (
            err.status,
            Json(ErrorResponse {
                error: err.message,
                kind: "bad_request".to_string(),
                retryable: false,
            }),
        )
    })?;
    match process_upload(pipeline, upload).await {
        Interaction::Presented(presented) => Ok(Json(ApiResponse::Translated {
            original: presented.original,
            translated: presented.translated,
            detected_source_language: presented.detected_source_language,
            file_name: state.settings.output_file_name.clone(),
        })),
        Interaction::Warned { message, .. } => Ok(Json(ApiResponse::NoText { message })),
        Interaction::ErrorDisplayed { error, .. } => Err((
            error.status(),
            Json(ErrorResponse {
                error: error.user_message(),
                kind: error.kind().to_string(),
                retryable: error.is_retryable(),
            }),
        )),
        Interaction::Idle => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "upload was not processed".to_string(),
                kind: "internal".to_string(),
                retryable: false,
            }),
        )),
    }
}
