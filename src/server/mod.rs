#[cfg(test)]
mod tests;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::WebRagError;
use crate::auth::{AuthError, AuthService, UserProfile};
use crate::export::{ExcelOutcome, create_excel};
use crate::llm::ChatTurn;
use crate::rag::RagService;
use crate::visuals::{VisualOutcome, create_visuals};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagService>,
    pub auth: Arc<AuthService>,
    /// Static bearer key protecting the RAG endpoints. `None` disables the
    /// check entirely.
    pub api_key: Option<String>,
}

/// Build the HTTP application.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/verify-otp", post(verify_otp))
        .route("/login", post(login))
        .route("/analyze", post(analyze))
        .route("/ask", post(ask))
        .route("/excel", post(export_excel))
        .route("/visuals", post(visualize))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Error payload shaped as `{"detail": "..."}`.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<WebRagError> for ApiError {
    fn from(e: WebRagError) -> Self {
        let status = match &e {
            WebRagError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Request failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let status = match &e {
            AuthError::AlreadyRegistered
            | AuthError::InvalidOtp
            | AuthError::InvalidCredentials => StatusCode::BAD_REQUEST,
            AuthError::NoOtpRecord => StatusCode::NOT_FOUND,
            AuthError::EmailUnavailable
            | AuthError::OtpSendFailed
            | AuthError::TokenUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Internal(source) => {
                error!("Auth request failed: {source}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

/// Enforce the static bearer key when one is configured. The header must be
/// exactly `Bearer <key>`; anything else is rejected.
fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };

    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {expected}"));

    if authorized {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid API Key."))
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// --- RAG routes ---

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    urls: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    success: bool,
    index_name: Option<String>,
    summary: Option<String>,
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    check_api_key(&state, &headers)?;

    let outcome = state.rag.analyze(&request.urls).await?;
    Ok(Json(AnalyzeResponse {
        success: true,
        index_name: Some(outcome.index_name),
        summary: Some(outcome.summary),
    }))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    index_name: String,
    question: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
}

async fn ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    check_api_key(&state, &headers)?;

    let answer = state
        .rag
        .ask(&request.index_name, &request.question, &request.history)
        .await?;
    Ok(Json(AskResponse { answer }))
}

// --- Artifact routes ---

#[derive(Debug, Deserialize)]
struct ArtifactRequest {
    query: String,
    index: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
struct ExcelResponse {
    message: String,
    response_type: String,
    filename: Option<String>,
    file_base64: Option<String>,
}

async fn export_excel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ArtifactRequest>,
) -> Result<Json<ExcelResponse>, ApiError> {
    check_api_key(&state, &headers)?;

    let outcome = create_excel(&state.rag, &request.index, &request.query, &request.history).await?;
    let response = match outcome {
        ExcelOutcome::Chat { message } => ExcelResponse {
            message,
            response_type: "chat".to_string(),
            filename: None,
            file_base64: None,
        },
        ExcelOutcome::Excel {
            message,
            filename,
            file_base64,
        } => ExcelResponse {
            message,
            response_type: "excel".to_string(),
            filename: Some(filename),
            file_base64: Some(file_base64),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct VisualResponse {
    response_type: String,
    message: String,
    task: Option<String>,
    visualization_type: Option<String>,
    images: Option<Vec<String>>,
}

async fn visualize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ArtifactRequest>,
) -> Result<Json<VisualResponse>, ApiError> {
    check_api_key(&state, &headers)?;

    let outcome =
        create_visuals(&state.rag, &request.index, &request.query, &request.history).await?;
    let response = match outcome {
        VisualOutcome::Chat { message } => VisualResponse {
            response_type: "chat".to_string(),
            message,
            task: None,
            visualization_type: None,
            images: None,
        },
        VisualOutcome::Visual {
            message,
            task,
            visualization_type,
            images,
        } => VisualResponse {
            response_type: "viz".to_string(),
            message,
            task: Some(task),
            visualization_type: Some(visualization_type),
            images: Some(images),
        },
    };
    Ok(Json(response))
}

// --- Auth routes ---

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.register(&request.username, &request.email).await?;
    Ok(Json(json!({ "message": "OTP sent to email" })))
}

#[derive(Debug, Deserialize)]
struct VerifyOtpRequest {
    email: String,
    otp: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    message: String,
    token: String,
    user: UserProfile,
}

async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .auth
        .verify_otp(&request.email, &request.otp, &request.password)
        .await?;
    Ok(Json(SessionResponse {
        message: "Verified successfully".to_string(),
        token: session.token,
        user: session.user,
    }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    identifier: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .auth
        .login(&request.identifier, &request.password)
        .await?;
    Ok(Json(SessionResponse {
        message: "Login successful".to_string(),
        token: session.token,
        user: session.user,
    }))
}
