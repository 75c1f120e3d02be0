use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::observability::RequestSpan;
use super::{
    AccountDto, ApiError, ApiResponse, AppState, LoginRequest, MessageResponse, RegisterRequest,
    SessionResponse,
};
use crate::models::{Account, NewAccount};

/// Cookie-session key holding the account's current session token.
pub const SESSION_KEY: &str = "session_token";

// ============================================================================
// Handlers
// ============================================================================

/// GET /session
/// The signed-in account, or `{"user": null}`
pub async fn show(
    State(state): State<Arc<AppState>>,
    span: RequestSpan,
    session: Session,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let identity = session_identity(&session).await?;
    let user = state.auth().current_session(identity.as_deref()).await?;

    if let Some(user) = &user {
        span.record_user(user.id);
    }

    Ok(Json(ApiResponse::success(SessionResponse {
        user: user.map(AccountDto::from),
    })))
}

/// POST /session
/// Log in with a username or email plus password
pub async fn create(
    State(state): State<Arc<AppState>>,
    span: RequestSpan,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let account = state
        .auth()
        .create_session(&payload.credential, &payload.password)
        .await?;

    bind_session(&session, &account).await?;
    span.record_user(account.id);

    Ok(Json(ApiResponse::success(SessionResponse {
        user: Some(AccountDto::from(account)),
    })))
}

/// DELETE /session
/// Log out; 204 when there was nothing to log out of
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, ApiError> {
    let identity = session_identity(&session).await?;
    let destroyed = state.auth().destroy_session(identity.as_deref()).await?;

    if identity.is_some() {
        session
            .flush()
            .await
            .map_err(|e| ApiError::internal(format!("Failed to clear session: {e}")))?;
    }

    if !destroyed {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "success".to_string(),
    }))
    .into_response())
}

/// POST /users
/// Register a new account and sign it in
pub async fn register(
    State(state): State<Arc<AppState>>,
    span: RequestSpan,
    session: Session,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionResponse>>), ApiError> {
    let account = state
        .auth()
        .register(NewAccount::new(
            payload.username,
            payload.email,
            payload.password,
        ))
        .await?;

    bind_session(&session, &account).await?;
    span.record_user(account.id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SessionResponse {
            user: Some(AccountDto::from(account)),
        })),
    ))
}

// ============================================================================
// Helpers
// ============================================================================

async fn session_identity(session: &Session) -> Result<Option<String>, ApiError> {
    session
        .get::<String>(SESSION_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))
}

/// Stores the account's token under a fresh session id.
async fn bind_session(session: &Session, account: &Account) -> Result<(), ApiError> {
    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to cycle session: {e}")))?;

    session
        .insert(SESSION_KEY, &account.session_token)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))
}
