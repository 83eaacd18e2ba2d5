use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    auth::{AuthService, SESSION_COOKIE},
    domain::User,
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let ctx = &state.service_context;

    let password_hash = ctx.user_repo
        .password_hash(&req.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !AuthService::verify_password(&req.password, &password_hash).await? {
        tracing::info!("Failed login attempt for {}", req.email);
        return Err(AppError::Unauthorized);
    }

    let user = ctx.user_repo
        .find_by_email(&req.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let (_session, token) = ctx.auth_service.create_session(user.id).await?;
    let cookie = ctx.auth_service.create_session_cookie(&token);

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            message: "Login successful".to_string(),
            user,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode)> {
    let ctx = &state.service_context;

    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        // Best effort: the cookie is cleared regardless.
        if let Ok(Some(session)) = ctx.auth_service.validate_session(session_cookie.value()).await {
            let _ = ctx.csrf_service.delete_token(&session.id).await;
        }
        let _ = ctx.auth_service.invalidate_session(session_cookie.value()).await;
    }

    Ok((jar.add(AuthService::create_logout_cookie()), StatusCode::NO_CONTENT))
}

pub async fn me(Extension(current_user): Extension<CurrentUser>) -> Json<User> {
    Json(current_user.user)
}

pub async fn csrf_token(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<CsrfTokenResponse>> {
    let csrf_token = state.service_context.csrf_service
        .generate_token(&current_user.session_id)
        .await?;

    Ok(Json(CsrfTokenResponse { csrf_token }))
}
