use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use caltrack_auth::{
    AuthResult, CreatedAccount, CurrentUser, IssuedToken, ProfileUpdate, User,
    middleware::Credentials,
};
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AuthResult<Json<IssuedToken>> {
    let issued = state.accounts.login(&body.email, &body.password).await?;
    Ok(Json(issued))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub expected_calories_per_day: i64,
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<SignUpRequest>,
) -> AuthResult<(StatusCode, Json<IssuedToken>)> {
    let issued = state
        .accounts
        .sign_up(
            &body.email,
            &body.name,
            &body.password,
            body.expected_calories_per_day,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub expected_calories_per_day: i64,
    pub group_id: i64,
}

/// Creates an account in the requested group with a generated password.
pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateUserRequest>,
) -> AuthResult<(StatusCode, Json<CreatedAccount>)> {
    let created = state
        .accounts
        .create_user(
            &user,
            &body.email,
            &body.name,
            body.expected_calories_per_day,
            body.group_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Revokes the token the request authenticated with.
pub async fn sign_out(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    credentials: Credentials,
) -> AuthResult<StatusCode> {
    state.accounts.sign_out(&user, &credentials.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user.as_ref().clone())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expected_calories_per_day: Option<i64>,
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> AuthResult<Json<User>> {
    let update = ProfileUpdate {
        name: body.name,
        expected_calories_per_day: body.expected_calories_per_day,
    };
    let updated = state.accounts.update_profile(&user, id, update).await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Sets a new password. The user's tokens and cached sessions are dropped,
/// so the caller has to log in again after resetting their own.
pub async fn reset_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<ResetPasswordRequest>,
) -> AuthResult<Json<User>> {
    let updated = state
        .accounts
        .reset_password(&user, id, &body.old_password, &body.new_password)
        .await?;
    Ok(Json(updated))
}

pub async fn change_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, group_id)): Path<(i64, i64)>,
) -> AuthResult<Json<User>> {
    let updated = state.accounts.change_group(&user, id, group_id).await?;
    Ok(Json(updated))
}
