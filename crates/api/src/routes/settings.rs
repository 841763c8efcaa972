//! Account settings handlers. All routes require a bearer token.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use insider_core::{Email, UserId};

use super::JsonBody;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::User;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub email: Email,
    pub name: Option<String>,
}

/// Account as returned after an update. Never carries the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: UserId,
    pub email: Email,
    pub name: Option<String>,
    pub is_verified: bool,
}

impl From<User> for AccountView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            is_verified: user.is_verified,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateNameRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateNameResponse {
    pub message: &'static str,
    pub user: AccountView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// `GET /api/v1/settings/user`
pub async fn user(RequireAuth(user): RequireAuth) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        email: user.email,
        name: user.name,
    })
}

/// `PUT /api/v1/settings/update-name`
pub async fn update_name(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(req): JsonBody<UpdateNameRequest>,
) -> Result<Json<UpdateNameResponse>> {
    let user = state.auth().update_name(user.id, &req.name).await?;
    Ok(Json(UpdateNameResponse {
        message: "Name updated successfully",
        user: user.into(),
    }))
}

/// `PUT /api/v1/settings/update-password`
pub async fn update_password(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(req): JsonBody<UpdatePasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .auth()
        .update_password(user.id, &req.current_password, &req.new_password)
        .await?;
    Ok(Json(
        serde_json::json!({ "message": "Password updated successfully" }),
    ))
}
