//! License route handlers. All routes require a bearer token.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use insider_core::LicenseId;

use super::JsonBody;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::services::license::{ActiveStatus, LicenseError, LicenseView};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    #[serde(rename = "type", default)]
    pub license_type: String,
}

/// Body for roster changes. `licenseId` arrives as a number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRequest {
    #[serde(default)]
    pub license_id: Value,
    #[serde(default)]
    pub member_email: String,
}

impl MemberRequest {
    fn license_id(&self) -> Result<LicenseId> {
        parse_license_id(&self.license_id).ok_or(AppError::License(LicenseError::NotFound))
    }
}

#[derive(Debug, Serialize)]
pub struct UserName {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LicensesResponse {
    pub licenses: Vec<LicenseView>,
    pub user: UserName,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub message: &'static str,
    pub license: LicenseView,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn parse_license_id(value: &Value) -> Option<LicenseId> {
    let id = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    i32::try_from(id).ok().map(LicenseId::new)
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /api/v1/license`
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<LicensesResponse>> {
    let listing = state.licenses().list(user.id).await?;
    Ok(Json(LicensesResponse {
        licenses: listing.licenses,
        user: UserName {
            name: listing.user_name,
        },
    }))
}

/// `POST /api/v1/license/activate`
pub async fn activate(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(req): JsonBody<ActivateRequest>,
) -> Result<Json<ActivateResponse>> {
    let license = state
        .licenses()
        .activate(user.id, &req.license_type)
        .await?;
    add_breadcrumb(
        "license",
        "License activated",
        Some(&[("license_id", &license.id.to_string())]),
    );
    Ok(Json(ActivateResponse {
        message: "License activated successfully",
        license: LicenseView::new(&license, None),
    }))
}

/// `POST /api/v1/license/add-team-member`
pub async fn add_team_member(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(req): JsonBody<MemberRequest>,
) -> Result<Json<MessageResponse>> {
    let license_id = req.license_id()?;
    state
        .licenses()
        .add_member(&user, license_id, &req.member_email)
        .await?;
    add_breadcrumb(
        "license",
        "Team member added",
        Some(&[("license_id", &license_id.to_string())]),
    );
    Ok(Json(MessageResponse {
        message: "Great! The new team member has been added successfully.",
    }))
}

/// `POST /api/v1/license/remove-team-member`
pub async fn remove_team_member(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(req): JsonBody<MemberRequest>,
) -> Result<Json<MessageResponse>> {
    let license_id = req.license_id()?;
    state
        .licenses()
        .remove_member(&user, license_id, &req.member_email)
        .await?;
    add_breadcrumb(
        "license",
        "Team member removed",
        Some(&[("license_id", &license_id.to_string())]),
    );
    Ok(Json(MessageResponse {
        message: "The team member has been removed successfully.",
    }))
}

/// `GET /api/v1/license/check-active`
pub async fn check_active(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<ActiveStatus>> {
    Ok(Json(state.licenses().check_active(user.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_license_id() {
        assert_eq!(parse_license_id(&json!(7)), Some(LicenseId::new(7)));
        assert_eq!(parse_license_id(&json!("12")), Some(LicenseId::new(12)));
        assert_eq!(parse_license_id(&json!("abc")), None);
        assert_eq!(parse_license_id(&json!(1.5)), None);
        assert_eq!(parse_license_id(&json!(null)), None);
        assert_eq!(parse_license_id(&json!(9_999_999_999_i64)), None);
    }
}
