//! Request identity extractors.
//!
//! Authentication happens upstream; the gateway forwards the authenticated user id
//! in `x-user-id`. Handlers use `AuthUser` or `AdminUser` to require one.

use axum::extract::FromRequestParts;
use http::request::Parts;
use tracing::debug;

use crate::audit::principal::Principal;
use crate::state::AppState;
use crate::web::error::{ApiError, db_error};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Any resolved user.
pub struct AuthUser(pub Principal);

/// A resolved user with the admin role.
pub struct AdminUser(pub Principal);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| ApiError::unauthorized("authentication required"))?;

        let principal = state
            .principals
            .resolve(user_id)
            .await
            .map_err(|e| db_error("resolve user", e))?;

        match principal {
            Some(principal) => Ok(AuthUser(principal)),
            None => {
                debug!(user_id, "Unknown user id in request");
                Err(ApiError::unauthorized("unknown user"))
            }
        }
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(principal) = AuthUser::from_request_parts(parts, state).await?;
        if !principal.is_admin() {
            debug!(user_id = principal.id, "Non-admin user rejected from admin route");
            return Err(ApiError::forbidden("admin access required"));
        }
        Ok(AdminUser(principal))
    }
}
