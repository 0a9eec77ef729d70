use axum::{extract::State, http::StatusCode, response::Json};

use super::common::{created, no_content_response};
use crate::services::users::{CreateProfileRequest, ProfileResponse, UpdateProfileRequest};
use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, ApiResult, AppState};

/// Profile of the authenticated user
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    tag = "Profile",
    responses(
        (status = 200, description = "Profile retrieved", body = ApiResponse<ProfileResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No profile for this user", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<ProfileResponse> {
    let profile = state.services.users.get_profile(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

/// Create the profile for the token subject
#[utoipa::path(
    post,
    path = "/api/auth/profile",
    tag = "Profile",
    request_body = CreateProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = ApiResponse<ProfileResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 409, description = "Profile or email already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProfileResponse>>), ServiceError> {
    let profile = state
        .services
        .users
        .create_profile(auth_user.user_id, request)
        .await?;
    Ok(created(profile))
}

#[utoipa::path(
    put,
    path = "/api/auth/profile",
    tag = "Profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ApiResponse<ProfileResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No profile for this user", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<ProfileResponse> {
    let profile = state
        .services
        .users
        .update_profile(auth_user.user_id, request)
        .await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    delete,
    path = "/api/auth/profile",
    tag = "Profile",
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No profile for this user", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .users
        .delete_profile(auth_user.user_id)
        .await?;
    Ok(no_content_response())
}
