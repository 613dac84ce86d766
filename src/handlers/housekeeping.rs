use axum::{extract::State, routing::post, Json, Router};

use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::services::housekeeping::SweepReport;
use crate::{ApiResponse, AppState};

/// Manually trigger one housekeeping sweep. The sweep contract is identical
/// for the timer, external schedulers and this endpoint.
#[utoipa::path(
    post,
    path = "/api/v1/admin/housekeeping/run",
    responses(
        (status = 200, description = "Sweep report", body = ApiResponse<SweepReport>),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn run_housekeeping(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<SweepReport>>, ServiceError> {
    if !user.is_admin() {
        return Err(ServiceError::Forbidden(
            "housekeeping requires the admin role".to_string(),
        ));
    }

    let report = state.services.housekeeping.sweep().await?;
    Ok(Json(ApiResponse::success(report)))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/housekeeping/run", post(run_housekeeping))
}
