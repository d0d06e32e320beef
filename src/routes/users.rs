use axum::{Extension, extract::State, response::IntoResponse};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    models::PatientProfile,
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        extract::Json,
        middleware,
    },
    services::accounts::UpdatePatientProfile,
};

/// Self-service profile for patient accounts.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/user",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(update_profile))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::patient_authorization,
            )),
    )
}

/// Edit contact and demographic details; omitted fields are kept.
#[utoipa::path(
    patch,
    path = "/",
    tags = ["User"],
    security(("bearerAuth" = [])),
    request_body = UpdatePatientProfile,
    responses(
        (status = 200, description = "Profile updated", body = StdResponse<PatientProfile, String>),
        (status = 403, description = "Doctors cannot use this endpoint"),
        (status = 422, description = "Nothing to update or invalid gender")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(patient): Extension<PatientProfile>,
    Json(body): Json<UpdatePatientProfile>,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.accounts().update_profile(patient.id, body).await?;

    Ok(StdResponse {
        data: Some(updated),
        message: Some("User updated successfully"),
    })
}
