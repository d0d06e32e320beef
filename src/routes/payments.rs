use axum::{Extension, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    models::{AppointmentEntity, PatientProfile},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        extract::Json,
        middleware,
    },
    services::payments::{CheckoutRequest, OrderHandle, VerifyPaymentRequest},
};

/// Gateway checkout for the authenticated patient's own appointments.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/payments",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(checkout))
            .routes(utoipa_axum::routes!(verify))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::patient_authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRes {
    pub appointment: AppointmentEntity,
    pub already_verified: bool,
}

/// Create a gateway order for an appointment.
#[utoipa::path(
    post,
    path = "/checkout",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Order created", body = StdResponse<OrderHandle, String>),
        (status = 403, description = "Not your appointment"),
        (status = 409, description = "Appointment already paid"),
        (status = 422, description = "Amount is malformed or differs from the booked amount"),
        (status = 502, description = "Payment gateway unavailable, retry later")
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    Extension(patient): Extension<PatientProfile>,
    Json(body): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.payments().initiate_checkout(&patient, body).await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Payment order created"),
    })
}

/// Confirm a gateway payment with its signed callback fields.
#[utoipa::path(
    post,
    path = "/verify",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified", body = StdResponse<VerifyRes, String>),
        (status = 400, description = "Signature does not match"),
        (status = 409, description = "No order yet, or already paid with a different receipt")
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    Extension(patient): Extension<PatientProfile>,
    Json(body): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let verification = state.payments().verify_payment(&patient, body).await?;
    let message = if verification.already_verified {
        "Payment was already verified"
    } else {
        "Payment verified successfully"
    };

    Ok(StdResponse {
        data: Some(VerifyRes {
            appointment: verification.appointment,
            already_verified: verification.already_verified,
        }),
        message: Some(message),
    })
}
