use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    auth::guard::Principal,
    models::{AppointmentEntity, PatientProfile},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        extract::{Json, Path, Query},
        middleware,
    },
    routes::PageQuery,
    services::booking::BookAppointment,
    store::{Page, Pagination},
};

/// Booking is patient-only; reading, cancelling and listing accept either role.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/appointments",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_appointment))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::patient_authorization,
            ))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(get_appointments))
                    .routes(utoipa_axum::routes!(get_appointment, cancel_appointment))
                    .route_layer(axum::middleware::from_fn_with_state(
                        state.clone(),
                        middleware::authenticate,
                    )),
            ),
    )
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPage {
    pub appointments: Vec<AppointmentEntity>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

impl AppointmentPage {
    pub fn new(page: Page<AppointmentEntity>, pagination: Pagination) -> Self {
        Self {
            appointments: page.items,
            total_count: page.total_count,
            limit: pagination.limit,
            offset: pagination.offset,
        }
    }
}

/// Book a slot with a doctor for the authenticated patient.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    request_body = BookAppointment,
    responses(
        (status = 201, description = "Appointment booked", body = StdResponse<AppointmentEntity, String>),
        (status = 404, description = "Doctor not found"),
        (status = 409, description = "Slot already booked"),
        (status = 422, description = "Invalid date, time, amount or payment type")
    )
)]
pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(patient): Extension<PatientProfile>,
    Json(body): Json<BookAppointment>,
) -> Result<impl IntoResponse, AppError> {
    let appointment = state
        .booking()
        .create_appointment(patient.id, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(appointment),
            message: Some("Appointment booked successfully"),
        },
    ))
}

/// Appointments of the authenticated patient or doctor, newest date first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Appointments fetched", body = StdResponse<AppointmentPage, String>)
    )
)]
pub async fn get_appointments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.pagination()?;
    let appointments = state.booking().list_appointments(&principal, page).await?;

    Ok(StdResponse {
        data: Some(AppointmentPage::new(appointments, page)),
        message: Some("Appointments fetched successfully"),
    })
}

/// One appointment, for its patient or its doctor.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Appointment ID to fetch")
    ),
    responses(
        (status = 200, description = "Appointment fetched", body = StdResponse<AppointmentEntity, String>),
        (status = 403, description = "Not the patient or doctor of this appointment"),
        (status = 404, description = "Appointment not found"),
        (status = 422, description = "Malformed appointment ID")
    )
)]
pub async fn get_appointment(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    let appointment = state.booking().appointment_details(id, &principal).await?;

    Ok(StdResponse {
        data: Some(appointment),
        message: Some("Appointment fetched successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Appointments"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Appointment ID to cancel")
    ),
    responses(
        (status = 200, description = "Appointment cancelled"),
        (status = 403, description = "Not the patient or doctor of this appointment"),
        (status = 404, description = "Appointment not found")
    )
)]
pub async fn cancel_appointment(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    state.booking().cancel_appointment(id, &principal).await?;

    Ok(StdResponse::<(), _> {
        data: None,
        message: Some("Appointment cancelled successfully"),
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::{
        models::Role,
        testing::{TestContext, days_from_today},
    };

    fn app(ctx: &TestContext) -> Router {
        let (router, _) = crate::routes::routes_with_openapi(&ctx.state).split_for_parts();
        router.with_state(ctx.state.clone())
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn booking_request(token: Option<&str>, practitioner_id: uuid::Uuid) -> Request<Body> {
        let mut builder = Request::post("/appointments").header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(
                json!({
                    "practitionerId": practitioner_id,
                    "date": days_from_today(4).to_string(),
                    "time": "10:00",
                    "amount": "500",
                    "paymentType": "online",
                })
                .to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn unauthenticated_requests_change_nothing() {
        let ctx = TestContext::new();
        let practitioner = ctx.seed_practitioner("dr-rao").await;
        let app = app(&ctx);

        let requests = [
            booking_request(None, practitioner.id),
            Request::get("/appointments").body(Body::empty()).unwrap(),
            Request::delete(format!("/appointments/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        ];
        for request in requests {
            let res = app.clone().oneshot(request).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(res).await["code"], "UNAUTHENTICATED");
        }
        assert_eq!(ctx.ledger.len(), 0);
    }

    #[tokio::test]
    async fn expired_tokens_are_reported_distinctly() {
        let ctx = TestContext::new();
        let patient = ctx.seed_patient("asha").await;
        let now = chrono::Utc::now().timestamp();
        let token = ctx
            .state
            .access_tokens
            .encode(&crate::auth::token::Claims {
                sub: patient.id,
                role: Role::Patient,
                iat: now - 120,
                exp: now - 60,
                jti: uuid::Uuid::new_v4(),
            })
            .unwrap();

        let res = app(&ctx)
            .oneshot(
                Request::get("/appointments")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["code"], "TOKEN_EXPIRED");
    }

    #[tokio::test]
    async fn patient_books_and_lists_their_appointment() {
        let ctx = TestContext::new();
        let patient = ctx.seed_patient("asha").await;
        let practitioner = ctx.seed_practitioner("dr-rao").await;
        let token = ctx.access_token(patient.id, Role::Patient);
        let app = app(&ctx);

        let res = app
            .clone()
            .oneshot(booking_request(Some(&token), practitioner.id))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let created = body_json(res).await;
        assert_eq!(created["data"]["paymentStatus"], "pending");

        let res = app
            .clone()
            .oneshot(booking_request(Some(&token), practitioner.id))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = app
            .oneshot(
                Request::get("/appointments?limit=5")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let listing = body_json(res).await;
        assert_eq!(listing["data"]["totalCount"], 1);
        assert_eq!(listing["data"]["limit"], 5);
        assert_eq!(listing["data"]["appointments"][0]["id"], created["data"]["id"]);
    }

    #[tokio::test]
    async fn practitioners_cannot_book() {
        let ctx = TestContext::new();
        let practitioner = ctx.seed_practitioner("dr-rao").await;
        let token = ctx.access_token(practitioner.id, Role::Practitioner);

        let res = app(&ctx)
            .oneshot(booking_request(Some(&token), practitioner.id))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(ctx.ledger.len(), 0);
    }

    fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn owning_practitioner_cancels_and_strangers_are_forbidden() {
        let ctx = TestContext::new();
        let patient = ctx.seed_patient("asha").await;
        let stranger = ctx.seed_patient("ravi").await;
        let practitioner = ctx.seed_practitioner("dr-rao").await;
        let app = app(&ctx);

        let res = app
            .clone()
            .oneshot(booking_request(
                Some(&ctx.access_token(patient.id, Role::Patient)),
                practitioner.id,
            ))
            .await
            .unwrap();
        let id = body_json(res).await["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/appointments/{id}");

        let res = app
            .clone()
            .oneshot(authed("DELETE", &uri, &ctx.access_token(stranger.id, Role::Patient)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(res).await["code"], "FORBIDDEN");
        assert_eq!(ctx.ledger.len(), 1);

        let doctor_token = ctx.access_token(practitioner.id, Role::Practitioner);
        let res = app
            .clone()
            .oneshot(authed("GET", &uri, &doctor_token))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["data"]["id"], id.as_str());

        let res = app
            .clone()
            .oneshot(authed("DELETE", &uri, &doctor_token))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(ctx.ledger.len(), 0);

        let res = app.oneshot(authed("GET", &uri, &doctor_token)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_ids_and_bodies_are_invalid_input() {
        let ctx = TestContext::new();
        let patient = ctx.seed_patient("asha").await;
        let token = ctx.access_token(patient.id, Role::Patient);
        let app = app(&ctx);

        let res = app
            .clone()
            .oneshot(authed("DELETE", "/appointments/not-a-uuid", &token))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(res).await["code"], "INVALID_INPUT");

        let res = app
            .clone()
            .oneshot(
                Request::post("/appointments")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::from(
                        json!({ "practitionerId": "not-a-uuid", "date": "2030-01-01" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(res).await["code"], "INVALID_INPUT");

        let res = app
            .clone()
            .oneshot(
                Request::post("/appointments")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(res).await["code"], "INVALID_INPUT");

        let res = app
            .oneshot(authed("GET", "/appointments?limit=ten", &token))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(res).await["code"], "INVALID_INPUT");
    }
}
