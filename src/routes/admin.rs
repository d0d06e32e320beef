use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    models::{PatientProfile, PractitionerProfile},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        extract::{Json, Path, Query},
        middleware,
    },
    routes::{PageQuery, appointments::AppointmentPage},
    services::accounts::RegisterPractitioner,
    store::Owner,
};

/// Doctor onboarding, user listing and per-account schedules, admins only.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/admin",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(add_doctor))
            .routes(utoipa_axum::routes!(get_users))
            .routes(utoipa_axum::routes!(get_user_appointments))
            .routes(utoipa_axum::routes!(get_doctor_appointments))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::admin_authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<PatientProfile>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

#[utoipa::path(
    post,
    path = "/doctors",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    request_body = RegisterPractitioner,
    responses(
        (status = 201, description = "Doctor added", body = StdResponse<PractitionerProfile, String>),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Doctor with email or name already exists")
    )
)]
pub async fn add_doctor(
    State(state): State<AppState>,
    Json(body): Json<RegisterPractitioner>,
) -> Result<impl IntoResponse, AppError> {
    let doctor = state.accounts().register_practitioner(body).await?;

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(doctor),
            message: Some("Doctor added successfully"),
        },
    ))
}

/// Patient and admin accounts.
#[utoipa::path(
    get,
    path = "/users",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Users fetched", body = StdResponse<UserPage, String>),
        (status = 403, description = "Admins only")
    )
)]
pub async fn get_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.pagination()?;
    let users = state.accounts().list_patients(page).await?;

    Ok(StdResponse {
        data: Some(UserPage {
            users: users.items,
            total_count: users.total_count,
            limit: page.limit,
            offset: page.offset,
        }),
        message: Some("Users fetched successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/users/{id}/appointments",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Patient ID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Appointments fetched", body = StdResponse<AppointmentPage, String>),
        (status = 403, description = "Admins only"),
        (status = 404, description = "User does not exist")
    )
)]
pub async fn get_user_appointments(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.pagination()?;
    let appointments = state
        .booking()
        .list_for_owner(Owner::Patient(id), page)
        .await?;

    Ok(StdResponse {
        data: Some(AppointmentPage::new(appointments, page)),
        message: Some("Appointments fetched successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/doctors/{id}/appointments",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Doctor ID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Appointments fetched", body = StdResponse<AppointmentPage, String>),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Doctor does not exist")
    )
)]
pub async fn get_doctor_appointments(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.pagination()?;
    let appointments = state
        .booking()
        .list_for_owner(Owner::Practitioner(id), page)
        .await?;

    Ok(StdResponse {
        data: Some(AppointmentPage::new(appointments, page)),
        message: Some("Appointments fetched successfully"),
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
        services::booking::BookAppointment,
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

    fn add_doctor_request(token: &str) -> Request<Body> {
        Request::post("/admin/doctors")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(
                json!({
                    "name": "Dr Kapoor",
                    "email": "kapoor@clinic.test",
                    "password": "pulse-check",
                    "profileImg": "https://cdn.test/kapoor.png",
                    "degree": "MD",
                    "speciality": "Dermatology",
                    "experience": "8 Years",
                    "about": "Skin specialist",
                    "fees": "800",
                })
                .to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn admin_adds_a_doctor_who_can_then_log_in() {
        let ctx = TestContext::new();
        let admin = ctx.seed_admin("root").await;
        let token = ctx.access_token(admin.id, Role::Admin);

        let res = app(&ctx).oneshot(add_doctor_request(&token)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_json(res).await["data"]["speciality"], "dermatology");

        ctx.state
            .accounts()
            .login_practitioner("kapoor@clinic.test", "pulse-check")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn plain_patients_are_forbidden() {
        let ctx = TestContext::new();
        let patient = ctx.seed_patient("asha").await;
        let token = ctx.access_token(patient.id, Role::Patient);

        let res = app(&ctx).oneshot(add_doctor_request(&token)).await.unwrap();

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(res).await["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn admin_lists_users() {
        let ctx = TestContext::new();
        let admin = ctx.seed_admin("root").await;
        ctx.seed_patient("asha").await;
        let token = ctx.access_token(admin.id, Role::Admin);

        let res = app(&ctx)
            .oneshot(
                Request::get("/admin/users")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["data"]["totalCount"], 2);
        assert!(body["data"]["users"][0].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn admin_reads_any_accounts_schedule() {
        let ctx = TestContext::new();
        let admin = ctx.seed_admin("root").await;
        let patient = ctx.seed_patient("asha").await;
        let practitioner = ctx.seed_practitioner("dr-rao").await;
        ctx.state
            .booking()
            .create_appointment(
                patient.id,
                BookAppointment {
                    practitioner_id: practitioner.id,
                    date: days_from_today(2).to_string(),
                    time: "10:00".into(),
                    amount: "500".into(),
                    payment_type: "cash".into(),
                },
            )
            .await
            .unwrap();
        let token = ctx.access_token(admin.id, Role::Admin);
        let app = app(&ctx);

        for uri in [
            format!("/admin/users/{}/appointments", patient.id),
            format!("/admin/doctors/{}/appointments", practitioner.id),
        ] {
            let res = app
                .clone()
                .oneshot(
                    Request::get(uri)
                        .header(header::AUTHORIZATION, format!("Bearer {token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(body_json(res).await["data"]["totalCount"], 1);
        }

        let res = app
            .oneshot(
                Request::get(format!("/admin/users/{}/appointments", practitioner.id))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
