use axum::{
    Extension,
    extract::State,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    auth::guard::Principal,
    models::PractitionerProfile,
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        extract::{Json, Path, Query},
        middleware,
    },
    routes::{
        PageQuery, appointments::AppointmentPage, auth::LoginReq, auth::session_cookies,
    },
    services::accounts::PractitionerSession,
    store::Pagination,
};

/// Public doctor directory, doctor login and the doctor's own schedule.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/doctor",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(login))
            .routes(utoipa_axum::routes!(get_doctors))
            .routes(utoipa_axum::routes!(search_doctors))
            .routes(utoipa_axum::routes!(get_doctor))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(get_my_appointments))
                    .route_layer(axum::middleware::from_fn_with_state(
                        state.clone(),
                        middleware::practitioner_authorization,
                    )),
            ),
    )
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DoctorPage {
    pub doctors: Vec<PractitionerProfile>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Part of a doctor's name or speciality.
    pub query: String,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/login",
    tags = ["Doctors"],
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in", body = StdResponse<PractitionerSession, String>),
        (status = 401, description = "Invalid user credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .accounts()
        .login_practitioner(&body.email, &body.password)
        .await?;

    Ok((
        session_cookies(&state, &session.access_token, &session.refresh_token),
        StdResponse {
            data: Some(session),
            message: Some("Doctor logged in successfully"),
        },
    ))
}

/// List active doctors.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Doctors"],
    params(PageQuery),
    responses(
        (status = 200, description = "Doctors fetched", body = StdResponse<DoctorPage, String>),
        (status = 422, description = "limit or offset out of range")
    )
)]
pub async fn get_doctors(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.pagination()?;
    let doctors = state.accounts().list_practitioners(page).await?;

    Ok(StdResponse {
        data: Some(DoctorPage {
            doctors: doctors.items,
            total_count: doctors.total_count,
            limit: page.limit,
            offset: page.offset,
        }),
        message: Some("Doctors fetched successfully"),
    })
}

/// Active doctors whose name or speciality contains the query, ignoring case.
#[utoipa::path(
    get,
    path = "/search",
    tags = ["Doctors"],
    params(SearchQuery),
    responses(
        (status = 200, description = "Doctors found", body = StdResponse<DoctorPage, String>),
        (status = 422, description = "Missing query or limit out of range")
    )
)]
pub async fn search_doctors(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Pagination::new(search.limit, search.offset)?;
    let doctors = state
        .accounts()
        .search_practitioners(&search.query, page)
        .await?;

    Ok(StdResponse {
        data: Some(DoctorPage {
            doctors: doctors.items,
            total_count: doctors.total_count,
            limit: page.limit,
            offset: page.offset,
        }),
        message: Some("Doctors fetched successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Doctors"],
    params(
        ("id" = Uuid, Path, description = "Doctor ID to fetch")
    ),
    responses(
        (status = 200, description = "Doctor fetched", body = StdResponse<PractitionerProfile, String>),
        (status = 404, description = "Doctor not found")
    )
)]
pub async fn get_doctor(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let doctor = state.accounts().find_practitioner(id).await?;

    Ok(StdResponse {
        data: Some(doctor),
        message: Some("Doctor fetched successfully"),
    })
}

/// Appointments booked with the authenticated doctor, newest date first.
#[utoipa::path(
    get,
    path = "/appointments",
    tags = ["Doctors"],
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Appointments fetched", body = StdResponse<AppointmentPage, String>),
        (status = 401, description = "Not a doctor token")
    )
)]
pub async fn get_my_appointments(
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
