use std::time::Duration;

use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    auth::guard::{ACCESS_TOKEN_COOKIE, Principal, REFRESH_TOKEN_COOKIE, cookie_value},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        extract::Json,
        middleware,
    },
    services::accounts::{PatientSession, RegisterPatient, TokenPair},
};

/// Patient authentication and the session endpoints shared by every role.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/auth",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(register))
            .routes(utoipa_axum::routes!(login))
            .routes(utoipa_axum::routes!(refresh))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(logout))
                    .routes(utoipa_axum::routes!(me))
                    .routes(utoipa_axum::routes!(change_password))
                    .route_layer(axum::middleware::from_fn_with_state(
                        state.clone(),
                        middleware::authenticate,
                    )),
            ),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReq {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordReq {
    pub current_password: String,
    pub new_password: String,
}

fn cookie(name: &str, value: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` pair carrying a freshly issued session.
pub fn session_cookies(
    state: &AppState,
    access_token: &str,
    refresh_token: &str,
) -> AppendHeaders<[(axum::http::HeaderName, String); 2]> {
    AppendHeaders([
        (
            SET_COOKIE,
            cookie(
                ACCESS_TOKEN_COOKIE,
                access_token,
                state.access_tokens.ttl(),
                state.cookie_secure,
            ),
        ),
        (
            SET_COOKIE,
            cookie(
                REFRESH_TOKEN_COOKIE,
                refresh_token,
                state.refresh_tokens.ttl(),
                state.cookie_secure,
            ),
        ),
    ])
}

fn expired_cookies(state: &AppState) -> AppendHeaders<[(axum::http::HeaderName, String); 2]> {
    AppendHeaders([
        (
            SET_COOKIE,
            cookie(ACCESS_TOKEN_COOKIE, "", Duration::ZERO, state.cookie_secure),
        ),
        (
            SET_COOKIE,
            cookie(REFRESH_TOKEN_COOKIE, "", Duration::ZERO, state.cookie_secure),
        ),
    ])
}

/// Create a patient account and start a session.
#[utoipa::path(
    post,
    path = "/register",
    tags = ["Auth"],
    request_body = RegisterPatient,
    responses(
        (status = 201, description = "Patient registered", body = StdResponse<PatientSession, String>),
        (status = 409, description = "Name or email already taken"),
        (status = 422, description = "Invalid registration details")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterPatient>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.accounts().register_patient(body).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        session_cookies(&state, &session.access_token, &session.refresh_token),
        StdResponse {
            data: Some(session),
            message: Some("User registered successfully"),
        },
    ))
}

/// Log in as a patient or admin.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Auth"],
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in", body = StdResponse<PatientSession, String>),
        (status = 401, description = "Invalid user credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .accounts()
        .login_patient(&body.email, &body.password)
        .await?;

    Ok((
        session_cookies(&state, &session.access_token, &session.refresh_token),
        StdResponse {
            data: Some(session),
            message: Some("User logged in successfully"),
        },
    ))
}

/// Exchange a refresh token for a new token pair.
///
/// The `refreshToken` cookie wins over the request body.
#[utoipa::path(
    post,
    path = "/refresh",
    tags = ["Auth"],
    request_body(content = RefreshReq, description = "Optional when the refreshToken cookie is sent"),
    responses(
        (status = 200, description = "Tokens rotated", body = StdResponse<TokenPair, String>),
        (status = 401, description = "Refresh token missing, expired or already used")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let from_body = if body.is_empty() {
        RefreshReq::default()
    } else {
        serde_json::from_slice::<RefreshReq>(&body)
            .map_err(|err| AppError::InvalidInput(format!("Invalid request body: {err}")))?
    };
    let token = cookie_value(&headers, REFRESH_TOKEN_COOKIE).or(from_body.refresh_token);

    let tokens = state.accounts().refresh(token.as_deref()).await?;

    Ok((
        session_cookies(&state, &tokens.access_token, &tokens.refresh_token),
        StdResponse {
            data: Some(tokens),
            message: Some("Access token refreshed"),
        },
    ))
}

/// End the session and forget the refresh token.
#[utoipa::path(
    post,
    path = "/logout",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Logged out")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    state.accounts().logout(&principal).await?;

    Ok((
        expired_cookies(&state),
        StdResponse::<(), _> {
            data: None,
            message: Some("User logged out"),
        },
    ))
}

/// The authenticated principal, tagged by kind.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current principal", body = StdResponse<Principal, String>)
    )
)]
pub async fn me(Extension(principal): Extension<Principal>) -> Result<impl IntoResponse, AppError> {
    Ok(StdResponse {
        data: Some(principal),
        message: Some("Current user fetched successfully"),
    })
}

#[utoipa::path(
    patch,
    path = "/password",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    request_body = ChangePasswordReq,
    responses(
        (status = 200, description = "Password changed"),
        (status = 401, description = "Current password is wrong")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ChangePasswordReq>,
) -> Result<impl IntoResponse, AppError> {
    state
        .accounts()
        .change_password(&principal, &body.current_password, &body.new_password)
        .await?;

    Ok(StdResponse::<(), _> {
        data: None,
        message: Some("Password changed successfully"),
    })
}
