//! Route-layer guards. Each resolves the caller and stores it as a request
//! extension for the handler to pick up with `Extension(..)`.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    auth::guard::{Principal, extract_token},
    platform::{app_error::AppError, app_state::AppState},
};

/// Any authenticated principal.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers());
    let principal = state.guard().authenticate(token.as_deref()).await?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Patients and admins; practitioners get `Forbidden`.
pub async fn patient_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers());
    let principal = state.guard().authenticate(token.as_deref()).await?;
    let patient = principal.as_patient()?.clone();

    req.extensions_mut().insert(patient);
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn practitioner_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers());
    let practitioner = state
        .guard()
        .authenticate_practitioner(token.as_deref())
        .await?;

    req.extensions_mut()
        .insert(Principal::Practitioner(practitioner.clone()));
    req.extensions_mut().insert(practitioner);
    Ok(next.run(req).await)
}

pub async fn admin_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers());
    let admin = state.guard().authenticate_admin(token.as_deref()).await?;

    req.extensions_mut().insert(Principal::Patient(admin.clone()));
    req.extensions_mut().insert(admin);
    Ok(next.run(req).await)
}
