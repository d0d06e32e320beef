use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    platform::{app_error::AppResult, app_state::AppState},
    store::Pagination,
};

pub mod admin;
pub mod appointments;
pub mod auth;
pub mod doctors;
pub mod payments;
pub mod users;

/// Every route group of the service, with its OpenAPI description.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    auth::routes_with_openapi(state)
        .merge(doctors::routes_with_openapi(state))
        .merge(admin::routes_with_openapi(state))
        .merge(appointments::routes_with_openapi(state))
        .merge(payments::routes_with_openapi(state))
        .merge(users::routes_with_openapi(state))
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1 to 100, defaults to 10.
    pub limit: Option<i64>,
    /// Defaults to 0.
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn pagination(&self) -> AppResult<Pagination> {
        Pagination::new(self.limit, self.offset)
    }
}
