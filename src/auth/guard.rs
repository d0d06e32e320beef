//! Bearer-token authentication.
//!
//! A token resolves to exactly one [`Principal`]. The role claim stamped at
//! issuance picks the identity table; there is no probing of one table and
//! falling back to the other.

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::token::TokenSigner,
    models::{PatientProfile, PractitionerProfile, Role},
    platform::app_error::{AppError, AppResult},
    store::{IdentityKind, IdentityStore, Owner},
};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// The authenticated actor behind a request, with credentials redacted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", content = "profile", rename_all = "lowercase")]
pub enum Principal {
    Patient(PatientProfile),
    Practitioner(PractitionerProfile),
}

impl Principal {
    pub fn id(&self) -> Uuid {
        match self {
            Principal::Patient(patient) => patient.id,
            Principal::Practitioner(practitioner) => practitioner.id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Principal::Patient(patient) => patient.role,
            Principal::Practitioner(_) => Role::Practitioner,
        }
    }

    pub fn kind(&self) -> IdentityKind {
        match self {
            Principal::Patient(_) => IdentityKind::Patient,
            Principal::Practitioner(_) => IdentityKind::Practitioner,
        }
    }

    pub fn owner(&self) -> Owner {
        match self {
            Principal::Patient(patient) => Owner::Patient(patient.id),
            Principal::Practitioner(practitioner) => Owner::Practitioner(practitioner.id),
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Principal::Patient(patient) => &patient.email,
            Principal::Practitioner(practitioner) => &practitioner.email,
        }
    }

    pub fn as_patient(&self) -> AppResult<&PatientProfile> {
        match self {
            Principal::Patient(patient) => Ok(patient),
            Principal::Practitioner(_) => Err(AppError::Forbidden(
                "This action is only available to patients".into(),
            )),
        }
    }
}

/// `accessToken` cookie first, then `Authorization: Bearer <token>`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, ACCESS_TOKEN_COOKIE).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[derive(Clone)]
pub struct AuthGuard {
    identities: Arc<dyn IdentityStore>,
    tokens: TokenSigner,
}

impl AuthGuard {
    pub fn new(identities: Arc<dyn IdentityStore>, tokens: TokenSigner) -> Self {
        Self { identities, tokens }
    }

    /// Resolves a token to an active patient, admin or practitioner.
    pub async fn authenticate(&self, token: Option<&str>) -> AppResult<Principal> {
        let token = token.ok_or(AppError::Unauthenticated)?;
        let claims = self.tokens.verify(token)?;

        match claims.role {
            Role::Patient | Role::Admin => {
                let patient = self
                    .identities
                    .find_patient(claims.sub)
                    .await?
                    .filter(|patient| patient.is_active)
                    .ok_or(AppError::PrincipalNotFound)?;
                Ok(Principal::Patient(PatientProfile::from(&patient)))
            }
            Role::Practitioner => {
                let practitioner = self
                    .identities
                    .find_practitioner(claims.sub)
                    .await?
                    .filter(|practitioner| practitioner.is_active)
                    .ok_or(AppError::PrincipalNotFound)?;
                Ok(Principal::Practitioner(PractitionerProfile::from(
                    &practitioner,
                )))
            }
        }
    }

    /// The stored role must be admin; the claim alone is not trusted.
    pub async fn authenticate_admin(&self, token: Option<&str>) -> AppResult<PatientProfile> {
        match self.authenticate(token).await? {
            Principal::Patient(patient) if patient.role == Role::Admin => Ok(patient),
            _ => Err(AppError::Forbidden("Forbidden: Admins only".into())),
        }
    }

    /// Resolves strictly against practitioner records.
    pub async fn authenticate_practitioner(
        &self,
        token: Option<&str>,
    ) -> AppResult<PractitionerProfile> {
        match self.authenticate(token).await? {
            Principal::Practitioner(practitioner) => Ok(practitioner),
            Principal::Patient(_) => Err(AppError::PrincipalNotFound),
        }
    }
}
