//! Registration, login, token rotation and credential changes.

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{
        credentials::CredentialHasher,
        guard::Principal,
        token::{TokenSigner, refresh_token_digest},
    },
    models::{
        CreatePatientEntity, CreatePractitionerEntity, PatientProfile, PatientProfileChanges,
        PractitionerProfile, Role,
    },
    platform::{
        app_error::{AppError, AppResult},
        config::AdminSeed,
    },
    store::{IdentityKind, IdentityStore, Page, Pagination},
};

pub const MIN_PASSWORD_LEN: usize = 6;
const GENDERS: [&str; 3] = ["male", "female", "others"];

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPatient {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPractitioner {
    pub name: String,
    pub email: String,
    pub password: String,
    /// URL of an already uploaded image.
    pub profile_img: String,
    pub degree: String,
    pub speciality: String,
    pub experience: String,
    pub about: String,
    pub fees: String,
}

/// Contact and demographic fields a patient may edit; omitted fields are kept.
#[derive(Deserialize, ToSchema, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatientProfile {
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PatientSession {
    pub patient: PatientProfile,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PractitionerSession {
    pub practitioner: PractitionerProfile,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AccountService {
    identities: Arc<dyn IdentityStore>,
    hasher: Arc<dyn CredentialHasher>,
    access_tokens: TokenSigner,
    refresh_tokens: TokenSigner,
}

impl AccountService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        hasher: Arc<dyn CredentialHasher>,
        access_tokens: TokenSigner,
        refresh_tokens: TokenSigner,
    ) -> Self {
        Self {
            identities,
            hasher,
            access_tokens,
            refresh_tokens,
        }
    }

    pub async fn register_patient(&self, input: RegisterPatient) -> AppResult<PatientSession> {
        let name = normalise_identifier(&input.name, "name")?;
        let email = normalise_email(&input.email)?;
        validate_password(&input.password)?;
        let gender = input
            .gender
            .as_deref()
            .map(normalise_gender)
            .transpose()?;

        let password_hash = self.hash(input.password).await?;
        let patient = self
            .identities
            .create_patient(CreatePatientEntity {
                id: Uuid::new_v4(),
                name,
                email,
                password_hash,
                phone: non_blank(input.phone),
                address: non_blank(input.address),
                gender,
                dob: non_blank(input.dob),
                role: Role::Patient.as_str().to_string(),
            })
            .await?;

        tracing::info!("Registered patient {}", patient.id);

        let tokens = self
            .issue_tokens(IdentityKind::Patient, patient.id, patient.role())
            .await?;
        Ok(PatientSession {
            patient: PatientProfile::from(&patient),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    pub async fn login_patient(&self, email: &str, password: &str) -> AppResult<PatientSession> {
        let patient = self
            .identities
            .find_patient_by_email(&email.trim().to_lowercase())
            .await?
            .filter(|patient| patient.is_active)
            .ok_or(AppError::InvalidCredentials)?;

        if !self
            .verify(password.to_string(), patient.password_hash.clone())
            .await?
        {
            return Err(AppError::InvalidCredentials);
        }

        let tokens = self
            .issue_tokens(IdentityKind::Patient, patient.id, patient.role())
            .await?;
        Ok(PatientSession {
            patient: PatientProfile::from(&patient),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    pub async fn login_practitioner(
        &self,
        email: &str,
        password: &str,
    ) -> AppResult<PractitionerSession> {
        let practitioner = self
            .identities
            .find_practitioner_by_email(&email.trim().to_lowercase())
            .await?
            .filter(|practitioner| practitioner.is_active)
            .ok_or(AppError::InvalidCredentials)?;

        if !self
            .verify(password.to_string(), practitioner.password_hash.clone())
            .await?
        {
            return Err(AppError::InvalidCredentials);
        }

        let tokens = self
            .issue_tokens(
                IdentityKind::Practitioner,
                practitioner.id,
                Role::Practitioner,
            )
            .await?;
        Ok(PractitionerSession {
            practitioner: PractitionerProfile::from(&practitioner),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Rotates both tokens. The presented refresh token must match the stored
    /// digest, and the new digest replaces it only if it still does, so each
    /// refresh token is usable once even under concurrent requests.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> AppResult<TokenPair> {
        let refresh_token = refresh_token.ok_or(AppError::Unauthenticated)?;
        let claims = self.refresh_tokens.verify(refresh_token)?;
        let presented = refresh_token_digest(refresh_token);

        let (kind, stored) = match claims.role {
            Role::Patient | Role::Admin => {
                let patient = self
                    .identities
                    .find_patient(claims.sub)
                    .await?
                    .filter(|patient| patient.is_active)
                    .ok_or(AppError::PrincipalNotFound)?;
                (IdentityKind::Patient, patient.refresh_token_digest)
            }
            Role::Practitioner => {
                let practitioner = self
                    .identities
                    .find_practitioner(claims.sub)
                    .await?
                    .filter(|practitioner| practitioner.is_active)
                    .ok_or(AppError::PrincipalNotFound)?;
                (IdentityKind::Practitioner, practitioner.refresh_token_digest)
            }
        };

        if stored.as_deref() != Some(presented.as_str()) {
            tracing::warn!("Rejected stale refresh token for {}", claims.sub);
            return Err(AppError::InvalidToken);
        }

        let tokens = self.sign_pair(claims.sub, claims.role)?;
        let rotated = self
            .identities
            .rotate_refresh_token_digest(
                kind,
                claims.sub,
                &presented,
                &refresh_token_digest(&tokens.refresh_token),
            )
            .await?;
        if !rotated {
            tracing::warn!("Refresh token for {} was already rotated", claims.sub);
            return Err(AppError::InvalidToken);
        }

        Ok(tokens)
    }

    pub async fn logout(&self, principal: &Principal) -> AppResult<()> {
        self.identities
            .set_refresh_token_digest(principal.kind(), principal.id(), None)
            .await
    }

    /// Also invalidates the outstanding refresh token.
    pub async fn change_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let stored_hash = match principal {
            Principal::Patient(patient) => self
                .identities
                .find_patient(patient.id)
                .await?
                .map(|patient| patient.password_hash),
            Principal::Practitioner(practitioner) => self
                .identities
                .find_practitioner(practitioner.id)
                .await?
                .map(|practitioner| practitioner.password_hash),
        }
        .ok_or(AppError::PrincipalNotFound)?;

        if !self
            .verify(current_password.to_string(), stored_hash)
            .await?
        {
            return Err(AppError::InvalidCredentials);
        }
        validate_password(new_password)?;

        let password_hash = self.hash(new_password.to_string()).await?;
        self.identities
            .update_credential(principal.kind(), principal.id(), &password_hash)
            .await
    }

    pub async fn update_profile(
        &self,
        patient_id: Uuid,
        input: UpdatePatientProfile,
    ) -> AppResult<PatientProfile> {
        let changes = PatientProfileChanges {
            phone: non_blank(input.phone),
            address: non_blank(input.address),
            gender: non_blank(input.gender)
                .as_deref()
                .map(normalise_gender)
                .transpose()?,
            dob: non_blank(input.dob),
        };
        if changes.is_empty() {
            return Err(AppError::InvalidInput(
                "Provide at least one of phone, address, gender or dob".into(),
            ));
        }

        let patient = self
            .identities
            .update_patient_profile(patient_id, changes)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;

        tracing::info!("Updated profile of patient {}", patient.id);
        Ok(PatientProfile::from(&patient))
    }

    pub async fn register_practitioner(
        &self,
        input: RegisterPractitioner,
    ) -> AppResult<PractitionerProfile> {
        let name = required_field(&input.name, "name")?;
        let email = normalise_email(&input.email)?;
        validate_password(&input.password)?;
        let profile_img = required_field(&input.profile_img, "profileImg")?;
        let degree = required_field(&input.degree, "degree")?;
        let speciality = required_field(&input.speciality, "speciality")?.to_lowercase();
        let experience = required_field(&input.experience, "experience")?;
        let about = required_field(&input.about, "about")?;
        let fees = required_field(&input.fees, "fees")?;

        let password_hash = self.hash(input.password).await?;
        let practitioner = self
            .identities
            .create_practitioner(CreatePractitionerEntity {
                id: Uuid::new_v4(),
                name,
                email,
                password_hash,
                profile_img,
                degree,
                speciality,
                experience,
                about,
                fees,
            })
            .await?;

        tracing::info!("Registered practitioner {}", practitioner.id);
        Ok(PractitionerProfile::from(&practitioner))
    }

    /// Creates the configured admin unless an account with that email exists.
    pub async fn ensure_admin(&self, seed: &AdminSeed) -> AppResult<PatientProfile> {
        let email = normalise_email(&seed.email)?;
        if let Some(existing) = self.identities.find_patient_by_email(&email).await? {
            if existing.role() != Role::Admin {
                tracing::warn!(
                    "Admin seed email {} belongs to a non-admin account, leaving it untouched",
                    email
                );
            }
            return Ok(PatientProfile::from(&existing));
        }

        validate_password(&seed.password)?;
        let password_hash = self.hash(seed.password.clone()).await?;
        let admin = self
            .identities
            .create_patient(CreatePatientEntity {
                id: Uuid::new_v4(),
                name: normalise_identifier(&seed.name, "name")?,
                email,
                password_hash,
                phone: None,
                address: None,
                gender: None,
                dob: None,
                role: Role::Admin.as_str().to_string(),
            })
            .await?;

        tracing::info!("Seeded admin account {}", admin.id);
        Ok(PatientProfile::from(&admin))
    }

    pub async fn list_patients(&self, page: Pagination) -> AppResult<Page<PatientProfile>> {
        let page = self.identities.list_patients(page).await?;
        Ok(Page {
            items: page.items.iter().map(PatientProfile::from).collect(),
            total_count: page.total_count,
        })
    }

    pub async fn list_practitioners(
        &self,
        page: Pagination,
    ) -> AppResult<Page<PractitionerProfile>> {
        let page = self.identities.list_practitioners(page).await?;
        Ok(Page {
            items: page.items.iter().map(PractitionerProfile::from).collect(),
            total_count: page.total_count,
        })
    }

    /// Case-insensitive substring match on name or speciality.
    pub async fn search_practitioners(
        &self,
        term: &str,
        page: Pagination,
    ) -> AppResult<Page<PractitionerProfile>> {
        let term = required_field(term, "query")?;
        let page = self.identities.search_practitioners(&term, page).await?;
        Ok(Page {
            items: page.items.iter().map(PractitionerProfile::from).collect(),
            total_count: page.total_count,
        })
    }

    pub async fn find_practitioner(&self, id: Uuid) -> AppResult<PractitionerProfile> {
        self.identities
            .find_practitioner(id)
            .await?
            .filter(|practitioner| practitioner.is_active)
            .map(|practitioner| PractitionerProfile::from(&practitioner))
            .ok_or_else(|| AppError::NotFound("Doctor not found".into()))
    }

    async fn issue_tokens(&self, kind: IdentityKind, id: Uuid, role: Role) -> AppResult<TokenPair> {
        let tokens = self.sign_pair(id, role)?;
        self.identities
            .set_refresh_token_digest(kind, id, Some(&refresh_token_digest(&tokens.refresh_token)))
            .await?;
        Ok(tokens)
    }

    fn sign_pair(&self, id: Uuid, role: Role) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.access_tokens.sign(id, role)?,
            refresh_token: self.refresh_tokens.sign(id, role)?,
        })
    }

    async fn hash(&self, plaintext: String) -> AppResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .context("Credential hashing task panicked")?
    }

    async fn verify(&self, plaintext: String, hash: String) -> AppResult<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash))
            .await
            .context("Credential verification task panicked")?
    }
}

fn required_field(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn normalise_identifier(value: &str, field: &str) -> AppResult<String> {
    required_field(value, field).map(|value| value.to_lowercase())
}

fn normalise_email(email: &str) -> AppResult<String> {
    let email = normalise_identifier(email, "email")?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::InvalidInput("email is not a valid address".into())),
    }
}

fn normalise_gender(gender: &str) -> AppResult<String> {
    let gender = gender.trim().to_lowercase();
    if GENDERS.contains(&gender.as_str()) {
        Ok(gender)
    } else {
        Err(AppError::InvalidInput(format!(
            "gender must be one of {}",
            GENDERS.join(", ")
        )))
    }
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
