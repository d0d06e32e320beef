use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// Roles

/// Role discriminant carried by identity records and access tokens.
///
/// Declaration order is privilege order: `Patient < Practitioner < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Practitioner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Practitioner => "practitioner",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "patient" => Some(Role::Patient),
            "practitioner" => Some(Role::Practitioner),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Online,
    Cash,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Online => "online",
            PaymentType::Cash => "cash",
        }
    }

    /// Case-insensitive, so `"Online"` from older clients is accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "online" => Some(PaymentType::Online),
            "cash" => Some(PaymentType::Cash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
        }
    }
}

// Patients

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::patients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PatientEntity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub refresh_token_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientEntity {
    /// Unknown values fall back to the least privileged role.
    pub fn role(&self) -> Role {
        match Role::parse(&self.role) {
            Some(Role::Admin) => Role::Admin,
            _ => Role::Patient,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::patients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreatePatientEntity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
    pub role: String,
}

/// Self-service profile edit. `None` leaves the column untouched.
#[derive(AsChangeset, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = crate::schema::patients)]
pub struct PatientProfileChanges {
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
}

impl PatientProfileChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Patient as exposed to clients: no credential hash, no refresh slot.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&PatientEntity> for PatientProfile {
    fn from(patient: &PatientEntity) -> Self {
        Self {
            id: patient.id,
            name: patient.name.clone(),
            email: patient.email.clone(),
            phone: patient.phone.clone(),
            address: patient.address.clone(),
            gender: patient.gender.clone(),
            dob: patient.dob.clone(),
            role: patient.role(),
            is_active: patient.is_active,
            created_at: patient.created_at,
        }
    }
}

// Practitioners

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::practitioners)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PractitionerEntity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_img: String,
    pub degree: String,
    pub speciality: String,
    pub experience: String,
    pub about: String,
    pub fees: String,
    pub is_active: bool,
    pub refresh_token_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::practitioners)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreatePractitionerEntity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_img: String,
    pub degree: String,
    pub speciality: String,
    pub experience: String,
    pub about: String,
    pub fees: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PractitionerProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_img: String,
    pub degree: String,
    pub speciality: String,
    pub experience: String,
    pub about: String,
    pub fees: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&PractitionerEntity> for PractitionerProfile {
    fn from(practitioner: &PractitionerEntity) -> Self {
        Self {
            id: practitioner.id,
            name: practitioner.name.clone(),
            email: practitioner.email.clone(),
            profile_img: practitioner.profile_img.clone(),
            degree: practitioner.degree.clone(),
            speciality: practitioner.speciality.clone(),
            experience: practitioner.experience.clone(),
            about: practitioner.about.clone(),
            fees: practitioner.fees.clone(),
            role: Role::Practitioner,
            is_active: practitioner.is_active,
            created_at: practitioner.created_at,
        }
    }
}

// Appointments

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq, ToSchema)]
#[diesel(table_name = crate::schema::appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct AppointmentEntity {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    /// Decimal string, never a float.
    pub amount_to_pay: String,
    pub payment_type: String,
    pub payment_status: String,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentEntity {
    pub fn payment_status(&self) -> PaymentStatus {
        if self.payment_status == PaymentStatus::Completed.as_str() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateAppointmentEntity {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub amount_to_pay: String,
    pub payment_type: String,
    pub payment_status: String,
}

/// Gateway confirmation persisted when a payment is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}
