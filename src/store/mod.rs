//! Persistence seams.
//!
//! Services depend on these traits, never on a connection pool, so the
//! booking and payment rules can be exercised without a database.

pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    models::{
        AppointmentEntity, CreateAppointmentEntity, CreatePatientEntity, CreatePractitionerEntity,
        PatientEntity, PatientProfileChanges, PaymentReceipt, PractitionerEntity,
    },
    platform::app_error::{AppError, AppResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(limit: Option<i64>, offset: Option<i64>) -> AppResult<Self> {
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);
        let offset = offset.unwrap_or(0);

        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        if offset < 0 {
            return Err(AppError::InvalidInput("offset must not be negative".into()));
        }

        Ok(Self { limit, offset })
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Patient,
    Practitioner,
}

/// Which side of an appointment a listing is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Patient(Uuid),
    Practitioner(Uuid),
}

/// Compound key guarded against double booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
}

impl From<&AppointmentEntity> for SlotKey {
    fn from(appointment: &AppointmentEntity) -> Self {
        Self {
            patient_id: appointment.patient_id,
            practitioner_id: appointment.practitioner_id,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time.clone(),
        }
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// `Conflict` when the name or email is taken.
    async fn create_patient(&self, patient: CreatePatientEntity) -> AppResult<PatientEntity>;
    async fn find_patient(&self, id: Uuid) -> AppResult<Option<PatientEntity>>;
    async fn find_patient_by_email(&self, email: &str) -> AppResult<Option<PatientEntity>>;
    async fn list_patients(&self, page: Pagination) -> AppResult<Page<PatientEntity>>;
    /// `None` when no such patient exists.
    async fn update_patient_profile(
        &self,
        id: Uuid,
        changes: PatientProfileChanges,
    ) -> AppResult<Option<PatientEntity>>;

    /// `Conflict` when the name or email is taken.
    async fn create_practitioner(
        &self,
        practitioner: CreatePractitionerEntity,
    ) -> AppResult<PractitionerEntity>;
    async fn find_practitioner(&self, id: Uuid) -> AppResult<Option<PractitionerEntity>>;
    async fn find_practitioner_by_email(&self, email: &str)
    -> AppResult<Option<PractitionerEntity>>;
    async fn list_practitioners(&self, page: Pagination) -> AppResult<Page<PractitionerEntity>>;
    /// Active practitioners whose name or speciality contains `term`,
    /// ignoring case.
    async fn search_practitioners(
        &self,
        term: &str,
        page: Pagination,
    ) -> AppResult<Page<PractitionerEntity>>;

    async fn update_credential(
        &self,
        kind: IdentityKind,
        id: Uuid,
        password_hash: &str,
    ) -> AppResult<()>;
    async fn set_refresh_token_digest(
        &self,
        kind: IdentityKind,
        id: Uuid,
        digest: Option<&str>,
    ) -> AppResult<()>;
    /// Replaces the refresh digest only while it still equals `current`.
    /// Returns whether the swap happened.
    async fn rotate_refresh_token_digest(
        &self,
        kind: IdentityKind,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait AppointmentLedger: Send + Sync {
    /// Must fail with `Conflict` if the slot is already booked, including when
    /// a concurrent writer got there first.
    async fn insert(&self, appointment: CreateAppointmentEntity) -> AppResult<AppointmentEntity>;
    async fn find(&self, id: Uuid) -> AppResult<Option<AppointmentEntity>>;
    async fn find_slot(&self, slot: &SlotKey) -> AppResult<Option<AppointmentEntity>>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
    /// Newest appointment date first.
    async fn list_by_owner(
        &self,
        owner: Owner,
        page: Pagination,
    ) -> AppResult<Page<AppointmentEntity>>;

    /// Stores the gateway order id while payment is still pending.
    /// `None` when the appointment is gone or already completed.
    async fn record_order(&self, id: Uuid, order_id: &str) -> AppResult<Option<AppointmentEntity>>;

    /// Compare-and-swap `pending -> completed`, gated on the stored order id
    /// matching the receipt. `None` when the swap did not happen.
    async fn complete_payment(
        &self,
        id: Uuid,
        receipt: &PaymentReceipt,
    ) -> AppResult<Option<AppointmentEntity>>;
}
