use anyhow::Context;
use async_trait::async_trait;
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, PgTextExpressionMethods,
    QueryDsl, SelectableHelper,
    pg::Pg,
    result::{DatabaseErrorKind, Error as DieselError},
};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::{
    models::{
        AppointmentEntity, CreateAppointmentEntity, CreatePatientEntity, CreatePractitionerEntity,
        PatientEntity, PatientProfileChanges, PaymentReceipt, PaymentStatus, PaymentType,
        PractitionerEntity,
    },
    platform::{
        app_error::{AppError, AppResult},
        db::DbPool,
    },
    schema::{appointments, patients, practitioners},
    store::{AppointmentLedger, IdentityKind, IdentityStore, Owner, Page, Pagination, SlotKey},
};

fn conflict_on_unique(err: DieselError, conflict: &str, context: &'static str) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::Conflict(conflict.to_string())
        }
        other => AppError::Other(anyhow::Error::new(other).context(context)),
    }
}

/// `%term%` for ILIKE with the pattern metacharacters escaped.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn practitioners_matching(pattern: &str) -> practitioners::BoxedQuery<'static, Pg> {
    practitioners::table
        .filter(practitioners::is_active.eq(true))
        .filter(
            practitioners::name
                .ilike(pattern.to_string())
                .or(practitioners::speciality.ilike(pattern.to_string())),
        )
        .into_boxed()
}

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: DbPool,
}

impl PgIdentityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create_patient(&self, patient: CreatePatientEntity) -> AppResult<PatientEntity> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        diesel::insert_into(patients::table)
            .values(patient)
            .returning(PatientEntity::as_returning())
            .get_result(conn)
            .await
            .map_err(|err| {
                conflict_on_unique(
                    err,
                    "Username or email is already taken",
                    "Failed to create patient",
                )
            })
    }

    async fn find_patient(&self, id: Uuid) -> AppResult<Option<PatientEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let patient = patients::table
            .find(id)
            .select(PatientEntity::as_select())
            .first(conn)
            .await
            .optional()
            .context("Failed to get patient")?;

        Ok(patient)
    }

    async fn find_patient_by_email(&self, email: &str) -> AppResult<Option<PatientEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let patient = patients::table
            .filter(patients::email.eq(email))
            .select(PatientEntity::as_select())
            .first(conn)
            .await
            .optional()
            .context("Failed to get patient by email")?;

        Ok(patient)
    }

    async fn list_patients(&self, page: Pagination) -> AppResult<Page<PatientEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let total_count: i64 = patients::table
            .count()
            .get_result(conn)
            .await
            .context("Failed to count patients")?;

        let items: Vec<PatientEntity> = patients::table
            .order(patients::created_at.desc())
            .limit(page.limit)
            .offset(page.offset)
            .select(PatientEntity::as_select())
            .load(conn)
            .await
            .context("Failed to get patients")?;

        Ok(Page { items, total_count })
    }

    async fn update_patient_profile(
        &self,
        id: Uuid,
        changes: PatientProfileChanges,
    ) -> AppResult<Option<PatientEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let patient = diesel::update(patients::table.find(id))
            .set((changes, patients::updated_at.eq(diesel::dsl::now)))
            .returning(PatientEntity::as_returning())
            .get_result(conn)
            .await
            .optional()
            .context("Failed to update patient profile")?;

        Ok(patient)
    }

    async fn create_practitioner(
        &self,
        practitioner: CreatePractitionerEntity,
    ) -> AppResult<PractitionerEntity> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        diesel::insert_into(practitioners::table)
            .values(practitioner)
            .returning(PractitionerEntity::as_returning())
            .get_result(conn)
            .await
            .map_err(|err| {
                conflict_on_unique(
                    err,
                    "Doctor name or email is already taken",
                    "Failed to create practitioner",
                )
            })
    }

    async fn find_practitioner(&self, id: Uuid) -> AppResult<Option<PractitionerEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let practitioner = practitioners::table
            .find(id)
            .select(PractitionerEntity::as_select())
            .first(conn)
            .await
            .optional()
            .context("Failed to get practitioner")?;

        Ok(practitioner)
    }

    async fn find_practitioner_by_email(
        &self,
        email: &str,
    ) -> AppResult<Option<PractitionerEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let practitioner = practitioners::table
            .filter(practitioners::email.eq(email))
            .select(PractitionerEntity::as_select())
            .first(conn)
            .await
            .optional()
            .context("Failed to get practitioner by email")?;

        Ok(practitioner)
    }

    async fn list_practitioners(&self, page: Pagination) -> AppResult<Page<PractitionerEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let total_count: i64 = practitioners::table
            .filter(practitioners::is_active.eq(true))
            .count()
            .get_result(conn)
            .await
            .context("Failed to count practitioners")?;

        let items: Vec<PractitionerEntity> = practitioners::table
            .filter(practitioners::is_active.eq(true))
            .order(practitioners::name.asc())
            .limit(page.limit)
            .offset(page.offset)
            .select(PractitionerEntity::as_select())
            .load(conn)
            .await
            .context("Failed to get practitioners")?;

        Ok(Page { items, total_count })
    }

    async fn search_practitioners(
        &self,
        term: &str,
        page: Pagination,
    ) -> AppResult<Page<PractitionerEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let pattern = contains_pattern(term);

        let total_count: i64 = practitioners_matching(&pattern)
            .count()
            .get_result(conn)
            .await
            .context("Failed to count matching practitioners")?;

        let items: Vec<PractitionerEntity> = practitioners_matching(&pattern)
            .order(practitioners::name.asc())
            .limit(page.limit)
            .offset(page.offset)
            .select(PractitionerEntity::as_select())
            .load(conn)
            .await
            .context("Failed to search practitioners")?;

        Ok(Page { items, total_count })
    }

    async fn update_credential(
        &self,
        kind: IdentityKind,
        id: Uuid,
        password_hash: &str,
    ) -> AppResult<()> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let updated = match kind {
            IdentityKind::Patient => {
                diesel::update(patients::table.find(id))
                    .set((
                        patients::password_hash.eq(password_hash),
                        patients::refresh_token_digest.eq(None::<String>),
                        patients::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await
            }
            IdentityKind::Practitioner => {
                diesel::update(practitioners::table.find(id))
                    .set((
                        practitioners::password_hash.eq(password_hash),
                        practitioners::refresh_token_digest.eq(None::<String>),
                        practitioners::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await
            }
        }
        .context("Failed to update credential")?;

        if updated == 0 {
            return Err(AppError::NotFound("Account does not exist".into()));
        }
        Ok(())
    }

    async fn set_refresh_token_digest(
        &self,
        kind: IdentityKind,
        id: Uuid,
        digest: Option<&str>,
    ) -> AppResult<()> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let result = match kind {
            IdentityKind::Patient => {
                diesel::update(patients::table.find(id))
                    .set(patients::refresh_token_digest.eq(digest))
                    .execute(conn)
                    .await
            }
            IdentityKind::Practitioner => {
                diesel::update(practitioners::table.find(id))
                    .set(practitioners::refresh_token_digest.eq(digest))
                    .execute(conn)
                    .await
            }
        };
        result.context("Failed to store refresh token")?;

        Ok(())
    }

    async fn rotate_refresh_token_digest(
        &self,
        kind: IdentityKind,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> AppResult<bool> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let updated = match kind {
            IdentityKind::Patient => {
                diesel::update(
                    patients::table
                        .find(id)
                        .filter(patients::refresh_token_digest.eq(current)),
                )
                .set(patients::refresh_token_digest.eq(next))
                .execute(conn)
                .await
            }
            IdentityKind::Practitioner => {
                diesel::update(
                    practitioners::table
                        .find(id)
                        .filter(practitioners::refresh_token_digest.eq(current)),
                )
                .set(practitioners::refresh_token_digest.eq(next))
                .execute(conn)
                .await
            }
        }
        .context("Failed to rotate refresh token")?;

        Ok(updated > 0)
    }
}

#[derive(Clone)]
pub struct PgAppointmentLedger {
    pool: DbPool,
}

impl PgAppointmentLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn owned_by(owner: Owner) -> appointments::BoxedQuery<'static, Pg> {
    match owner {
        Owner::Patient(id) => appointments::table
            .filter(appointments::patient_id.eq(id))
            .into_boxed(),
        Owner::Practitioner(id) => appointments::table
            .filter(appointments::practitioner_id.eq(id))
            .into_boxed(),
    }
}

#[async_trait]
impl AppointmentLedger for PgAppointmentLedger {
    async fn insert(&self, appointment: CreateAppointmentEntity) -> AppResult<AppointmentEntity> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        // appointments_slot_unique rejects the loser of a concurrent booking race.
        diesel::insert_into(appointments::table)
            .values(appointment)
            .returning(AppointmentEntity::as_returning())
            .get_result(conn)
            .await
            .map_err(|err| {
                conflict_on_unique(
                    err,
                    "Appointment already exists for the selected date and time",
                    "Failed to create appointment",
                )
            })
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<AppointmentEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let appointment = appointments::table
            .find(id)
            .select(AppointmentEntity::as_select())
            .first(conn)
            .await
            .optional()
            .context("Failed to get appointment")?;

        Ok(appointment)
    }

    async fn find_slot(&self, slot: &SlotKey) -> AppResult<Option<AppointmentEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let appointment = appointments::table
            .filter(appointments::patient_id.eq(slot.patient_id))
            .filter(appointments::practitioner_id.eq(slot.practitioner_id))
            .filter(appointments::appointment_date.eq(slot.appointment_date))
            .filter(appointments::appointment_time.eq(&slot.appointment_time))
            .select(AppointmentEntity::as_select())
            .first(conn)
            .await
            .optional()
            .context("Failed to look up appointment slot")?;

        Ok(appointment)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let deleted = diesel::delete(appointments::table.find(id))
            .execute(conn)
            .await
            .context("Failed to delete appointment")?;

        Ok(deleted > 0)
    }

    async fn list_by_owner(
        &self,
        owner: Owner,
        page: Pagination,
    ) -> AppResult<Page<AppointmentEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let total_count: i64 = owned_by(owner)
            .count()
            .get_result(conn)
            .await
            .context("Failed to count appointments")?;

        let items: Vec<AppointmentEntity> = owned_by(owner)
            .order((
                appointments::appointment_date.desc(),
                appointments::appointment_time.desc(),
            ))
            .limit(page.limit)
            .offset(page.offset)
            .select(AppointmentEntity::as_select())
            .load(conn)
            .await
            .context("Failed to get appointments")?;

        Ok(Page { items, total_count })
    }

    async fn record_order(&self, id: Uuid, order_id: &str) -> AppResult<Option<AppointmentEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let updated = diesel::update(
            appointments::table
                .find(id)
                .filter(appointments::payment_status.eq(PaymentStatus::Pending.as_str())),
        )
        .set((
            appointments::order_id.eq(order_id),
            appointments::updated_at.eq(diesel::dsl::now),
        ))
        .returning(AppointmentEntity::as_returning())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to record payment order")?;

        Ok(updated)
    }

    async fn complete_payment(
        &self,
        id: Uuid,
        receipt: &PaymentReceipt,
    ) -> AppResult<Option<AppointmentEntity>> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let updated = diesel::update(
            appointments::table
                .find(id)
                .filter(appointments::payment_status.eq(PaymentStatus::Pending.as_str()))
                .filter(appointments::order_id.eq(&receipt.order_id)),
        )
        .set((
            appointments::payment_status.eq(PaymentStatus::Completed.as_str()),
            appointments::payment_type.eq(PaymentType::Online.as_str()),
            appointments::payment_id.eq(&receipt.payment_id),
            appointments::signature.eq(&receipt.signature),
            appointments::updated_at.eq(diesel::dsl::now),
        ))
        .returning(AppointmentEntity::as_returning())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to update payment status")?;

        Ok(updated)
    }
}
