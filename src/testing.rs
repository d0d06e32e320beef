//! In-memory collaborators for service and router tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    api::{
        notifications::Notifier,
        razorpay::{GatewayOrder, PaymentGateway, payment_signature, verify_payment_signature},
    },
    auth::credentials::{BcryptHasher, CredentialHasher, MIN_BCRYPT_COST},
    models::{
        AppointmentEntity, CreateAppointmentEntity, CreatePatientEntity, CreatePractitionerEntity,
        PatientEntity, PatientProfileChanges, PaymentReceipt, PaymentStatus, PaymentType,
        PractitionerEntity, Role,
    },
    platform::{
        app_error::{AppError, AppResult},
        app_state::{AppState, Collaborators},
        config::AuthConfig,
    },
    store::{AppointmentLedger, IdentityKind, IdentityStore, Owner, Page, Pagination, SlotKey},
};

pub const PASSWORD: &str = "correct-horse";
pub const GATEWAY_KEY_ID: &str = "rzp_test_key";
pub const GATEWAY_SECRET: &str = "rzp_test_secret";

pub fn days_from_today(days: i64) -> NaiveDate {
    let today = Utc::now().date_naive();
    if days >= 0 {
        today + Days::new(days as u64)
    } else {
        today - Days::new(days.unsigned_abs())
    }
}

pub fn gateway_signature(order_id: &str, payment_id: &str) -> String {
    payment_signature(GATEWAY_SECRET, order_id, payment_id)
}

fn page_of<T: Clone>(items: &[T], page: Pagination) -> Page<T> {
    Page {
        items: items
            .iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect(),
        total_count: items.len() as i64,
    }
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    patients: Mutex<Vec<PatientEntity>>,
    practitioners: Mutex<Vec<PractitionerEntity>>,
    pinned_patient: Mutex<Option<PatientEntity>>,
}

impl MemoryIdentityStore {
    /// Makes `find_patient` keep returning this snapshot, as a reader that
    /// raced a concurrent writer would see it.
    pub fn pin_patient_read(&self, patient: PatientEntity) {
        *self.pinned_patient.lock().unwrap() = Some(patient);
    }

    pub fn patient(&self, id: Uuid) -> Option<PatientEntity> {
        self.patients.lock().unwrap().iter().find(|p| p.id == id).cloned()
    }

    pub fn patient_count(&self) -> usize {
        self.patients.lock().unwrap().len()
    }

    pub fn deactivate_practitioner(&self, id: Uuid) {
        if let Some(practitioner) = self
            .practitioners
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| p.id == id)
        {
            practitioner.is_active = false;
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_patient(&self, patient: CreatePatientEntity) -> AppResult<PatientEntity> {
        let mut patients = self.patients.lock().unwrap();
        if patients
            .iter()
            .any(|p| p.name == patient.name || p.email == patient.email)
        {
            return Err(AppError::Conflict("User with email or username already exists".into()));
        }

        let now = Utc::now();
        let entity = PatientEntity {
            id: patient.id,
            name: patient.name,
            email: patient.email,
            password_hash: patient.password_hash,
            phone: patient.phone,
            address: patient.address,
            gender: patient.gender,
            dob: patient.dob,
            role: patient.role,
            is_active: true,
            refresh_token_digest: None,
            created_at: now,
            updated_at: now,
        };
        patients.push(entity.clone());
        Ok(entity)
    }

    async fn find_patient(&self, id: Uuid) -> AppResult<Option<PatientEntity>> {
        let pinned = self.pinned_patient.lock().unwrap().clone();
        match pinned {
            Some(snapshot) if snapshot.id == id => Ok(Some(snapshot)),
            _ => Ok(self.patient(id)),
        }
    }

    async fn find_patient_by_email(&self, email: &str) -> AppResult<Option<PatientEntity>> {
        Ok(self
            .patients
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.email == email)
            .cloned())
    }

    async fn list_patients(&self, page: Pagination) -> AppResult<Page<PatientEntity>> {
        Ok(page_of(&self.patients.lock().unwrap(), page))
    }

    async fn update_patient_profile(
        &self,
        id: Uuid,
        changes: PatientProfileChanges,
    ) -> AppResult<Option<PatientEntity>> {
        Ok(self
            .patients
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| p.id == id)
            .map(|p| {
                if let Some(phone) = changes.phone {
                    p.phone = Some(phone);
                }
                if let Some(address) = changes.address {
                    p.address = Some(address);
                }
                if let Some(gender) = changes.gender {
                    p.gender = Some(gender);
                }
                if let Some(dob) = changes.dob {
                    p.dob = Some(dob);
                }
                p.updated_at = Utc::now();
                p.clone()
            }))
    }

    async fn create_practitioner(
        &self,
        practitioner: CreatePractitionerEntity,
    ) -> AppResult<PractitionerEntity> {
        let mut practitioners = self.practitioners.lock().unwrap();
        if practitioners
            .iter()
            .any(|p| p.name == practitioner.name || p.email == practitioner.email)
        {
            return Err(AppError::Conflict("Doctor with email or name already exists".into()));
        }

        let now = Utc::now();
        let entity = PractitionerEntity {
            id: practitioner.id,
            name: practitioner.name,
            email: practitioner.email,
            password_hash: practitioner.password_hash,
            profile_img: practitioner.profile_img,
            degree: practitioner.degree,
            speciality: practitioner.speciality,
            experience: practitioner.experience,
            about: practitioner.about,
            fees: practitioner.fees,
            is_active: true,
            refresh_token_digest: None,
            created_at: now,
            updated_at: now,
        };
        practitioners.push(entity.clone());
        Ok(entity)
    }

    async fn find_practitioner(&self, id: Uuid) -> AppResult<Option<PractitionerEntity>> {
        Ok(self
            .practitioners
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn find_practitioner_by_email(
        &self,
        email: &str,
    ) -> AppResult<Option<PractitionerEntity>> {
        Ok(self
            .practitioners
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.email == email)
            .cloned())
    }

    async fn list_practitioners(&self, page: Pagination) -> AppResult<Page<PractitionerEntity>> {
        Ok(page_of(&self.practitioners.lock().unwrap(), page))
    }

    async fn search_practitioners(
        &self,
        term: &str,
        page: Pagination,
    ) -> AppResult<Page<PractitionerEntity>> {
        let term = term.to_lowercase();
        let mut matches: Vec<PractitionerEntity> = self
            .practitioners
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                p.is_active
                    && (p.name.to_lowercase().contains(&term)
                        || p.speciality.to_lowercase().contains(&term))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page_of(&matches, page))
    }

    async fn update_credential(
        &self,
        kind: IdentityKind,
        id: Uuid,
        password_hash: &str,
    ) -> AppResult<()> {
        let updated = match kind {
            IdentityKind::Patient => self
                .patients
                .lock()
                .unwrap()
                .iter_mut()
                .find(|p| p.id == id)
                .map(|p| {
                    p.password_hash = password_hash.to_string();
                    p.refresh_token_digest = None;
                })
                .is_some(),
            IdentityKind::Practitioner => self
                .practitioners
                .lock()
                .unwrap()
                .iter_mut()
                .find(|p| p.id == id)
                .map(|p| {
                    p.password_hash = password_hash.to_string();
                    p.refresh_token_digest = None;
                })
                .is_some(),
        };

        if updated {
            Ok(())
        } else {
            Err(AppError::NotFound("Account not found".into()))
        }
    }

    async fn set_refresh_token_digest(
        &self,
        kind: IdentityKind,
        id: Uuid,
        digest: Option<&str>,
    ) -> AppResult<()> {
        let digest = digest.map(str::to_string);
        match kind {
            IdentityKind::Patient => {
                if let Some(p) = self.patients.lock().unwrap().iter_mut().find(|p| p.id == id) {
                    p.refresh_token_digest = digest;
                }
            }
            IdentityKind::Practitioner => {
                if let Some(p) = self
                    .practitioners
                    .lock()
                    .unwrap()
                    .iter_mut()
                    .find(|p| p.id == id)
                {
                    p.refresh_token_digest = digest;
                }
            }
        }
        Ok(())
    }

    async fn rotate_refresh_token_digest(
        &self,
        kind: IdentityKind,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> AppResult<bool> {
        fn swap(slot: &mut Option<String>, current: &str, next: &str) -> bool {
            if slot.as_deref() == Some(current) {
                *slot = Some(next.to_string());
                true
            } else {
                false
            }
        }

        let rotated = match kind {
            IdentityKind::Patient => self
                .patients
                .lock()
                .unwrap()
                .iter_mut()
                .find(|p| p.id == id)
                .is_some_and(|p| swap(&mut p.refresh_token_digest, current, next)),
            IdentityKind::Practitioner => self
                .practitioners
                .lock()
                .unwrap()
                .iter_mut()
                .find(|p| p.id == id)
                .is_some_and(|p| swap(&mut p.refresh_token_digest, current, next)),
        };
        Ok(rotated)
    }
}

/// Enforces slot uniqueness and the pending-only payment swap like the
/// database does.
#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<AppointmentEntity>>,
    completions: AtomicUsize,
}

impl MemoryLedger {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppointmentLedger for MemoryLedger {
    async fn insert(&self, appointment: CreateAppointmentEntity) -> AppResult<AppointmentEntity> {
        let mut rows = self.rows.lock().unwrap();
        let slot = SlotKey {
            patient_id: appointment.patient_id,
            practitioner_id: appointment.practitioner_id,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time.clone(),
        };
        if rows.iter().any(|row| SlotKey::from(row) == slot) {
            return Err(AppError::Conflict(
                "Appointment already exists for the selected date and time".into(),
            ));
        }

        let now = Utc::now();
        let entity = AppointmentEntity {
            id: appointment.id,
            patient_id: appointment.patient_id,
            practitioner_id: appointment.practitioner_id,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            amount_to_pay: appointment.amount_to_pay,
            payment_type: appointment.payment_type,
            payment_status: appointment.payment_status,
            order_id: None,
            payment_id: None,
            signature: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(entity.clone());
        Ok(entity)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<AppointmentEntity>> {
        Ok(self.rows.lock().unwrap().iter().find(|row| row.id == id).cloned())
    }

    async fn find_slot(&self, slot: &SlotKey) -> AppResult<Option<AppointmentEntity>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| SlotKey::from(*row) == *slot)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| row.id != id);
        Ok(rows.len() < before)
    }

    async fn list_by_owner(
        &self,
        owner: Owner,
        page: Pagination,
    ) -> AppResult<Page<AppointmentEntity>> {
        let mut owned: Vec<AppointmentEntity> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| match owner {
                Owner::Patient(id) => row.patient_id == id,
                Owner::Practitioner(id) => row.practitioner_id == id,
            })
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            b.appointment_date
                .cmp(&a.appointment_date)
                .then_with(|| b.appointment_time.cmp(&a.appointment_time))
        });
        Ok(page_of(&owned, page))
    }

    async fn record_order(&self, id: Uuid, order_id: &str) -> AppResult<Option<AppointmentEntity>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|row| row.id == id && row.payment_status() == PaymentStatus::Pending)
            .map(|row| {
                row.order_id = Some(order_id.to_string());
                row.updated_at = Utc::now();
                row.clone()
            }))
    }

    async fn complete_payment(
        &self,
        id: Uuid,
        receipt: &PaymentReceipt,
    ) -> AppResult<Option<AppointmentEntity>> {
        let mut rows = self.rows.lock().unwrap();
        let completed = rows
            .iter_mut()
            .find(|row| {
                row.id == id
                    && row.payment_status() == PaymentStatus::Pending
                    && row.order_id.as_deref() == Some(receipt.order_id.as_str())
            })
            .map(|row| {
                row.payment_status = PaymentStatus::Completed.as_str().to_string();
                row.payment_type = PaymentType::Online.as_str().to_string();
                row.payment_id = Some(receipt.payment_id.clone());
                row.signature = Some(receipt.signature.clone());
                row.updated_at = Utc::now();
                row.clone()
            });

        if completed.is_some() {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
        Ok(completed)
    }
}

/// Issues sequential order ids unless one is queued with `next_order_id`.
#[derive(Default)]
pub struct FakeGateway {
    orders: AtomicUsize,
    failing: AtomicBool,
    queued_id: Mutex<Option<String>>,
}

impl FakeGateway {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn next_order_id(&self, id: &str) {
        *self.queued_id.lock().unwrap() = Some(id.to_string());
    }

    pub fn orders_created(&self) -> usize {
        self.orders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> AppResult<GatewayOrder> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamError("PaymentGateway".into()));
        }

        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        let id = self
            .queued_id
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| format!("order_{n}"));

        Ok(GatewayOrder {
            id,
            amount: amount_minor,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
        })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(GATEWAY_SECRET, order_id, payment_id, signature)
    }

    fn key_id(&self) -> &str {
        GATEWAY_KEY_ID
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(address, subject)` of every successful send.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, address: &str, subject: &str, _context: Value) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamError("NotificationService".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), subject.to_string()));
        Ok(())
    }
}

pub struct TestContext {
    pub state: AppState,
    pub identities: Arc<MemoryIdentityStore>,
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    hasher: Arc<BcryptHasher>,
}

impl TestContext {
    pub fn new() -> Self {
        let identities = Arc::new(MemoryIdentityStore::default());
        let ledger = Arc::new(MemoryLedger::default());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let hasher = Arc::new(BcryptHasher::new(MIN_BCRYPT_COST));

        let auth = AuthConfig {
            access_token_secret: "test-access-secret".into(),
            access_token_ttl: Duration::from_secs(900),
            refresh_token_secret: "test-refresh-secret".into(),
            refresh_token_ttl: Duration::from_secs(3600),
            cookie_secure: false,
            bcrypt_cost: MIN_BCRYPT_COST,
        };

        let state = AppState::new(
            Collaborators {
                identities: identities.clone(),
                ledger: ledger.clone(),
                gateway: gateway.clone(),
                notifier: notifier.clone(),
                hasher: hasher.clone(),
            },
            &auth,
            "INR",
        );

        Self {
            state,
            identities,
            ledger,
            gateway,
            notifier,
            hasher,
        }
    }

    pub fn access_token(&self, id: Uuid, role: Role) -> String {
        self.state.access_tokens.sign(id, role).unwrap()
    }

    pub async fn seed_patient(&self, name: &str) -> PatientEntity {
        self.seed_patient_with_id(Uuid::new_v4(), name).await
    }

    pub async fn seed_patient_with_id(&self, id: Uuid, name: &str) -> PatientEntity {
        self.insert_patient(id, name, Role::Patient).await
    }

    pub async fn seed_admin(&self, name: &str) -> PatientEntity {
        self.insert_patient(Uuid::new_v4(), name, Role::Admin).await
    }

    pub async fn seed_practitioner(&self, name: &str) -> PractitionerEntity {
        self.identities
            .create_practitioner(CreatePractitionerEntity {
                id: Uuid::new_v4(),
                name: name.to_string(),
                email: format!("{name}@clinic.test"),
                password_hash: self.hasher.hash(PASSWORD).unwrap(),
                profile_img: "https://cdn.test/doctor.png".into(),
                degree: "MBBS".into(),
                speciality: "general physician".into(),
                experience: "5 Years".into(),
                about: "Sees everyone".into(),
                fees: "500".into(),
            })
            .await
            .unwrap()
    }

    async fn insert_patient(&self, id: Uuid, name: &str, role: Role) -> PatientEntity {
        self.identities
            .create_patient(CreatePatientEntity {
                id,
                name: name.to_string(),
                email: format!("{name}@medbook.test"),
                password_hash: self.hasher.hash(PASSWORD).unwrap(),
                phone: None,
                address: None,
                gender: None,
                dob: None,
                role: role.as_str().to_string(),
            })
            .await
            .unwrap()
    }
}
