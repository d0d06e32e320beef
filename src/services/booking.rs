//! Appointment booking, cancellation and role-scoped listings.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::notifications::{Notifier, notify_best_effort},
    auth::guard::Principal,
    models::{AppointmentEntity, CreateAppointmentEntity, PaymentStatus, PaymentType},
    platform::app_error::{AppError, AppResult},
    store::{AppointmentLedger, IdentityStore, Owner, Page, Pagination, SlotKey},
};

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointment {
    pub practitioner_id: Uuid,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub date: String,
    pub time: String,
    /// Decimal string, e.g. `"500"` or `"499.50"`.
    pub amount: String,
    pub payment_type: String,
}

pub struct BookingService {
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn AppointmentLedger>,
    notifier: Arc<dyn Notifier>,
}

impl BookingService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn AppointmentLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            identities,
            ledger,
            notifier,
        }
    }

    pub async fn create_appointment(
        &self,
        patient_id: Uuid,
        request: BookAppointment,
    ) -> AppResult<AppointmentEntity> {
        let appointment_date = parse_appointment_date(&request.date, Utc::now().date_naive())?;
        let appointment_time = request.time.trim().to_string();
        if appointment_time.is_empty() {
            return Err(AppError::InvalidInput("time is required".into()));
        }
        let amount_to_pay = parse_amount(&request.amount)?;
        let payment_type = PaymentType::parse(&request.payment_type).ok_or_else(|| {
            AppError::InvalidInput("paymentType must be either online or cash".into())
        })?;

        let patient = self
            .identities
            .find_patient(patient_id)
            .await?
            .filter(|patient| patient.is_active)
            .ok_or_else(|| AppError::NotFound("Patient not found".into()))?;
        let practitioner = self
            .identities
            .find_practitioner(request.practitioner_id)
            .await?
            .filter(|practitioner| practitioner.is_active)
            .ok_or_else(|| AppError::NotFound("Doctor not found".into()))?;

        let slot = SlotKey {
            patient_id: patient.id,
            practitioner_id: practitioner.id,
            appointment_date,
            appointment_time,
        };
        if self.ledger.find_slot(&slot).await?.is_some() {
            return Err(AppError::Conflict(
                "Appointment already booked for this slot".into(),
            ));
        }

        // The unique slot index still rejects a concurrent duplicate here.
        let appointment = self
            .ledger
            .insert(CreateAppointmentEntity {
                id: Uuid::new_v4(),
                patient_id: slot.patient_id,
                practitioner_id: slot.practitioner_id,
                appointment_date: slot.appointment_date,
                appointment_time: slot.appointment_time,
                amount_to_pay,
                payment_type: payment_type.as_str().to_string(),
                payment_status: PaymentStatus::Pending.as_str().to_string(),
            })
            .await?;

        tracing::info!(
            "Booked appointment {} for patient {} with practitioner {}",
            appointment.id,
            patient.id,
            practitioner.id
        );

        notify_best_effort(
            self.notifier.as_ref(),
            &patient.email,
            "Appointment Booked",
            json!({
                "patientName": patient.name,
                "doctorName": practitioner.name,
                "appointmentDate": appointment.appointment_date,
                "appointmentTime": appointment.appointment_time,
                "amount": appointment.amount_to_pay,
                "paymentType": appointment.payment_type,
            }),
        )
        .await;

        Ok(appointment)
    }

    /// Only the owning patient or the owning practitioner may cancel.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        requester: &Principal,
    ) -> AppResult<()> {
        let appointment = self
            .ledger
            .find(appointment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;

        if !is_party(requester, &appointment) {
            return Err(AppError::Forbidden(
                "You are not allowed to cancel this appointment".into(),
            ));
        }

        if !self.ledger.delete(appointment_id).await? {
            return Err(AppError::NotFound("Appointment not found".into()));
        }

        tracing::info!("Appointment {} cancelled by {}", appointment_id, requester.id());
        Ok(())
    }

    /// Visible to its patient and its practitioner only.
    pub async fn appointment_details(
        &self,
        appointment_id: Uuid,
        requester: &Principal,
    ) -> AppResult<AppointmentEntity> {
        let appointment = self
            .ledger
            .find(appointment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;

        if !is_party(requester, &appointment) {
            return Err(AppError::Forbidden(
                "You are not allowed to view this appointment".into(),
            ));
        }
        Ok(appointment)
    }

    /// Any account's appointments, for administrators. The owner must exist.
    pub async fn list_for_owner(
        &self,
        owner: Owner,
        page: Pagination,
    ) -> AppResult<Page<AppointmentEntity>> {
        let exists = match owner {
            Owner::Patient(id) => self.identities.find_patient(id).await?.is_some(),
            Owner::Practitioner(id) => self.identities.find_practitioner(id).await?.is_some(),
        };
        if !exists {
            return Err(AppError::NotFound(match owner {
                Owner::Patient(_) => "User does not exist".into(),
                Owner::Practitioner(_) => "Doctor does not exist".into(),
            }));
        }

        self.ledger.list_by_owner(owner, page).await
    }

    pub async fn list_appointments(
        &self,
        principal: &Principal,
        page: Pagination,
    ) -> AppResult<Page<AppointmentEntity>> {
        self.ledger.list_by_owner(principal.owner(), page).await
    }
}

fn is_party(principal: &Principal, appointment: &AppointmentEntity) -> bool {
    match principal {
        Principal::Patient(patient) => patient.id == appointment.patient_id,
        Principal::Practitioner(practitioner) => practitioner.id == appointment.practitioner_id,
    }
}

/// Normalises to a UTC calendar day and rejects days before `today`.
pub fn parse_appointment_date(raw: &str, today: NaiveDate) -> AppResult<NaiveDate> {
    let raw = raw.trim();
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|timestamp| timestamp.with_timezone(&Utc).date_naive())
        })
        .ok_or_else(|| {
            AppError::InvalidInput("date must be YYYY-MM-DD or an RFC 3339 timestamp".into())
        })?;

    if date < today {
        return Err(AppError::InvalidInput(
            "Appointment date cannot be in the past".into(),
        ));
    }
    Ok(date)
}

/// Positive decimal with at most two fractional digits, returned trimmed.
pub fn parse_amount(raw: &str) -> AppResult<String> {
    let invalid = || {
        AppError::InvalidInput(
            "amount must be a positive number with at most two decimals".into(),
        )
    };

    let amount = raw.trim();
    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (amount, None),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if let Some(fraction) = fraction {
        if fraction.is_empty()
            || fraction.len() > 2
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
    }
    if !amount.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        return Err(invalid());
    }

    Ok(amount.to_string())
}
