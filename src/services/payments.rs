//! Online payment for appointments.
//!
//! Each appointment moves `no order -> pending order -> completed` and never
//! back. Completion is a conditional write on the ledger, so concurrent
//! verifications transition it exactly once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        notifications::{Notifier, notify_best_effort},
        razorpay::PaymentGateway,
    },
    models::{AppointmentEntity, PatientProfile, PaymentReceipt, PaymentStatus},
    platform::app_error::{AppError, AppResult},
    services::booking::parse_amount,
    store::AppointmentLedger,
};

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub appointment_id: Uuid,
    /// Major currency units with at most two decimals, as a number or a
    /// numeric string. Must equal the booked amount.
    #[schema(value_type = String, example = "500")]
    pub amount: Value,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub appointment_id: Uuid,
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// What a client needs to open the gateway checkout.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderHandle {
    pub appointment_id: Uuid,
    pub order_id: String,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Verification {
    pub appointment: AppointmentEntity,
    /// Set when this call found the payment already completed.
    pub already_verified: bool,
}

pub struct PaymentService {
    ledger: Arc<dyn AppointmentLedger>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    currency: String,
}

impl PaymentService {
    pub fn new(
        ledger: Arc<dyn AppointmentLedger>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        currency: String,
    ) -> Self {
        Self {
            ledger,
            gateway,
            notifier,
            currency,
        }
    }

    pub async fn initiate_checkout(
        &self,
        payer: &PatientProfile,
        request: CheckoutRequest,
    ) -> AppResult<OrderHandle> {
        let amount_minor = checkout_amount_minor(&request.amount)?;

        let appointment = self.owned_appointment(payer, request.appointment_id).await?;
        if appointment.payment_status() == PaymentStatus::Completed {
            return Err(AppError::Conflict(
                "Payment for this appointment is already completed".into(),
            ));
        }
        if amount_minor != minor_units(&appointment.amount_to_pay)? {
            tracing::warn!(
                "Checkout amount {} does not match booked amount {} for appointment {}",
                request.amount,
                appointment.amount_to_pay,
                appointment.id
            );
            return Err(AppError::InvalidInput(format!(
                "amount must equal the booked amount of {}",
                appointment.amount_to_pay
            )));
        }

        let order = self
            .gateway
            .create_order(amount_minor, &self.currency, &appointment.id.to_string())
            .await?;

        self.ledger
            .record_order(appointment.id, &order.id)
            .await?
            .ok_or_else(|| {
                AppError::Conflict("Appointment was paid or removed during checkout".into())
            })?;

        tracing::info!(
            "Created payment order {} for appointment {}",
            order.id,
            appointment.id
        );

        Ok(OrderHandle {
            appointment_id: appointment.id,
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key: self.gateway.key_id().to_string(),
        })
    }

    /// Repeating a successful verification with the identical receipt is a
    /// no-op; any other attempt on a completed appointment is a `Conflict`.
    pub async fn verify_payment(
        &self,
        payer: &PatientProfile,
        request: VerifyPaymentRequest,
    ) -> AppResult<Verification> {
        let receipt = PaymentReceipt {
            order_id: required(&request.order_id, "orderId")?,
            payment_id: required(&request.payment_id, "paymentId")?,
            signature: required(&request.signature, "signature")?,
        };

        let appointment = self.owned_appointment(payer, request.appointment_id).await?;
        if appointment.payment_status() == PaymentStatus::Completed {
            return self.settled(appointment, &receipt);
        }

        let Some(order_id) = appointment.order_id.as_deref() else {
            return Err(AppError::Conflict(
                "No payment order has been created for this appointment".into(),
            ));
        };
        if order_id != receipt.order_id {
            tracing::warn!(
                "Payment verification for appointment {} used a foreign order {}",
                appointment.id,
                receipt.order_id
            );
            return Err(AppError::InvalidSignature);
        }
        if !self
            .gateway
            .verify_signature(&receipt.order_id, &receipt.payment_id, &receipt.signature)
        {
            tracing::warn!(
                "Rejected payment signature for appointment {}",
                appointment.id
            );
            return Err(AppError::InvalidSignature);
        }

        let Some(completed) = self.ledger.complete_payment(appointment.id, &receipt).await? else {
            // Lost the race to a concurrent verification or re-checkout.
            let current = self
                .ledger
                .find(appointment.id)
                .await?
                .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;
            return self.settled(current, &receipt);
        };

        tracing::info!(
            "Payment {} completed appointment {}",
            receipt.payment_id,
            completed.id
        );

        notify_best_effort(
            self.notifier.as_ref(),
            &payer.email,
            "Payment Successful",
            json!({
                "patientName": payer.name,
                "appointmentDate": completed.appointment_date,
                "appointmentTime": completed.appointment_time,
                "amount": completed.amount_to_pay,
                "orderId": receipt.order_id,
                "paymentId": receipt.payment_id,
            }),
        )
        .await;

        Ok(Verification {
            appointment: completed,
            already_verified: false,
        })
    }

    async fn owned_appointment(
        &self,
        payer: &PatientProfile,
        appointment_id: Uuid,
    ) -> AppResult<AppointmentEntity> {
        let appointment = self
            .ledger
            .find(appointment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;

        if appointment.patient_id != payer.id {
            return Err(AppError::Forbidden(
                "You can only pay for your own appointments".into(),
            ));
        }
        Ok(appointment)
    }

    /// Outcome of a verification that could not perform the transition itself.
    ///
    /// The stored signature was checked when it was recorded, so a repeat is
    /// identical exactly when it carries the same ids and a valid signature.
    fn settled(
        &self,
        appointment: AppointmentEntity,
        receipt: &PaymentReceipt,
    ) -> AppResult<Verification> {
        if appointment.payment_status() != PaymentStatus::Completed {
            return Err(AppError::Conflict(
                "Payment order was replaced by a newer checkout, verify that order instead".into(),
            ));
        }

        let same_receipt = appointment.order_id.as_deref() == Some(receipt.order_id.as_str())
            && appointment.payment_id.as_deref() == Some(receipt.payment_id.as_str())
            && self.gateway.verify_signature(
                &receipt.order_id,
                &receipt.payment_id,
                &receipt.signature,
            );

        if same_receipt {
            Ok(Verification {
                appointment,
                already_verified: true,
            })
        } else {
            Err(AppError::Conflict(
                "Payment for this appointment was already completed with a different payment"
                    .into(),
            ))
        }
    }
}

/// Accepts `500`, `499.5` or `"499.50"` and returns minor units.
pub fn checkout_amount_minor(value: &Value) -> AppResult<i64> {
    match value {
        Value::Number(number) => minor_units(&number.to_string()),
        Value::String(raw) => minor_units(raw),
        _ => Err(AppError::InvalidInput(
            "amount must be a positive number with at most two decimals".into(),
        )),
    }
}

/// Converts a positive decimal with at most two fractional digits to minor
/// units without going through floating point.
pub fn minor_units(amount: &str) -> AppResult<i64> {
    let amount = parse_amount(amount)?;
    let (whole, fraction) = amount.split_once('.').unwrap_or((amount.as_str(), ""));
    let too_large = || AppError::InvalidInput("amount is too large".into());

    let whole: i64 = whole.parse().map_err(|_| too_large())?;
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| too_large())? * 10,
        _ => fraction.parse().map_err(|_| too_large())?,
    };

    whole
        .checked_mul(100)
        .and_then(|minor| minor.checked_add(cents))
        .ok_or_else(too_large)
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{field} is required")));
    }
    Ok(value.to_string())
}
