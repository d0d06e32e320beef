//! Razorpay order creation and payment-signature verification.

use anyhow::Context;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::platform::{
    app_error::{AppError, AppResult},
    config::PaymentConfig,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// One synchronous attempt; any transport or gateway failure is an
    /// `UpstreamError`.
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> AppResult<GatewayOrder>;

    /// Constant-time check of the checkout callback signature.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    /// Publishable key handed to clients to open the checkout widget.
    fn key_id(&self) -> &str;
}

#[derive(Serialize)]
struct CreateOrderReq<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

pub struct RazorpayGateway {
    client: Client,
    api_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    /// The client timeout bounds every gateway call.
    pub fn new(config: &PaymentConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build payment gateway HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> AppResult<GatewayOrder> {
        let res = self
            .client
            .post(format!("{}/v1/orders", self.api_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderReq {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    tracing::warn!("Payment gateway timed out creating order {}", receipt);
                } else {
                    tracing::warn!("Payment gateway unreachable: {}", err);
                }
                AppError::UpstreamError("PaymentGateway".into())
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!("Payment gateway rejected order {}: {} {}", receipt, status, body);
            return Err(AppError::UpstreamError("PaymentGateway".into()));
        }

        res.json::<GatewayOrder>().await.map_err(|err| {
            tracing::warn!("Payment gateway returned an unreadable order: {}", err);
            AppError::UpstreamError("PaymentGateway".into())
        })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(&self.key_secret, order_id, payment_id, signature)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

fn signature_mac(secret: &str, order_id: &str, payment_id: &str) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac
}

/// Hex HMAC-SHA256 of `"{order_id}|{payment_id}"`, as issued by the gateway.
pub fn payment_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    hex::encode(signature_mac(secret, order_id, payment_id).finalize().into_bytes())
}

pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    signature_mac(secret, order_id, payment_id)
        .verify_slice(&provided)
        .is_ok()
}
