use std::sync::Arc;

use crate::{
    api::{notifications::Notifier, razorpay::PaymentGateway},
    auth::{credentials::CredentialHasher, guard::AuthGuard, token::TokenSigner},
    platform::config::AuthConfig,
    services::{accounts::AccountService, booking::BookingService, payments::PaymentService},
    store::{AppointmentLedger, IdentityStore},
};

/// Shared handles injected into every handler.
///
/// Collaborators are trait objects so tests can swap in in-memory stores and a
/// fake gateway.
#[derive(Clone)]
pub struct AppState {
    pub identities: Arc<dyn IdentityStore>,
    pub ledger: Arc<dyn AppointmentLedger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub hasher: Arc<dyn CredentialHasher>,
    pub access_tokens: TokenSigner,
    pub refresh_tokens: TokenSigner,
    pub currency: Arc<str>,
    pub cookie_secure: bool,
}

pub struct Collaborators {
    pub identities: Arc<dyn IdentityStore>,
    pub ledger: Arc<dyn AppointmentLedger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub hasher: Arc<dyn CredentialHasher>,
}

impl AppState {
    pub fn new(collaborators: Collaborators, auth: &AuthConfig, currency: &str) -> Self {
        Self {
            identities: collaborators.identities,
            ledger: collaborators.ledger,
            gateway: collaborators.gateway,
            notifier: collaborators.notifier,
            hasher: collaborators.hasher,
            access_tokens: TokenSigner::new(&auth.access_token_secret, auth.access_token_ttl),
            refresh_tokens: TokenSigner::new(&auth.refresh_token_secret, auth.refresh_token_ttl),
            currency: Arc::from(currency),
            cookie_secure: auth.cookie_secure,
        }
    }

    pub fn guard(&self) -> AuthGuard {
        AuthGuard::new(self.identities.clone(), self.access_tokens.clone())
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(
            self.identities.clone(),
            self.hasher.clone(),
            self.access_tokens.clone(),
            self.refresh_tokens.clone(),
        )
    }

    pub fn booking(&self) -> BookingService {
        BookingService::new(
            self.identities.clone(),
            self.ledger.clone(),
            self.notifier.clone(),
        )
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(
            self.ledger.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.currency.to_string(),
        )
    }
}
