use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use medbook_appointmentservice::{
    api::{ApiUrls, notifications::HttpNotifier, razorpay::RazorpayGateway},
    auth::credentials::BcryptHasher,
    platform::{
        app_state::{AppState, Collaborators},
        bootstrap::{self, bootstrap},
        config, db, swagger,
    },
    routes,
    store::postgres::{PgAppointmentLedger, PgIdentityStore},
};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    bootstrap::init_tracing();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let pool = db::create_pool(&config.database.url).await?;
    let api_urls = ApiUrls::init();
    let http_client = reqwest::Client::builder()
        .timeout(config.payments.timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let state = AppState::new(
        Collaborators {
            identities: Arc::new(PgIdentityStore::new(pool.clone())),
            ledger: Arc::new(PgAppointmentLedger::new(pool)),
            gateway: Arc::new(RazorpayGateway::new(&config.payments)?),
            notifier: Arc::new(HttpNotifier::new(
                http_client,
                api_urls.notification_service_url,
            )),
            hasher: Arc::new(BcryptHasher::new(config.auth.bcrypt_cost)),
        },
        &config.auth,
        &config.payments.currency,
    );

    if let Some(seed) = &config.admin {
        state
            .accounts()
            .ensure_admin(seed)
            .await
            .context("Failed to seed admin account")?;
    }

    let routes = routes::routes_with_openapi(&state);

    let mut openapi = routes.get_openapi().clone();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("MedBook AppointmentService API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi)?;

    let app = Router::new()
        .merge(routes)
        .with_state(state)
        .merge(swagger_ui);

    tracing::info!("Bootstrapping...");
    bootstrap("AppointmentService", app, &config.server).await?;
    Ok(())
}
