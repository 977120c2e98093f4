//! Tenbill API Server
//!
//! Serves the billing HTTP surface for one tenant deployment:
//! webhook intake, login callback, checkout intents, subscription
//! reads, and admin cleanup sweeps.

use std::sync::Arc;

use tenbill_billing::{resolve_tenant, BillingService, PaddleClient, PaddleConfig};
use tenbill_shared::{create_migration_pool, create_pool, run_migrations};
use tokio::time::{interval, Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenbill_api::auth::AuthClient;
use tenbill_api::routes::create_router;
use tenbill_api::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tenbill_api=debug,tenbill_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tenbill API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let tenant = resolve_tenant(config.tenant_id.as_deref());
    tracing::info!(tenant = %tenant, "Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    // Migrations run over a direct connection when one is configured
    // (poolers reject the prepared statements the migrator uses)
    tracing::info!("Running database migrations...");
    let migration_url = config
        .database_direct_url
        .as_ref()
        .unwrap_or(&config.database_url);
    let migration_pool = create_migration_pool(migration_url).await?;
    run_migrations(&migration_pool).await?;
    migration_pool.close().await;
    tracing::info!("Database migrations complete");

    let provider = PaddleClient::new(PaddleConfig::from_env()?);
    let billing = Arc::new(BillingService::new(pool.clone(), tenant, provider));
    let auth = AuthClient::new(
        config.auth_provider_url.clone(),
        config.auth_provider_key.clone(),
    );

    let state = AppState {
        pool,
        config: config.clone(),
        billing: Arc::clone(&billing),
        auth,
    };

    if config.enable_cleanup_task {
        spawn_cleanup_task(Arc::clone(&billing), config.cleanup_interval_secs);
    }

    let app = create_router(state);

    tracing::info!(address = %config.bind_address, "Listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodic duplicate-collapse sweep over this deployment's tenant.
/// Runs forever; a failed pass is logged and retried next tick.
fn spawn_cleanup_task(billing: Arc<BillingService>, interval_secs: u64) {
    tracing::info!(interval_secs, "Cleanup sweep task enabled");
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs));
        // The first tick fires immediately; skip it so startup isn't
        // competing with the sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let result = async {
                let mut session = billing.session().await?;
                billing.cleanup.cleanup_duplicate_customers(&mut session).await
            }
            .await;

            match result {
                Ok(report) => {
                    tracing::info!(
                        tenant = %billing.tenant(),
                        deleted = report.deleted,
                        "Scheduled cleanup sweep finished"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scheduled cleanup sweep failed");
                }
            }
        }
    });
}
