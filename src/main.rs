use resource_lending::{
    adapters::memory::{InMemoryLoanRequestReadModel, InMemoryReservationStore},
    adapters::mock::MockResourceCatalog,
    adapters::postgres::{
        PostgresEventStore, PostgresLoanRequestReadModel, PostgresReservationStore,
        PostgresResourceCatalog,
    },
    api::{handlers::AppState, router::create_router},
    application::loan_request::{PendingDeadline, ServiceDependencies, expire_pending_requests},
    config::AppConfig,
    domain::{ActorId, approval::ApprovalPolicy},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resource_lending=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let approval_policy = Arc::new(ApprovalPolicy::with_restricted_categories(
        config.departmental_categories.clone(),
    ));

    // Initialize adapters
    let service_deps = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to PostgreSQL");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            ServiceDependencies {
                event_store: Arc::new(PostgresEventStore::new(pool.clone())),
                reservation_store: Arc::new(PostgresReservationStore::new(pool.clone())),
                read_model: Arc::new(PostgresLoanRequestReadModel::new(pool.clone())),
                catalog: Arc::new(PostgresResourceCatalog::new(pool)),
                approval_policy,
                settings: config.engine_settings(),
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let catalog = match &config.catalog_seed_file {
                Some(path) => {
                    let seed = tokio::fs::read_to_string(path).await?;
                    let catalog = MockResourceCatalog::from_json(&seed)?;
                    tracing::info!(path = %path, units = catalog.unit_count(), "Catalog seeded");
                    catalog
                }
                None => MockResourceCatalog::new(),
            };
            let store = Arc::new(InMemoryReservationStore::new());

            ServiceDependencies {
                event_store: store.clone(),
                reservation_store: store,
                read_model: Arc::new(InMemoryLoanRequestReadModel::new()),
                catalog: Arc::new(catalog),
                approval_policy,
                settings: config.engine_settings(),
            }
        }
    };

    // Pending expiry sweep
    if let Some(deadline) = config.pending_expiry {
        let deps = service_deps.clone();
        let period = config.expiry_sweep_interval;
        tokio::spawn(async move {
            let policy = PendingDeadline(deadline);
            let sweeper = ActorId::from_uuid(Uuid::nil());
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match expire_pending_requests(&deps, &policy, sweeper, chrono::Utc::now()).await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!(count, "Expired pending loan requests"),
                    Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                }
            }
        });
    }

    // Create application state
    let app_state = Arc::new(AppState { service_deps });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
