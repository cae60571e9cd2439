use std::sync::Arc;

use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use photobook_backend::config::AppConfig;
use photobook_backend::jobs::delivery_sync::DeliveryReconciler;
use photobook_backend::jobs::print_dispatch::{DispatchReconciler, DispatchSettings};
use photobook_backend::jobs::scheduler::Scheduler;
use photobook_backend::services::carrier::{Carrier, CarrierClient};
use photobook_backend::services::notifier::{HttpNotifier, LogNotifier, Notifier};
use photobook_backend::services::payment_gateway::{PaymentGateway, PaymentGatewayClient};
use photobook_backend::services::store::{OrderStore, SeaOrmStore};
use photobook_backend::services::transaction_lifecycle::{PaymentPolicy, TransactionService};
use photobook_backend::{handlers, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,photobook_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().expect("Invalid configuration");

    // Connect to database
    tracing::info!("Connecting to database...");
    let mut options = ConnectOptions::new(config.database_url.clone());
    options
        .max_connections(100)
        .acquire_timeout(config.store_timeout)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let store: Arc<dyn OrderStore> = Arc::new(SeaOrmStore::new(db, config.store_timeout));
    let carrier: Arc<dyn Carrier> =
        Arc::new(CarrierClient::new(&config.carrier).expect("Failed to build carrier client"));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        PaymentGatewayClient::new(&config.gateway).expect("Failed to build payment gateway client"),
    );
    let notifier: Arc<dyn Notifier> = match &config.notifier_url {
        Some(url) => Arc::new(HttpNotifier::new(url.clone()).expect("Failed to build notifier")),
        None => {
            tracing::warn!("NOTIFIER_URL not set - notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // Start reconciliation engine
    let shutdown = CancellationToken::new();
    let mut scheduler = Scheduler::new(store.clone(), config.scheduler.clone(), shutdown.clone());
    scheduler.register(Arc::new(DispatchReconciler::new(
        store.clone(),
        carrier.clone(),
        DispatchSettings::from(&config.carrier),
    )));
    scheduler.register(Arc::new(DeliveryReconciler::new(
        store.clone(),
        carrier,
        notifier.clone(),
        config.carrier.delivered_code.clone(),
    )));

    let state = AppState {
        store: store.clone(),
        transactions: TransactionService::new(
            store,
            gateway,
            notifier,
            PaymentPolicy::from(&config.gateway),
        ),
    };

    let app = handlers::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!(
        "Server listening on {}",
        listener.local_addr().expect("Listener has no local address")
    );

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received, stopping gracefully");
                }
                _ = server_shutdown.cancelled() => {}
            }
            server_shutdown.cancel();
        })
        .await
        .expect("Server error");

    shutdown.cancel();
    scheduler.join().await;
}
