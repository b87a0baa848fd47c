//! Wiring of the engine from configuration

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::{
    AssignmentEngine, BillingEngine, SessionOrchestrator, TransactionManager,
};
use crate::config::{AppConfig, ConfigError, StorageBackend};
use crate::domain::{Clock, DomainError, PaymentGateway, SpotFilter, Store};
use crate::infrastructure::{
    init_database, run_migrations, InMemoryPaymentGateway, InMemoryStore, SeaOrmStore,
    StaticRateScheduleProvider, SystemClock,
};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// A fully wired engine
pub struct ParkingCore {
    pub store: Arc<dyn Store>,
    pub manager: Arc<TransactionManager>,
    pub rates: Arc<StaticRateScheduleProvider>,
    pub clock: Arc<dyn Clock>,
    pub orchestrator: SessionOrchestrator,
}

impl ParkingCore {
    /// Opens the configured store, applies migrations for the database
    /// backend and provisions configured spots.
    pub async fn from_config(config: &AppConfig) -> Result<Self, BootstrapError> {
        config.validate()?;

        let store: Arc<dyn Store> = match config.storage.backend {
            StorageBackend::Memory => {
                info!(
                    "Using in-memory store ({} concurrent transactions)",
                    config.storage.max_concurrent_transactions
                );
                Arc::new(InMemoryStore::with_max_concurrency(
                    config.storage.max_concurrent_transactions,
                ))
            }
            StorageBackend::Database => {
                let db = init_database(&config.database.connection_config()).await?;
                run_migrations(&db).await?;
                Arc::new(SeaOrmStore::new(db))
            }
        };

        let core = Self::assemble(
            config,
            store,
            Arc::new(SystemClock),
            Arc::new(InMemoryPaymentGateway::approving()),
        )?;
        let created = core.provision_spots(config).await?;
        if created > 0 {
            info!("Provisioned {} spot(s) from configuration", created);
        }
        Ok(core)
    }

    /// Wires the engine around collaborators supplied by the caller.
    pub fn assemble(
        config: &AppConfig,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Result<Self, BootstrapError> {
        let rates = Arc::new(StaticRateScheduleProvider::with_schedules(
            config.rate_schedules(),
        )?);
        let manager = Arc::new(TransactionManager::with_defaults(
            store.clone(),
            config.transaction_options(),
        ));

        let rate_types: HashMap<_, _> = config
            .assignment
            .default_rate_types
            .iter()
            .map(|(vehicle, rate)| (*vehicle, *rate))
            .collect();
        let assignment =
            Arc::new(AssignmentEngine::new(clock.clone()).with_default_rate_types(rate_types));
        let billing = Arc::new(BillingEngine::new(clock.clone()));

        let orchestrator = SessionOrchestrator::new(
            manager.clone(),
            assignment,
            billing,
            rates.clone(),
            payments,
            clock.clone(),
        );

        Ok(Self {
            store,
            manager,
            rates,
            clock,
            orchestrator,
        })
    }

    /// Creates configured spots whose location is not stored yet. Returns
    /// how many were created.
    pub async fn provision_spots(&self, config: &AppConfig) -> Result<usize, BootstrapError> {
        let mut created = 0;
        for garage in &config.garages {
            let existing: HashSet<(i32, String, i32)> = self
                .store
                .spots()
                .find_many(&SpotFilter::default().in_garage(Some(garage.id)))
                .await
                .map_err(DomainError::from)?
                .into_iter()
                .map(|s| (s.floor, s.bay, s.spot_number))
                .collect();

            for run in &garage.spots {
                for spot in run.new_spots(garage.id) {
                    let key = (spot.floor, spot.bay.clone(), spot.spot_number);
                    if existing.contains(&key) {
                        continue;
                    }
                    self.store
                        .spots()
                        .create(spot)
                        .await
                        .map_err(DomainError::from)?;
                    created += 1;
                }
            }
        }
        Ok(created)
    }
}

// ── Tests ──────────────────────────────────────────────────────
