//! SeaORM-backed store
//!
//! One generic repository type serves both the pooled connection
//! (auto-commit calls) and an open `DatabaseTransaction`. Savepoints are
//! issued as plain SQL on the transaction's connection.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use log::{debug, trace};

use crate::domain::{
    AuditAction, AuditEntry, AuditFilter, AuditRepository, BeginOptions, IsolationLevel,
    NewAuditEntry, NewParkingSession, NewSpot, NewVehicle, ParkingSession, RateType,
    SessionFilter, SessionRepository, SessionStatus, Spot, SpotFilter, SpotRepository,
    SpotStatus, SpotType, Store, StoreResult, StoreTransaction, Vehicle, VehicleRepository,
    VehicleType,
};
use crate::infrastructure::database::entities::{audit_log, parking_session, spot, vehicle};
use crate::shared::errors::StoreError;

// ── Conversion helpers ──────────────────────────────────────────

/// Classifies driver errors into the store's retry vocabulary.
fn db_err(e: DbErr) -> StoreError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("deadlock") || lower.contains("40p01") {
        StoreError::Deadlock(message)
    } else if lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("could not serialize")
        || lower.contains("40001")
    {
        StoreError::Conflict {
            entity: "database",
            id: message,
        }
    } else if lower.contains("lock timeout")
        || lower.contains("lock wait timeout")
        || lower.contains("55p03")
        || lower.contains("pool timed out")
    {
        StoreError::LockTimeout
    } else {
        StoreError::Database(message)
    }
}

fn corrupt(table: &str, id: i32, field: &str, value: &str) -> StoreError {
    StoreError::Database(format!("invalid {} '{}' in {} {}", field, value, table, id))
}

fn parse_decimal(table: &str, id: i32, field: &str, value: Option<String>) -> StoreResult<Option<Decimal>> {
    value
        .map(|v| Decimal::from_str(&v).map_err(|_| corrupt(table, id, field, &v)))
        .transpose()
}

fn encode_features(features: &[String]) -> StoreResult<String> {
    serde_json::to_string(features).map_err(|e| StoreError::Database(e.to_string()))
}

fn spot_to_domain(m: spot::Model) -> StoreResult<Spot> {
    let spot_type =
        SpotType::from_str(&m.spot_type).ok_or_else(|| corrupt("spots", m.id, "spot_type", &m.spot_type))?;
    let status =
        SpotStatus::from_str(&m.status).ok_or_else(|| corrupt("spots", m.id, "status", &m.status))?;
    let features: Vec<String> = serde_json::from_str(&m.features)
        .map_err(|_| corrupt("spots", m.id, "features", &m.features))?;
    Ok(Spot {
        id: m.id,
        garage_id: m.garage_id,
        floor: m.floor,
        bay: m.bay,
        spot_number: m.spot_number,
        spot_type,
        status,
        features,
        hourly_rate_override: parse_decimal("spots", m.id, "hourly_rate_override", m.hourly_rate_override)?,
        updated_at: m.updated_at,
    })
}

fn vehicle_to_domain(m: vehicle::Model) -> StoreResult<Vehicle> {
    let vehicle_type = VehicleType::from_str(&m.vehicle_type)
        .map_err(|_| corrupt("vehicles", m.id, "vehicle_type", &m.vehicle_type))?;
    Ok(Vehicle {
        id: m.id,
        license_plate: m.license_plate,
        vehicle_type,
        owner_name: m.owner_name,
        owner_contact: m.owner_contact,
        created_at: m.created_at,
    })
}

fn session_to_domain(m: parking_session::Model) -> StoreResult<ParkingSession> {
    let status = SessionStatus::from_str(&m.status)
        .ok_or_else(|| corrupt("parking_sessions", m.id, "status", &m.status))?;
    let rate_type = RateType::from_str(&m.rate_type)
        .ok_or_else(|| corrupt("parking_sessions", m.id, "rate_type", &m.rate_type))?;
    Ok(ParkingSession {
        id: m.id,
        garage_id: m.garage_id,
        spot_id: m.spot_id,
        vehicle_id: m.vehicle_id,
        status,
        check_in_time: m.check_in_time,
        check_out_time: m.check_out_time,
        rate_type,
        total_amount: parse_decimal("parking_sessions", m.id, "total_amount", m.total_amount)?,
    })
}

fn audit_to_domain(m: audit_log::Model) -> StoreResult<AuditEntry> {
    let transaction_id = uuid::Uuid::parse_str(&m.transaction_id)
        .map_err(|_| corrupt("audit_log", m.id, "transaction_id", &m.transaction_id))?;
    let action = AuditAction::from_str(&m.action)
        .ok_or_else(|| corrupt("audit_log", m.id, "action", &m.action))?;
    Ok(AuditEntry {
        id: m.id,
        transaction_id,
        action,
        session_id: m.session_id,
        spot_id: m.spot_id,
        vehicle_id: m.vehicle_id,
        detail: m.detail,
        created_at: m.created_at,
    })
}

fn isolation_to_db(level: IsolationLevel) -> sea_orm::IsolationLevel {
    match level {
        IsolationLevel::ReadUncommitted => sea_orm::IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted => sea_orm::IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead => sea_orm::IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable => sea_orm::IsolationLevel::Serializable,
    }
}

// ── SeaOrmRepository ────────────────────────────────────────────

/// Repository set over any SeaORM connection: the pool or a transaction.
pub struct SeaOrmRepository<C> {
    conn: C,
}

#[async_trait]
impl<C> SpotRepository for SeaOrmRepository<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Spot>> {
        spot::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .map_err(db_err)?
            .map(spot_to_domain)
            .transpose()
    }

    async fn find_many(&self, filter: &SpotFilter) -> StoreResult<Vec<Spot>> {
        let mut query = spot::Entity::find();
        if let Some(garage_id) = filter.garage_id {
            query = query.filter(spot::Column::GarageId.eq(garage_id));
        }
        if let Some(statuses) = &filter.statuses {
            query = query.filter(spot::Column::Status.is_in(statuses.iter().map(|s| s.as_str())));
        }
        if let Some(types) = &filter.spot_types {
            query = query.filter(spot::Column::SpotType.is_in(types.iter().map(|t| t.as_str())));
        }
        let models = query
            .order_by_asc(spot::Column::Id)
            .all(&self.conn)
            .await
            .map_err(db_err)?;
        models.into_iter().map(spot_to_domain).collect()
    }

    async fn create(&self, new: NewSpot) -> StoreResult<Spot> {
        let model = spot::ActiveModel {
            id: NotSet,
            garage_id: Set(new.garage_id),
            floor: Set(new.floor),
            bay: Set(new.bay),
            spot_number: Set(new.spot_number),
            spot_type: Set(new.spot_type.as_str().to_string()),
            status: Set(new.status.as_str().to_string()),
            features: Set(encode_features(&new.features)?),
            hourly_rate_override: Set(new.hourly_rate_override.map(|r| r.to_string())),
            updated_at: Set(Utc::now()),
        };
        let result = model.insert(&self.conn).await.map_err(db_err)?;
        debug!("Spot {} created in garage {}", result.id, result.garage_id);
        spot_to_domain(result)
    }

    async fn update(&self, s: &Spot) -> StoreResult<()> {
        let model = spot::ActiveModel {
            id: Set(s.id),
            garage_id: Set(s.garage_id),
            floor: Set(s.floor),
            bay: Set(s.bay.clone()),
            spot_number: Set(s.spot_number),
            spot_type: Set(s.spot_type.as_str().to_string()),
            status: Set(s.status.as_str().to_string()),
            features: Set(encode_features(&s.features)?),
            hourly_rate_override: Set(s.hourly_rate_override.map(|r| r.to_string())),
            updated_at: Set(Utc::now()),
        };
        match model.update(&self.conn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StoreError::Missing { entity: "spot", id: s.id }),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn transition_status(
        &self,
        id: i32,
        from: SpotStatus,
        to: SpotStatus,
    ) -> StoreResult<bool> {
        let result = spot::Entity::update_many()
            .col_expr(spot::Column::Status, Expr::value(to.as_str()))
            .col_expr(spot::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(spot::Column::Id.eq(id))
            .filter(spot::Column::Status.eq(from.as_str()))
            .exec(&self.conn)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 1 {
            trace!("Spot {} moved {} -> {}", id, from.as_str(), to.as_str());
            return Ok(true);
        }
        if SpotRepository::find_by_id(self, id).await?.is_none() {
            return Err(StoreError::Missing { entity: "spot", id });
        }
        Ok(false)
    }
}

#[async_trait]
impl<C> VehicleRepository for SeaOrmRepository<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Vehicle>> {
        vehicle::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .map_err(db_err)?
            .map(vehicle_to_domain)
            .transpose()
    }

    async fn find_by_plate(&self, license_plate: &str) -> StoreResult<Option<Vehicle>> {
        vehicle::Entity::find()
            .filter(vehicle::Column::LicensePlate.eq(license_plate))
            .one(&self.conn)
            .await
            .map_err(db_err)?
            .map(vehicle_to_domain)
            .transpose()
    }

    async fn create(&self, new: NewVehicle) -> StoreResult<Vehicle> {
        let plate = new.license_plate.clone();
        let model = vehicle::ActiveModel {
            id: NotSet,
            license_plate: Set(new.license_plate),
            vehicle_type: Set(new.vehicle_type.as_str().to_string()),
            owner_name: Set(new.owner_name),
            owner_contact: Set(new.owner_contact),
            created_at: Set(Utc::now()),
        };
        let result = model.insert(&self.conn).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                StoreError::Duplicate {
                    entity: "vehicle",
                    value: plate.clone(),
                }
            } else {
                db_err(e)
            }
        })?;
        debug!("Vehicle registered: {} ({})", result.license_plate, result.id);
        vehicle_to_domain(result)
    }

    async fn lock_for_update(&self, id: i32) -> StoreResult<Vehicle> {
        // No-op update so the row lock is held until commit.
        let result = vehicle::Entity::update_many()
            .col_expr(
                vehicle::Column::LicensePlate,
                SimpleExpr::from(Expr::col(vehicle::Column::LicensePlate)),
            )
            .filter(vehicle::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(StoreError::Missing { entity: "vehicle", id });
        }
        VehicleRepository::find_by_id(self, id)
            .await?
            .ok_or(StoreError::Missing { entity: "vehicle", id })
    }
}

#[async_trait]
impl<C> SessionRepository for SeaOrmRepository<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<ParkingSession>> {
        parking_session::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .map_err(db_err)?
            .map(session_to_domain)
            .transpose()
    }

    async fn find_many(&self, filter: &SessionFilter) -> StoreResult<Vec<ParkingSession>> {
        let mut query = parking_session::Entity::find();
        if let Some(garage_id) = filter.garage_id {
            query = query.filter(parking_session::Column::GarageId.eq(garage_id));
        }
        if let Some(spot_id) = filter.spot_id {
            query = query.filter(parking_session::Column::SpotId.eq(spot_id));
        }
        if let Some(vehicle_id) = filter.vehicle_id {
            query = query.filter(parking_session::Column::VehicleId.eq(vehicle_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(parking_session::Column::Status.eq(status.as_str()));
        }
        let models = query
            .order_by_asc(parking_session::Column::Id)
            .all(&self.conn)
            .await
            .map_err(db_err)?;
        models.into_iter().map(session_to_domain).collect()
    }

    async fn create(&self, new: NewParkingSession) -> StoreResult<ParkingSession> {
        let model = parking_session::ActiveModel {
            id: NotSet,
            garage_id: Set(new.garage_id),
            spot_id: Set(new.spot_id),
            vehicle_id: Set(new.vehicle_id),
            status: Set(SessionStatus::Active.as_str().to_string()),
            check_in_time: Set(new.check_in_time),
            check_out_time: Set(None),
            rate_type: Set(new.rate_type.as_str().to_string()),
            total_amount: Set(None),
        };
        let vehicle_id = new.vehicle_id;
        let result = model.insert(&self.conn).await.map_err(|e| {
            // One active session per vehicle is enforced by a partial index.
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                StoreError::Duplicate {
                    entity: "parking_session",
                    value: vehicle_id.to_string(),
                }
            } else {
                db_err(e)
            }
        })?;
        debug!("Parking session {} opened on spot {}", result.id, result.spot_id);
        session_to_domain(result)
    }

    async fn update(&self, s: &ParkingSession) -> StoreResult<()> {
        let model = parking_session::ActiveModel {
            id: Set(s.id),
            garage_id: Set(s.garage_id),
            spot_id: Set(s.spot_id),
            vehicle_id: Set(s.vehicle_id),
            status: Set(s.status.as_str().to_string()),
            check_in_time: Set(s.check_in_time),
            check_out_time: Set(s.check_out_time),
            rate_type: Set(s.rate_type.as_str().to_string()),
            total_amount: Set(s.total_amount.map(|a| a.to_string())),
        };
        match model.update(&self.conn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StoreError::Missing {
                entity: "parking_session",
                id: s.id,
            }),
            Err(e) => Err(db_err(e)),
        }
    }
}

#[async_trait]
impl<C> AuditRepository for SeaOrmRepository<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry> {
        let model = audit_log::ActiveModel {
            id: NotSet,
            transaction_id: Set(entry.transaction_id.to_string()),
            action: Set(entry.action.as_str().to_string()),
            session_id: Set(entry.session_id),
            spot_id: Set(entry.spot_id),
            vehicle_id: Set(entry.vehicle_id),
            detail: Set(entry.detail),
            created_at: Set(entry.created_at),
        };
        let result = model.insert(&self.conn).await.map_err(db_err)?;
        audit_to_domain(result)
    }

    async fn find_many(&self, filter: &AuditFilter) -> StoreResult<Vec<AuditEntry>> {
        let mut query = audit_log::Entity::find();
        if let Some(transaction_id) = filter.transaction_id {
            query = query.filter(audit_log::Column::TransactionId.eq(transaction_id.to_string()));
        }
        if let Some(session_id) = filter.session_id {
            query = query.filter(audit_log::Column::SessionId.eq(session_id));
        }
        if let Some(vehicle_id) = filter.vehicle_id {
            query = query.filter(audit_log::Column::VehicleId.eq(vehicle_id));
        }
        if let Some(action) = filter.action {
            query = query.filter(audit_log::Column::Action.eq(action.as_str()));
        }
        let models = query
            .order_by_asc(audit_log::Column::Id)
            .all(&self.conn)
            .await
            .map_err(db_err)?;
        models.into_iter().map(audit_to_domain).collect()
    }
}

// ── SeaOrmStore ─────────────────────────────────────────────────

/// Store backed by a SeaORM connection pool.
///
/// ```ignore
/// let db = init_database(&DatabaseConfig::sqlite("./parking.db")).await?;
/// run_migrations(&db).await?;
/// let store = SeaOrmStore::new(db);
/// let tx = store.begin(BeginOptions::default()).await?;
/// ```
pub struct SeaOrmStore {
    db: DatabaseConnection,
    repos: SeaOrmRepository<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            repos: SeaOrmRepository { conn: db.clone() },
            db,
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl Store for SeaOrmStore {
    async fn begin(&self, options: BeginOptions) -> StoreResult<Box<dyn StoreTransaction>> {
        // SQLite transactions are always serializable and reject the
        // isolation clause.
        let isolation = match self.db.get_database_backend() {
            DbBackend::Sqlite => None,
            _ => Some(isolation_to_db(options.isolation)),
        };
        let txn = self
            .db
            .begin_with_config(isolation, None)
            .await
            .map_err(db_err)?;
        trace!(
            "Database transaction opened (isolation {}, priority {})",
            options.isolation, options.priority
        );
        Ok(Box::new(SeaOrmTransaction {
            repos: SeaOrmRepository { conn: txn },
        }))
    }

    fn spots(&self) -> &dyn SpotRepository {
        &self.repos
    }

    fn vehicles(&self) -> &dyn VehicleRepository {
        &self.repos
    }

    fn sessions(&self) -> &dyn SessionRepository {
        &self.repos
    }

    fn audit(&self) -> &dyn AuditRepository {
        &self.repos
    }
}

/// An open database transaction. SeaORM rolls it back when dropped.
pub struct SeaOrmTransaction {
    repos: SeaOrmRepository<DatabaseTransaction>,
}

impl SeaOrmTransaction {
    async fn savepoint_sql(&self, statement: &str, name: &str) -> StoreResult<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::UnknownSavepoint(name.to_string()));
        }
        self.repos
            .conn
            .execute_unprepared(&format!("{} {}", statement, name))
            .await
            .map_err(|e| {
                let lower = e.to_string().to_lowercase();
                if lower.contains("no such savepoint") || lower.contains("does not exist") {
                    StoreError::UnknownSavepoint(name.to_string())
                } else {
                    db_err(e)
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for SeaOrmTransaction {
    fn spots(&self) -> &dyn SpotRepository {
        &self.repos
    }

    fn vehicles(&self) -> &dyn VehicleRepository {
        &self.repos
    }

    fn sessions(&self) -> &dyn SessionRepository {
        &self.repos
    }

    fn audit(&self) -> &dyn AuditRepository {
        &self.repos
    }

    async fn savepoint(&self, name: &str) -> StoreResult<()> {
        self.savepoint_sql("SAVEPOINT", name).await
    }

    async fn release_savepoint(&self, name: &str) -> StoreResult<()> {
        self.savepoint_sql("RELEASE SAVEPOINT", name).await
    }

    async fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()> {
        self.savepoint_sql("ROLLBACK TO SAVEPOINT", name).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.repos.conn.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.repos.conn.rollback().await.map_err(db_err)
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{init_database, run_migrations, DatabaseConfig};

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    async fn sample_store() -> SeaOrmStore {
        let db = init_database(&DatabaseConfig::sqlite_memory()).await.unwrap();
        run_migrations(&db).await.unwrap();
        SeaOrmStore::new(db)
    }

    #[tokio::test]
    async fn spot_round_trips_through_sqlite() {
        let store = sample_store().await;
        let created = store
            .spots()
            .create(
                NewSpot::new(1, 2, "B", 14, SpotType::Electric)
                    .with_features(["ev_charging"])
                    .with_hourly_rate(dec("7.25")),
            )
            .await
            .unwrap();

        let loaded = store.spots().find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.spot_type, SpotType::Electric);
        assert_eq!(loaded.features, vec!["ev_charging".to_string()]);
        assert_eq!(loaded.hourly_rate_override, Some(dec("7.25")));
        assert_eq!(loaded.location().to_string(), "garage 1 / floor 2 / bay B / spot 14");
    }

    #[tokio::test]
    async fn status_swap_only_from_expected_state() {
        let store = sample_store().await;
        let spot = store
            .spots()
            .create(NewSpot::new(1, 1, "A", 1, SpotType::Standard))
            .await
            .unwrap();

        assert!(store
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap());
        assert!(!store
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap());
        assert!(matches!(
            store
                .spots()
                .transition_status(999, SpotStatus::Available, SpotStatus::Occupied)
                .await,
            Err(StoreError::Missing { id: 999, .. })
        ));
    }

    #[tokio::test]
    async fn rollback_to_savepoint_discards_later_writes() {
        let store = sample_store().await;
        let spot = store
            .spots()
            .create(NewSpot::new(1, 1, "A", 1, SpotType::Standard))
            .await
            .unwrap();

        let tx = store.begin(BeginOptions::default()).await.unwrap();
        let txn_id = uuid::Uuid::new_v4();
        tx.audit()
            .append(NewAuditEntry::new(txn_id, AuditAction::CheckInRequested, Utc::now()))
            .await
            .unwrap();
        tx.savepoint("sp_1").await.unwrap();
        tx.spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap();
        tx.rollback_to_savepoint("sp_1").await.unwrap();
        tx.release_savepoint("sp_1").await.unwrap();
        tx.commit().await.unwrap();

        let spot = store.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert_eq!(spot.status, SpotStatus::Available);
        let entries = store
            .audit()
            .find_many(&AuditFilter {
                transaction_id: Some(txn_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::CheckInRequested);
    }

    #[tokio::test]
    async fn rolled_back_transaction_leaves_no_rows() {
        let store = sample_store().await;
        let tx = store.begin(BeginOptions::default()).await.unwrap();
        tx.vehicles()
            .create(NewVehicle::new("ABC123", VehicleType::Standard))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(store.vehicles().find_by_plate("ABC123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_plate_is_rejected() {
        let store = sample_store().await;
        store
            .vehicles()
            .create(NewVehicle::new("xyz999", VehicleType::Compact))
            .await
            .unwrap();
        let err = store
            .vehicles()
            .create(NewVehicle::new("XYZ999", VehicleType::Compact))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "vehicle", .. }));
    }

    #[tokio::test]
    async fn second_active_session_for_vehicle_is_rejected() {
        let store = sample_store().await;
        let s1 = store
            .spots()
            .create(NewSpot::new(1, 1, "A", 1, SpotType::Standard))
            .await
            .unwrap();
        let s2 = store
            .spots()
            .create(NewSpot::new(1, 1, "A", 2, SpotType::Standard))
            .await
            .unwrap();
        let vehicle = store
            .vehicles()
            .create(NewVehicle::new("ABC123", VehicleType::Standard))
            .await
            .unwrap();
        let session_on = |spot_id: i32| NewParkingSession {
            garage_id: 1,
            spot_id,
            vehicle_id: vehicle.id,
            check_in_time: Utc::now(),
            rate_type: RateType::Hourly,
        };

        let mut first = store.sessions().create(session_on(s1.id)).await.unwrap();
        let err = store.sessions().create(session_on(s2.id)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "parking_session", .. }));

        first.status = SessionStatus::Completed;
        first.check_out_time = Some(Utc::now());
        store.sessions().update(&first).await.unwrap();
        store.sessions().create(session_on(s2.id)).await.unwrap();
    }

    #[tokio::test]
    async fn vehicle_lock_reads_row_inside_transaction() {
        let store = sample_store().await;
        let vehicle = store
            .vehicles()
            .create(NewVehicle::new("ABC123", VehicleType::Compact))
            .await
            .unwrap();
        let tx = store.begin(BeginOptions::default()).await.unwrap();
        let locked = tx.vehicles().lock_for_update(vehicle.id).await.unwrap();
        assert_eq!(locked.license_plate, "ABC123");
        assert!(matches!(
            tx.vehicles().lock_for_update(999).await,
            Err(StoreError::Missing { entity: "vehicle", id: 999 })
        ));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_savepoint_is_reported() {
        let store = sample_store().await;
        let tx = store.begin(BeginOptions::default()).await.unwrap();
        assert!(matches!(
            tx.release_savepoint("sp_9").await,
            Err(StoreError::UnknownSavepoint(_))
        ));
        assert!(matches!(
            tx.savepoint("bad name; drop").await,
            Err(StoreError::UnknownSavepoint(_))
        ));
        tx.rollback().await.unwrap();
    }

    #[test]
    fn driver_errors_are_classified() {
        let locked = db_err(DbErr::Custom("database is locked".into()));
        assert!(locked.is_retryable());
        let deadlock = db_err(DbErr::Custom("ERROR 40P01: deadlock detected".into()));
        assert!(matches!(deadlock, StoreError::Deadlock(_)));
        assert!(matches!(
            db_err(DbErr::Custom("disk I/O error".into())),
            StoreError::Database(_)
        ));
    }
}
