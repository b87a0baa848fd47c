//! In-memory storage implementation
//!
//! Every row carries the commit version that last wrote it. Transactions
//! buffer their writes, remember the versions they read and validate them
//! under a single commit lock. Row updates additionally take a write intent;
//! two transactions racing for the same row are resolved by wound-wait on
//! `(priority, start order)` so the loser fails fast with a deadlock instead
//! of blocking.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use crate::domain::{
    AuditEntry, AuditFilter, AuditRepository, BeginOptions, IsolationLevel, NewAuditEntry,
    NewParkingSession, NewSpot, NewVehicle, ParkingSession, SessionFilter, SessionRepository,
    Spot, SpotFilter, SpotRepository, SpotStatus, Store, StoreResult, StoreTransaction,
    TransactionPriority, Vehicle, VehicleRepository,
};
use crate::shared::errors::StoreError;

/// Default bound on concurrently open transactions
pub const DEFAULT_MAX_CONCURRENT_TRANSACTIONS: usize = 64;

// ── Rows and tables ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum TableId {
    Spots,
    Vehicles,
    Sessions,
    Audit,
}

type RowKey = (TableId, i32);

#[derive(Debug, Clone)]
enum Row {
    Spot(Spot),
    Vehicle(Vehicle),
    Session(ParkingSession),
    Audit(AuditEntry),
}

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    value: T,
}

struct Table<T> {
    rows: DashMap<i32, Versioned<T>>,
    next_id: AtomicI32,
    /// Bumped on every committed write to the table; serializable scans
    /// validate against it.
    version: AtomicU64,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI32::new(1),
            version: AtomicU64::new(0),
        }
    }

    fn get(&self, id: i32) -> Option<Versioned<T>> {
        self.rows.get(&id).map(|r| r.value().clone())
    }

    fn version_of(&self, id: i32) -> u64 {
        self.rows.get(&id).map_or(0, |r| r.version)
    }

    fn allocate_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn put(&self, id: i32, value: T, version: u64) {
        self.rows.insert(id, Versioned { version, value });
        self.version.store(version, Ordering::SeqCst);
    }

    fn committed_rows(&self) -> Vec<(i32, Versioned<T>)> {
        self.rows
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

/// Glue between a domain type and its table.
trait Record: Clone + Send + Sync + 'static {
    const TABLE: TableId;
    const ENTITY: &'static str;

    fn id(&self) -> i32;
    fn into_row(self) -> Row;
    fn from_row(row: &Row) -> Option<&Self>;
    fn table(shared: &Shared) -> &Table<Self>;
}

impl Record for Spot {
    const TABLE: TableId = TableId::Spots;
    const ENTITY: &'static str = "spot";

    fn id(&self) -> i32 {
        self.id
    }
    fn into_row(self) -> Row {
        Row::Spot(self)
    }
    fn from_row(row: &Row) -> Option<&Self> {
        match row {
            Row::Spot(s) => Some(s),
            _ => None,
        }
    }
    fn table(shared: &Shared) -> &Table<Self> {
        &shared.spots
    }
}

impl Record for Vehicle {
    const TABLE: TableId = TableId::Vehicles;
    const ENTITY: &'static str = "vehicle";

    fn id(&self) -> i32 {
        self.id
    }
    fn into_row(self) -> Row {
        Row::Vehicle(self)
    }
    fn from_row(row: &Row) -> Option<&Self> {
        match row {
            Row::Vehicle(v) => Some(v),
            _ => None,
        }
    }
    fn table(shared: &Shared) -> &Table<Self> {
        &shared.vehicles
    }
}

impl Record for ParkingSession {
    const TABLE: TableId = TableId::Sessions;
    const ENTITY: &'static str = "parking_session";

    fn id(&self) -> i32 {
        self.id
    }
    fn into_row(self) -> Row {
        Row::Session(self)
    }
    fn from_row(row: &Row) -> Option<&Self> {
        match row {
            Row::Session(s) => Some(s),
            _ => None,
        }
    }
    fn table(shared: &Shared) -> &Table<Self> {
        &shared.sessions
    }
}

impl Record for AuditEntry {
    const TABLE: TableId = TableId::Audit;
    const ENTITY: &'static str = "audit_entry";

    fn id(&self) -> i32 {
        self.id
    }
    fn into_row(self) -> Row {
        Row::Audit(self)
    }
    fn from_row(row: &Row) -> Option<&Self> {
        match row {
            Row::Audit(a) => Some(a),
            _ => None,
        }
    }
    fn table(shared: &Shared) -> &Table<Self> {
        &shared.audit
    }
}

fn entity_of(table: TableId) -> &'static str {
    match table {
        TableId::Spots => Spot::ENTITY,
        TableId::Vehicles => Vehicle::ENTITY,
        TableId::Sessions => ParkingSession::ENTITY,
        TableId::Audit => AuditEntry::ENTITY,
    }
}

// ── Shared state ───────────────────────────────────────────────

struct IntentHolder {
    txn_seq: u64,
    priority: TransactionPriority,
    wounded: Arc<AtomicBool>,
}

struct Shared {
    spots: Table<Spot>,
    vehicles: Table<Vehicle>,
    sessions: Table<ParkingSession>,
    audit: Table<AuditEntry>,
    intents: DashMap<RowKey, IntentHolder>,
    commit_lock: Mutex<()>,
    commit_seq: AtomicU64,
    txn_seq: AtomicU64,
    permits: Arc<Semaphore>,
}

impl Shared {
    fn lock_commits(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.commit_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("commit lock poisoned".into()))
    }

    fn next_version(&self) -> u64 {
        self.commit_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn version_of(&self, key: RowKey) -> u64 {
        match key.0 {
            TableId::Spots => self.spots.version_of(key.1),
            TableId::Vehicles => self.vehicles.version_of(key.1),
            TableId::Sessions => self.sessions.version_of(key.1),
            TableId::Audit => self.audit.version_of(key.1),
        }
    }

    fn table_version(&self, table: TableId) -> u64 {
        let version = match table {
            TableId::Spots => &self.spots.version,
            TableId::Vehicles => &self.vehicles.version,
            TableId::Sessions => &self.sessions.version,
            TableId::Audit => &self.audit.version,
        };
        version.load(Ordering::SeqCst)
    }

    /// Must be called with the commit lock held.
    fn apply(&self, row: Row, version: u64) {
        match row {
            Row::Spot(s) => self.spots.put(s.id, s, version),
            Row::Vehicle(v) => self.vehicles.put(v.id, v, version),
            Row::Session(s) => self.sessions.put(s.id, s, version),
            Row::Audit(a) => self.audit.put(a.id, a, version),
        }
    }

    fn plate_owner(&self, plate: &str) -> Option<i32> {
        self.vehicles
            .rows
            .iter()
            .find(|entry| entry.value().value.license_plate == plate)
            .map(|entry| *entry.key())
    }

    fn commit_one<T: Record>(&self, value: T) -> StoreResult<()> {
        let _guard = self.lock_commits()?;
        let version = self.next_version();
        self.apply(value.into_row(), version);
        Ok(())
    }

    fn committed_where<T: Record>(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let mut rows: Vec<T> = T::table(self)
            .committed_rows()
            .into_iter()
            .map(|(_, v)| v.value)
            .filter(|v| pred(v))
            .collect();
        rows.sort_by_key(|r| r.id());
        rows
    }
}

// ── Store ──────────────────────────────────────────────────────

/// In-memory store for development, tests and the CLI preview mode
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_max_concurrency(DEFAULT_MAX_CONCURRENT_TRANSACTIONS)
    }

    /// `begin` waits once `max_transactions` transactions are open.
    pub fn with_max_concurrency(max_transactions: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                spots: Table::new(),
                vehicles: Table::new(),
                sessions: Table::new(),
                audit: Table::new(),
                intents: DashMap::new(),
                commit_lock: Mutex::new(()),
                commit_seq: AtomicU64::new(0),
                txn_seq: AtomicU64::new(0),
                permits: Arc::new(Semaphore::new(max_transactions.max(1))),
            }),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self, options: BeginOptions) -> StoreResult<Box<dyn StoreTransaction>> {
        let permit = self
            .shared
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Unavailable("store is shutting down".into()))?;

        let seq = self.shared.txn_seq.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(
            txn_seq = seq,
            isolation = %options.isolation,
            priority = %options.priority,
            "memory transaction opened"
        );

        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            seq,
            options,
            wounded: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(TxState::default()),
            _permit: permit,
        }))
    }

    fn spots(&self) -> &dyn SpotRepository {
        self.shared.as_ref()
    }

    fn vehicles(&self) -> &dyn VehicleRepository {
        self.shared.as_ref()
    }

    fn sessions(&self) -> &dyn SessionRepository {
        self.shared.as_ref()
    }

    fn audit(&self) -> &dyn AuditRepository {
        self.shared.as_ref()
    }
}

// Auto-commit access: every write is its own committed version.

#[async_trait]
impl SpotRepository for Shared {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Spot>> {
        Ok(self.spots.get(id).map(|v| v.value))
    }

    async fn find_many(&self, filter: &SpotFilter) -> StoreResult<Vec<Spot>> {
        Ok(self.committed_where(|s: &Spot| filter.matches(s)))
    }

    async fn create(&self, spot: NewSpot) -> StoreResult<Spot> {
        let spot = spot.into_spot(self.spots.allocate_id(), Utc::now());
        self.commit_one(spot.clone())?;
        Ok(spot)
    }

    async fn update(&self, spot: &Spot) -> StoreResult<()> {
        let _guard = self.lock_commits()?;
        if self.spots.get(spot.id).is_none() {
            return Err(StoreError::Missing { entity: Spot::ENTITY, id: spot.id });
        }
        let mut spot = spot.clone();
        spot.updated_at = Utc::now();
        let version = self.next_version();
        self.apply(Row::Spot(spot), version);
        Ok(())
    }

    async fn transition_status(
        &self,
        id: i32,
        from: SpotStatus,
        to: SpotStatus,
    ) -> StoreResult<bool> {
        let _guard = self.lock_commits()?;
        let mut spot = self
            .spots
            .get(id)
            .map(|v| v.value)
            .ok_or(StoreError::Missing { entity: Spot::ENTITY, id })?;
        if spot.status != from {
            return Ok(false);
        }
        spot.status = to;
        spot.updated_at = Utc::now();
        let version = self.next_version();
        self.apply(Row::Spot(spot), version);
        Ok(true)
    }
}

#[async_trait]
impl VehicleRepository for Shared {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Vehicle>> {
        Ok(self.vehicles.get(id).map(|v| v.value))
    }

    async fn find_by_plate(&self, license_plate: &str) -> StoreResult<Option<Vehicle>> {
        Ok(self
            .committed_where(|v: &Vehicle| v.license_plate == license_plate)
            .into_iter()
            .next())
    }

    async fn create(&self, vehicle: NewVehicle) -> StoreResult<Vehicle> {
        let _guard = self.lock_commits()?;
        if self.plate_owner(&vehicle.license_plate).is_some() {
            return Err(StoreError::Duplicate {
                entity: Vehicle::ENTITY,
                value: vehicle.license_plate,
            });
        }
        let vehicle = vehicle.into_vehicle(self.vehicles.allocate_id(), Utc::now());
        let version = self.next_version();
        self.apply(Row::Vehicle(vehicle.clone()), version);
        Ok(vehicle)
    }

    async fn lock_for_update(&self, id: i32) -> StoreResult<Vehicle> {
        self.vehicles
            .get(id)
            .map(|v| v.value)
            .ok_or(StoreError::Missing { entity: Vehicle::ENTITY, id })
    }
}

#[async_trait]
impl SessionRepository for Shared {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<ParkingSession>> {
        Ok(self.sessions.get(id).map(|v| v.value))
    }

    async fn find_many(&self, filter: &SessionFilter) -> StoreResult<Vec<ParkingSession>> {
        Ok(self.committed_where(|s: &ParkingSession| filter.matches(s)))
    }

    async fn create(&self, session: NewParkingSession) -> StoreResult<ParkingSession> {
        let session = session.into_session(self.sessions.allocate_id());
        self.commit_one(session.clone())?;
        Ok(session)
    }

    async fn update(&self, session: &ParkingSession) -> StoreResult<()> {
        let _guard = self.lock_commits()?;
        if self.sessions.get(session.id).is_none() {
            return Err(StoreError::Missing {
                entity: ParkingSession::ENTITY,
                id: session.id,
            });
        }
        let version = self.next_version();
        self.apply(Row::Session(session.clone()), version);
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for Shared {
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry> {
        let entry = entry.into_entry(self.audit.allocate_id());
        self.commit_one(entry.clone())?;
        Ok(entry)
    }

    async fn find_many(&self, filter: &AuditFilter) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.committed_where(|e: &AuditEntry| filter.matches(e)))
    }
}

// ── Transactions ───────────────────────────────────────────────

struct PendingWrite {
    key: RowKey,
    row: Row,
    insert: bool,
}

/// Write-log length and intents held when a savepoint was taken
struct SavepointMark {
    name: String,
    writes: usize,
    intents: HashSet<RowKey>,
}

#[derive(Default)]
struct TxState {
    writes: Vec<PendingWrite>,
    savepoints: Vec<SavepointMark>,
    /// Committed version each row had when this transaction first read
    /// it (0 = row absent). Writes are validated against it.
    observed: HashMap<RowKey, u64>,
    /// Repeatable-read snapshot of rows already read
    cached: HashMap<RowKey, Option<Row>>,
    /// Table versions at first scan, validated for serializable commits
    scanned: BTreeMap<TableId, u64>,
    intents: HashSet<RowKey>,
    finished: bool,
}

/// One open in-memory transaction
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    seq: u64,
    options: BeginOptions,
    wounded: Arc<AtomicBool>,
    state: Mutex<TxState>,
    _permit: OwnedSemaphorePermit,
}

impl MemoryTransaction {
    fn lock_state(&self) -> StoreResult<MutexGuard<'_, TxState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("transaction state poisoned".into()))
    }

    fn ensure_live(&self, state: &TxState) -> StoreResult<()> {
        if state.finished {
            return Err(StoreError::Closed);
        }
        if self.wounded.load(Ordering::SeqCst) {
            return Err(StoreError::Deadlock(format!(
                "transaction {} was aborted by a higher-priority transaction",
                self.seq
            )));
        }
        Ok(())
    }

    fn repeatable(&self) -> bool {
        self.options.isolation >= IsolationLevel::RepeatableRead
    }

    fn serializable(&self) -> bool {
        self.options.isolation == IsolationLevel::Serializable
    }

    fn outranks(&self, holder: &IntentHolder) -> bool {
        (self.options.priority, std::cmp::Reverse(self.seq))
            > (holder.priority, std::cmp::Reverse(holder.txn_seq))
    }

    fn holder(&self) -> IntentHolder {
        IntentHolder {
            txn_seq: self.seq,
            priority: self.options.priority,
            wounded: Arc::clone(&self.wounded),
        }
    }

    fn acquire_intent(&self, state: &mut TxState, key: RowKey) -> StoreResult<()> {
        if state.intents.contains(&key) {
            return Ok(());
        }
        match self.shared.intents.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(self.holder());
            }
            Entry::Occupied(mut slot) => {
                let holder = slot.get();
                if !holder.wounded.load(Ordering::SeqCst) && !self.outranks(holder) {
                    return Err(StoreError::Deadlock(format!(
                        "{} {} is held by transaction {} ({} priority)",
                        entity_of(key.0),
                        key.1,
                        holder.txn_seq,
                        holder.priority
                    )));
                }
                if !holder.wounded.swap(true, Ordering::SeqCst) {
                    debug!(
                        winner = self.seq,
                        victim = holder.txn_seq,
                        entity = entity_of(key.0),
                        id = key.1,
                        "wounding transaction holding write intent"
                    );
                }
                slot.insert(self.holder());
            }
        }
        state.intents.insert(key);
        Ok(())
    }

    fn release_intents(&self, state: &mut TxState) {
        for key in state.intents.drain() {
            self.shared
                .intents
                .remove_if(&key, |_, holder| holder.txn_seq == self.seq);
        }
    }

    fn finish(&self, state: &mut TxState) {
        state.writes.clear();
        state.savepoints.clear();
        self.release_intents(state);
        state.finished = true;
    }

    fn read<T: Record>(&self, id: i32) -> StoreResult<Option<T>> {
        let mut state = self.lock_state()?;
        self.ensure_live(&state)?;
        let key = (T::TABLE, id);

        if let Some(write) = state.writes.iter().rev().find(|w| w.key == key) {
            return Ok(T::from_row(&write.row).cloned());
        }
        if self.repeatable() {
            if let Some(cached) = state.cached.get(&key) {
                return Ok(cached.as_ref().and_then(T::from_row).cloned());
            }
        }

        let committed = T::table(&self.shared).get(id);
        let version = committed.as_ref().map_or(0, |v| v.version);
        let value = committed.map(|v| v.value);
        state.observed.entry(key).or_insert(version);
        if self.repeatable() {
            state.cached.insert(key, value.clone().map(|v| v.into_row()));
        }
        Ok(value)
    }

    fn scan<T: Record>(&self, pred: impl Fn(&T) -> bool) -> StoreResult<Vec<T>> {
        let mut state = self.lock_state()?;
        self.ensure_live(&state)?;
        let table = T::table(&self.shared);
        if self.serializable() {
            state
                .scanned
                .entry(T::TABLE)
                .or_insert_with(|| table.version.load(Ordering::SeqCst));
        }

        let mut rows: BTreeMap<i32, T> = BTreeMap::new();
        for (id, committed) in table.committed_rows() {
            let key = (T::TABLE, id);
            state.observed.entry(key).or_insert(committed.version);
            let value = if self.repeatable() {
                match state.cached.get(&key).cloned() {
                    Some(cached) => cached.as_ref().and_then(T::from_row).cloned(),
                    None => {
                        state
                            .cached
                            .insert(key, Some(committed.value.clone().into_row()));
                        Some(committed.value)
                    }
                }
            } else {
                Some(committed.value)
            };
            if let Some(value) = value {
                rows.insert(id, value);
            }
        }

        for write in state.writes.iter().filter(|w| w.key.0 == T::TABLE) {
            if let Some(value) = T::from_row(&write.row) {
                rows.insert(write.key.1, value.clone());
            }
        }

        Ok(rows.into_values().filter(|r| pred(r)).collect())
    }

    fn write<T: Record>(&self, value: T, insert: bool) -> StoreResult<()> {
        let mut state = self.lock_state()?;
        self.ensure_live(&state)?;
        let key = (T::TABLE, value.id());
        if !insert {
            self.acquire_intent(&mut state, key)?;
            let shared = &self.shared;
            state
                .observed
                .entry(key)
                .or_insert_with(|| shared.version_of(key));
        }
        state.writes.push(PendingWrite {
            key,
            row: value.into_row(),
            insert,
        });
        Ok(())
    }

    /// Fails when a row this transaction depends on changed since it was
    /// read. Must be called with the commit lock held.
    fn validate(&self, state: &TxState, finals: &[(RowKey, Row, bool)]) -> StoreResult<()> {
        let conflict = |key: RowKey| StoreError::Conflict {
            entity: entity_of(key.0),
            id: key.1.to_string(),
        };

        for (key, row, insert) in finals {
            if *insert {
                if let Row::Vehicle(vehicle) = row {
                    if let Some(owner) = self.shared.plate_owner(&vehicle.license_plate) {
                        if owner != vehicle.id {
                            return Err(StoreError::Conflict {
                                entity: Vehicle::ENTITY,
                                id: vehicle.license_plate.clone(),
                            });
                        }
                    }
                }
                continue;
            }
            let expected = state.observed.get(key).copied().unwrap_or(0);
            if self.shared.version_of(*key) != expected {
                return Err(conflict(*key));
            }
        }

        if self.serializable() {
            for (key, expected) in &state.observed {
                if self.shared.version_of(*key) != *expected {
                    return Err(conflict(*key));
                }
            }
            for (table, expected) in &state.scanned {
                if self.shared.table_version(*table) != *expected {
                    return Err(StoreError::Conflict {
                        entity: entity_of(*table),
                        id: "*".into(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if !state.finished {
                trace!(txn_seq = self.seq, "memory transaction dropped without commit");
                self.finish(&mut state);
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn spots(&self) -> &dyn SpotRepository {
        self
    }

    fn vehicles(&self) -> &dyn VehicleRepository {
        self
    }

    fn sessions(&self) -> &dyn SessionRepository {
        self
    }

    fn audit(&self) -> &dyn AuditRepository {
        self
    }

    async fn savepoint(&self, name: &str) -> StoreResult<()> {
        let mut state = self.lock_state()?;
        self.ensure_live(&state)?;
        let mark = SavepointMark {
            name: name.to_string(),
            writes: state.writes.len(),
            intents: state.intents.clone(),
        };
        state.savepoints.push(mark);
        Ok(())
    }

    async fn release_savepoint(&self, name: &str) -> StoreResult<()> {
        let mut state = self.lock_state()?;
        self.ensure_live(&state)?;
        let pos = state
            .savepoints
            .iter()
            .rposition(|mark| mark.name == name)
            .ok_or_else(|| StoreError::UnknownSavepoint(name.to_string()))?;
        state.savepoints.truncate(pos);
        Ok(())
    }

    async fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()> {
        let mut state = self.lock_state()?;
        self.ensure_live(&state)?;
        let pos = state
            .savepoints
            .iter()
            .rposition(|mark| mark.name == name)
            .ok_or_else(|| StoreError::UnknownSavepoint(name.to_string()))?;
        let mark = &state.savepoints[pos];
        let writes = mark.writes;
        let later: Vec<RowKey> = state
            .intents
            .iter()
            .filter(|key| !mark.intents.contains(key))
            .copied()
            .collect();
        state.writes.truncate(writes);
        state.savepoints.truncate(pos + 1);
        for key in later {
            state.intents.remove(&key);
            self.shared
                .intents
                .remove_if(&key, |_, holder| holder.txn_seq == self.seq);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut state = self.lock_state()?;
        if let Err(e) = self.ensure_live(&state) {
            if !state.finished {
                self.finish(&mut state);
            }
            return Err(e);
        }

        // Collapse the write log to the last value per row.
        let mut finals: Vec<(RowKey, Row, bool)> = Vec::new();
        let mut index: HashMap<RowKey, usize> = HashMap::new();
        for write in state.writes.drain(..) {
            match index.get(&write.key) {
                Some(&i) => {
                    finals[i].1 = write.row;
                    finals[i].2 |= write.insert;
                }
                None => {
                    index.insert(write.key, finals.len());
                    finals.push((write.key, write.row, write.insert));
                }
            }
        }

        let outcome = {
            let _guard = self.shared.lock_commits()?;
            match self.validate(&state, &finals) {
                Ok(()) => {
                    if !finals.is_empty() {
                        let version = self.shared.next_version();
                        let count = finals.len();
                        for (_, row, _) in finals {
                            self.shared.apply(row, version);
                        }
                        debug!(txn_seq = self.seq, version, rows = count, "memory transaction committed");
                    }
                    Ok(())
                }
                Err(e) => {
                    debug!(txn_seq = self.seq, error = %e, "memory transaction failed validation");
                    Err(e)
                }
            }
        };

        self.finish(&mut state);
        outcome
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let mut state = self.lock_state()?;
        if !state.finished {
            self.finish(&mut state);
            trace!(txn_seq = self.seq, "memory transaction rolled back");
        }
        Ok(())
    }
}

#[async_trait]
impl SpotRepository for MemoryTransaction {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Spot>> {
        self.read::<Spot>(id)
    }

    async fn find_many(&self, filter: &SpotFilter) -> StoreResult<Vec<Spot>> {
        self.scan(|s: &Spot| filter.matches(s))
    }

    async fn create(&self, spot: NewSpot) -> StoreResult<Spot> {
        let spot = spot.into_spot(self.shared.spots.allocate_id(), Utc::now());
        self.write(spot.clone(), true)?;
        Ok(spot)
    }

    async fn update(&self, spot: &Spot) -> StoreResult<()> {
        if self.read::<Spot>(spot.id)?.is_none() {
            return Err(StoreError::Missing { entity: Spot::ENTITY, id: spot.id });
        }
        let mut spot = spot.clone();
        spot.updated_at = Utc::now();
        self.write(spot, false)
    }

    async fn transition_status(
        &self,
        id: i32,
        from: SpotStatus,
        to: SpotStatus,
    ) -> StoreResult<bool> {
        let mut spot = self
            .read::<Spot>(id)?
            .ok_or(StoreError::Missing { entity: Spot::ENTITY, id })?;
        if spot.status != from {
            return Ok(false);
        }
        spot.status = to;
        spot.updated_at = Utc::now();
        self.write(spot, false)?;
        Ok(true)
    }
}

#[async_trait]
impl VehicleRepository for MemoryTransaction {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Vehicle>> {
        self.read::<Vehicle>(id)
    }

    async fn find_by_plate(&self, license_plate: &str) -> StoreResult<Option<Vehicle>> {
        Ok(self
            .scan(|v: &Vehicle| v.license_plate == license_plate)?
            .into_iter()
            .next())
    }

    async fn create(&self, vehicle: NewVehicle) -> StoreResult<Vehicle> {
        if self.find_by_plate(&vehicle.license_plate).await?.is_some() {
            return Err(StoreError::Duplicate {
                entity: Vehicle::ENTITY,
                value: vehicle.license_plate,
            });
        }
        let vehicle = vehicle.into_vehicle(self.shared.vehicles.allocate_id(), Utc::now());
        self.write(vehicle.clone(), true)?;
        Ok(vehicle)
    }

    async fn lock_for_update(&self, id: i32) -> StoreResult<Vehicle> {
        let vehicle = self
            .read::<Vehicle>(id)?
            .ok_or(StoreError::Missing { entity: Vehicle::ENTITY, id })?;
        self.write(vehicle.clone(), false)?;
        Ok(vehicle)
    }
}

#[async_trait]
impl SessionRepository for MemoryTransaction {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<ParkingSession>> {
        self.read::<ParkingSession>(id)
    }

    async fn find_many(&self, filter: &SessionFilter) -> StoreResult<Vec<ParkingSession>> {
        self.scan(|s: &ParkingSession| filter.matches(s))
    }

    async fn create(&self, session: NewParkingSession) -> StoreResult<ParkingSession> {
        let session = session.into_session(self.shared.sessions.allocate_id());
        self.write(session.clone(), true)?;
        Ok(session)
    }

    async fn update(&self, session: &ParkingSession) -> StoreResult<()> {
        if self.read::<ParkingSession>(session.id)?.is_none() {
            return Err(StoreError::Missing {
                entity: ParkingSession::ENTITY,
                id: session.id,
            });
        }
        self.write(session.clone(), false)
    }
}

#[async_trait]
impl AuditRepository for MemoryTransaction {
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry> {
        let entry = entry.into_entry(self.shared.audit.allocate_id());
        self.write(entry.clone(), true)?;
        Ok(entry)
    }

    async fn find_many(&self, filter: &AuditFilter) -> StoreResult<Vec<AuditEntry>> {
        self.scan(|e: &AuditEntry| filter.matches(e))
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuditAction, SpotType, VehicleType};
    use uuid::Uuid;

    fn options(priority: TransactionPriority) -> BeginOptions {
        BeginOptions {
            isolation: IsolationLevel::ReadCommitted,
            priority,
        }
    }

    async fn sample_store() -> (InMemoryStore, Spot) {
        let store = InMemoryStore::new();
        let spot = store
            .spots()
            .create(NewSpot::new(1, 1, "A", 1, SpotType::Standard))
            .await
            .unwrap();
        (store, spot)
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_to_others() {
        let (store, spot) = sample_store().await;
        let tx = store.begin(BeginOptions::default()).await.unwrap();
        assert!(tx
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap());

        // read-your-writes inside, old value outside
        let inside = tx.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert_eq!(inside.status, SpotStatus::Occupied);
        let outside = store.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert_eq!(outside.status, SpotStatus::Available);

        tx.commit().await.unwrap();
        let after = store.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert_eq!(after.status, SpotStatus::Occupied);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let (store, spot) = sample_store().await;
        {
            let tx = store.begin(BeginOptions::default()).await.unwrap();
            tx.spots()
                .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
                .await
                .unwrap();
        }
        let after = store.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert_eq!(after.status, SpotStatus::Available);
        assert!(store.shared.intents.is_empty());
    }

    #[tokio::test]
    async fn stale_read_conflicts_at_commit() {
        let (store, spot) = sample_store().await;
        let tx = store.begin(BeginOptions::default()).await.unwrap();
        let seen = tx.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert!(seen.is_available());

        // someone else takes it through the auto-commit path
        assert!(store
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Maintenance)
            .await
            .unwrap());

        let mut stale = seen.clone();
        stale.status = SpotStatus::Occupied;
        tx.spots().update(&stale).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "spot", .. }));
    }

    #[tokio::test]
    async fn equal_priority_younger_writer_loses() {
        let (store, spot) = sample_store().await;
        let older = store.begin(options(TransactionPriority::Normal)).await.unwrap();
        let younger = store.begin(options(TransactionPriority::Normal)).await.unwrap();

        assert!(older
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap());
        let err = younger
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Deadlock(_)));

        younger.rollback().await.unwrap();
        older.commit().await.unwrap();
    }

    #[tokio::test]
    async fn higher_priority_wounds_holder() {
        let (store, spot) = sample_store().await;
        let low = store.begin(options(TransactionPriority::Low)).await.unwrap();
        let high = store.begin(options(TransactionPriority::High)).await.unwrap();

        assert!(low
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap());
        assert!(high
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap());

        let err = low.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Deadlock(_)));
        high.commit().await.unwrap();

        let after = store.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert_eq!(after.status, SpotStatus::Occupied);
    }

    #[tokio::test]
    async fn rollback_to_savepoint_keeps_earlier_writes() {
        let (store, spot) = sample_store().await;
        let tx = store.begin(BeginOptions::default()).await.unwrap();
        let txn_id = Uuid::new_v4();

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
        // still live after rollback-to
        tx.release_savepoint("sp_1").await.unwrap();
        assert!(matches!(
            tx.release_savepoint("sp_1").await,
            Err(StoreError::UnknownSavepoint(_))
        ));
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
    }

    #[tokio::test]
    async fn concurrent_plate_registration_conflicts() {
        let store = InMemoryStore::new();
        let a = store.begin(BeginOptions::default()).await.unwrap();
        let b = store.begin(BeginOptions::default()).await.unwrap();
        a.vehicles()
            .create(NewVehicle::new("abc123", VehicleType::Standard))
            .await
            .unwrap();
        b.vehicles()
            .create(NewVehicle::new("ABC123", VehicleType::Standard))
            .await
            .unwrap();
        a.commit().await.unwrap();
        let err = b.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "vehicle", .. }));
    }

    #[tokio::test]
    async fn vehicle_lock_blocks_second_locker() {
        let store = InMemoryStore::new();
        let vehicle = store
            .vehicles()
            .create(NewVehicle::new("ABC123", VehicleType::Standard))
            .await
            .unwrap();
        let older = store.begin(options(TransactionPriority::Normal)).await.unwrap();
        let younger = store.begin(options(TransactionPriority::Normal)).await.unwrap();

        let locked = older.vehicles().lock_for_update(vehicle.id).await.unwrap();
        assert_eq!(locked.license_plate, "ABC123");
        let err = younger.vehicles().lock_for_update(vehicle.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Deadlock(_)));
        assert!(matches!(
            older.vehicles().lock_for_update(999).await,
            Err(StoreError::Missing { id: 999, .. })
        ));

        younger.rollback().await.unwrap();
        older.commit().await.unwrap();
        let after = store.vehicles().find_by_id(vehicle.id).await.unwrap().unwrap();
        assert_eq!(after, vehicle);
    }

    #[tokio::test]
    async fn rollback_to_savepoint_releases_later_intents() {
        let (store, spot) = sample_store().await;
        let older = store.begin(options(TransactionPriority::Normal)).await.unwrap();
        let younger = store.begin(options(TransactionPriority::Normal)).await.unwrap();

        older.savepoint("sp_1").await.unwrap();
        assert!(older
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap());
        older.rollback_to_savepoint("sp_1").await.unwrap();

        // the spot is free to take again
        assert!(younger
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Occupied)
            .await
            .unwrap());
        younger.commit().await.unwrap();
        older.commit().await.unwrap();

        let after = store.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert_eq!(after.status, SpotStatus::Occupied);
        assert!(store.shared.intents.is_empty());
    }

    #[tokio::test]
    async fn serializable_scan_detects_phantoms() {
        let (store, _) = sample_store().await;
        let tx = store
            .begin(BeginOptions {
                isolation: IsolationLevel::Serializable,
                priority: TransactionPriority::Normal,
            })
            .await
            .unwrap();
        let available = tx.spots().find_many(&SpotFilter::available()).await.unwrap();
        assert_eq!(available.len(), 1);

        store
            .spots()
            .create(NewSpot::new(1, 1, "A", 2, SpotType::Standard))
            .await
            .unwrap();

        tx.audit()
            .append(NewAuditEntry::new(Uuid::new_v4(), AuditAction::CheckInRequested, Utc::now()))
            .await
            .unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::Conflict { entity: "spot", .. })
        ));
    }

    #[tokio::test]
    async fn repeatable_read_pins_first_read() {
        let (store, spot) = sample_store().await;
        let tx = store
            .begin(BeginOptions {
                isolation: IsolationLevel::RepeatableRead,
                priority: TransactionPriority::Normal,
            })
            .await
            .unwrap();
        let first = tx.spots().find_by_id(spot.id).await.unwrap().unwrap();
        store
            .spots()
            .transition_status(spot.id, SpotStatus::Available, SpotStatus::Maintenance)
            .await
            .unwrap();
        let second = tx.spots().find_by_id(spot.id).await.unwrap().unwrap();
        assert_eq!(first.status, second.status);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let store = InMemoryStore::new();
        let tx = store.begin(BeginOptions::default()).await.unwrap();
        let ghost = NewSpot::new(1, 1, "A", 1, SpotType::Compact).into_spot(99, Utc::now());
        assert!(matches!(
            tx.spots().update(&ghost).await,
            Err(StoreError::Missing { id: 99, .. })
        ));
    }
}
