use std::path::Path;

use anyhow::{anyhow, Context, Result};
use packer_core::{Detection, EntityKind, Item, ItemId, KernelError, Trip, TripId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS items (
  item_id TEXT PRIMARY KEY,
  name TEXT,
  weight_kg REAL CHECK (weight_kg IS NULL OR weight_kg >= 0),
  estimated_volume_cm3 REAL CHECK (estimated_volume_cm3 IS NULL OR estimated_volume_cm3 >= 0),
  detection_json TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trips (
  trip_id TEXT PRIMARY KEY,
  destination TEXT NOT NULL,
  duration_days INTEGER NOT NULL CHECK (duration_days >= 1),
  doing_laundry INTEGER NOT NULL CHECK (doing_laundry IN (0, 1)),
  activities TEXT,
  lowest_temp REAL,
  highest_temp REAL,
  total_items_weight REAL NOT NULL DEFAULT 0 CHECK (total_items_weight >= 0),
  total_items_volume REAL NOT NULL DEFAULT 0 CHECK (total_items_volume >= 0),
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trip_items (
  trip_id TEXT NOT NULL,
  item_id TEXT NOT NULL,
  position INTEGER NOT NULL,
  PRIMARY KEY (trip_id, item_id),
  FOREIGN KEY (trip_id) REFERENCES trips(trip_id),
  FOREIGN KEY (item_id) REFERENCES items(item_id)
);

CREATE INDEX IF NOT EXISTS idx_trip_items_item ON trip_items(item_id);
CREATE INDEX IF NOT EXISTS idx_trip_items_order ON trip_items(trip_id, position);
";

/// Item and trip registries backed by one SQLite connection.
///
/// Every mutation that touches the item/trip membership edge runs inside a
/// single transaction, so neither side of the bidirectional link is ever
/// observable without the other. Callers serialize access (the api facade
/// holds the store behind a mutex), which also makes each packing decision's
/// read-score-commit sequence a critical section.
pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

struct ItemRow {
    item_id: String,
    name: Option<String>,
    weight_kg: Option<f64>,
    estimated_volume_cm3: Option<f64>,
    detection_json: Option<String>,
    created_at: String,
}

struct TripRow {
    trip_id: String,
    destination: String,
    duration_days: i64,
    doing_laundry: bool,
    activities: Option<String>,
    lowest_temp: Option<f64>,
    highest_temp: Option<f64>,
    total_items_weight: f64,
    total_items_volume: f64,
    created_at: String,
}

impl SqliteStore {
    /// Open a store at `path` and configure runtime pragmas. Pass `:memory:`
    /// for a process-lifetime store, which is the default deployment shape.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas fail.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Open a process-lifetime in-memory store.
    ///
    /// # Errors
    /// Returns an error when the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version == 0 {
            self.conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration 1")?;
            record_schema_version(&self.conn, 1)?;
            version = 1;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Insert one new item. Memberships are not writable here; use
    /// [`SqliteStore::associate`] to link the item to a trip.
    ///
    /// # Errors
    /// Returns an error when validation or the insert fails.
    pub fn insert_item(&mut self, item: &Item) -> Result<()> {
        item.validate().map_err(|err| anyhow!("item validation failed: {err}"))?;

        let tx = self.conn.transaction().context("failed to start transaction")?;
        tx.execute(
            "INSERT INTO items(item_id, name, weight_kg, estimated_volume_cm3, detection_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.item_id.to_string(),
                item.name,
                item.weight_kg,
                item.estimated_volume_cm3,
                encode_detection(item.detection.as_ref())?,
                rfc3339(item.created_at)?,
            ],
        )
        .context("failed to insert item")?;
        tx.commit().context("failed to commit item insert")?;
        Ok(())
    }

    /// # Errors
    /// Returns [`KernelError::NotFound`] for an unknown id, or an error when
    /// the row cannot be read or decoded.
    pub fn get_item(&self, item_id: ItemId) -> Result<Item> {
        let row = self
            .conn
            .prepare(
                "SELECT item_id, name, weight_kg, estimated_volume_cm3, detection_json, created_at
                 FROM items WHERE item_id = ?1",
            )?
            .query_row(params![item_id.to_string()], item_row)
            .optional()?;

        let Some(row) = row else {
            return Err(KernelError::not_found(EntityKind::Item, item_id).into());
        };
        self.decode_item(row)
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_items(&self) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, name, weight_kg, estimated_volume_cm3, detection_json, created_at
             FROM items ORDER BY created_at ASC, item_id ASC",
        )?;
        let mut rows = stmt.query([])?;

        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(self.decode_item(item_row(row)?)?);
        }
        Ok(items)
    }

    /// Update an item's own fields (name, measurements, detection).
    /// Memberships and `created_at` are not writable here. Trips the item
    /// belongs to get their totals recalculated in the same transaction.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] for an unknown id, or an error when
    /// validation or any write fails.
    pub fn update_item(&mut self, item: &Item) -> Result<()> {
        item.validate().map_err(|err| anyhow!("item validation failed: {err}"))?;

        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_item_exists(&tx, item.item_id)?;

        tx.execute(
            "UPDATE items SET name = ?2, weight_kg = ?3, estimated_volume_cm3 = ?4, detection_json = ?5
             WHERE item_id = ?1",
            params![
                item.item_id.to_string(),
                item.name,
                item.weight_kg,
                item.estimated_volume_cm3,
                encode_detection(item.detection.as_ref())?,
            ],
        )
        .context("failed to update item")?;

        for trip_id in member_trip_ids(&tx, item.item_id)? {
            recalculate_in_tx(&tx, &trip_id)?;
        }

        tx.commit().context("failed to commit item update")?;
        Ok(())
    }

    /// Delete an item, removing it from every trip that referenced it. Each
    /// affected trip's totals lose the item's last-known contribution,
    /// clamped at zero so floating-point drift never produces a negative
    /// total.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] for an unknown id, or an error when
    /// any write fails.
    pub fn delete_item(&mut self, item_id: ItemId) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_item_exists(&tx, item_id)?;

        tx.execute(
            "UPDATE trips SET
                total_items_weight = MAX(total_items_weight
                    - COALESCE((SELECT weight_kg FROM items WHERE item_id = ?1), 0), 0),
                total_items_volume = MAX(total_items_volume
                    - COALESCE((SELECT estimated_volume_cm3 FROM items WHERE item_id = ?1), 0), 0)
             WHERE trip_id IN (SELECT trip_id FROM trip_items WHERE item_id = ?1)",
            params![item_id.to_string()],
        )
        .context("failed to subtract item contribution from trip totals")?;

        tx.execute("DELETE FROM trip_items WHERE item_id = ?1", params![item_id.to_string()])
            .context("failed to delete item memberships")?;
        tx.execute("DELETE FROM items WHERE item_id = ?1", params![item_id.to_string()])
            .context("failed to delete item")?;

        tx.commit().context("failed to commit item delete")?;
        Ok(())
    }

    /// Insert one new trip. Membership rows are not writable here.
    ///
    /// # Errors
    /// Returns an error when validation or the insert fails.
    pub fn insert_trip(&mut self, trip: &Trip) -> Result<()> {
        trip.validate().map_err(|err| anyhow!("trip validation failed: {err}"))?;

        let tx = self.conn.transaction().context("failed to start transaction")?;
        tx.execute(
            "INSERT INTO trips(
                trip_id, destination, duration_days, doing_laundry, activities,
                lowest_temp, highest_temp, total_items_weight, total_items_volume, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                trip.trip_id.to_string(),
                trip.destination,
                trip.duration_days,
                trip.doing_laundry,
                trip.activities,
                trip.lowest_temp,
                trip.highest_temp,
                trip.total_items_weight,
                trip.total_items_volume,
                rfc3339(trip.created_at)?,
            ],
        )
        .context("failed to insert trip")?;
        tx.commit().context("failed to commit trip insert")?;
        Ok(())
    }

    /// # Errors
    /// Returns [`KernelError::NotFound`] for an unknown id, or an error when
    /// the row cannot be read or decoded.
    pub fn get_trip(&self, trip_id: TripId) -> Result<Trip> {
        let row = self
            .conn
            .prepare(
                "SELECT trip_id, destination, duration_days, doing_laundry, activities,
                        lowest_temp, highest_temp, total_items_weight, total_items_volume, created_at
                 FROM trips WHERE trip_id = ?1",
            )?
            .query_row(params![trip_id.to_string()], trip_row)
            .optional()?;

        let Some(row) = row else {
            return Err(KernelError::not_found(EntityKind::Trip, trip_id).into());
        };
        self.decode_trip(row)
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_trips(&self) -> Result<Vec<Trip>> {
        let mut stmt = self.conn.prepare(
            "SELECT trip_id, destination, duration_days, doing_laundry, activities,
                    lowest_temp, highest_temp, total_items_weight, total_items_volume, created_at
             FROM trips ORDER BY created_at ASC, trip_id ASC",
        )?;
        let mut rows = stmt.query([])?;

        let mut trips = Vec::new();
        while let Some(row) = rows.next()? {
            trips.push(self.decode_trip(trip_row(row)?)?);
        }
        Ok(trips)
    }

    /// Update a trip's own fields. Membership and cached totals are derived
    /// state and move only through the dedicated operations.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] for an unknown id, or an error when
    /// validation or the write fails.
    pub fn update_trip(&mut self, trip: &Trip) -> Result<()> {
        trip.validate().map_err(|err| anyhow!("trip validation failed: {err}"))?;

        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_trip_exists(&tx, trip.trip_id)?;

        tx.execute(
            "UPDATE trips SET destination = ?2, duration_days = ?3, doing_laundry = ?4,
                    activities = ?5, lowest_temp = ?6, highest_temp = ?7
             WHERE trip_id = ?1",
            params![
                trip.trip_id.to_string(),
                trip.destination,
                trip.duration_days,
                trip.doing_laundry,
                trip.activities,
                trip.lowest_temp,
                trip.highest_temp,
            ],
        )
        .context("failed to update trip")?;

        tx.commit().context("failed to commit trip update")?;
        Ok(())
    }

    /// Delete a trip. Member items lose the back-reference but outlive the
    /// trip; there is no cascade onto items.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] for an unknown id, or an error when
    /// any write fails.
    pub fn delete_trip(&mut self, trip_id: TripId) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_trip_exists(&tx, trip_id)?;

        tx.execute("DELETE FROM trip_items WHERE trip_id = ?1", params![trip_id.to_string()])
            .context("failed to delete trip memberships")?;
        tx.execute("DELETE FROM trips WHERE trip_id = ?1", params![trip_id.to_string()])
            .context("failed to delete trip")?;

        tx.commit().context("failed to commit trip delete")?;
        Ok(())
    }

    /// Load a trip's member items in packing order.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] for an unknown trip id, or an error
    /// when rows cannot be read or decoded.
    pub fn list_trip_items(&self, trip_id: TripId) -> Result<Vec<Item>> {
        ensure_trip_exists(&self.conn, trip_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT i.item_id, i.name, i.weight_kg, i.estimated_volume_cm3, i.detection_json, i.created_at
             FROM trip_items ti
             JOIN items i ON i.item_id = ti.item_id
             WHERE ti.trip_id = ?1
             ORDER BY ti.position ASC",
        )?;
        let mut rows = stmt.query(params![trip_id.to_string()])?;

        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(self.decode_item(item_row(row)?)?);
        }
        Ok(items)
    }

    /// Link an item to a trip and recalculate the trip's totals, all in one
    /// transaction. Associating an existing membership is a no-op.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] when either id is unknown, or an
    /// error when any write fails.
    pub fn associate(&mut self, item_id: ItemId, trip_id: TripId) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_item_exists(&tx, item_id)?;
        ensure_trip_exists(&tx, trip_id)?;

        tx.execute(
            "INSERT OR IGNORE INTO trip_items(trip_id, item_id, position)
             VALUES (?1, ?2,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM trip_items WHERE trip_id = ?1))",
            params![trip_id.to_string(), item_id.to_string()],
        )
        .context("failed to insert membership")?;

        recalculate_in_tx(&tx, &trip_id.to_string())?;
        tx.commit().context("failed to commit association")?;
        Ok(())
    }

    /// Unlink an item from a trip and recalculate the trip's totals, all in
    /// one transaction. Removing a non-membership is a no-op.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] when either id is unknown, or an
    /// error when any write fails.
    pub fn disassociate(&mut self, item_id: ItemId, trip_id: TripId) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_item_exists(&tx, item_id)?;
        ensure_trip_exists(&tx, trip_id)?;

        tx.execute(
            "DELETE FROM trip_items WHERE trip_id = ?1 AND item_id = ?2",
            params![trip_id.to_string(), item_id.to_string()],
        )
        .context("failed to delete membership")?;

        recalculate_in_tx(&tx, &trip_id.to_string())?;
        tx.commit().context("failed to commit disassociation")?;
        Ok(())
    }

    /// Persist a `pack` outcome from the decision engine: append membership
    /// and grow the cached totals by the item's present measurements. This is
    /// the incremental path; [`SqliteStore::recalculate_totals`] remains the
    /// authoritative reconciliation.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] when either id is unknown, or an
    /// error when any write fails.
    pub fn commit_pack(&mut self, trip_id: TripId, item_id: ItemId) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_item_exists(&tx, item_id)?;
        ensure_trip_exists(&tx, trip_id)?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO trip_items(trip_id, item_id, position)
                 VALUES (?1, ?2,
                    (SELECT COALESCE(MAX(position) + 1, 0) FROM trip_items WHERE trip_id = ?1))",
                params![trip_id.to_string(), item_id.to_string()],
            )
            .context("failed to insert membership")?;

        if inserted > 0 {
            tx.execute(
                "UPDATE trips SET
                    total_items_weight = total_items_weight
                        + COALESCE((SELECT weight_kg FROM items WHERE item_id = ?2), 0),
                    total_items_volume = total_items_volume
                        + COALESCE((SELECT estimated_volume_cm3 FROM items WHERE item_id = ?2), 0)
                 WHERE trip_id = ?1",
                params![trip_id.to_string(), item_id.to_string()],
            )
            .context("failed to grow trip totals")?;
        }

        tx.commit().context("failed to commit pack")?;
        Ok(())
    }

    /// Recompute a trip's cached totals from scratch over its current
    /// members, treating absent measurements as zero. No incremental
    /// shortcuts: this is the reconciliation path that corrects drift.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] for an unknown trip id, or an error
    /// when the write fails.
    pub fn recalculate_totals(&mut self, trip_id: TripId) -> Result<(f64, f64)> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_trip_exists(&tx, trip_id)?;
        recalculate_in_tx(&tx, &trip_id.to_string())?;

        let totals = tx
            .query_row(
                "SELECT total_items_weight, total_items_volume FROM trips WHERE trip_id = ?1",
                params![trip_id.to_string()],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
            )
            .context("failed to read recalculated totals")?;

        tx.commit().context("failed to commit recalculation")?;
        Ok(totals)
    }

    fn decode_item(&self, row: ItemRow) -> Result<Item> {
        let item_id = ItemId(parse_ulid(&row.item_id)?);
        let detection: Option<Detection> = match row.detection_json {
            Some(json) => {
                Some(serde_json::from_str(&json).context("failed to decode stored detection")?)
            }
            None => None,
        };

        let mut stmt = self
            .conn
            .prepare("SELECT trip_id FROM trip_items WHERE item_id = ?1 ORDER BY rowid ASC")?;
        let mut rows = stmt.query(params![row.item_id])?;
        let mut trips = Vec::new();
        while let Some(membership) = rows.next()? {
            let trip_id_raw: String = membership.get(0)?;
            trips.push(TripId(parse_ulid(&trip_id_raw)?));
        }

        Ok(Item {
            item_id,
            name: row.name,
            weight_kg: row.weight_kg,
            estimated_volume_cm3: row.estimated_volume_cm3,
            detection,
            importance: None,
            trips,
            created_at: parse_rfc3339(&row.created_at)?,
        })
    }

    fn decode_trip(&self, row: TripRow) -> Result<Trip> {
        let trip_id = TripId(parse_ulid(&row.trip_id)?);

        let mut stmt = self
            .conn
            .prepare("SELECT item_id FROM trip_items WHERE trip_id = ?1 ORDER BY position ASC")?;
        let mut rows = stmt.query(params![row.trip_id])?;
        let mut items = Vec::new();
        while let Some(membership) = rows.next()? {
            let item_id_raw: String = membership.get(0)?;
            items.push(ItemId(parse_ulid(&item_id_raw)?));
        }

        Ok(Trip {
            trip_id,
            destination: row.destination,
            duration_days: row.duration_days,
            doing_laundry: row.doing_laundry,
            activities: row.activities,
            lowest_temp: row.lowest_temp,
            highest_temp: row.highest_temp,
            items,
            total_items_weight: row.total_items_weight,
            total_items_volume: row.total_items_volume,
            created_at: parse_rfc3339(&row.created_at)?,
        })
    }
}

fn item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        item_id: row.get(0)?,
        name: row.get(1)?,
        weight_kg: row.get(2)?,
        estimated_volume_cm3: row.get(3)?,
        detection_json: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn trip_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TripRow> {
    Ok(TripRow {
        trip_id: row.get(0)?,
        destination: row.get(1)?,
        duration_days: row.get(2)?,
        doing_laundry: row.get(3)?,
        activities: row.get(4)?,
        lowest_temp: row.get(5)?,
        highest_temp: row.get(6)?,
        total_items_weight: row.get(7)?,
        total_items_volume: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn ensure_item_exists(conn: &Connection, item_id: ItemId) -> Result<()> {
    let exists = conn
        .prepare("SELECT 1 FROM items WHERE item_id = ?1")?
        .query_row(params![item_id.to_string()], |_| Ok(()))
        .optional()?;
    if exists.is_none() {
        return Err(KernelError::not_found(EntityKind::Item, item_id).into());
    }
    Ok(())
}

fn ensure_trip_exists(conn: &Connection, trip_id: TripId) -> Result<()> {
    let exists = conn
        .prepare("SELECT 1 FROM trips WHERE trip_id = ?1")?
        .query_row(params![trip_id.to_string()], |_| Ok(()))
        .optional()?;
    if exists.is_none() {
        return Err(KernelError::not_found(EntityKind::Trip, trip_id).into());
    }
    Ok(())
}

fn member_trip_ids(conn: &Connection, item_id: ItemId) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT trip_id FROM trip_items WHERE item_id = ?1")?;
    let mut rows = stmt.query(params![item_id.to_string()])?;
    let mut trip_ids = Vec::new();
    while let Some(row) = rows.next()? {
        trip_ids.push(row.get(0)?);
    }
    Ok(trip_ids)
}

fn recalculate_in_tx(conn: &Connection, trip_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE trips SET
            total_items_weight = (
                SELECT COALESCE(SUM(COALESCE(i.weight_kg, 0)), 0)
                FROM trip_items ti JOIN items i ON i.item_id = ti.item_id
                WHERE ti.trip_id = ?1),
            total_items_volume = (
                SELECT COALESCE(SUM(COALESCE(i.estimated_volume_cm3, 0)), 0)
                FROM trip_items ti JOIN items i ON i.item_id = ti.item_id
                WHERE ti.trip_id = ?1)
         WHERE trip_id = ?1",
        params![trip_id],
    )
    .context("failed to recalculate trip totals")?;
    Ok(())
}

fn encode_detection(detection: Option<&Detection>) -> Result<Option<String>> {
    match detection {
        Some(detection) => {
            Ok(Some(serde_json::to_string(detection).context("failed to encode detection")?))
        }
        None => Ok(None),
    }
}

fn parse_ulid(value: &str) -> Result<Ulid> {
    Ulid::from_string(value).with_context(|| format!("invalid ulid in store: {value}"))
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid timestamp in store: {value}"))
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = rfc3339(OffsetDateTime::now_utc())?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .context("failed to record schema version")?;
    Ok(())
}
