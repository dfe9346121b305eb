//! SQLite implementation of [`LedgerStore`], [`EntityRegistry`] and [`SyncLeases`].

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{
    Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
};
use stakewatch_core::{Entity, LedgerTransaction, NewEntity, TxKind};

use super::schema;
use super::{EntityRegistry, LedgerStore, Page, SyncLeases, TxFilter, TxOrder};
use crate::{Error, Result};

const TX_COLUMNS: &str = "transaction_id, entity_address, kind, sender, receiver, \
                          amount, fee, confirmed_round, occurred_at, note";

const ENTITY_COLUMNS: &str =
    "address, display_name, initial_balance, bootstrap_transaction_id, registered_at";

/// How long a write waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger and registry backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL lets report readers run alongside the sync writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        schema::init_schema(&conn)?;

        tracing::debug!(path = %path.display(), "opened ledger store");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LedgerStore for SqliteStore {
    fn insert_if_absent(&self, tx: &LedgerTransaction) -> Result<bool> {
        let amount = to_sql_int(tx, "amount", tx.amount)?;
        let fee = to_sql_int(tx, "fee", tx.fee)?;
        let round = to_sql_int(tx, "confirmed_round", tx.confirmed_round)?;

        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO ledger_transactions
                (transaction_id, entity_address, kind, sender, receiver,
                 amount, fee, confirmed_round, occurred_at, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                tx.transaction_id,
                tx.entity_address,
                tx.kind.as_str(),
                tx.sender,
                tx.receiver,
                amount,
                fee,
                round,
                tx.occurred_at,
                tx.note,
            ],
        )?;

        Ok(changed > 0)
    }

    fn latest_confirmed_round(&self, entity_address: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let round: i64 = conn.query_row(
            "SELECT COALESCE(MAX(confirmed_round), 0)
             FROM ledger_transactions WHERE entity_address = ?",
            [entity_address],
            |row| row.get(0),
        )?;

        Ok(round.max(0) as u64)
    }

    fn query(
        &self,
        filter: &TxFilter,
        order: TxOrder,
        page: Page,
    ) -> Result<Vec<LedgerTransaction>> {
        let (where_clause, mut values) = build_where(filter);
        let order_clause = match order {
            TxOrder::ConfirmedRoundAsc => "confirmed_round ASC, transaction_id ASC",
            TxOrder::ConfirmedRoundDesc => "confirmed_round DESC, transaction_id ASC",
            TxOrder::OccurredAtAsc => "occurred_at ASC, transaction_id ASC",
        };

        // SQLite treats a negative LIMIT as unbounded
        values.push(Value::Integer(page.limit.map_or(-1, i64::from)));
        values.push(Value::Integer(i64::from(page.skip)));

        let sql = format!(
            "SELECT {} FROM ledger_transactions WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            TX_COLUMNS, where_clause, order_clause
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn count(&self, filter: &TxFilter) -> Result<u64> {
        let (where_clause, values) = build_where(filter);
        let sql = format!(
            "SELECT COUNT(*) FROM ledger_transactions WHERE {}",
            where_clause
        );

        let conn = self.conn.lock();
        let count: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;

        Ok(count.max(0) as u64)
    }

    fn find(
        &self,
        entity_address: &str,
        transaction_id: &str,
    ) -> Result<Option<LedgerTransaction>> {
        let conn = self.conn.lock();
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM ledger_transactions
                     WHERE entity_address = ? AND transaction_id = ?",
                    TX_COLUMNS
                ),
                [entity_address, transaction_id],
                row_to_transaction,
            )
            .optional()?;

        Ok(tx)
    }
}

impl EntityRegistry for SqliteStore {
    fn get(&self, address: &str) -> Result<Option<Entity>> {
        let conn = self.conn.lock();
        let entity = conn
            .query_row(
                &format!("SELECT {} FROM entities WHERE address = ?", ENTITY_COLUMNS),
                [address],
                row_to_entity,
            )
            .optional()?;

        Ok(entity)
    }

    fn list(&self) -> Result<Vec<Entity>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entities ORDER BY registered_at ASC, rowid ASC",
            ENTITY_COLUMNS
        ))?;
        let entities = stmt
            .query_map([], row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entities)
    }

    fn register(&self, new: NewEntity) -> Result<Entity> {
        let entity = new.into_entity(Utc::now().trunc_subsecs(0))?;
        let initial_balance = i64::try_from(entity.initial_balance).map_err(|_| {
            stakewatch_core::Error::InvalidAmount {
                input: entity.initial_balance.to_string(),
                reason: "initial balance does not fit in 63 bits".to_string(),
            }
        })?;

        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO entities
                (address, display_name, initial_balance, bootstrap_transaction_id, registered_at)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            params![
                entity.address,
                entity.display_name,
                initial_balance,
                entity.registered_at.timestamp(),
            ],
        )?;

        if changed == 0 {
            return Err(Error::EntityExists(entity.address));
        }

        tracing::info!(
            address = %entity.address,
            name = %entity.display_name,
            initial_balance = entity.initial_balance,
            "registered entity"
        );

        Ok(entity)
    }

    fn remove(&self, address: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM entities WHERE address = ?", [address])?;

        if changed > 0 {
            tracing::info!(address = %address, "removed entity");
        }

        Ok(changed > 0)
    }

    fn set_bootstrap_once(&self, address: &str, transaction_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE entities SET bootstrap_transaction_id = ?2
             WHERE address = ?1 AND bootstrap_transaction_id IS NULL",
            [address, transaction_id],
        )?;

        Ok(changed > 0)
    }
}

impl SyncLeases for SqliteStore {
    fn try_acquire_lease(&self, address: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let stale_before = now.saturating_sub(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<(String, i64)> = tx
            .query_row(
                "SELECT holder, acquired_at FROM sync_leases WHERE entity_address = ?",
                [address],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let acquired = match &current {
            None => true,
            Some((owner, acquired_at)) => owner == holder || *acquired_at < stale_before,
        };

        if acquired {
            tx.execute(
                "INSERT OR REPLACE INTO sync_leases (entity_address, holder, acquired_at)
                 VALUES (?1, ?2, ?3)",
                params![address, holder, now],
            )?;
        }
        tx.commit()?;

        if let Some((owner, _)) = current.filter(|(owner, _)| acquired && owner != holder) {
            tracing::warn!(
                address = %address,
                previous = %owner,
                holder = %holder,
                "took over stale sync lease"
            );
        }

        Ok(acquired)
    }

    fn release_lease(&self, address: &str, holder: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM sync_leases WHERE entity_address = ?1 AND holder = ?2",
            [address, holder],
        )?;
        Ok(())
    }
}

/// Build a WHERE clause and its bound values from a filter.
fn build_where(filter: &TxFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["entity_address = ?"];
    let mut values = vec![Value::Text(filter.entity_address.clone())];

    if let Some(kind) = filter.kind {
        clauses.push("kind = ?");
        values.push(Value::Text(kind.as_str().to_string()));
    }
    if let Some(sender) = &filter.sender {
        clauses.push("sender = ?");
        values.push(Value::Text(sender.clone()));
    }
    if let Some(receiver) = &filter.receiver {
        clauses.push("receiver = ?");
        values.push(Value::Text(receiver.clone()));
    }
    if let Some(fee) = filter.fee {
        clauses.push("fee = ?");
        values.push(Value::Integer(i64::try_from(fee).unwrap_or(i64::MAX)));
    }
    if let Some(since) = filter.occurred_since {
        clauses.push("occurred_at >= ?");
        values.push(Value::Integer(since));
    }
    if let Some(marker) = &filter.note_contains {
        // instr() is case-sensitive, unlike LIKE
        clauses.push("instr(note, ?) > 0");
        values.push(Value::Text(marker.clone()));
    }

    (clauses.join(" AND "), values)
}

fn to_sql_int(tx: &LedgerTransaction, field: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Malformed {
        id: Some(tx.transaction_id.clone()),
        reason: format!("{} {} exceeds the storable range", field, value),
    })
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<LedgerTransaction> {
    let kind: String = row.get(2)?;
    let kind = kind
        .parse::<TxKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(LedgerTransaction {
        transaction_id: row.get(0)?,
        entity_address: row.get(1)?,
        kind,
        sender: row.get(3)?,
        receiver: row.get(4)?,
        amount: row.get::<_, i64>(5)?.max(0) as u64,
        fee: row.get::<_, i64>(6)?.max(0) as u64,
        confirmed_round: row.get::<_, i64>(7)?.max(0) as u64,
        occurred_at: row.get(8)?,
        note: row.get(9)?,
    })
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let registered_at: i64 = row.get(4)?;
    let registered_at = DateTime::<Utc>::from_timestamp(registered_at, 0)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, registered_at))?;

    Ok(Entity {
        address: row.get(0)?,
        display_name: row.get(1)?,
        initial_balance: row.get::<_, i64>(2)?.max(0) as u64,
        bootstrap_transaction_id: row.get(3)?,
        registered_at,
    })
}
