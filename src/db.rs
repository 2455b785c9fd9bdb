use crate::entities::{CreditCard, User};
use crate::error::{LedgerError, Result};
use crate::money::Amount;
use crate::reconciliation::ReconciliationReport;
use crate::store::SequenceStore;
use crate::timeline::{Checkpoint, Timeline};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const DATE_FMT: &str = "%Y-%m-%d";

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    /// Audit record for one persisted reconciliation
    pub fn reconciled(report: &ReconciliationReport, actor: &str) -> Self {
        Event::new(
            "timeline_reconciled",
            "credit_card",
            &CreditCard::normalize_number(&report.account_ref),
            serde_json::json!({
                "summary": report.summary(),
                "observations": report.adjustments.len(),
                "shifted": report.shifted_count(),
                "topped_up": report.topped_up,
                "checkpoints": report.timeline.len(),
                "reconciled_on": report.reconciled_on.format(DATE_FMT).to_string(),
                "fingerprint": report.fingerprint,
            }),
            actor,
        )
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Deleting a user cascades to cards and their balance history
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Users & Credit Cards
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS credit_cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            issuance_bank TEXT NOT NULL,
            number TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Balance History (one row per checkpoint, sparse)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS balance_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id INTEGER NOT NULL REFERENCES credit_cards(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            balance_cents INTEGER NOT NULL,
            UNIQUE(card_id, date)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cards_user ON credit_cards(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Busy/locked database means another writer got there first; retryable
fn map_write_error(err: rusqlite::Error, what: &str) -> LedgerError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            LedgerError::Conflict(format!("{}: database busy", what))
        }
        other => LedgerError::Database(other),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_timestamp(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

// ============================================================================
// USERS
// ============================================================================

pub fn create_user(conn: &Connection, name: &str, email: &str) -> Result<User> {
    User::validate_new(name, email)?;
    let email = User::normalize_email(email);
    let now = Utc::now();

    let result = conn.execute(
        "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3)",
        params![name.trim(), email, now.to_rfc3339()],
    );

    match result {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(LedgerError::Duplicate(format!("user with email {}", email)));
        }
        Err(e) => return Err(map_write_error(e, "create user")),
    }

    let user = User {
        id: conn.last_insert_rowid(),
        name: name.trim().to_string(),
        email,
        created_at: now,
    };

    insert_event(
        conn,
        &Event::new(
            "user_created",
            "user",
            &user.id.to_string(),
            serde_json::json!({ "email": user.email }),
            "api",
        ),
    )?;

    Ok(user)
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, name, email, created_at FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                let created_at: String = row.get(3)?;
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    created_at: parse_timestamp(&created_at)?,
                })
            },
        )
        .optional()?;

    Ok(user)
}

/// Delete a user together with their cards and balance history
pub fn delete_user(conn: &Connection, user_id: i64) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM users WHERE id = ?1", params![user_id])
        .map_err(|e| map_write_error(e, "delete user"))?;

    if deleted == 0 {
        return Err(LedgerError::NotFound(format!("user {}", user_id)));
    }

    insert_event(
        conn,
        &Event::new("user_deleted", "user", &user_id.to_string(), serde_json::json!({}), "api"),
    )?;

    Ok(())
}

// ============================================================================
// CREDIT CARDS
// ============================================================================

fn card_from_row(row: &rusqlite::Row) -> rusqlite::Result<CreditCard> {
    let created_at: String = row.get(4)?;
    Ok(CreditCard {
        id: row.get(0)?,
        user_id: row.get(1)?,
        issuance_bank: row.get(2)?,
        number: row.get(3)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

pub fn add_credit_card(
    conn: &Connection,
    user_id: i64,
    issuance_bank: &str,
    number: &str,
) -> Result<CreditCard> {
    let number = CreditCard::validate_new(issuance_bank, number)?;
    let number = number.as_str();

    if get_user(conn, user_id)?.is_none() {
        return Err(LedgerError::NotFound(format!("user {}", user_id)));
    }
    if find_card_by_number(conn, number)?.is_some() {
        return Err(LedgerError::Duplicate(format!(
            "credit card {}",
            CreditCard::mask_number(number)
        )));
    }

    let now = Utc::now();
    conn.execute(
        "INSERT INTO credit_cards (user_id, issuance_bank, number, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, issuance_bank.trim(), number, now.to_rfc3339()],
    )
    .map_err(|e| map_write_error(e, "add credit card"))?;

    let card = CreditCard {
        id: conn.last_insert_rowid(),
        user_id,
        issuance_bank: issuance_bank.trim().to_string(),
        number: number.to_string(),
        created_at: now,
    };

    insert_event(
        conn,
        &Event::new(
            "card_registered",
            "credit_card",
            &card.number,
            serde_json::json!({ "user_id": user_id, "bank": card.issuance_bank }),
            "api",
        ),
    )?;

    Ok(card)
}

/// Lookup accepts the number with or without separators
pub fn find_card_by_number(conn: &Connection, number: &str) -> Result<Option<CreditCard>> {
    let card = conn
        .query_row(
            "SELECT id, user_id, issuance_bank, number, created_at
             FROM credit_cards WHERE number = ?1",
            params![CreditCard::normalize_number(number)],
            card_from_row,
        )
        .optional()?;

    Ok(card)
}

/// All cards of a user; unknown user is an error, a user without cards is not
pub fn list_cards_for_user(conn: &Connection, user_id: i64) -> Result<Vec<CreditCard>> {
    if get_user(conn, user_id)?.is_none() {
        return Err(LedgerError::NotFound(format!("user {}", user_id)));
    }

    let mut stmt = conn.prepare(
        "SELECT id, user_id, issuance_bank, number, created_at
         FROM credit_cards
         WHERE user_id = ?1
         ORDER BY id",
    )?;

    let cards = stmt
        .query_map(params![user_id], card_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(cards)
}

/// Owner of a card number
pub fn user_id_for_card(conn: &Connection, number: &str) -> Result<i64> {
    find_card_by_number(conn, number)?
        .map(|card| card.user_id)
        .ok_or_else(|| LedgerError::UnknownAccount(number.to_string()))
}

// ============================================================================
// BALANCE HISTORY
// ============================================================================

fn card_id_for(conn: &Connection, number: &str) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM credit_cards WHERE number = ?1",
        params![CreditCard::normalize_number(number)],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| LedgerError::UnknownAccount(number.to_string()))
}

/// Load a card's timeline (empty if never reconciled)
pub fn load_timeline(conn: &Connection, number: &str) -> Result<Timeline> {
    let card_id = card_id_for(conn, number)?;

    let mut stmt = conn.prepare(
        "SELECT date, balance_cents FROM balance_history
         WHERE card_id = ?1
         ORDER BY date",
    )?;

    let checkpoints = stmt
        .query_map(params![card_id], |row| {
            let date: String = row.get(0)?;
            let cents: i64 = row.get(1)?;
            let date = NaiveDate::parse_from_str(&date, DATE_FMT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(Checkpoint::new(date, Amount::from_cents(cents)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Timeline::from_checkpoints(checkpoints))
}

/// Replace a card's timeline in full
pub fn replace_timeline(conn: &Connection, number: &str, timeline: &Timeline) -> Result<()> {
    let card_id = card_id_for(conn, number)?;

    conn.execute("DELETE FROM balance_history WHERE card_id = ?1", params![card_id])
        .map_err(|e| map_write_error(e, "replace timeline"))?;

    let mut stmt = conn.prepare(
        "INSERT INTO balance_history (card_id, date, balance_cents) VALUES (?1, ?2, ?3)",
    )?;
    for checkpoint in timeline.checkpoints() {
        stmt.execute(params![
            card_id,
            checkpoint.date.format(DATE_FMT).to_string(),
            checkpoint.balance.cents(),
        ])
        .map_err(|e| map_write_error(e, "replace timeline"))?;
    }

    Ok(())
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(&timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed sequence store
///
/// One connection behind a mutex; the batch commit runs in a single
/// transaction so either every account of a batch is updated or none is.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        info!(path = %path.display(), "sqlite store opened");
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn create_user(&self, name: &str, email: &str) -> Result<User> {
        self.with_connection(|conn| create_user(conn, name, email))
    }

    pub fn delete_user(&self, user_id: i64) -> Result<()> {
        self.with_connection(|conn| delete_user(conn, user_id))
    }

    pub fn add_credit_card(&self, user_id: i64, issuance_bank: &str, number: &str) -> Result<CreditCard> {
        self.with_connection(|conn| add_credit_card(conn, user_id, issuance_bank, number))
    }

    pub fn list_cards_for_user(&self, user_id: i64) -> Result<Vec<CreditCard>> {
        self.with_connection(|conn| list_cards_for_user(conn, user_id))
    }

    pub fn user_id_for_card(&self, number: &str) -> Result<i64> {
        self.with_connection(|conn| user_id_for_card(conn, number))
    }

    pub fn events_for_card(&self, number: &str) -> Result<Vec<Event>> {
        let number = CreditCard::normalize_number(number);
        self.with_connection(|conn| get_events_for_entity(conn, "credit_card", &number))
    }
}

impl SequenceStore for SqliteStore {
    fn load_timeline(&self, account_ref: &str) -> Result<Timeline> {
        self.with_connection(|conn| load_timeline(conn, account_ref))
    }

    fn store_timeline(&self, account_ref: &str, timeline: &Timeline) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| map_write_error(e, "begin"))?;
        replace_timeline(&tx, account_ref, timeline)?;
        tx.commit().map_err(|e| map_write_error(e, "commit"))?;
        Ok(())
    }

    fn commit(&self, reports: &[ReconciliationReport]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| map_write_error(e, "begin"))?;

        for report in reports {
            replace_timeline(&tx, &report.account_ref, &report.timeline)?;
            insert_event(&tx, &Event::reconciled(report, "reconciler"))?;
            debug!(
                card = %CreditCard::mask_number(&report.account_ref),
                checkpoints = report.timeline.len(),
                "timeline replaced"
            );
        }

        // Dropping `tx` on an early return above rolls everything back
        tx.commit().map_err(|e| map_write_error(e, "commit"))?;
        Ok(())
    }
}
