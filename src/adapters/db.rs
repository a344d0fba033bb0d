use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use thiserror::Error;

use crate::domain::models::{CardRfid, ChargerId, ConfigEntry, EntryData, NewConfigEntry};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS config_entries (
    entry_id TEXT PRIMARY KEY,
    unique_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    version INTEGER NOT NULL,
    email TEXT NOT NULL,
    password TEXT NOT NULL,
    card_rfid TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#,
)];

const ENTRY_COLUMNS: &str =
    "entry_id, unique_id, title, version, email, password, card_rfid, created_at, updated_at";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("charger {0} is already configured")]
    DuplicateUniqueId(ChargerId),
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn insert_entry(connection: &Connection, new_entry: &NewConfigEntry) -> Result<(), DbError> {
    let result = connection.execute(
        "INSERT INTO config_entries (entry_id, unique_id, title, version, email, password, card_rfid, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            new_entry.entry_id,
            new_entry.data.charger_id.as_str(),
            new_entry.title,
            new_entry.version,
            new_entry.data.email,
            new_entry.data.password,
            new_entry.data.card_rfid.as_str(),
            new_entry.created_at,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(failure, _))
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Err(DbError::DuplicateUniqueId(new_entry.data.charger_id.clone()))
        }
        Err(error) => Err(DbError::from(error)),
    }
}

pub fn update_entry_data(
    connection: &Connection,
    entry_id: &str,
    data: &EntryData,
    updated_at: &str,
) -> Result<bool, DbError> {
    let changed = connection.execute(
        "UPDATE config_entries
         SET email = ?2, password = ?3, card_rfid = ?4, updated_at = ?5
         WHERE entry_id = ?1",
        params![
            entry_id,
            data.email,
            data.password,
            data.card_rfid.as_str(),
            updated_at,
        ],
    )?;

    Ok(changed > 0)
}

pub fn remove_entry(connection: &Connection, entry_id: &str) -> Result<bool, DbError> {
    let changed = connection.execute(
        "DELETE FROM config_entries WHERE entry_id = ?1",
        params![entry_id],
    )?;
    Ok(changed > 0)
}

pub fn get_entry(connection: &Connection, entry_id: &str) -> Result<Option<ConfigEntry>, DbError> {
    let entry = connection
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM config_entries WHERE entry_id = ?1"),
            params![entry_id],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

pub fn find_entry_by_unique_id(
    connection: &Connection,
    charger_id: &ChargerId,
) -> Result<Option<ConfigEntry>, DbError> {
    let entry = connection
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM config_entries WHERE unique_id = ?1"),
            params![charger_id.as_str()],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

pub fn list_entries(connection: &Connection) -> Result<Vec<ConfigEntry>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM config_entries ORDER BY created_at ASC, entry_id ASC"
    ))?;

    let rows = statement.query_map([], entry_from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }

    Ok(entries)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ConfigEntry> {
    let unique_id: String = row.get(1)?;
    let card_rfid: String = row.get(6)?;

    Ok(ConfigEntry {
        entry_id: row.get(0)?,
        title: row.get(2)?,
        version: row.get(3)?,
        data: EntryData {
            email: row.get(4)?,
            password: row.get(5)?,
            card_rfid: CardRfid::new(card_rfid),
            charger_id: ChargerId::new(unique_id),
        },
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
