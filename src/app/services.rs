use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::models::{ChargerId, ConfigEntry, EntryData, NewConfigEntry};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

/// Config-entry storage keyed by unique charger identifier.
pub trait EntryStore: Send + Sync + 'static {
    fn list_entries(&self) -> Result<Vec<ConfigEntry>, ServiceError>;
    fn get_entry(&self, entry_id: &str) -> Result<Option<ConfigEntry>, ServiceError>;
    fn find_by_charger(&self, charger_id: &ChargerId)
    -> Result<Option<ConfigEntry>, ServiceError>;
    fn create_entry(&self, title: &str, data: &EntryData) -> Result<ConfigEntry, ServiceError>;
    fn update_entry_data(&self, entry_id: &str, data: &EntryData) -> Result<bool, ServiceError>;
    fn remove_entry(&self, entry_id: &str) -> Result<bool, ServiceError>;
}

#[derive(Clone)]
pub struct SqliteEntryStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteEntryStore {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl EntryStore for SqliteEntryStore {
    fn list_entries(&self) -> Result<Vec<ConfigEntry>, ServiceError> {
        self.with_connection(db::list_entries)
    }

    fn get_entry(&self, entry_id: &str) -> Result<Option<ConfigEntry>, ServiceError> {
        self.with_connection(|connection| db::get_entry(connection, entry_id))
    }

    fn find_by_charger(
        &self,
        charger_id: &ChargerId,
    ) -> Result<Option<ConfigEntry>, ServiceError> {
        self.with_connection(|connection| db::find_entry_by_unique_id(connection, charger_id))
    }

    fn create_entry(&self, title: &str, data: &EntryData) -> Result<ConfigEntry, ServiceError> {
        let new_entry = NewConfigEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            version: crate::domain::models::ENTRY_VERSION,
            data: data.clone(),
            created_at: now_iso8601(),
        };

        self.with_connection(|connection| {
            db::insert_entry(connection, &new_entry)?;
            Ok(ConfigEntry {
                entry_id: new_entry.entry_id.clone(),
                title: new_entry.title.clone(),
                version: new_entry.version,
                data: new_entry.data.clone(),
                created_at: new_entry.created_at.clone(),
                updated_at: new_entry.created_at.clone(),
            })
        })
    }

    fn update_entry_data(&self, entry_id: &str, data: &EntryData) -> Result<bool, ServiceError> {
        let updated_at = now_iso8601();
        self.with_connection(|connection| {
            db::update_entry_data(connection, entry_id, data, &updated_at)
        })
    }

    fn remove_entry(&self, entry_id: &str) -> Result<bool, ServiceError> {
        self.with_connection(|connection| db::remove_entry(connection, entry_id))
    }
}

pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::adapters::db::DbError;
    use crate::domain::models::{CardRfid, ChargerId, EntryData};
    use crate::test_support::open_test_connection;

    use super::{EntryStore, ServiceError, SqliteEntryStore};

    fn store(name: &str) -> SqliteEntryStore {
        SqliteEntryStore::new(Arc::new(Mutex::new(open_test_connection(name))))
    }

    fn data(charger_id: &str) -> EntryData {
        EntryData {
            email: "driver@example.com".to_string(),
            password: "secret".to_string(),
            card_rfid: CardRfid::new("04A2B3"),
            charger_id: ChargerId::new(charger_id),
        }
    }

    #[test]
    fn creates_entry_with_generated_id() {
        let store = store("store-create");

        let entry = store
            .create_entry("Shell Recharge Charger c-1", &data("c-1"))
            .expect("create should succeed");

        assert_eq!(entry.entry_id.len(), 36);
        assert_eq!(entry.version, 2);
        let loaded = store
            .get_entry(&entry.entry_id)
            .expect("query should succeed")
            .expect("entry should exist");
        assert_eq!(loaded, entry);
    }

    #[test]
    fn duplicate_charger_surfaces_as_database_error() {
        let store = store("store-duplicate");
        store
            .create_entry("first", &data("c-1"))
            .expect("first create should succeed");

        let result = store.create_entry("second", &data("c-1"));

        assert!(matches!(
            result,
            Err(ServiceError::Database(DbError::DuplicateUniqueId(_)))
        ));
    }

    #[test]
    fn finds_entry_by_charger() {
        let store = store("store-find");
        let created = store
            .create_entry("first", &data("c-9"))
            .expect("create should succeed");

        let found = store
            .find_by_charger(&ChargerId::new("c-9"))
            .expect("query should succeed");
        assert_eq!(found.map(|entry| entry.entry_id), Some(created.entry_id));
        assert_eq!(
            store
                .find_by_charger(&ChargerId::new("other"))
                .expect("query should succeed"),
            None
        );
    }
}
