//! The program store: the persistent SQLite catalog database plus the process-wide ancillary
//! state (options, feed ETags and the known game build map).

pub mod catalog;
pub mod models;
pub mod option;

use crate::{error::StoreError, util, util::ext::PathExt};
pub use catalog::Catalog;
use log::*;
use models::{EtagEntry, GameBuild};
use rusqlite::{Connection, OptionalExtension, NO_PARAMS};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use tokio::task;

include!(concat!(env!("OUT_DIR"), "/store_consts.rs"));

/// The special value interpreted as using an in-memory SQLite database.
pub(crate) const MEMORY_STORE: &str = "_memory";
/// The maximum permissions the store database file can have (600: `rw-------`)
const MAX_STORE_FILE_PERMISSIONS: u32 = 0o600;
/// Clears the game build map before it's replaced with a feed's build map.
const DELETE_GAME_BUILDS: &str = "DELETE FROM game_builds";

/// Provides access to the program store and the catalog within. New instances are created with a
/// [`Builder`](Builder).
pub struct Store {
    /// The connection to the SQLite database file.
    conn: Arc<Mutex<Connection>>,
    /// The module catalog.
    pub catalog: Catalog,
}

/// Builds new [`Store`](Store) instances.
pub struct Builder<P>
where
    P: AsRef<Path>,
{
    /// The SQL schema to use for the SQLite database.
    schema: String,
    /// An optional pre-calculated checksum for the SQL schema.
    schema_checksum: Option<String>,
    /// Location for the store database. Either a filesystem path, or in-memory.
    store_location: StoreLocation<P>,
    /// Should the schema checksum not be stored as an option in the program store.
    skip_storing_checksum: bool,
}

/// Specifies the location for the store database.
pub enum StoreLocation<P: AsRef<Path>> {
    /// Specifies an in-memory database.
    Memory,
    /// Specifies a filesystem path to save the database in.
    File(P),
}

impl<P> Builder<P>
where
    P: AsRef<Path>,
{
    /// Returns a new `Builder` with a given database location. The schema and its checksum are the
    /// defaults which are found in the constants `SCHEMA` and `SCHEMA_CHECKSUM`.
    pub fn from_location(store_location: StoreLocation<P>) -> Self {
        Self {
            schema: String::from(SCHEMA),
            schema_checksum: Some(String::from(SCHEMA_CHECKSUM)),
            store_location,
            skip_storing_checksum: false,
        }
    }

    /// Specifies a different schema. The pre-calculated schema checksum will be cleared and
    /// recalculated when finalising the builder.
    #[allow(dead_code)]
    pub fn with_schema(self, schema: &str) -> Self {
        Self {
            schema: String::from(schema),
            schema_checksum: None,
            ..self
        }
    }

    /// Specify whether to skip storing the schema checksum in the store options.
    #[allow(dead_code)]
    pub fn skip_storing_checksum(self, skip: bool) -> Self {
        Self {
            skip_storing_checksum: skip,
            ..self
        }
    }

    /// Finalise the builder and return a new `Store`.
    pub async fn build(self) -> anyhow::Result<Store> {
        let schema_checksum = if let Some(checksum) = self.schema_checksum {
            checksum
        } else {
            trace!("Missing schema checksum, calculating");
            util::checksum::blake2b_string(&self.schema)
        };
        trace!("Store database schema checksum: {}", schema_checksum);

        let (store_file_exists, conn) = match self.store_location {
            StoreLocation::Memory => {
                // when opening an in-memory database, it will initially be empty, i.e. it didn't
                // exist beforehand
                (false, Connection::open_in_memory()?)
            }
            StoreLocation::File(path) => (path.as_ref().exists(), open_file_connection(path)?),
        };

        // the child table cascades rely on foreign keys, which SQLite doesn't enforce unless told
        // to per-connection
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let conn = Arc::new(Mutex::new(conn));

        let catalog = Catalog {
            conn: Arc::clone(&conn),
        };
        let store = Store { conn, catalog };
        debug!("Store database exists: {}", store_file_exists);

        let checksums_match =
            store_file_exists && checksum_matches_meta(&store, &schema_checksum).await?;
        debug!("Schema checksums match: {}", checksums_match);

        if !checksums_match {
            apply_store_schema(&store, &self.schema).await?;

            if !self.skip_storing_checksum {
                store_schema_checksum(&store, &schema_checksum).await?;
            }
        }

        Ok(store)
    }
}

/// Opens an SQLite connection to a given file path. If the file exists, its permissions are checked
/// to ensure they meet `MAX_STORE_FILE_PERMISSIONS`. If the file doesn't exist, a new one will be
/// created and its permissions will be set to `MAX_STORE_FILE_PERMISSIONS`.
///
/// # Errors
/// Returns `StoreError::InsufficientFilePermissions` if the existing file's permissions aren't
/// sufficient.
fn open_file_connection<P>(path: P) -> anyhow::Result<Connection>
where
    P: AsRef<Path>,
{
    if path.as_ref().exists() {
        if util::file::ensure_permission(&path, MAX_STORE_FILE_PERMISSIONS)? {
            Ok(Connection::open(path)?)
        } else {
            Err(StoreError::InsufficientFilePermissions {
                path: String::from(path.as_ref().get_str()?),
                maximum: MAX_STORE_FILE_PERMISSIONS,
                actual: util::file::get_permissions(&path)?,
            }
            .into())
        }
    } else {
        let conn = Connection::open(&path)?;
        util::file::set_permissions(&path, MAX_STORE_FILE_PERMISSIONS)?;
        Ok(conn)
    }
}

/// Applies a given SQL schema to a given `Store`.
async fn apply_store_schema(store: &Store, schema: &str) -> anyhow::Result<()> {
    trace!("Applying database schema...");
    trace!("{}", schema);

    store.apply_schema(schema).await?;
    Ok(())
}

/// Stores a given schema checksum to the program store's `SchemaChecksum` option, and the current
/// program version to the `AppVersion` option.
async fn store_schema_checksum(store: &Store, checksum: &str) -> anyhow::Result<()> {
    trace!("Storing schema checksum...");

    store
        .set_option(option::Value::new(
            option::Field::SchemaChecksum,
            Some(String::from(checksum)),
        ))
        .await?;
    store
        .set_option(option::Value::new(
            option::Field::AppVersion,
            Some(String::from(env!("CARGO_PKG_VERSION"))),
        ))
        .await?;
    Ok(())
}

impl<P> From<P> for StoreLocation<P>
where
    P: AsRef<Path>,
{
    fn from(p: P) -> Self {
        if p.as_ref().get_str().expect("failed to get path as str") == MEMORY_STORE {
            StoreLocation::Memory
        } else {
            StoreLocation::File(p)
        }
    }
}

/// Compares a given store schema checksum string to what a given store's metadata possibly
/// contains. Returns a `Result<bool>` corresponding to whether the store's existing schema checksum
/// matches the wanted one. Returns `Ok(false)` if the store doesn't contain the [schema checksum
/// field][Field]. Returns an error if reading the database options table fails.
///
/// [Field]: option::Field#variant.SchemaChecksum
async fn checksum_matches_meta(store: &Store, wanted_checksum: &str) -> anyhow::Result<bool> {
    if let Some(metavalue) = store.get_option(option::Field::SchemaChecksum).await? {
        if let Some(existing_checksum) = metavalue.value() {
            trace!("Got existing schema checksum: {}", existing_checksum);
            return Ok(wanted_checksum == existing_checksum);
        }
    }

    Ok(false)
}

/// Accepts a reference to an `Arc<Mutex<Connection>>` and a block where that reference can be used
/// to access the database connection. The block will run a blocking thread with
/// `task::spawn_blocking`. Returns what the given block returns. The `mut` form binds the locked
/// connection mutably so the block can open a transaction on it.
///
/// ```ignore
/// let conn = &self.conn;
/// sql!(conn => {
///     // use conn
/// })
/// ```
#[macro_export]
macro_rules! sql {
    ($conn:ident => $b:block) => {
        Ok({
            let _c = Arc::clone(&$conn);
            task::spawn_blocking(move || -> anyhow::Result<_> {
                let $conn = _c.lock().unwrap();
                $b
            })
            .await??
        })
    };
    (mut $conn:ident => $b:block) => {
        Ok({
            let _c = Arc::clone(&$conn);
            task::spawn_blocking(move || -> anyhow::Result<_> {
                let mut $conn = _c.lock().unwrap();
                $b
            })
            .await??
        })
    };
}

impl Store {
    /// Applies a given schema to the database.
    async fn apply_schema(&self, schema: &str) -> anyhow::Result<()> {
        let conn = Arc::clone(&self.conn);
        let schema = String::from(schema);
        let result = task::spawn_blocking(move || -> anyhow::Result<()> {
            conn.lock()
                .unwrap()
                .execute_batch(&format!("BEGIN TRANSACTION; {} COMMIT;", schema))?;
            Ok(())
        })
        .await?;

        Ok(result?)
    }

    /// Retrieves an option value from the option table with a given option field.
    pub async fn get_option(&self, field: option::Field) -> anyhow::Result<Option<option::Value>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(option::Value::select())?;

            Ok(stmt
                .query_row_named(&option::Value::select_params(&field), |row| {
                    Ok(row.into())
                })
                .optional()?)
        })
    }

    /// Stores an option value to the options table.
    pub async fn set_option(&self, value: option::Value) -> anyhow::Result<()> {
        let conn = &self.conn;
        sql!(conn => {
            conn.execute_named(option::Value::replace_into(), &value.all_params())?;
            Ok(())
        })
    }

    /// Retrieves the stored cache validator for a given feed URL.
    pub async fn get_etag(&self, url: String) -> anyhow::Result<Option<EtagEntry>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(EtagEntry::select())?;

            Ok(stmt
                .query_row_named(&EtagEntry::select_params(&url), |row| {
                    Ok(row.into())
                })
                .optional()?)
        })
    }

    /// Stores a cache validator for a feed URL, replacing any previous one.
    pub async fn set_etag(&self, etag: EtagEntry) -> anyhow::Result<()> {
        let conn = &self.conn;
        sql!(conn => {
            conn.execute_named(EtagEntry::replace_into(), &etag.all_params())?;
            Ok(())
        })
    }

    /// Replaces the known game build map with a given one.
    pub async fn set_game_builds(&self, builds: Vec<GameBuild>) -> anyhow::Result<()> {
        let conn = &self.conn;
        sql!(mut conn => {
            let tx = conn.transaction()?;
            tx.execute(DELETE_GAME_BUILDS, NO_PARAMS)?;

            {
                let mut stmt = tx.prepare(GameBuild::replace_into())?;
                for build in &builds {
                    stmt.execute_named(&build.all_params())?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Retrieves all known game builds.
    pub async fn get_game_builds(&self) -> anyhow::Result<Vec<GameBuild>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(GameBuild::select_all())?;
            let mut builds = Vec::new();

            for build in stmt.query_map(NO_PARAMS, |row| {
                Ok(row.into())
            })? {
                builds.push(build?);
            }

            Ok(builds)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    async fn get_test_store() -> Store {
        store::Builder::<String>::from_location(StoreLocation::Memory)
            .skip_storing_checksum(true)
            .build()
            .await
            .expect("failed to build test store")
    }

    #[tokio::test]
    async fn set_get_option() {
        let store = get_test_store().await;

        store
            .set_option(option::Value::new(
                option::Field::AppVersion,
                Some(String::from("value")),
            ))
            .await
            .expect("failed to set option value");

        let got_value = store
            .get_option(option::Field::AppVersion)
            .await
            .expect("failed to get option value")
            .expect("store returned no value");

        assert_eq!(got_value.value(), Some("value"));
    }

    #[tokio::test]
    async fn etag_roundtrip() {
        let store = get_test_store().await;
        let url = String::from("https://example.com/repository.json");

        assert!(store
            .get_etag(url.clone())
            .await
            .expect("failed to get etag")
            .is_none());

        store
            .set_etag(EtagEntry {
                url: url.clone(),
                etag: Some(String::from("\"deadbeef\"")),
            })
            .await
            .expect("failed to set etag");

        let got = store
            .get_etag(url)
            .await
            .expect("failed to get etag")
            .expect("store returned no etag");
        assert_eq!(got.etag.as_deref(), Some("\"deadbeef\""));
    }

    #[tokio::test]
    async fn game_builds_are_replaced_wholesale() {
        let store = get_test_store().await;

        store
            .set_game_builds(vec![
                GameBuild {
                    build_id: 2268,
                    version: "1.8.1".parse().unwrap(),
                },
                GameBuild {
                    build_id: 2788,
                    version: "1.10.1".parse().unwrap(),
                },
            ])
            .await
            .expect("failed to set game builds");

        store
            .set_game_builds(vec![GameBuild {
                build_id: 3140,
                version: "1.12.5".parse().unwrap(),
            }])
            .await
            .expect("failed to replace game builds");

        let builds = store
            .get_game_builds()
            .await
            .expect("failed to get game builds");
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].build_id, 3140);
    }
}
