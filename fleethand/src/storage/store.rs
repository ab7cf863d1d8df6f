//! Server state store backed by SQLite

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::FleetError;
use crate::roster::ServerRecord;

/// Default re-run delay for checkpoints, in seconds
pub const CHECKPOINT_DELAY_SECS: i64 = 3600;

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Identity and metadata row as listed by `list_all`
#[derive(Debug, Clone)]
pub struct ServerSummary {
    pub id: String,
    pub host: String,
    pub res: Map<String, Value>,
}

/// Persistent per-server state, one row per server id.
///
/// All flag and metadata access goes through a [`StateSession`] scoped to a
/// single server id, so there is no hidden "current server" context.
pub struct ServerStore {
    conn: Connection,
    clock: Clock,
}

impl ServerStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self, FleetError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, FleetError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS servers (
                id TEXT PRIMARY KEY,
                host TEXT NOT NULL,
                user TEXT NOT NULL,
                pass TEXT NOT NULL,
                port INTEGER NOT NULL,
                next_action TEXT NOT NULL DEFAULT '{}',
                description TEXT NOT NULL DEFAULT '',
                res TEXT NOT NULL DEFAULT '{}'
            );
            "#,
        )?;
        Ok(Self {
            conn,
            clock: Box::new(|| Utc::now().timestamp()),
        })
    }

    /// Replace the wall clock, used by tests to simulate time
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Begin a session scoped to one server id
    pub fn session<'a>(&'a self, server_id: &str) -> StateSession<'a> {
        StateSession {
            store: self,
            id: server_id.to_string(),
        }
    }

    /// All known servers with their metadata blobs
    pub fn list_all(&self) -> Result<Vec<ServerSummary>, FleetError> {
        let mut stmt = self.conn.prepare("SELECT id, host, res FROM servers")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, host, res) = row?;
            out.push(ServerSummary {
                id,
                host,
                res: parse_json_map(&res),
            });
        }
        Ok(out)
    }

    /// Total number of persisted servers
    pub fn count(&self) -> Result<u64, FleetError> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM servers", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// A short-lived view over one server's row. Cheap to construct; holds no
/// row state of its own.
pub struct StateSession<'a> {
    store: &'a ServerStore,
    id: String,
}

impl StateSession<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a row exists for this id
    pub fn exists(&self) -> Result<bool, FleetError> {
        let found = self
            .store
            .conn
            .query_row(
                "SELECT 1 FROM servers WHERE id = ?1",
                params![self.id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a new row seeded with the given auth fields, or update
    /// host/user/pass/port on an existing one. The id column is never part
    /// of the update payload.
    pub fn upsert_identity(&self, record: &ServerRecord) -> Result<(), FleetError> {
        if self.exists()? {
            self.store.conn.execute(
                "UPDATE servers SET host = ?1, user = ?2, pass = ?3, port = ?4 WHERE id = ?5",
                params![
                    record.host,
                    record.user,
                    record.pass.expose_secret(),
                    record.port,
                    self.id
                ],
            )?;
        } else {
            self.store.conn.execute(
                "INSERT INTO servers (id, host, user, pass, port, next_action, description, res)
                 VALUES (?1, ?2, ?3, ?4, ?5, '{}', '', '{}')",
                params![
                    self.id,
                    record.host,
                    record.user,
                    record.pass.expose_secret(),
                    record.port
                ],
            )?;
        }
        Ok(())
    }

    /// Stored connection identity, if any
    pub fn identity(&self) -> Result<Option<StoredIdentity>, FleetError> {
        let row = self
            .store
            .conn
            .query_row(
                "SELECT host, user, pass, port FROM servers WHERE id = ?1",
                params![self.id],
                |row| {
                    Ok(StoredIdentity {
                        host: row.get(0)?,
                        user: row.get(1)?,
                        pass: row.get(2)?,
                        port: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ------------------------- installed flags -------------------------

    /// Absence of the key means not installed, never an error.
    pub fn get_flag(&self, name: &str) -> Result<bool, FleetError> {
        let res = self.res_map()?;
        Ok(matches!(res.get(name), Some(Value::Bool(true))))
    }

    /// Idempotent, always sets true. There is no "uninstall" for most
    /// flags; administrative clears go through `delete_kv`.
    pub fn set_flag(&self, name: &str) -> Result<(), FleetError> {
        let mut res = self.res_map()?;
        res.insert(name.to_string(), Value::Bool(true));
        self.write_res_map(&res)
    }

    // ------------------------- free-form metadata -------------------------

    pub fn get_kv(&self, key: &str) -> Result<Option<Value>, FleetError> {
        let res = self.res_map()?;
        Ok(res.get(key).cloned())
    }

    /// Convenience accessor for string metadata, empty when absent
    pub fn get_kv_str(&self, key: &str) -> Result<String, FleetError> {
        Ok(self
            .get_kv(key)?
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    pub fn set_kv(&self, key: &str, value: Value) -> Result<(), FleetError> {
        let mut res = self.res_map()?;
        res.insert(key.to_string(), value);
        self.write_res_map(&res)
    }

    pub fn delete_kv(&self, key: &str) -> Result<(), FleetError> {
        let mut res = self.res_map()?;
        if res.remove(key).is_some() {
            self.write_res_map(&res)?;
        }
        Ok(())
    }

    // ------------------------- checkpoints -------------------------

    /// True if no next-action timestamp is recorded for `key`, or if the
    /// recorded timestamp has passed.
    pub fn checkpoint_ready(&self, key: &str) -> Result<bool, FleetError> {
        let next = self.next_action_map()?;
        match next.get(key).and_then(Value::as_i64) {
            Some(time_next) => Ok(self.store.now() > time_next),
            None => Ok(true),
        }
    }

    /// Record now + `delay_secs` as the earliest next run for `key`
    pub fn checkpoint_touch(&self, key: &str, delay_secs: i64) -> Result<(), FleetError> {
        let mut next = self.next_action_map()?;
        next.insert(
            key.to_string(),
            Value::from(self.store.now() + delay_secs),
        );
        self.store.conn.execute(
            "UPDATE servers SET next_action = ?1 WHERE id = ?2",
            params![Value::Object(next).to_string(), self.id],
        )?;
        Ok(())
    }

    // ------------------------- token cache -------------------------

    /// Cached access token, empty when absent or past its expiry
    pub fn access_token(&self) -> Result<String, FleetError> {
        if !self.exists()? {
            return Ok(String::new());
        }
        let res = self.res_map()?;
        let token = match res.get("access_token").and_then(Value::as_str) {
            Some(t) => t.to_string(),
            None => return Ok(String::new()),
        };
        let expires = res.get("expires_in").and_then(Value::as_i64).unwrap_or(0);
        if self.store.now() < expires {
            Ok(token)
        } else {
            Ok(String::new())
        }
    }

    pub fn store_access_token(&self, token: &str, expires_in: i64) -> Result<(), FleetError> {
        let mut res = self.res_map()?;
        res.insert("access_token".to_string(), Value::from(token));
        res.insert("expires_in".to_string(), Value::from(expires_in));
        self.write_res_map(&res)
    }

    /// Zero the expiry so the cached token is never returned again
    pub fn invalidate_token(&self) -> Result<(), FleetError> {
        let mut res = self.res_map()?;
        res.insert("expires_in".to_string(), Value::from(0));
        self.write_res_map(&res)
    }

    // ------------------------- internals -------------------------

    fn res_map(&self) -> Result<Map<String, Value>, FleetError> {
        let raw = self
            .store
            .conn
            .query_row(
                "SELECT res FROM servers WHERE id = ?1",
                params![self.id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw.map(|r| parse_json_map(&r)).unwrap_or_default())
    }

    fn write_res_map(&self, res: &Map<String, Value>) -> Result<(), FleetError> {
        let updated = self.store.conn.execute(
            "UPDATE servers SET res = ?1 WHERE id = ?2",
            params![Value::Object(res.clone()).to_string(), self.id],
        )?;
        if updated == 0 {
            return Err(FleetError::Store(format!(
                "no row for server id {}",
                self.id
            )));
        }
        Ok(())
    }

    fn next_action_map(&self) -> Result<Map<String, Value>, FleetError> {
        let raw = self
            .store
            .conn
            .query_row(
                "SELECT next_action FROM servers WHERE id = ?1",
                params![self.id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw.map(|r| parse_json_map(&r)).unwrap_or_default())
    }
}

/// Host/user/pass/port as stored for one server
#[derive(Debug, Clone)]
pub struct StoredIdentity {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub port: u16,
}

/// A missing or corrupt metadata blob reads as an empty map.
fn parse_json_map(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            if !raw.trim().is_empty() && raw.trim() != "{}" {
                warn!("discarding malformed metadata blob: {:?}", raw);
            }
            Map::new()
        }
    }
}
