//! SQLite implementation of the commit store.
//!
//! Uses rusqlite with bundled SQLite; every query runs on
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use lexsync_core::{
    ChangeRecord, ClientId, Commit, CommitId, CommitMetadata, HybridTimestamp, SyncState,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::CommitStore;

const COMMIT_COLUMNS: &str =
    "id, client_id, wall_clock, counter, hash, parent_hash, change_records, sync_date";

/// Milliseconds then the nanosecond remainder, so every representable
/// wall clock keeps its own position in the log.
const LOG_ORDER: &str = "ORDER BY wall_millis, wall_submillis, counter, id";

/// SQLite-backed commit store.
///
/// Thread-safe via an internal mutex around a single connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {e}")))?
    }
}

fn conversion<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn row_to_commit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Commit> {
    let id: String = row.get(0)?;
    let client_id: String = row.get(1)?;
    let wall_clock: String = row.get(2)?;
    let counter: i64 = row.get(3)?;
    let hash: String = row.get(4)?;
    let parent_hash: String = row.get(5)?;
    let records: String = row.get(6)?;
    let sync_date: Option<String> = row.get(7)?;

    let wall_clock = DateTime::parse_from_rfc3339(&wall_clock)
        .map_err(|e| conversion(2, e))?
        .with_timezone(&Utc);
    let change_records: Vec<ChangeRecord> =
        serde_json::from_str(&records).map_err(|e| conversion(6, e))?;
    let sync_date = sync_date
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| conversion(7, e))?;

    Ok(Commit::from_stored(
        CommitId::from_str(&id).map_err(|e| conversion(0, e))?,
        ClientId::from_str(&client_id).map_err(|e| conversion(1, e))?,
        HybridTimestamp::new(wall_clock, counter),
        hash,
        parent_hash,
        change_records,
        CommitMetadata { sync_date },
    ))
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn query_commits(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Commit>> {
    let sql = format!("SELECT {COMMIT_COLUMNS} FROM commits {filter} {LOG_ORDER}");
    let mut stmt = conn.prepare(&sql)?;
    let commits = stmt
        .query_map(params, row_to_commit)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(commits)
}

#[async_trait]
impl CommitStore for SqliteStore {
    async fn add_commits(&self, commits: &[Commit]) -> Result<usize> {
        let commits = commits.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut added = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO commits (
                        id, client_id, wall_clock, wall_millis, wall_submillis, counter,
                        hash, parent_hash, change_records, sync_date
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for commit in &commits {
                    let wall = commit.timestamp.wall_clock;
                    added += stmt.execute(params![
                        commit.id.to_string(),
                        commit.client_id.to_string(),
                        format_time(&wall),
                        commit.timestamp.wall_millis(),
                        wall.timestamp_subsec_nanos() % 1_000_000,
                        commit.timestamp.counter,
                        commit.hash(),
                        commit.parent_hash(),
                        serde_json::to_string(&commit.change_records)?,
                        commit.sync_date().as_ref().map(format_time),
                    ])?;
                }
            }
            tx.commit()?;
            tracing::debug!(added, offered = commits.len(), "stored commits");
            Ok(added)
        })
        .await
    }

    async fn get_commit(&self, id: &CommitId) -> Result<Option<Commit>> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE id = ?1"),
                params![id],
                row_to_commit,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn has_commit(&self, id: &CommitId) -> Result<bool> {
        let id = id.to_string();
        self.run(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM commits WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn current_commits(&self) -> Result<Vec<Commit>> {
        self.run(|conn| query_commits(conn, "", [])).await
    }

    async fn commits_by_client(&self, client: &ClientId) -> Result<Vec<Commit>> {
        let client = client.to_string();
        self.run(move |conn| query_commits(conn, "WHERE client_id = ?1", params![client]))
            .await
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Commit>> {
        let hash = hash.to_string();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE hash = ?1"),
                params![hash],
                row_to_commit,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn latest_commit(&self) -> Result<Option<Commit>> {
        self.run(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {COMMIT_COLUMNS} FROM commits
                     ORDER BY wall_millis DESC, wall_submillis DESC, counter DESC, id DESC LIMIT 1"
                ),
                [],
                row_to_commit,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_hashes(&self, commits: &[Commit]) -> Result<()> {
        let links: Vec<(String, String, String)> = commits
            .iter()
            .map(|c| (c.id.to_string(), c.hash().to_string(), c.parent_hash().to_string()))
            .collect();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("UPDATE commits SET hash = ?2, parent_hash = ?3 WHERE id = ?1")?;
                for (id, hash, parent_hash) in &links {
                    stmt.execute(params![id, hash, parent_hash])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn set_sync_date(&self, ids: &[CommitId], date: Option<DateTime<Utc>>) -> Result<()> {
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let date = date.as_ref().map(format_time);
        self.run(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("UPDATE commits SET sync_date = ?2 WHERE id = ?1")?;
                for id in &ids {
                    stmt.execute(params![id, date])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn unsynced_commits(&self) -> Result<Vec<Commit>> {
        self.run(|conn| query_commits(conn, "WHERE sync_date IS NULL", []))
            .await
    }

    async fn get_sync_state(&self) -> Result<SyncState> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT client_id, MAX(wall_millis) FROM commits GROUP BY client_id")?;
            let rows = stmt
                .query_map([], |row| {
                    let client: String = row.get(0)?;
                    let millis: i64 = row.get(1)?;
                    let client = ClientId::from_str(&client).map_err(|e| conversion(0, e))?;
                    Ok((client, millis))
                })?
                .collect::<rusqlite::Result<SyncState>>()?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lexsync_core::change::CreateEntryChange;
    use lexsync_core::{link_chain, Change, EntityId};

    fn commit(client: ClientId, millis: i64) -> Commit {
        Commit::new(client, HybridTimestamp::from_millis(millis, 0)).with_change(
            Change::CreateEntry(CreateEntryChange::new(EntityId::new_v4()).with_lexeme_form("en", "tree")),
        )
    }

    #[tokio::test]
    async fn test_round_trip_commit() {
        let store = SqliteStore::open_memory().unwrap();
        let mut c = commit(ClientId::new_v4(), 1_234);
        c.timestamp.wall_clock += Duration::nanoseconds(789);
        c.set_sync_date(Some(Utc::now()));

        store.add_commits(&[c.clone()]).await.unwrap();
        let back = store.get_commit(&c.id).await.unwrap().unwrap();
        assert_eq!(back, c);
    }

    #[tokio::test]
    async fn test_duplicate_insert_ignored() {
        let store = SqliteStore::open_memory().unwrap();
        let c = commit(ClientId::new_v4(), 1);

        assert_eq!(store.add_commits(&[c.clone(), c.clone()]).await.unwrap(), 1);
        assert_eq!(store.add_commits(&[c]).await.unwrap(), 0);
        assert_eq!(store.current_commits().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_log_order_breaks_ties_on_counter() {
        let store = SqliteStore::open_memory().unwrap();
        let client = ClientId::new_v4();
        let second = Commit::new(client, HybridTimestamp::from_millis(10, 1));
        let first = Commit::new(client, HybridTimestamp::from_millis(10, 0));
        let third = Commit::new(client, HybridTimestamp::from_millis(11, 0));
        store
            .add_commits(&[third.clone(), second.clone(), first.clone()])
            .await
            .unwrap();

        let ids: Vec<_> = store
            .current_commits()
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert_eq!(store.latest_commit().await.unwrap().unwrap().id, third.id);
    }

    #[tokio::test]
    async fn test_log_order_spans_distant_dates() {
        let store = SqliteStore::open_memory().unwrap();
        let client = ClientId::new_v4();
        let at = |rfc: &str| {
            let wall = DateTime::parse_from_rfc3339(rfc).unwrap().with_timezone(&Utc);
            Commit::new(client, HybridTimestamp::new(wall, 0))
        };
        // Outside the range a signed nanosecond count can hold.
        let mut commits = vec![
            at("2400-01-01T00:00:00.000000002Z"),
            at("1600-06-01T00:00:00Z"),
            at("2400-01-01T00:00:00.000000001Z"),
            at("2300-01-01T00:00:00Z"),
            at("1970-01-01T00:00:00Z"),
            at("1500-01-01T00:00:00.5Z"),
        ];
        store.add_commits(&commits).await.unwrap();
        lexsync_core::sort_commits(&mut commits);

        let stored: Vec<_> = store
            .current_commits()
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        let expected: Vec<_> = commits.iter().map(|c| c.id).collect();
        assert_eq!(stored, expected);
        assert_eq!(
            store.latest_commit().await.unwrap().unwrap().id,
            commits[commits.len() - 1].id
        );
    }

    #[tokio::test]
    async fn test_sync_state_from_sql() {
        let store = SqliteStore::open_memory().unwrap();
        let a = ClientId::new_v4();
        let b = ClientId::new_v4();
        store
            .add_commits(&[commit(a, 100), commit(a, 40), commit(b, 200)])
            .await
            .unwrap();

        let state = store.get_sync_state().await.unwrap();
        assert_eq!(state, SyncState::from_iter([(a, 100), (b, 200)]));
        assert_eq!(store.commits_by_client(&a).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hashes_and_sync_dates_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexsync.db");
        let client = ClientId::new_v4();
        let mut commits = vec![commit(client, 1), commit(client, 2)];

        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_commits(&commits).await.unwrap();
            link_chain(&mut commits, "").unwrap();
            store.update_hashes(&commits).await.unwrap();
            store
                .set_sync_date(&[commits[0].id], Some(Utc::now()))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let stored = store.current_commits().await.unwrap();
        lexsync_core::validate_commits(&stored).unwrap();
        assert_eq!(stored[1].hash(), commits[1].hash());

        let pending = store.unsynced_commits().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, commits[1].id);
        assert!(store.find_by_hash(commits[0].hash()).await.unwrap().is_some());
    }
}
