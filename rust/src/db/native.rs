/// Native platform SQLite implementation using rusqlite
///
/// The connection lives on a dedicated worker thread. The simulation thread
/// only ever touches the two channels, so a slow query can never stall a
/// tick; finished jobs wait in the result channel until the next poll.

use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};

use super::{CompletedJob, Database, DbError, QueryJob, QueryResult, Value};

/// Tables read by the spawn core
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS spawns (
        id INTEGER PRIMARY KEY,
        spawn_x REAL NOT NULL,
        spawn_z REAL NOT NULL,
        spawn_width INTEGER NOT NULL,
        spawn_length INTEGER NOT NULL,
        spawn_density INTEGER NOT NULL,
        spawn_planet INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS spawn_groups (
        id INTEGER PRIMARY KEY,
        spawn_id INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS faction (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS lair_templates (
        id INTEGER PRIMARY KEY,
        lair_object_string TEXT NOT NULL,
        stf_name TEXT NOT NULL,
        stf_file TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS lairs (
        id INTEGER PRIMARY KEY,
        creature_spawn_region INTEGER NOT NULL,
        lair_template INTEGER NOT NULL,
        creature_group INTEGER NOT NULL,
        family INTEGER NOT NULL,
        faction INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS creature_groups (
        creature_group_id INTEGER NOT NULL,
        creature_id INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS creatures (
        id INTEGER PRIMARY KEY,
        creature_species_id INTEGER NOT NULL,
        loot_group_id INTEGER NOT NULL,
        creature_posture INTEGER NOT NULL,
        creature_state INTEGER NOT NULL,
        creature_level INTEGER NOT NULL,
        creature_type TEXT NOT NULL,
        stf_variable_id TEXT NOT NULL,
        stf_file_id TEXT NOT NULL,
        creature_faction INTEGER NOT NULL,
        creature_moodID INTEGER NOT NULL,
        creature_scale REAL NOT NULL,
        creature_family INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS non_persistent_npcs (
        id INTEGER PRIMARY KEY,
        species_id INTEGER NOT NULL,
        loot_group_id INTEGER NOT NULL,
        posture INTEGER NOT NULL,
        state INTEGER NOT NULL,
        level INTEGER NOT NULL,
        type TEXT NOT NULL,
        stf_variable_id TEXT NOT NULL,
        stf_file_id TEXT NOT NULL,
        faction INTEGER NOT NULL,
        moodID INTEGER NOT NULL,
        scale REAL NOT NULL,
        family INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS attributes (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        internal INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS creature_attributes (
        creature_id INTEGER NOT NULL,
        attribute_id INTEGER NOT NULL,
        value TEXT NOT NULL,
        \"order\" INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS lair_attributes (
        lair_id INTEGER NOT NULL,
        attribute_id INTEGER NOT NULL,
        value TEXT NOT NULL,
        \"order\" INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS non_persistent_npc_attributes (
        npc_id INTEGER NOT NULL,
        attribute_id INTEGER NOT NULL,
        value TEXT NOT NULL,
        \"order\" INTEGER NOT NULL DEFAULT 0
    );
";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

pub struct SqliteDatabase {
    job_tx: Option<Sender<QueryJob>>,
    result_rx: Receiver<CompletedJob>,
    worker: Option<JoinHandle<()>>,
}

impl SqliteDatabase {
    /// Open (or create) the database and start its worker thread
    ///
    /// `None` opens an in-memory database.
    pub fn open(path: Option<&Path>) -> Result<Self, DbError> {
        let conn = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| DbError::OpenFailed(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| DbError::ExecuteFailed(e.to_string()))?;

        Self::start(conn)
    }

    /// Run setup statements (seeding, migrations) before the worker starts
    pub fn open_with(path: Option<&Path>, setup: &str) -> Result<Self, DbError> {
        let conn = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| DbError::OpenFailed(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .and_then(|_| conn.execute_batch(setup))
            .map_err(|e| DbError::ExecuteFailed(e.to_string()))?;

        Self::start(conn)
    }

    fn start(conn: Connection) -> Result<Self, DbError> {
        let (job_tx, job_rx) = unbounded::<QueryJob>();
        let (result_tx, result_rx) = unbounded::<CompletedJob>();

        let worker = thread::Builder::new()
            .name("db-worker".to_string())
            .spawn(move || {
                tracing::debug!("db worker thread started");
                // Exits once every sender is dropped.
                while let Ok(job) = job_rx.recv() {
                    let result = run_query(&conn, &job);
                    if let Err(e) = &result {
                        tracing::warn!(job = %job.id, error = %e, "query failed");
                    }
                    if result_tx.send(CompletedJob { id: job.id, result }).is_err() {
                        break;
                    }
                }
                tracing::debug!("db worker thread stopped");
            })
            .map_err(|e| DbError::OpenFailed(e.to_string()))?;

        tracing::info!("SqliteDatabase: worker started");
        Ok(Self {
            job_tx: Some(job_tx),
            result_rx,
            worker: Some(worker),
        })
    }
}

fn run_query(conn: &Connection, job: &QueryJob) -> Result<QueryResult, DbError> {
    let mut stmt = conn
        .prepare_cached(job.sql)
        .map_err(|e| DbError::QueryFailed(e.to_string()))?;
    let columns = stmt.column_count();

    let mut rows = stmt
        .query(rusqlite::params_from_iter(job.params.iter()))
        .map_err(|e| DbError::QueryFailed(e.to_string()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| DbError::QueryFailed(e.to_string()))? {
        let mut values = Vec::with_capacity(columns);
        for i in 0..columns {
            let value = row
                .get_ref(i)
                .map_err(|e| DbError::QueryFailed(e.to_string()))?;
            values.push(Value::from(value));
        }
        out.push(values);
    }

    Ok(QueryResult::new(out))
}

impl Database for SqliteDatabase {
    fn execute_async(&self, job: QueryJob) -> Result<(), DbError> {
        let tx = self.job_tx.as_ref().ok_or(DbError::WorkerGone)?;
        tx.send(job).map_err(|_| DbError::WorkerGone)
    }

    fn poll_completed(&self) -> Vec<CompletedJob> {
        self.result_rx.try_iter().collect()
    }
}

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        // Closing the job channel lets the worker fall out of its loop.
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for(db: &SqliteDatabase) -> CompletedJob {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(done) = db.poll_completed().into_iter().next() {
                return done;
            }
            assert!(Instant::now() < deadline, "query never completed");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_query_round_trips_through_worker() {
        let db = SqliteDatabase::open_with(
            None,
            "INSERT INTO spawns VALUES (1, 10.0, 20.0, 200, 200, 50, 5);
             INSERT INTO spawns VALUES (2, 0.0, 0.0, 100, 100, 50, 6);",
        )
        .unwrap();

        let job = QueryJob::new(
            "SELECT id, spawn_x, spawn_width FROM spawns WHERE spawn_planet = ?1",
            vec![Value::from(5u32)],
        );
        let id = job.id;
        db.execute_async(job).unwrap();

        let done = wait_for(&db);
        assert_eq!(done.id, id);
        let result = done.result.unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(
            result.rows()[0],
            vec![Value::Integer(1), Value::Real(10.0), Value::Integer(200)]
        );
    }

    #[test]
    fn test_bad_sql_comes_back_as_error() {
        let db = SqliteDatabase::open(None).unwrap();
        db.execute_async(QueryJob::new("SELECT nope FROM nowhere", vec![]))
            .unwrap();
        let done = wait_for(&db);
        assert!(matches!(done.result, Err(DbError::QueryFailed(_))));
    }
}
