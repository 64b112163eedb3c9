/// Database abstraction for the spawn core
///
/// Queries are fire-and-forget from the simulation thread's point of view:
/// `execute_async` hands a job to the backend and `poll_completed` returns
/// whatever finished since the last frame. Continuation state never leaves
/// the simulation thread; only the job id travels with the query.
///
/// - Native: `SqliteDatabase` runs rusqlite on a worker thread
/// - Tests/tooling: `MemoryDatabase` answers from a scripted responder

#[cfg(not(target_family = "wasm"))]
mod native;
mod memory;
pub mod schema;

#[cfg(not(target_family = "wasm"))]
pub use native::SqliteDatabase;
pub use memory::MemoryDatabase;

use thiserror::Error;
use ulid::Ulid;

/// Database error type
#[derive(Debug, Clone, Error)]
pub enum DbError {
    #[error("failed to open database: {0}")]
    OpenFailed(String),
    #[error("failed to execute SQL: {0}")]
    ExecuteFailed(String),
    #[error("failed to query database: {0}")]
    QueryFailed(String),
    #[error("column {column} missing for field `{field}`")]
    MissingColumn { field: &'static str, column: usize },
    #[error("column {column} for field `{field}` holds {found}, expected {expected}")]
    TypeMismatch {
        field: &'static str,
        column: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("database worker is gone")]
    WorkerGone,
}

/// One column value as delivered by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Row-major result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn first(&self) -> Option<&[Value]> {
        self.rows.first().map(Vec::as_slice)
    }
}

/// Correlates a submitted query with its pending continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Ulid);

impl JobId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A query submitted to the backend
#[derive(Debug, Clone)]
pub struct QueryJob {
    pub id: JobId,
    pub sql: &'static str,
    pub params: Vec<Value>,
}

impl QueryJob {
    pub fn new(sql: &'static str, params: Vec<Value>) -> Self {
        Self {
            id: JobId::new(),
            sql,
            params,
        }
    }
}

/// A finished query handed back to the simulation thread
#[derive(Debug)]
pub struct CompletedJob {
    pub id: JobId,
    pub result: Result<QueryResult, DbError>,
}

/// Asynchronous query executor
pub trait Database: Send + Sync {
    /// Submit a query; the result arrives through `poll_completed`
    fn execute_async(&self, job: QueryJob) -> Result<(), DbError>;

    /// Drain every job that finished since the last call (non-blocking)
    fn poll_completed(&self) -> Vec<CompletedJob>;
}
