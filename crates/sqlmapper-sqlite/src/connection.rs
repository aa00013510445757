//! SQLite connection implementation.
//!
//! This module provides safe wrappers around SQLite's C API and implements
//! the `Connection`, `Command` and `RowReader` traits from sqlmapper-core.
//!
//! A connection serializes access to its handle through a mutex. A live
//! [`SqliteReader`] owns the guard until it is dropped, so a second command
//! started meanwhile fails fast with [`ConnectionErrorKind::Busy`] instead of
//! deadlocking.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::result_large_err)] // Error type is defined in sqlmapper-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::ffi;
use crate::types;
use sqlmapper_core::{
    Command, Connection, DbParameter, Dialect, Error, Result, Row, RowReader,
    error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind},
    row::ColumnInfo,
};
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode.
    pub no_mutex: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    fn is_memory(&self) -> bool {
        self.path == ":memory:" || self.path.is_empty()
    }
}

/// Inner state of the SQLite connection, protected by a mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is only touched while holding the connection's Mutex,
// so it is never used from two threads at once.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// Parameters are bound by name: `@id` in the command text takes the
/// parameter named `id`, matched ignoring case. Placeholders without a
/// supplied parameter stay NULL.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
    identity: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db was allocated by open_v2 and must be closed
                unsafe {
                    let msg = ffi::last_error(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, ms);
            }
        }

        // Separate in-memory databases must never share cached query plans.
        let identity = if config.is_memory() {
            format!(
                "sqlite://:memory:#{}",
                NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed)
            )
        } else {
            format!("sqlite://{}", config.path)
        };
        tracing::debug!(identity = %identity, "Opened SQLite connection");

        Ok(Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
            identity,
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Take the handle, failing instead of blocking while a reader holds it.
    fn acquire(&self) -> Result<MutexGuard<'_, SqliteInner>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Busy,
                message: format!(
                    "{} is in use by an open reader; drop it before issuing another command",
                    self.identity
                ),
                source: None,
            })),
        }
    }

    /// Execute SQL directly without preparing (for DDL, etc.)
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.acquire()?;
        exec(inner.db, sql)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let inner = self.acquire()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(inner.db) })
    }

    /// Begin a transaction. It rolls back when dropped uncommitted.
    pub fn begin(&self) -> Result<SqliteTransaction<'_>> {
        let mut inner = self.acquire()?;
        if inner.in_transaction {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: None,
                message: "Already in a transaction".to_string(),
                source: None,
            }));
        }
        exec(inner.db, "BEGIN")?;
        inner.in_transaction = true;
        tracing::trace!(identity = %self.identity, "Began transaction");
        Ok(SqliteTransaction {
            conn: self,
            finished: false,
        })
    }

    /// Whether a transaction is open on this connection.
    pub fn in_transaction(&self) -> Result<bool> {
        Ok(self.acquire()?.in_transaction)
    }

    fn finish_transaction(&self, sql: &str) -> Result<()> {
        let mut inner = self.acquire()?;
        // The flag clears even if COMMIT fails: SQLite rolls back on error.
        inner.in_transaction = false;
        exec(inner.db, sql)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !inner.db.is_null() {
            // SAFETY: db is valid and no statement outlives the connection
            let rc = unsafe { ffi::sqlite3_close_v2(inner.db) };
            if rc != ffi::SQLITE_OK {
                tracing::warn!(rc, "sqlite3_close_v2 failed");
            }
            inner.db = ptr::null_mut();
        }
    }
}

/// A SQLite transaction.
///
/// Commands join it by passing it to `create_command`.
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    finished: bool,
}

impl SqliteTransaction<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.finish_transaction("COMMIT")
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.finish_transaction("ROLLBACK")
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Auto-rollback on drop if not committed
            if let Err(e) = self.conn.finish_transaction("ROLLBACK") {
                tracing::warn!(error = %e, "Rollback on drop failed");
            }
        }
    }
}

impl Connection for SqliteConnection {
    type Transaction<'t>
        = SqliteTransaction<'t>
    where
        Self: 't;

    type Command<'c>
        = SqliteCommand<'c>
    where
        Self: 'c;

    fn identity(&self) -> &str {
        &self.identity
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn create_command<'c>(
        &'c self,
        sql: &str,
        transaction: Option<&SqliteTransaction<'_>>,
    ) -> Result<SqliteCommand<'c>> {
        if let Some(tx) = transaction {
            if !ptr::eq(tx.conn, self) {
                return Err(Error::config(
                    "the transaction belongs to a different connection",
                ));
            }
        }
        Ok(SqliteCommand {
            conn: self,
            sql: sql.to_string(),
            parameters: Vec::new(),
        })
    }
}

/// A parameterized command on a [`SqliteConnection`].
///
/// The text may hold several statements separated by `;`. Each statement
/// that returns columns is one result grid.
#[derive(Debug)]
pub struct SqliteCommand<'c> {
    conn: &'c SqliteConnection,
    sql: String,
    parameters: Vec<DbParameter>,
}

impl<'c> Command for SqliteCommand<'c> {
    type Reader = SqliteReader<'c>;

    fn command_text(&self) -> &str {
        &self.sql
    }

    fn set_command_text(&mut self, sql: String) {
        self.sql = sql;
    }

    fn add_parameter(&mut self, parameter: DbParameter) {
        self.parameters.push(parameter);
    }

    fn parameters(&self) -> &[DbParameter] {
        &self.parameters
    }

    fn execute_reader(self) -> Result<SqliteReader<'c>> {
        let guard = self.conn.acquire()?;
        tracing::trace!(sql = %self.sql, parameters = self.parameters.len(), "Executing reader");
        let mut reader = SqliteReader::new(guard, self.sql, self.parameters)?;
        reader.advance()?;
        Ok(reader)
    }

    fn execute_non_query(self) -> Result<u64> {
        let guard = self.conn.acquire()?;
        tracing::trace!(sql = %self.sql, parameters = self.parameters.len(), "Executing non-query");
        let mut reader = SqliteReader::new(guard, self.sql, self.parameters)?;
        let before = reader.total_changes();
        while reader.advance()? {
            while reader.read()?.is_some() {}
        }
        let after = reader.total_changes();
        Ok(u64::try_from(after - before).unwrap_or(0))
    }
}

/// A forward-only cursor over the grids of a command.
///
/// Holds the connection until dropped.
pub struct SqliteReader<'c> {
    guard: MutexGuard<'c, SqliteInner>,
    text: String,
    sql: CString,
    /// Byte offset of the next unprepared statement.
    offset: usize,
    parameters: Vec<DbParameter>,
    stmt: *mut ffi::sqlite3_stmt,
    columns: Arc<ColumnInfo>,
    done: bool,
    failed: bool,
}

impl<'c> SqliteReader<'c> {
    fn new(
        guard: MutexGuard<'c, SqliteInner>,
        text: String,
        parameters: Vec<DbParameter>,
    ) -> Result<Self> {
        let sql = CString::new(text.as_str()).map_err(|_| {
            Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                sql: Some(text.clone()),
                message: "SQL contains null byte".to_string(),
                source: None,
            })
        })?;
        Ok(Self {
            guard,
            text,
            sql,
            offset: 0,
            parameters,
            stmt: ptr::null_mut(),
            columns: Arc::new(ColumnInfo::default()),
            done: true,
            failed: false,
        })
    }

    fn db(&self) -> *mut ffi::sqlite3 {
        self.guard.db
    }

    fn total_changes(&self) -> i64 {
        // SAFETY: db is valid while the guard is held
        unsafe { ffi::sqlite3_total_changes64(self.db()) }
    }

    fn finalize_current(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: stmt was prepared on this connection and not finalized
            unsafe {
                ffi::sqlite3_finalize(self.stmt);
            }
            self.stmt = ptr::null_mut();
        }
    }

    /// Prepare and bind the next statement. Returns `false` at the end.
    fn prepare_next(&mut self) -> Result<bool> {
        let len = self.sql.as_bytes().len();
        while self.offset < len {
            let base: *const c_char = self.sql.as_ptr();
            let remaining = c_int::try_from(len - self.offset).map_err(|_| {
                Error::Query(QueryError {
                    kind: QueryErrorKind::DataTruncation,
                    sql: Some(self.text.clone()),
                    message: "SQL text is too long".to_string(),
                    source: None,
                })
            })?;
            let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
            let mut tail: *const c_char = ptr::null();

            // SAFETY: base + offset stays inside the CString's buffer
            let rc = unsafe {
                ffi::sqlite3_prepare_v2(
                    self.db(),
                    base.add(self.offset),
                    remaining,
                    &mut stmt,
                    &mut tail,
                )
            };
            if rc != ffi::SQLITE_OK {
                self.failed = true;
                return Err(prepare_error(self.db(), &self.text));
            }

            self.offset = if tail.is_null() {
                len
            } else {
                // SAFETY: tail points into the same buffer as base
                usize::try_from(unsafe { tail.offset_from(base) }).unwrap_or(len)
            };

            // Whitespace or a comment compiles to no statement.
            if stmt.is_null() {
                continue;
            }
            self.stmt = stmt;
            // SAFETY: stmt was just prepared on this connection
            unsafe { bind_parameters(self.db(), stmt, &self.parameters, &self.text)? };
            tracing::trace!(offset = self.offset, "Prepared SQLite statement");
            return Ok(true);
        }
        Ok(false)
    }

    /// Move to the next statement that returns columns, running the
    /// statements before it.
    fn advance(&mut self) -> Result<bool> {
        self.finalize_current();
        self.done = true;
        while self.prepare_next()? {
            // SAFETY: stmt is a valid prepared statement
            let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
            if count > 0 {
                let names = (0..count)
                    .map(|i| {
                        // SAFETY: i is a valid column index
                        unsafe { types::column_name(self.stmt, i) }
                            .unwrap_or_else(|| format!("column{}", i))
                    })
                    .collect();
                self.columns = Arc::new(ColumnInfo::new(names));
                self.done = false;
                return Ok(true);
            }
            // SAFETY: stmt is a valid prepared statement
            loop {
                match unsafe { ffi::sqlite3_step(self.stmt) } {
                    ffi::SQLITE_ROW => continue,
                    ffi::SQLITE_DONE => break,
                    _ => {
                        self.failed = true;
                        return Err(step_error(self.db(), &self.text));
                    }
                }
            }
            self.finalize_current();
        }
        self.columns = Arc::new(ColumnInfo::default());
        Ok(false)
    }
}

impl std::fmt::Debug for SqliteReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteReader")
            .field("sql", &self.text)
            .field("offset", &self.offset)
            .field("columns", &self.columns)
            .field("done", &self.done)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl RowReader for SqliteReader<'_> {
    fn columns(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    fn read(&mut self) -> Result<Option<Row>> {
        if self.stmt.is_null() || self.done {
            return Ok(None);
        }
        // SAFETY: stmt is a valid prepared statement
        match unsafe { ffi::sqlite3_step(self.stmt) } {
            ffi::SQLITE_ROW => {
                let count = c_int::try_from(self.columns.len()).unwrap_or(c_int::MAX);
                let values = (0..count)
                    // SAFETY: the statement has a current row
                    .map(|i| unsafe { types::read_column(self.stmt, i) })
                    .collect();
                Ok(Some(Row::with_columns(Arc::clone(&self.columns), values)))
            }
            ffi::SQLITE_DONE => {
                self.done = true;
                Ok(None)
            }
            _ => {
                self.done = true;
                self.failed = true;
                Err(step_error(self.db(), &self.text))
            }
        }
    }

    fn next_result(&mut self) -> Result<bool> {
        self.advance()
    }
}

impl Drop for SqliteReader<'_> {
    fn drop(&mut self) {
        if self.stmt.is_null() {
            return;
        }
        // SAFETY: stmt was prepared on this connection and not finalized
        let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
        self.stmt = ptr::null_mut();
        if rc != ffi::SQLITE_OK && !self.failed {
            tracing::warn!(rc, error = ffi::error_string(rc), "sqlite3_finalize failed");
        }
    }
}

/// Bind every named parameter of `stmt` that has a supplied value.
///
/// # Safety
/// `stmt` must be a valid statement prepared on `db`.
unsafe fn bind_parameters(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    parameters: &[DbParameter],
    sql: &str,
) -> Result<()> {
    // SAFETY: the caller guarantees stmt
    let count = unsafe { ffi::sqlite3_bind_parameter_count(stmt) };
    for index in 1..=count {
        // SAFETY: index is within 1..=count
        let Some(name) = (unsafe { types::parameter_name(stmt, index) }) else {
            continue;
        };
        let Some(parameter) = parameters
            .iter()
            .find(|p| p.name == name)
            .or_else(|| parameters.iter().find(|p| p.name.eq_ignore_ascii_case(&name)))
        else {
            tracing::trace!(parameter = %name, "No value supplied, leaving NULL");
            continue;
        };
        // SAFETY: index is within 1..=count
        let rc = unsafe { types::bind_value(stmt, index, &parameter.value) };
        if rc != ffi::SQLITE_OK {
            return Err(bind_error(db, sql, &name, rc));
        }
    }
    Ok(())
}

fn exec(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    let c_sql = CString::new(sql).map_err(|_| {
        Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some(sql.to_string()),
            message: "SQL contains null byte".to_string(),
            source: None,
        })
    })?;

    let mut errmsg: *mut c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

    if rc != ffi::SQLITE_OK {
        let msg = if errmsg.is_null() {
            ffi::error_string(rc).to_string()
        } else {
            // SAFETY: errmsg was allocated by SQLite and is freed here
            unsafe {
                let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                ffi::sqlite3_free(errmsg.cast());
                msg
            }
        };

        return Err(Error::Query(QueryError {
            kind: error_code_to_kind(rc, &msg),
            sql: Some(sql.to_string()),
            message: msg,
            source: None,
        }));
    }

    Ok(())
}

fn prepare_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (ffi::last_error(db), ffi::sqlite3_errcode(db)) };
    Error::Query(QueryError {
        kind: error_code_to_kind(code, &msg),
        sql: Some(sql.to_string()),
        message: msg,
        source: None,
    })
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, name: &str, rc: c_int) -> Error {
    let msg = if rc == ffi::SQLITE_MISUSE {
        "lists must be expanded before binding".to_string()
    } else {
        // SAFETY: db is valid
        unsafe { ffi::last_error(db) }
    };
    Error::Query(QueryError {
        kind: QueryErrorKind::Binding,
        sql: Some(sql.to_string()),
        message: format!("Failed to bind parameter @{}: {}", name, msg),
        source: None,
    })
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    prepare_error(db, sql)
}

fn error_code_to_kind(code: c_int, message: &str) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG | ffi::SQLITE_RANGE => QueryErrorKind::DataTruncation,
        _ if message.contains("syntax error") => QueryErrorKind::Syntax,
        _ if message.starts_with("no such") => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    }
}
