//! SQLite driver for sqlmapper.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the connection boundary of `sqlmapper-core`
//! (`Connection`, `Command`, `RowReader`) over libsqlite3, linked through
//! `libsqlite3-sys` with the bundled amalgamation.
//!
//! # Features
//!
//! - `@name` parameters bound by name, ignoring case
//! - Multi-statement commands, one result grid per row-returning statement
//! - Transactions that roll back when dropped uncommitted
//! - In-memory and file-based databases
//! - Configurable open flags and busy timeout
//!
//! # Example
//!
//! ```rust
//! use sqlmapper_core::{Command, Connection, RowReader};
//! use sqlmapper_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory().unwrap();
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
//! conn.execute_raw("INSERT INTO users (name) VALUES ('Alice')").unwrap();
//!
//! let mut reader = conn
//!     .create_command("SELECT name FROM users", None)
//!     .unwrap()
//!     .execute_reader()
//!     .unwrap();
//! let row = reader.read().unwrap().unwrap();
//! assert_eq!(row.get_named::<String>("name").unwrap(), "Alice");
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `u8`, `i16`, `i32`, `i64` | INTEGER |
//! | `f32`, `f64` | REAL |
//! | `Decimal` | TEXT |
//! | `String`, `char` | TEXT |
//! | `Vec<u8>` | BLOB |
//! | `Option<T>` | NULL or T |
//! | `NaiveDateTime`, `DateTime<FixedOffset>` | TEXT (ISO-8601) |
//! | `Uuid` | BLOB (16 bytes) |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is both `Send` and `Sync`, using internal mutex
//! synchronization to protect the underlying SQLite handle. A reader holds
//! the handle until it is dropped.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{
    OpenFlags, SqliteCommand, SqliteConfig, SqliteConnection, SqliteReader, SqliteTransaction,
};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
    }

    #[test]
    fn test_sqlite_version_number() {
        let num = sqlite_version_number();
        assert!(
            num >= 3_000_000,
            "Expected SQLite 3.x.x (>= 3000000), got {}",
            num
        );
    }
}
