//! Type encoding and decoding between Rust and SQLite.
//!
//! SQLite has a simple type system with 5 storage classes:
//! - INTEGER: Signed integer (1, 2, 3, 4, 6, or 8 bytes)
//! - REAL: 8-byte IEEE floating point
//! - TEXT: UTF-8 or UTF-16 string
//! - BLOB: Binary data
//! - NULL: The NULL value
//!
//! We map these to/from sqlmapper-core's Value type. Types SQLite has no
//! storage class for travel as text (decimals, timestamps) or as a blob
//! (UUIDs).

use crate::ffi;
use sqlmapper_core::Value;
use std::ffi::{CStr, c_int};

/// Bind a Value to a prepared statement parameter.
///
/// Returns the SQLite result code of the bind call.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: the caller guarantees `stmt` and `index`; SQLITE_TRANSIENT
    // makes SQLite copy text and blob buffers before returning
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),

            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, if *b { 1 } else { 0 }),

            Value::Byte(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),

            Value::SmallInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),

            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),

            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),

            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),

            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),

            // Decimal stored as text to keep its scale
            Value::Decimal(d) => bind_text(stmt, index, &d.to_string()),

            Value::Text(s) => bind_text(stmt, index, s),

            Value::Bytes(b) => bind_blob(stmt, index, b),

            // UUID stored as 16-byte blob
            Value::Uuid(u) => bind_blob(stmt, index, u.as_bytes()),

            // Timestamps stored as ISO-8601 text
            Value::DateTime(dt) => {
                bind_text(stmt, index, &dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }

            Value::DateTimeOffset(dt) => bind_text(stmt, index, &dt.to_rfc3339()),

            // Lists are expanded into one parameter per item before they
            // reach the driver.
            Value::Array(_) => ffi::SQLITE_MISUSE,
        }
    }
}

unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    let Ok(len) = c_int::try_from(text.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: the pointer/length pair describes `text`, copied by SQLite
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            text.as_ptr().cast(),
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

unsafe fn bind_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int, bytes: &[u8]) -> c_int {
    let Ok(len) = c_int::try_from(bytes.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: the pointer/length pair describes `bytes`, copied by SQLite
    unsafe {
        ffi::sqlite3_bind_blob(
            stmt,
            index,
            bytes.as_ptr().cast(),
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Read a column value from a result row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: the caller guarantees a current row; buffers are copied out
    // before the next step invalidates them
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_NULL => Value::Null,

            ffi::SQLITE_INTEGER => {
                let v = ffi::sqlite3_column_int64(stmt, index);
                // Choose the smallest representation
                match i32::try_from(v) {
                    Ok(small) => Value::Int(small),
                    Err(_) => Value::BigInt(v),
                }
            }

            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),

            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Text(String::new())
                } else {
                    let len = usize::try_from(len).unwrap_or(0);
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len);
                    Value::Text(String::from_utf8_lossy(slice).into_owned())
                }
            }

            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len <= 0 {
                    Value::Bytes(Vec::new())
                } else {
                    let len = usize::try_from(len).unwrap_or(0);
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len);
                    Value::Bytes(slice.to_vec())
                }
            }

            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: the name pointer stays valid until the statement is finalized
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}

/// Name of a statement parameter without its sigil (`@id` gives `id`).
///
/// Positional `?` parameters have no name and return `None`.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 1-based parameter index
pub unsafe fn parameter_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: the name pointer stays valid until the statement is finalized
    let name = unsafe {
        let ptr = ffi::sqlite3_bind_parameter_name(stmt, index);
        if ptr.is_null() {
            return None;
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    };
    Some(name.trim_start_matches(['@', ':', '$']).to_string())
}

#[cfg(test)]
mod tests {
    use crate::SqliteConnection;
    use chrono::NaiveDate;
    use sqlmapper_core::{Command, Connection, DbParameter, DbType, RowReader, Value};

    fn select_one(conn: &SqliteConnection, value: Value) -> Value {
        let mut cmd = conn.create_command("SELECT @v", None).unwrap();
        let db_type = value.db_type().unwrap_or(DbType::String);
        cmd.add_parameter(DbParameter::new("v", value, db_type));
        let mut reader = cmd.execute_reader().unwrap();
        let row = reader.read().unwrap().unwrap();
        row.get(0).cloned().unwrap()
    }

    #[test]
    fn test_integer_storage() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(select_one(&conn, Value::Bool(true)), Value::Int(1));
        assert_eq!(select_one(&conn, Value::Byte(7)), Value::Int(7));
        assert_eq!(select_one(&conn, Value::BigInt(1 << 40)), Value::BigInt(1 << 40));
    }

    #[test]
    fn test_text_storage() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(
            select_one(&conn, Value::Decimal("12.50".parse().unwrap())),
            Value::Text("12.50".to_string())
        );
        let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(13, 5, 0)
            .unwrap();
        assert_eq!(
            select_one(&conn, Value::DateTime(dt)),
            Value::Text("2024-02-29 13:05:00".to_string())
        );
    }

    #[test]
    fn test_uuid_is_a_blob() {
        let conn = SqliteConnection::open_memory().unwrap();
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            select_one(&conn, Value::Uuid(id)),
            Value::Bytes(id.as_bytes().to_vec())
        );
    }

    #[test]
    fn test_null_and_empty_blob() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(select_one(&conn, Value::Null), Value::Null);
        assert_eq!(select_one(&conn, Value::Bytes(Vec::new())), Value::Bytes(Vec::new()));
    }
}
