//! Scalar SQL functions shared by every connection.

use crate::model::keys::{canonical_key, canonical_real};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

/// Registers `canonical_key(value)` so SQL joins compare keys with the same
/// rule as [`canonical_key`].
///
/// `NULL` stays `NULL`, integers render in plain decimal, text is trimmed and
/// integral text loses leading zeros.
pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "canonical_key",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let key = match ctx.get_raw(0) {
                ValueRef::Null => None,
                ValueRef::Integer(value) => Some(value.to_string()),
                ValueRef::Real(value) => Some(canonical_real(value)),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    Some(canonical_key(&String::from_utf8_lossy(bytes)))
                }
            };
            Ok(key)
        },
    )
}
