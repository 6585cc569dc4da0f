//! Domain model for measurement-task resolution.
//!
//! # Responsibility
//! - `records`: raw reference-table rows as the store returns them.
//! - `views`: translated, deduplicated projections handed to callers.
//! - `keys` and `code_table`: the two pure rules every join and label
//!   depends on.

pub mod code_table;
pub mod keys;
pub mod records;
pub mod views;
