//! Fixture databases built by the sqlite3 shell from the scripts next to
//! them in `tests/data/`. Each test works on its own copy so journal files
//! and truncation never touch the originals.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const PAGE_SIZE: usize = 1024;
pub const PEOPLE: usize = 250;
pub const CITIES: [&str; 5] = ["Oslo", "Lima", "Kyiv", "Pune", "Bern"];
pub const TABLES: [&str; 7] = ["people", "notes", "empty", "order items", "kv", "pairs", "plain"];

/// Root pages of every table and index come first in `sample.db`, data
/// pages after them.
pub const SAMPLE_ROOT_PAGES: u64 = 12;

pub fn fixture(dir: &Path, name: &str) -> PathBuf {
    let source = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name);
    let target = dir.join(name);
    fs::copy(&source, &target).expect("copy fixture database");
    target
}

/// `people` (email NULL on every 7th row, partial index on email, index on
/// city), `notes` with overflow payloads and an automatic index, an empty
/// table, a quoted table name, two WITHOUT ROWID tables and `plain` with
/// untyped columns and a column added after its first rows.
pub fn sample_database(dir: &Path) -> PathBuf {
    fixture(dir, "sample.db")
}

pub fn person_email(id: usize) -> Option<String> {
    (id % 7 != 0).then(|| format!("user{:03}@example.com", 1000 - id))
}

pub fn long_text() -> String {
    (0..600).map(|i| format!("line {} ", i)).collect()
}

pub fn emails_with_values() -> usize {
    (1..=PEOPLE).filter(|&id| person_email(id).is_some()).count()
}
