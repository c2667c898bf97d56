mod common;

use std::fs;

use dbpeek::commands::{execute_on, Command};
use dbpeek::{Database, ExportDocument, OpenOptions};
use tempfile::TempDir;

fn open_sample() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let path = common::sample_database(dir.path());
    let db = Database::open(&path, OpenOptions::default()).unwrap();
    (dir, db)
}

fn run(db: &Database, command: Command) -> String {
    let mut out = Vec::new();
    execute_on(db, command, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn dump(selectors: &[&str], output: Option<std::path::PathBuf>) -> Command {
    Command::Dump {
        selectors: selectors.iter().map(|s| s.to_string()).collect(),
        output,
    }
}

#[test]
fn dumps_accumulate_in_one_file() {
    let (dir, db) = open_sample();
    let target = dir.path().join("dump.xml");

    run(&db, dump(&["notes"], Some(target.clone())));
    run(&db, dump(&["people/people_email"], Some(target.clone())));

    let document = ExportDocument::parse(&fs::read_to_string(&target).unwrap()).unwrap();
    let names: Vec<&str> = document.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["notes", "people"]);
    assert_eq!(document.tables[0].rows.len(), 3);
    assert_eq!(document.tables[1].row_count, common::emails_with_values());

    // the first exported row through the email index is the last person
    let first = &document.tables[1].rows[0];
    assert_eq!(first.columns[0].value.as_deref(), Some("250"));
}

#[test]
fn unreadable_destination_is_replaced() {
    let (dir, db) = open_sample();
    let target = dir.path().join("dump.xml");
    fs::write(&target, "this is not xml <<<").unwrap();

    run(&db, dump(&["empty"], Some(target.clone())));

    let written = fs::read_to_string(&target).unwrap();
    assert!(!written.contains("this is not xml"));
    let document = ExportDocument::parse(&written).unwrap();
    assert_eq!(document.tables.len(), 1);
    assert_eq!(document.tables[0].row_count, 0);
}

#[test]
fn dump_to_stdout_covers_every_table() {
    let (_dir, db) = open_sample();
    let xml = run(&db, dump(&[], None));
    let document = ExportDocument::parse(&xml).unwrap();
    let names: Vec<&str> = document.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, common::TABLES);

    // NULL email on rowid 7 is written without a Value attribute
    let seventh = &document.tables[0].rows[6];
    let email = seventh.columns.iter().find(|c| c.name == "email").unwrap();
    assert_eq!(email.value, None);
    assert!(xml.contains(r#"<Column Name="email"/>"#));
}

#[test]
fn dump_includes_without_rowid_tables() {
    let (_dir, db) = open_sample();
    let xml = run(&db, dump(&[], None));
    let document = ExportDocument::parse(&xml).unwrap();

    let kv = document.tables.iter().find(|t| t.name == "kv").unwrap();
    assert_eq!(kv.row_count, 3);
    let keys: Vec<Option<&str>> = kv.rows.iter().map(|r| r.columns[0].value.as_deref()).collect();
    assert_eq!(keys, vec![Some("alpha"), Some("beta"), Some("gamma")]);
    // v is a BLOB column: bytes are base64, text is kept as is
    assert_eq!(kv.rows[0].columns[1].value.as_deref(), Some("AP8="));
    assert_eq!(kv.rows[2].columns[1].value.as_deref(), Some("plain text"));

    let pairs = document.tables.iter().find(|t| t.name == "pairs").unwrap();
    let first: Vec<&str> = pairs.rows[0].columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(first, vec!["a", "b", "c"]);
    assert_eq!(pairs.rows[0].columns[0].value.as_deref(), Some("a0"));
}

#[test]
fn dump_by_index_of_without_rowid_table_fails() {
    let (_dir, db) = open_sample();
    let mut out = Vec::new();
    assert!(execute_on(&db, dump(&["pairs/pairs_b"], None), &mut out).is_err());
}

#[test]
fn bad_selector_is_an_error() {
    let (_dir, db) = open_sample();
    let mut out = Vec::new();
    assert!(execute_on(&db, dump(&["/people_city"], None), &mut out).is_err());
    assert!(execute_on(&db, dump(&["ghosts"], None), &mut out).is_err());
}

#[test]
fn lists_tables_and_rows() {
    let (_dir, db) = open_sample();

    let tables = run(&db, Command::Tables);
    assert_eq!(
        tables,
        "people\t250\nnotes\t3\nempty\t0\norder items\t2\nkv\t3\npairs\t3\nplain\t3\n"
    );

    let rows = run(
        &db,
        Command::Rows {
            selector: "people".into(),
            start: 5,
            count: 2,
        },
    );
    let lines: Vec<&str> = rows.lines().collect();
    assert_eq!(lines[0], "id\tname\temail\tcity\tage");
    assert_eq!(lines[1], "6\tperson 006\tuser994@example.com\tLima\t26");
    assert_eq!(lines[2], "7\tperson 007\tNULL\tKyiv\t27");
    assert_eq!(lines.len(), 3);
}

#[test]
fn describes_schema() {
    let (_dir, db) = open_sample();

    let info = run(&db, Command::Info);
    assert!(info.contains("database page size: 1024"));
    assert!(info.contains("number of tables: 7"));

    let columns = run(&db, Command::Columns { table: "people".into() });
    assert!(columns.contains("city\tVARCHAR(20)\tText(10)\tText"));

    let indexes = run(&db, Command::Indexes { table: "people".into() });
    assert!(indexes.starts_with("people_email\t(email)\tentries="));
    assert!(indexes.contains("partial"));
}
