mod common;

use dbpeek::{
    Database, OpenOptions, PagedCache, Result, Row, RowProvider, TableProvider, Value,
    MAX_PAGES_CACHED, PAGE_SIZE,
};
use tempfile::TempDir;

/// Passes through to a real provider and remembers every range asked for.
struct Counting<P> {
    inner: P,
    fetches: Vec<(usize, usize)>,
}

impl<P: RowProvider> RowProvider for Counting<P> {
    fn count(&mut self) -> Result<usize> {
        self.inner.count()
    }

    fn fetch_range(&mut self, start: usize, count: usize) -> Result<Vec<Row>> {
        self.fetches.push((start, count));
        self.inner.fetch_range(start, count)
    }
}

fn open_sample() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let path = common::sample_database(dir.path());
    let db = Database::open(&path, OpenOptions::default()).unwrap();
    (dir, db)
}

#[test]
fn browsing_a_table_fetches_each_page_once() {
    let (_dir, db) = open_sample();
    let provider = Counting {
        inner: TableProvider::new(&db, "people", None).unwrap(),
        fetches: Vec::new(),
    };
    let mut cache = PagedCache::new(provider);
    assert_eq!(cache.len().unwrap(), common::PEOPLE);

    let row = cache.get(99).unwrap();
    assert_eq!(row.get_by_name("id").unwrap(), Some(&Value::Int64(100)));
    cache.get(150).unwrap();
    let first = cache.get(0).unwrap();
    assert_eq!(first.ordinal(), 0);
    assert_eq!(
        first.get_by_name("name").unwrap(),
        Some(&Value::Text("person 001".into()))
    );

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 2));
    assert_eq!(cache.provider().fetches, vec![(0, PAGE_SIZE), (PAGE_SIZE, PAGE_SIZE)]);
}

#[test]
fn cached_rows_equal_single_row_fetches() {
    let (_dir, db) = open_sample();
    let mut direct = TableProvider::new(&db, "people", Some("people_city")).unwrap();
    let mut cache = PagedCache::new(TableProvider::new(&db, "people", Some("people_city")).unwrap());

    for n in [0, 1, 99, 100, 101, 173, 249] {
        let expected = direct.fetch_range(n, 1).unwrap().remove(0);
        let cached = cache.get(n).unwrap().clone();
        assert_eq!(cached, expected, "row {}", n);
        assert_eq!(cache.index_of(&cached), n);
    }
}

#[test]
fn nulls_stay_absent() {
    let (_dir, db) = open_sample();
    let mut cache = PagedCache::new(TableProvider::new(&db, "people", None).unwrap());
    // rowid 7 has no email
    let row = cache.get(6).unwrap();
    assert_eq!(row.get_by_name("email").unwrap(), None);
    assert_eq!(row.get_by_name("age").unwrap(), Some(&Value::Int32(27)));
}

#[test]
fn residency_is_bounded() {
    let dir = TempDir::new().unwrap();
    let path = common::fixture(dir.path(), "numbers.db");
    let db = Database::open(&path, OpenOptions::default()).unwrap();

    let mut cache = PagedCache::new(TableProvider::new(&db, "n", None).unwrap());
    let total = cache.len().unwrap();
    assert_eq!(total, (MAX_PAGES_CACHED + 2) * PAGE_SIZE);
    for i in (0..total).step_by(PAGE_SIZE / 2) {
        let row = cache.get(i).unwrap();
        assert_eq!(row.get(0).unwrap(), Some(&Value::Int64(i as i64)));
    }
    let resident = cache.resident_pages();
    assert_eq!(resident.len(), MAX_PAGES_CACHED);
    assert_eq!(resident[0], MAX_PAGES_CACHED + 1);
    assert!(!resident.contains(&0));
    assert!(!resident.contains(&1));
}

#[test]
fn unknown_index_is_rejected_up_front() {
    let (_dir, db) = open_sample();
    assert!(TableProvider::new(&db, "people", Some("missing")).is_err());
}
