use super::sled_backend::like;
use super::*;
use crate::Error;
use crate::StorageError;

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn seeded() -> SledBackend {
    let backend = SledBackend::temporary().expect("open temporary db");
    backend
        .create_table("devs", &columns(&["devkey", "macaddr", "signal", "last_time"]))
        .unwrap();
    for (key, mac, signal, last_time) in [
        ("k1", "AA:BB:CC:00:00:01", -40, 300i64),
        ("k2", "AA:BB:CC:00:00:02", -70, 100),
        ("k3", "11:22:33:00:00:03", -55, 200),
    ] {
        backend
            .execute_insert(&insert(
                "devs",
                ["devkey", "macaddr", "signal", "last_time"],
                vec![key.into(), mac.into(), signal.into(), last_time.into()],
            ))
            .unwrap();
    }
    backend
}

fn keys(rows: Rows) -> Vec<String> {
    rows.map(|row| row.get::<String>(0).unwrap()).collect()
}

#[test]
fn select_all_in_insertion_order() {
    let backend = seeded();
    let rows = backend.prepare_select(&select("devs", ["devkey"])).unwrap();
    assert_eq!(keys(rows), vec!["k1", "k2", "k3"]);
}

#[test]
fn select_filters_orders_and_limits() {
    let backend = seeded();
    let rows = backend
        .prepare_select(
            &select("devs", ["devkey", "signal"])
                .filter(where_("signal", Op::Gt, -60))
                .order_by("last_time"),
        )
        .unwrap();
    assert_eq!(keys(rows), vec!["k3", "k1"]);

    let rows = backend
        .prepare_select(&select("devs", ["devkey"]).order_by_desc("last_time").limit(2))
        .unwrap();
    assert_eq!(keys(rows), vec!["k1", "k3"]);
}

#[test]
fn and_binds_tighter_than_or() {
    let backend = seeded();
    // k2 via the first group, k3 via the second
    let rows = backend
        .prepare_select(
            &select("devs", ["devkey"]).filter(
                where_("signal", Op::Lt, -60)
                    .and("last_time", Op::Le, 100i64)
                    .or("macaddr", Op::Like, "11:%"),
            ),
        )
        .unwrap();
    assert_eq!(keys(rows), vec!["k2", "k3"]);
}

#[test]
fn like_is_case_insensitive() {
    let backend = seeded();
    let rows = backend
        .prepare_select(&select("devs", ["devkey"]).filter(where_("macaddr", Op::Like, "aa:bb:cc:%")))
        .unwrap();
    assert_eq!(keys(rows), vec!["k1", "k2"]);
}

#[test]
fn like_wildcards() {
    assert!(like("kitchen", "k%n"));
    assert!(like("kitchen", "%TCH%"));
    assert!(like("abc", "a_c"));
    assert!(!like("abbc", "a_c"));
    assert!(like("", "%"));
    assert!(!like("abc", "ab"));
    assert!(like("a%c", "a%c"));
}

#[test]
fn select_star_and_typed_columns() {
    let backend = seeded();
    let mut rows = backend
        .prepare_select(&select("devs", ["*"]).filter(where_("devkey", Op::Eq, "k3")))
        .unwrap();
    assert_eq!(rows.columns(), columns(&["devkey", "macaddr", "signal", "last_time"]).as_slice());

    let row = rows.next().expect("one row");
    assert_eq!(row.get_named::<i32>("signal").unwrap(), -55);
    assert_eq!(row.get::<i64>(3).unwrap(), 200);
    assert!(matches!(
        row.get::<i64>(9),
        Err(Error::Storage(StorageError::ColumnOutOfRange { index: 9, len: 4 }))
    ));
    assert!(matches!(
        row.get_named::<i64>("nope"),
        Err(Error::Storage(StorageError::UnknownColumn(_)))
    ));
    assert!(rows.next().is_none());
}

#[test]
fn update_changes_matching_rows_only() {
    let backend = seeded();
    let changed = backend
        .execute_update(
            &update("devs", ["signal"], vec![(-10).into()]).filter(where_("macaddr", Op::Like, "AA:%")),
        )
        .unwrap();
    assert_eq!(changed, 2);

    let rows = backend
        .prepare_select(&select("devs", ["devkey"]).filter(where_("signal", Op::Eq, -10)))
        .unwrap();
    assert_eq!(keys(rows), vec!["k1", "k2"]);

    let changed = backend
        .execute_update(&update("devs", ["signal"], vec![0.into()]).filter(where_("devkey", Op::Eq, "missing")))
        .unwrap();
    assert_eq!(changed, 0);
}

#[test]
fn null_never_compares() {
    let backend = seeded();
    backend
        .execute_insert(&insert("devs", ["devkey"], vec!["k4".into()]))
        .unwrap();

    let rows = backend
        .prepare_select(&select("devs", ["devkey"]).filter(where_("signal", Op::Neq, 0)))
        .unwrap();
    assert_eq!(keys(rows), vec!["k1", "k2", "k3"]);
}

#[test]
fn statement_errors_carry_rendered_sql() {
    let backend = seeded();

    let err = backend.prepare_select(&select("nope", ["a"])).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to prepare statement: SELECT a FROM nope no such table: nope"
    );

    let err = backend
        .prepare_select(&select("devs", ["devkey"]).filter(where_("bogus", Op::Eq, 1)))
        .unwrap_err();
    assert!(err.to_string().contains("no such column: bogus"));

    let empty: [&str; 0] = [];
    let err = backend.prepare_select(&select("devs", empty)).unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::Statement { .. })));

    let err = backend
        .execute_insert(&insert("devs", ["devkey", "signal"], vec!["k9".into()]))
        .unwrap_err();
    assert!(err.to_string().contains("1 values for 2 columns"));
}

#[test]
fn create_table_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SledBackend::open(dir.path().join("db")).unwrap();

    backend.create_table("t", &columns(&["a"])).unwrap();
    backend
        .execute_insert(&insert("t", ["a"], vec![1.into()]))
        .unwrap();
    backend.create_table("t", &columns(&["a", "b"])).unwrap();

    let rows = backend.prepare_select(&select("t", ["*"])).unwrap();
    assert_eq!(rows.columns(), columns(&["a"]).as_slice());
    assert_eq!(rows.count(), 1);

    assert!(backend.create_table("empty", &[]).is_err());
}
