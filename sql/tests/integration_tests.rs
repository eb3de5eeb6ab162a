//! Integration tests for the pxdb-sql crate, run against real SQLite files.

use std::path::Path;

use pxdb_config::PoolSettings;
use pxdb_core::{FieldDecl, FieldType, TableDecl, TableSpec};
use pxdb_sql::{
    DbError, FieldStatus, Pool, PoolRegistry, SchemaReconciler, Value, export_table, import_table,
    read_export,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn table(name: &str, fields: Vec<FieldDecl>) -> TableSpec {
    TableDecl {
        name: name.to_string(),
        fields,
    }
    .to_spec()
    .unwrap()
}

fn users() -> TableSpec {
    table(
        "users",
        vec![
            FieldDecl::new("id", "increment"),
            FieldDecl::new("name", "varchar"),
            FieldDecl::new("active", "bool").nullable(true).default_value(true),
        ],
    )
}

fn sqlite_pool(dir: &Path, prefix: &str) -> Pool {
    let mut settings = PoolSettings::sqlite("main", dir.join("test.db"));
    settings.prefix = prefix.to_string();
    Pool::new(&settings)
}

fn raw(dir: &Path) -> rusqlite::Connection {
    rusqlite::Connection::open(dir.join("test.db")).unwrap()
}

fn table_sql(dir: &Path, name: &str) -> Option<String> {
    raw(dir)
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get(0),
        )
        .ok()
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[test]
fn test_empty_database_converges() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");

    let report = SchemaReconciler::new(&pool).reconcile(&[users()]).unwrap();
    assert_eq!(report.tables_created, 1);
    assert_eq!(report.fields_added, 2);

    let sql = table_sql(dir.path(), "users").unwrap();
    assert!(sql.contains("`id` INTEGER PRIMARY KEY AUTOINCREMENT"), "{sql}");
    assert!(sql.contains("`name` VARCHAR(255) NOT NULL DEFAULT ''"), "{sql}");
    assert!(sql.contains("`active` TINYINT(1) NULL DEFAULT '1'"), "{sql}");

    let second = SchemaReconciler::new(&pool).reconcile(&[users()]).unwrap();
    assert_eq!(second.total_changes(), 0);
    assert!(second.statements.is_empty());
}

#[test]
fn test_dry_run_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");

    let dry = SchemaReconciler::new(&pool)
        .dry_run(true)
        .reconcile(&[users()])
        .unwrap();
    assert_eq!(dry.tables_created, 1);
    assert_eq!(dry.fields_added, 2);
    assert_eq!(table_sql(dir.path(), "users"), None);

    let real = SchemaReconciler::new(&pool).reconcile(&[users()]).unwrap();
    assert_eq!(dry.messages, real.messages);
    assert_eq!(dry.total_changes(), real.total_changes());
}

#[test]
fn test_changed_field_rebuilds_table_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");
    SchemaReconciler::new(&pool).reconcile(&[users()]).unwrap();

    let db = raw(dir.path());
    db.execute_batch(
        "ALTER TABLE users ADD COLUMN _audit TEXT NULL;
         INSERT INTO users (name, active, _audit) VALUES ('ada', 1, 'x'), ('bob', 0, 'y');",
    )
    .unwrap();
    drop(db);

    let changed = table(
        "users",
        vec![
            FieldDecl::new("id", "increment"),
            FieldDecl::new("name", "varchar").size(100).nullable(true),
            FieldDecl::new("active", "bool").nullable(true).default_value(true),
        ],
    );
    let report = SchemaReconciler::new(&pool).reconcile(&[changed.clone()]).unwrap();
    assert_eq!(report.fields_altered, 1);
    assert!(report.messages.iter().any(|m| m ==
        "Changing field: name varchar(255|NOT|'') -> varchar(100|NUL|NULL) \
         [size(255 -> 100), nullable(NOT -> NUL), default('' -> NULL)]"
    ), "{:?}", report.messages);
    assert!(report.statements.iter().any(|s| s.starts_with("CREATE TABLE `_rebuild_users`")));

    let sql = table_sql(dir.path(), "users").unwrap();
    assert!(sql.contains("VARCHAR(100) NULL"), "{sql}");
    assert!(sql.contains("_audit"), "{sql}");
    assert_eq!(table_sql(dir.path(), "_rebuild_users"), None);

    let db = raw(dir.path());
    let rows: Vec<(i64, String, String)> = db
        .prepare("SELECT id, name, _audit FROM users ORDER BY id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        rows,
        [(1, "ada".into(), "x".into()), (2, "bob".into(), "y".into())]
    );

    let again = SchemaReconciler::new(&pool).reconcile(&[changed]).unwrap();
    assert_eq!(again.total_changes(), 0);
}

#[test]
fn test_primary_key_column_added_by_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    raw(dir.path())
        .execute_batch(
            "CREATE TABLE tags (label VARCHAR(255) NOT NULL DEFAULT '');
             INSERT INTO tags (label) VALUES ('red'), ('blue');",
        )
        .unwrap();
    let pool = sqlite_pool(dir.path(), "");

    let tags = table(
        "tags",
        vec![FieldDecl::new("id", "increment"), FieldDecl::new("label", "varchar")],
    );
    let report = SchemaReconciler::new(&pool).reconcile(&[tags]).unwrap();
    assert_eq!(report.tables_created, 0);
    assert_eq!(report.fields_added, 1);

    let ids: Vec<i64> = raw(dir.path())
        .prepare("SELECT id FROM tags ORDER BY id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ids, [1, 2]);
}

#[test]
fn test_unique_index_survives_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");
    let accounts = |size: i64| {
        table(
            "accounts",
            vec![
                FieldDecl::new("id", "increment"),
                FieldDecl::new("email", "varchar").unique(),
                FieldDecl::new("nick", "varchar").size(size),
            ],
        )
    };
    SchemaReconciler::new(&pool).reconcile(&[accounts(20)]).unwrap();
    SchemaReconciler::new(&pool).reconcile(&[accounts(40)]).unwrap();

    let db = raw(dir.path());
    db.execute("INSERT INTO accounts (email, nick) VALUES ('a@x', 'a')", [])
        .unwrap();
    assert!(db
        .execute("INSERT INTO accounts (email, nick) VALUES ('a@x', 'b')", [])
        .is_err());
}

#[test]
fn test_failed_statement_names_the_field() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");
    let notes = table(
        "notes",
        vec![
            FieldDecl::new("id", "increment"),
            FieldDecl::new("body", "text").nullable(false),
        ],
    );

    let err = SchemaReconciler::new(&pool).reconcile(&[notes]).unwrap_err();
    match &err {
        DbError::Schema { pool, table, field, .. } => {
            assert_eq!((pool.as_str(), table.as_str(), field.as_str()), ("main", "notes", "body"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("main:notes:body"), "{err}");

    // The table created before the failure stays.
    assert!(table_sql(dir.path(), "notes").is_some());
}

#[test]
fn test_check_table_after_drift() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");
    raw(dir.path())
        .execute_batch("CREATE TABLE users (`id` INTEGER PRIMARY KEY AUTOINCREMENT, `name` VARCHAR(64) NOT NULL DEFAULT '')")
        .unwrap();

    let check = SchemaReconciler::new(&pool).check_table(&users()).unwrap();
    assert!(check.exists);
    assert_eq!(check.fields[0].status, FieldStatus::Unchanged);
    match &check.fields[1].status {
        FieldStatus::Changes(changes) => {
            let text: Vec<String> = changes.iter().map(ToString::to_string).collect();
            assert_eq!(text, ["size(64 -> 255)"]);
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(check.fields[2].status, FieldStatus::Missing);
}

// ---------------------------------------------------------------------------
// Pools and prefixes
// ---------------------------------------------------------------------------

#[test]
fn test_prefix_is_substituted_and_stripped() {
    let dir = tempfile::tempdir().unwrap();
    raw(dir.path())
        .execute_batch("CREATE TABLE other (x INT); CREATE TABLE app__scratch (x INT);")
        .unwrap();
    let pool = sqlite_pool(dir.path(), "app_");

    let report = SchemaReconciler::new(&pool).reconcile(&[users()]).unwrap();
    assert!(report.statements[0].starts_with("CREATE TABLE `app_users`"));
    assert!(table_sql(dir.path(), "app_users").is_some());

    let mut conn = pool.lease().unwrap();
    assert_eq!(pool.live_tables(&mut conn).unwrap(), ["users"]);
}

#[test]
fn test_exhaustion_and_release() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = PoolSettings::sqlite("main", dir.path().join("test.db"));
    settings.max_connections = 3;
    let pool = Pool::new(&settings);

    let leased: Vec<_> = (0..3).map(|_| pool.lease().unwrap()).collect();
    assert!(matches!(
        pool.lease(),
        Err(DbError::ResourceExhausted { max: 3, .. })
    ));

    let mut leased = leased.into_iter();
    let first = leased.next().unwrap();
    let index = first.index();
    first.release();
    assert_eq!(pool.lease().unwrap().index(), index);
}

#[test]
fn test_registry_reconciles_declared_tables() {
    let config = tempfile::tempdir().unwrap();
    std::fs::write(
        config.path().join("default.yml"),
        r#"
driver: sqlite
database: app.db
tables:
  - name: posts
    fields:
      - { name: id, type: increment }
      - { name: title, type: varchar, size: 200 }
      - { name: score, type: decimal, size: "8,2", default: 0 }
"#,
    )
    .unwrap();

    let registry = PoolRegistry::load_all(config.path()).unwrap();
    let pool = registry.default_pool().unwrap();
    assert_eq!(pool.name(), "main");
    assert_eq!(pool.table_schema("posts").unwrap().len(), 3);

    let report = SchemaReconciler::new(pool).reconcile_all().unwrap();
    assert_eq!(report.tables_created, 1);
    assert_eq!(report.fields_added, 2);

    let mut conn = pool.lease().unwrap();
    let live = pool.live_table(&mut conn, "posts").unwrap().unwrap();
    let score = live.field("score").unwrap();
    assert_eq!(score.field_type(), FieldType::Decimal);
    assert_eq!(score.size(), Some("8,2"));
    assert_eq!(score.default_value(), Some("0.00"));

    assert!(matches!(registry.get_pool("missing"), Err(DbError::Config(_))));
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

#[test]
fn test_export_then_import() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");
    SchemaReconciler::new(&pool).reconcile(&[users()]).unwrap();
    raw(dir.path())
        .execute_batch("INSERT INTO users (name, active) VALUES ('ada', 1), ('bob', NULL)")
        .unwrap();

    let file = dir.path().join("users.json");
    let dry = export_table(&pool, "users", &file, true).unwrap();
    assert_eq!(dry.rows.len(), 2);
    assert!(!file.exists());

    let export = export_table(&pool, "users", &file, false).unwrap();
    assert_eq!(export.columns, ["id", "name", "active"]);
    assert_eq!(export.rows[1], [Value::Int(2), Value::from("bob"), Value::Null]);
    assert_eq!(read_export(&file).unwrap().checksum, export.checksum);

    raw(dir.path()).execute_batch("DELETE FROM users").unwrap();
    assert_eq!(import_table(&pool, "users", &file, true).unwrap(), 2);
    let count = |dir: &Path| -> i64 {
        raw(dir)
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap()
    };
    assert_eq!(count(dir.path()), 0);

    assert_eq!(import_table(&pool, "users", &file, false).unwrap(), 2);
    assert_eq!(count(dir.path()), 2);
}

#[test]
fn test_dry_import_checks_statements() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");
    let people = table(
        "people",
        vec![FieldDecl::new("id", "increment"), FieldDecl::new("name", "varchar")],
    );
    SchemaReconciler::new(&pool).reconcile(&[users(), people]).unwrap();
    raw(dir.path())
        .execute_batch("INSERT INTO users (name, active) VALUES ('ada', 1)")
        .unwrap();

    let file = dir.path().join("users.json");
    export_table(&pool, "users", &file, false).unwrap();

    // `people` has no `active` column, so the INSERT cannot compile.
    let err = import_table(&pool, "people", &file, true).unwrap_err();
    assert!(matches!(err, DbError::Query { .. }), "unexpected error: {err}");
}

#[test]
fn test_tampered_export_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");
    SchemaReconciler::new(&pool).reconcile(&[users()]).unwrap();
    raw(dir.path())
        .execute_batch("INSERT INTO users (name) VALUES ('ada')")
        .unwrap();

    let file = dir.path().join("users.json");
    export_table(&pool, "users", &file, false).unwrap();
    let text = std::fs::read_to_string(&file).unwrap().replace("ada", "eve");
    std::fs::write(&file, text).unwrap();

    assert!(matches!(
        import_table(&pool, "users", &file, false),
        Err(DbError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_export_missing_table() {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite_pool(dir.path(), "");
    let err = export_table(&pool, "ghost", &dir.path().join("g.json"), false).unwrap_err();
    assert!(matches!(err, DbError::MissingTable { .. }));
}
