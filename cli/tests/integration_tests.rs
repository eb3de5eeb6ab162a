use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

/// Helper to create a temp directory that is cleaned up on drop.
struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("pxdb_cli_test_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("failed to create temp dir");
        Self { path }
    }

    fn path(&self) -> &PathBuf {
        &self.path
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

const USERS_POOL: &str = r#"
driver: sqlite
database: app.db
prefix: app_
tables:
  - name: users
    fields:
      - { name: id, type: increment }
      - { name: name, type: varchar, size: 64 }
      - { name: active, type: bool, default: true }
"#;

/// Config directory with a default SQLite pool declaring `users`.
fn write_config(dir: &TempDir) {
    fs::write(dir.join("default.yml"), USERS_POOL).expect("failed to write pool config");
}

fn pxdb(dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pxdb"))
        .arg("--config")
        .arg(dir.path())
        .args(args)
        .output()
        .expect("failed to run pxdb")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn sqlite_tables(dir: &TempDir) -> Vec<String> {
    let conn = rusqlite::Connection::open(dir.join("app.db")).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

// ---------------------------------------------------------------------------
// check / list
// ---------------------------------------------------------------------------

#[test]
fn check_reports_missing_table_by_default() {
    let dir = TempDir::new("check_missing");
    write_config(&dir);

    let output = pxdb(&dir, &["check"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains(" Cmd: check  Pool: -all-  Table: -all-"), "{out}");
    assert!(out.contains("<MISSING> main:users"), "{out}");
    assert!(out.contains(" Ran check on 1 tables"), "{out}");
}

#[test]
fn list_shows_live_fields_after_update() {
    let dir = TempDir::new("list_fields");
    write_config(&dir);

    let update = pxdb(&dir, &["update", "users", "--confirm"]);
    assert!(update.status.success(), "stderr: {}", stderr(&update));

    let output = pxdb(&dir, &["list", "-f"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("<found> main:users  Fields: 3"), "{out}");
    assert!(out.contains("varchar(64)"), "{out}");
    assert!(out.contains("active"), "{out}");
}

#[test]
fn check_lists_field_changes_after_drift() {
    let dir = TempDir::new("check_drift");
    write_config(&dir);
    let update = pxdb(&dir, &["update", "main:users", "--confirm"]);
    assert!(update.status.success(), "stderr: {}", stderr(&update));

    let drifted = USERS_POOL.replace("size: 64", "size: 128");
    fs::write(dir.join("default.yml"), drifted).unwrap();

    let output = pxdb(&dir, &["check", "-t", "users"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains(" Cmd: check  Pool: main  Table: users"), "{out}");
    assert!(out.contains("<found> main:users  Fields: 3  Changes: 1"), "{out}");
    assert!(out.contains("Changes Needed"), "{out}");
    assert!(out.contains("size(64 -> 128)"), "{out}");
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

#[test]
fn update_is_dry_unless_confirmed() {
    let dir = TempDir::new("update_dry");
    write_config(&dir);

    let output = pxdb(&dir, &["update", "*"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains(" [Dry Mode]"), "{out}");
    assert!(out.contains("[DRY] Creating table: main:users .."), "{out}");
    assert!(out.contains("--confirm"), "{out}");
    assert!(!sqlite_tables(&dir).contains(&"app_users".to_string()));

    let output = pxdb(&dir, &["update", "*", "--confirm"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Creating table: main:users .."), "{out}");
    assert!(!out.contains("[DRY]"), "{out}");
    assert!(sqlite_tables(&dir).contains(&"app_users".to_string()));

    let again = pxdb(&dir, &["update", "*", "--confirm"]);
    assert!(stdout(&again).contains("No fields need changes."));
}

#[test]
fn update_adds_new_field() {
    let dir = TempDir::new("update_add");
    write_config(&dir);
    assert!(pxdb(&dir, &["update", "users", "--confirm"]).status.success());

    let grown = format!("{USERS_POOL}      - {{ name: email, type: varchar, nullable: true }}\n");
    fs::write(dir.join("default.yml"), grown).unwrap();

    let output = pxdb(&dir, &["update", "users", "--confirm"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Adding field: email"), "{out}");
    assert!(out.contains("Added 1 field(s), and modified 0 field(s)"), "{out}");
}

#[test]
fn update_requires_a_target() {
    let dir = TempDir::new("update_no_target");
    write_config(&dir);

    let output = pxdb(&dir, &["update"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(stderr(&output).contains("needs a [pool:]table argument"));
}

// ---------------------------------------------------------------------------
// export / import
// ---------------------------------------------------------------------------

#[test]
fn export_then_import_rows() {
    let dir = TempDir::new("transfer");
    write_config(&dir);
    assert!(pxdb(&dir, &["update", "users", "--confirm"]).status.success());

    {
        let conn = rusqlite::Connection::open(dir.join("app.db")).unwrap();
        conn.execute(
            "INSERT INTO app_users (name, active) VALUES ('ada', 1), ('bob', 0)",
            [],
        )
        .unwrap();
    }

    let dump = dir.join("users.json");
    let dump_arg = dump.to_string_lossy().into_owned();
    let output = pxdb(&dir, &["export", "users", "--file", &dump_arg]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Exported 2 rows from main:users"));

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&dump).unwrap()).unwrap();
    assert_eq!(doc["format"], "pxdb-export");
    assert_eq!(doc["rows"].as_array().unwrap().len(), 2);

    {
        let conn = rusqlite::Connection::open(dir.join("app.db")).unwrap();
        conn.execute("DELETE FROM app_users", []).unwrap();
    }

    let dry = pxdb(&dir, &["import", "users", "--file", &dump_arg]);
    assert!(dry.status.success(), "stderr: {}", stderr(&dry));
    assert!(stdout(&dry).contains("[DRY] Imported 2 rows into main:users"));

    let output = pxdb(&dir, &["import", "users", "--file", &dump_arg, "--confirm"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let conn = rusqlite::Connection::open(dir.join("app.db")).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM app_users", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

#[test]
fn unknown_pool_is_usage_error() {
    let dir = TempDir::new("unknown_pool");
    write_config(&dir);

    let output = pxdb(&dir, &["check", "nowhere:users"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(stderr(&output).contains("nowhere"));
}

#[test]
fn missing_config_dir_is_config_error() {
    let dir = TempDir::new("no_config");
    let output = Command::new(env!("CARGO_BIN_EXE_pxdb"))
        .arg("--config")
        .arg(dir.join("absent"))
        .arg("list")
        .output()
        .expect("failed to run pxdb");
    assert_eq!(output.status.code(), Some(78));
}

#[test]
fn invalid_declaration_is_validation_error() {
    let dir = TempDir::new("bad_decl");
    fs::write(
        dir.join("default.yml"),
        "driver: sqlite\ndatabase: app.db\ntables:\n  - name: t\n    fields:\n      - { name: id, type: nonsense }\n",
    )
    .unwrap();

    let output = pxdb(&dir, &["list"]);
    assert_eq!(output.status.code(), Some(65), "stderr: {}", stderr(&output));
}
