//! Declaring a table and reconciling it against a SQLite database.
//!
//! Walks through a dry run, the real update, a schema change on the declared
//! side, and the check that shows what the next update would do.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p pxdb-demos --example reconcile_sqlite
//! ```

use pxdb_config::PoolSettings;
use pxdb_core::{FieldDecl, TableSchema};
use pxdb_sql::{FieldStatus, Pool, SchemaReconciler};

/// Table declared in code instead of a pool config file.
struct Articles {
    with_summary: bool,
}

impl TableSchema for Articles {
    fn table_name(&self) -> &str {
        "articles"
    }

    fn fields(&self) -> Vec<FieldDecl> {
        let mut fields = vec![
            FieldDecl::new("id", "increment"),
            FieldDecl::new("slug", "varchar").size(80).unique(),
            FieldDecl::new("title", "varchar").size(200),
            FieldDecl::new("views", "int").default_value(0),
        ];
        if self.with_summary {
            fields.push(FieldDecl::new("summary", "text").nullable(true));
        }
        fields
    }
}

fn main() {
    let db_path = std::env::temp_dir().join(format!("pxdb_demo_{}.db", std::process::id()));
    let mut settings = PoolSettings::sqlite("main", &db_path);
    settings.prefix = "demo_".into();
    let mut pool = Pool::new(&settings);

    let articles = Articles { with_summary: false }.to_spec().unwrap();
    pool.add_table_schema(articles).unwrap();

    // === Step 1: Dry run, nothing is written ===
    println!("=== Dry run ===");
    let report = SchemaReconciler::new(&pool).dry_run(true).reconcile_all().unwrap();
    for line in &report.messages {
        println!("[DRY] {line}");
    }
    for sql in &report.statements {
        println!("      {sql}");
    }

    // === Step 2: Apply ===
    println!("\n=== Update ===");
    let report = SchemaReconciler::new(&pool).reconcile_all().unwrap();
    for line in &report.messages {
        println!("{line}");
    }
    println!("{} changes in {} passes", report.total_changes(), report.passes);

    // === Step 3: Insert through a pooled connection ===
    {
        let mut conn = pool.lease().unwrap();
        conn.prepare("INSERT INTO `__TABLE__articles` (`slug`, `title`) VALUES (?, ?)")
            .unwrap();
        conn.bind("hello-world");
        conn.bind("Hello, world");
        conn.execute().unwrap();
        println!("\nInserted row {:?}", conn.insert_id());
    }

    // === Step 4: The declaration grows; check what an update would do ===
    println!("\n=== Check ===");
    let grown = Articles { with_summary: true }.to_spec().unwrap();
    let check = SchemaReconciler::new(&pool).check_table(&grown).unwrap();
    for field in &check.fields {
        let status = match &field.status {
            FieldStatus::Missing => "MISSING".to_string(),
            FieldStatus::Changes(changes) => changes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            FieldStatus::Unchanged => "ok".to_string(),
        };
        println!("  {:10} {}", field.name, status);
    }

    let report = SchemaReconciler::new(&pool)
        .reconcile(std::slice::from_ref(&grown))
        .unwrap();
    for line in &report.messages {
        println!("{line}");
    }

    let _ = std::fs::remove_file(&db_path);
}
