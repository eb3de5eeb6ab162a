//! Rendering MySQL DDL and diffing fields without a server.
//!
//! Loads a pool config from a YAML string written to a temp directory,
//! prints the statements the reconciler would issue for its first table,
//! then diffs a hand-built live column against the declaration.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p pxdb-demos --example mysql_ddl
//! ```

use pxdb_config::load_all;
use pxdb_core::{FieldSpec, check_field_needs_changes};

const SHOP: &str = r#"
driver: mysql
host: db.internal
user: shop
database: shop
prefix: shop_
tables:
  - name: orders
    fields:
      - { name: id, type: increment }
      - { name: customer, type: varchar, size: 120 }
      - { name: total, type: decimal, size: "12,2", default: 0 }
      - { name: status, type: enum, size: "'new','paid','shipped'", default: new }
      - { name: note, type: text, nullable: true }
"#;

fn main() {
    let dir = std::env::temp_dir().join(format!("pxdb_demo_config_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("shop.yml"), SHOP).unwrap();

    let config = load_all(&dir).unwrap();
    let shop = config.get("shop").unwrap();
    println!("Pool {} -> {}", shop.name, shop.dsn());

    // === CREATE TABLE with the first field, then one ADD per field ===
    let orders = shop.table("orders").unwrap();
    let mut filled = Vec::new();
    for field in orders.fields() {
        let mut field = field.duplicate();
        field.fill_keys_schema().unwrap();
        filled.push(field);
    }

    println!("\n{};", shop.driver.create_table_sql("__TABLE__orders", &filled[0]));
    for pair in filled.windows(2) {
        let sql = shop
            .driver
            .add_field_sql("__TABLE__orders", &pair[1], Some(pair[0].name()))
            .unwrap();
        for statement in sql {
            println!("{statement};");
        }
    }

    // === A live column as DESCRIBE would report it ===
    let mut live = FieldSpec::new("customer", "varchar").unwrap();
    live.set_size(Some("64"))
        .unwrap()
        .set_nullable(Some(true))
        .unwrap();
    live.fill_keys_existing().unwrap();

    let declared = &filled[1];
    println!("\nlive:     {}", live.describe());
    println!("declared: {}", declared.describe());
    match check_field_needs_changes(&live, declared).unwrap() {
        Some(changes) => {
            for change in changes {
                println!("  {change}");
            }
            let sql = shop
                .driver
                .change_field_sql("__TABLE__orders", &live, declared)
                .unwrap();
            println!("{};", sql.join(";\n"));
        }
        None => println!("  up to date"),
    }

    let _ = std::fs::remove_dir_all(&dir);
}
