//! SQL rendering per driver.
//!
//! Pure functions from specs to SQL text. Every table reference is written
//! as `__TABLE__<name>` so the connection can substitute the pool's prefix.
//!
//! MySQL gets positional `FIRST`/`AFTER` clauses, a latin1 character set on
//! textual columns, and separate key clauses. SQLite fuses auto-increment
//! into `INTEGER PRIMARY KEY AUTOINCREMENT`, adds unique columns through a
//! separate index, and cannot alter a column in place: changes go through
//! [`Driver::rebuild_table_sql`].
//!
//! # Examples
//!
//! ```
//! use pxdb_core::{Driver, FieldSpec};
//!
//! let mut id = FieldSpec::new("id", "increment").unwrap();
//! id.fill_keys_schema().unwrap();
//!
//! assert_eq!(
//!     Driver::Sqlite.create_table_sql("users", &id),
//!     "CREATE TABLE `__TABLE__users` (`id` INTEGER PRIMARY KEY AUTOINCREMENT)"
//! );
//! assert_eq!(
//!     Driver::MySql.field_ddl(&id),
//!     "`id` INT(11) NOT NULL AUTO_INCREMENT"
//! );
//! ```

use crate::error::{Result, SpecError};
use crate::field::FieldSpec;
use crate::types::{Driver, FieldType, TABLE_TOKEN};

const MYSQL_CHARSET: &str = "CHARACTER SET latin1 COLLATE latin1_swedish_ci";
const MYSQL_TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=latin1";

/// Name of the scratch table used while rebuilding `table` on SQLite.
///
/// The leading `_` keeps it out of introspected table lists.
pub fn rebuild_table_name(table: &str) -> String {
    format!("_rebuild_{table}")
}

/// Quotes an identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quotes a table name behind the prefix placeholder.
pub fn quote_table(table: &str) -> String {
    quote_ident(&format!("{TABLE_TOKEN}{table}"))
}

/// Quotes a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Driver {
    /// Column type with size, e.g. `VARCHAR(255)`.
    pub fn column_type(self, field: &FieldSpec) -> String {
        let ty = field.field_type();
        let name = match (self, ty) {
            (_, FieldType::Bool) => return "TINYINT(1)".to_string(),
            (Driver::Sqlite, FieldType::Enum) => return "ENUM".to_string(),
            // SET is a keyword in SQLite.
            (Driver::Sqlite, FieldType::Set) => return "\"SET\"".to_string(),
            _ => ty.as_str().to_ascii_uppercase(),
        };
        match field.size() {
            Some(size) if ty.has_size() => format!("{name}({size})"),
            _ => name,
        }
    }

    /// Column definition fragment without key clauses.
    ///
    /// On SQLite an auto-increment field renders as the fused
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`.
    pub fn field_ddl(self, field: &FieldSpec) -> String {
        let name = quote_ident(field.name());
        if self == Driver::Sqlite && field.is_increment() {
            return format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT");
        }

        let ty = field.field_type();
        let mut ddl = format!("{name} {}", self.column_type(field));
        if self == Driver::MySql && ty.is_textual() {
            ddl.push(' ');
            ddl.push_str(MYSQL_CHARSET);
        }

        let nullable = field.nullable() == Some(true);
        ddl.push_str(if nullable { " NULL" } else { " NOT NULL" });

        let default_allowed =
            !field.is_increment() && !(self == Driver::MySql && ty.forbids_default());
        if default_allowed {
            match field.default_value() {
                Some(value) => {
                    ddl.push_str(" DEFAULT ");
                    ddl.push_str(&quote_literal(value));
                }
                None if nullable => ddl.push_str(" DEFAULT NULL"),
                None => {}
            }
        }

        if self == Driver::MySql && field.is_increment() {
            ddl.push_str(" AUTO_INCREMENT");
        }
        ddl
    }

    /// Column definition as it appears inside `CREATE TABLE`.
    ///
    /// SQLite carries primary and unique constraints inline; MySQL declares
    /// keys separately, so this is the bare fragment there.
    pub fn column_definition(self, field: &FieldSpec) -> String {
        let mut ddl = self.field_ddl(field);
        if self == Driver::Sqlite {
            if field.is_primary() && !field.is_increment() {
                ddl.push_str(" PRIMARY KEY");
            }
            if field.is_unique() {
                ddl.push_str(" UNIQUE");
            }
        }
        ddl
    }

    /// `CREATE TABLE` holding only the first declared field.
    pub fn create_table_sql(self, table: &str, first: &FieldSpec) -> String {
        let mut body = self.column_definition(first);
        match self {
            Driver::MySql => {
                if first.is_primary() {
                    body.push_str(&format!(", PRIMARY KEY ({})", quote_ident(first.name())));
                }
                if first.is_unique() {
                    body.push_str(&format!(
                        ", UNIQUE KEY {0} ({0})",
                        quote_ident(first.name())
                    ));
                }
                format!(
                    "CREATE TABLE {} ({body}) {MYSQL_TABLE_OPTIONS}",
                    quote_table(table)
                )
            }
            Driver::Sqlite => format!("CREATE TABLE {} ({body})", quote_table(table)),
        }
    }

    /// Whether `ALTER TABLE ... ADD` can add this field.
    ///
    /// SQLite cannot add a primary key column; such fields need a rebuild.
    pub fn can_add_column(self, field: &FieldSpec) -> bool {
        match self {
            Driver::MySql => true,
            Driver::Sqlite => !field.is_primary() && !field.is_increment(),
        }
    }

    /// Statements adding `field` to an existing table.
    ///
    /// `after` is the preceding declared field, `None` for the first one.
    /// Position is honored on MySQL only.
    pub fn add_field_sql(
        self,
        table: &str,
        field: &FieldSpec,
        after: Option<&str>,
    ) -> Result<Vec<String>> {
        let column = quote_ident(field.name());
        match self {
            Driver::MySql => {
                let position = match after {
                    Some(prev) => format!("AFTER {}", quote_ident(prev)),
                    None => "FIRST".to_string(),
                };
                let mut sql = format!(
                    "ALTER TABLE {} ADD {} {position}",
                    quote_table(table),
                    self.field_ddl(field)
                );
                if field.is_primary() {
                    sql.push_str(&format!(", ADD PRIMARY KEY ({column})"));
                }
                if field.is_unique() {
                    sql.push_str(&format!(", ADD UNIQUE KEY {column} ({column})"));
                }
                Ok(vec![sql])
            }
            Driver::Sqlite => {
                if !self.can_add_column(field) {
                    return Err(self.unsupported("adding a primary key column"));
                }
                let mut statements = vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    quote_table(table),
                    self.field_ddl(field)
                )];
                if field.is_unique() {
                    statements.push(format!(
                        "CREATE UNIQUE INDEX {} ON {} ({column})",
                        quote_table(&format!("{table}_{}_unique", field.name())),
                        quote_table(table)
                    ));
                }
                Ok(statements)
            }
        }
    }

    /// Statements changing `existing` into `declared` in place.
    ///
    /// MySQL only; SQLite tables are rebuilt instead.
    pub fn change_field_sql(
        self,
        table: &str,
        existing: &FieldSpec,
        declared: &FieldSpec,
    ) -> Result<Vec<String>> {
        match self {
            Driver::MySql => {
                let mut sql = format!(
                    "ALTER TABLE {} CHANGE {} {}",
                    quote_table(table),
                    quote_ident(existing.name()),
                    self.field_ddl(declared)
                );
                match (existing.is_primary(), declared.is_primary()) {
                    (false, true) => sql.push_str(&format!(
                        ", ADD PRIMARY KEY ({})",
                        quote_ident(declared.name())
                    )),
                    (true, false) => sql.push_str(", DROP PRIMARY KEY"),
                    _ => {}
                }
                Ok(vec![sql])
            }
            Driver::Sqlite => Err(self.unsupported("changing a column in place")),
        }
    }

    /// Statements recreating `table` with new column definitions.
    ///
    /// `columns` are full column definitions (plus any table constraints) in
    /// their new order; `copy_columns` are the columns whose data is carried
    /// over. The old table is dropped and the new one renamed into place.
    pub fn rebuild_table_sql(
        self,
        table: &str,
        columns: &[String],
        copy_columns: &[String],
    ) -> Result<Vec<String>> {
        if self != Driver::Sqlite {
            return Err(self.unsupported("rebuilding a table"));
        }
        let scratch = quote_table(&rebuild_table_name(table));
        let target = quote_table(table);
        let mut statements = vec![
            format!("DROP TABLE IF EXISTS {scratch}"),
            format!("CREATE TABLE {scratch} ({})", columns.join(", ")),
        ];
        if !copy_columns.is_empty() {
            let list = copy_columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            statements.push(format!(
                "INSERT INTO {scratch} ({list}) SELECT {list} FROM {target}"
            ));
        }
        statements.push(format!("DROP TABLE {target}"));
        statements.push(format!("ALTER TABLE {scratch} RENAME TO {target}"));
        Ok(statements)
    }

    /// Query listing every table, prefixed or not.
    pub fn table_list_query(self) -> &'static str {
        match self {
            Driver::MySql => "SHOW TABLES",
            Driver::Sqlite => "SELECT name FROM sqlite_master WHERE type='table'",
        }
    }

    /// Query returning a table's column metadata.
    ///
    /// MySQL answers with one `DESCRIBE` row per column; SQLite returns the
    /// stored `CREATE TABLE` text, which has to be parsed.
    pub fn column_list_query(self, table: &str) -> String {
        match self {
            Driver::MySql => format!("DESCRIBE {}", quote_table(table)),
            Driver::Sqlite => format!(
                "SELECT sql FROM sqlite_master WHERE type='table' AND name={}",
                quote_literal(&format!("{TABLE_TOKEN}{table}"))
            ),
        }
    }

    fn unsupported(self, operation: &'static str) -> SpecError {
        SpecError::UnsupportedDriver {
            driver: self.as_str().to_string(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(name: &str, ty: &str) -> FieldSpec {
        let mut spec = FieldSpec::new(name, ty).unwrap();
        spec.fill_keys_schema().unwrap();
        spec
    }

    #[test]
    fn test_mysql_varchar_has_charset() {
        assert_eq!(
            Driver::MySql.field_ddl(&filled("name", "varchar")),
            "`name` VARCHAR(255) CHARACTER SET latin1 COLLATE latin1_swedish_ci NOT NULL DEFAULT ''"
        );
    }

    #[test]
    fn test_sqlite_has_no_charset() {
        assert_eq!(
            Driver::Sqlite.field_ddl(&filled("name", "varchar")),
            "`name` VARCHAR(255) NOT NULL DEFAULT ''"
        );
    }

    #[test]
    fn test_nullable_without_default() {
        let mut note = FieldSpec::new("note", "int").unwrap();
        note.set_nullable(Some(true)).unwrap();
        note.fill_keys_schema().unwrap();
        assert_eq!(
            Driver::MySql.field_ddl(&note),
            "`note` INT(11) NULL DEFAULT NULL"
        );
    }

    #[test]
    fn test_mysql_text_omits_default() {
        assert_eq!(
            Driver::MySql.field_ddl(&filled("body", "text")),
            "`body` TEXT CHARACTER SET latin1 COLLATE latin1_swedish_ci NOT NULL"
        );
        assert_eq!(
            Driver::Sqlite.field_ddl(&filled("body", "text")),
            "`body` TEXT NOT NULL DEFAULT ''"
        );
    }

    #[test]
    fn test_decimal_and_bool_rendering() {
        assert_eq!(
            Driver::MySql.field_ddl(&filled("price", "decimal")),
            "`price` DECIMAL(16,4) NOT NULL DEFAULT '0.0000'"
        );
        assert_eq!(
            Driver::Sqlite.field_ddl(&filled("active", "bool")),
            "`active` TINYINT(1) NOT NULL DEFAULT '0'"
        );
    }

    #[test]
    fn test_mysql_create_table() {
        assert_eq!(
            Driver::MySql.create_table_sql("users", &filled("id", "increment")),
            "CREATE TABLE `__TABLE__users` (`id` INT(11) NOT NULL AUTO_INCREMENT, PRIMARY KEY (`id`)) ENGINE=InnoDB DEFAULT CHARSET=latin1"
        );
    }

    #[test]
    fn test_mysql_add_field_position() {
        let name = filled("name", "varchar");
        let sql = Driver::MySql.add_field_sql("users", &name, Some("id")).unwrap();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("ALTER TABLE `__TABLE__users` ADD `name` VARCHAR(255)"));
        assert!(sql[0].ends_with("AFTER `id`"));

        let first = Driver::MySql.add_field_sql("users", &name, None).unwrap();
        assert!(first[0].ends_with(" FIRST"));
    }

    #[test]
    fn test_sqlite_add_unique_uses_index() {
        let mut email = FieldSpec::new("email", "varchar").unwrap();
        email.set_unique(true).unwrap();
        email.fill_keys_schema().unwrap();

        let sql = Driver::Sqlite.add_field_sql("users", &email, Some("id")).unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE `__TABLE__users` ADD COLUMN `email` VARCHAR(255) NOT NULL DEFAULT ''"
                    .to_string(),
                "CREATE UNIQUE INDEX `__TABLE__users_email_unique` ON `__TABLE__users` (`email`)"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_sqlite_cannot_add_primary_or_change() {
        let id = filled("id", "increment");
        assert!(matches!(
            Driver::Sqlite.add_field_sql("users", &id, None),
            Err(SpecError::UnsupportedDriver { .. })
        ));
        assert!(matches!(
            Driver::Sqlite.change_field_sql("users", &id, &id),
            Err(SpecError::UnsupportedDriver { .. })
        ));
        assert!(Driver::MySql.rebuild_table_sql("users", &[], &[]).is_err());
    }

    #[test]
    fn test_mysql_change_adds_primary_key() {
        let mut existing = FieldSpec::new("id", "int").unwrap();
        existing.fill_keys_existing().unwrap();
        let declared = filled("id", "increment");
        let sql = Driver::MySql
            .change_field_sql("users", &existing, &declared)
            .unwrap();
        assert_eq!(
            sql[0],
            "ALTER TABLE `__TABLE__users` CHANGE `id` `id` INT(11) NOT NULL AUTO_INCREMENT, ADD PRIMARY KEY (`id`)"
        );
    }

    #[test]
    fn test_sqlite_rebuild_statements() {
        let sql = Driver::Sqlite
            .rebuild_table_sql(
                "users",
                &["`id` INTEGER PRIMARY KEY AUTOINCREMENT".into(), "`age` INT(11) NOT NULL DEFAULT '0'".into()],
                &["id".into()],
            )
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "DROP TABLE IF EXISTS `__TABLE___rebuild_users`",
                "CREATE TABLE `__TABLE___rebuild_users` (`id` INTEGER PRIMARY KEY AUTOINCREMENT, `age` INT(11) NOT NULL DEFAULT '0')",
                "INSERT INTO `__TABLE___rebuild_users` (`id`) SELECT `id` FROM `__TABLE__users`",
                "DROP TABLE `__TABLE__users`",
                "ALTER TABLE `__TABLE___rebuild_users` RENAME TO `__TABLE__users`",
            ]
        );
    }

    #[test]
    fn test_introspection_queries() {
        assert_eq!(Driver::MySql.table_list_query(), "SHOW TABLES");
        assert_eq!(Driver::MySql.column_list_query("users"), "DESCRIBE `__TABLE__users`");
        assert_eq!(
            Driver::Sqlite.column_list_query("users"),
            "SELECT sql FROM sqlite_master WHERE type='table' AND name='__TABLE__users'"
        );
    }
}
