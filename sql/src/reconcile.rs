//! Schema reconciliation.
//!
//! The reconciler brings live tables in line with their declared
//! [`TableSpec`]s. A missing table is created holding only its first
//! declared field. Every other field is then added when missing or changed
//! when [`check_field_needs_changes`] reports a difference. Passes repeat
//! until one makes no change, re-reading the live schema each time, up to a
//! bounded number of passes.
//!
//! MySQL adds columns in declared position and changes them in place.
//! SQLite cannot do either for every column, so it applies one change per
//! pass and falls back to rebuilding the table through a `_rebuild_` copy.
//!
//! A failed statement aborts the table. Statements already applied are not
//! rolled back.
//!
//! # Dry run
//!
//! In dry-run mode no DDL reaches the database. Each change is applied to
//! the pool's cached schema instead, so later passes see it and the report
//! matches what a real run would produce. The cache is discarded when the
//! dry run ends.
//!
//! Dry-run statements are still compiled while the table in the database
//! matches the cached one. Once a table is missing from the database or has
//! a simulated change, its remaining statements are recorded unchecked.

use pxdb_core::{Driver, FieldChange, FieldSpec, TableSpec, check_field_needs_changes};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{DbError, Result};
use crate::introspect::{LiveTable, StoredDefinition};
use crate::pool::Pool;

/// Passes allowed per table before giving up.
pub const DEFAULT_MAX_PASSES: usize = 99;

/// Outcome of reconciling one or more tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pool: String,
    pub dry_run: bool,
    pub tables_created: usize,
    pub fields_added: usize,
    pub fields_altered: usize,
    pub fields_unchanged: usize,
    pub passes: usize,
    /// Statements run, or that would have run, prefix already substituted.
    pub statements: Vec<String>,
    /// Human-readable progress lines.
    pub messages: Vec<String>,
}

impl ReconcileReport {
    pub fn new(pool: impl Into<String>, dry_run: bool) -> Self {
        Self {
            pool: pool.into(),
            dry_run,
            ..Self::default()
        }
    }

    /// Tables created plus fields added or altered.
    pub fn total_changes(&self) -> usize {
        self.tables_created + self.fields_added + self.fields_altered
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.tables_created += other.tables_created;
        self.fields_added += other.fields_added;
        self.fields_altered += other.fields_altered;
        self.fields_unchanged += other.fields_unchanged;
        self.passes += other.passes;
        self.statements.extend(other.statements);
        self.messages.extend(other.messages);
    }
}

/// State of one declared field against the live table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStatus {
    Missing,
    Changes(Vec<FieldChange>),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCheck {
    pub name: String,
    /// `describe()` of the normalized declaration.
    pub declared: String,
    /// `describe()` of the live column, if present.
    pub existing: Option<String>,
    pub status: FieldStatus,
}

/// Read-only comparison of one declared table with the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCheck {
    pub table: String,
    pub exists: bool,
    pub fields: Vec<FieldCheck>,
}

impl TableCheck {
    pub fn is_up_to_date(&self) -> bool {
        self.exists && self.fields.iter().all(|f| f.status == FieldStatus::Unchanged)
    }
}

#[derive(Default)]
struct Pass {
    changes: usize,
    unchanged: usize,
}

/// Declared field placement for an added column.
enum Placement<'a> {
    Add { after: Option<&'a str> },
    Append,
    Replace,
}

/// Diffs declared tables against a pool and applies the DDL.
#[derive(Debug)]
pub struct SchemaReconciler<'p> {
    pool: &'p Pool,
    dry: bool,
    max_passes: usize,
}

impl<'p> SchemaReconciler<'p> {
    pub fn new(pool: &'p Pool) -> Self {
        Self {
            pool,
            dry: false,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    pub fn dry_run(mut self, dry: bool) -> Self {
        self.dry = dry;
        self
    }

    pub fn max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes.max(1);
        self
    }

    /// Reconciles every declared table of the pool.
    pub fn reconcile_all(&self) -> Result<ReconcileReport> {
        self.reconcile(self.pool.table_schemas())
    }

    /// Reconciles `tables` in order.
    ///
    /// # Errors
    ///
    /// [`DbError::Schema`] naming the pool, table and field whose statement
    /// failed, or [`DbError::NotConverged`] when a table still changes after
    /// the maximum number of passes.
    pub fn reconcile(&self, tables: &[TableSpec]) -> Result<ReconcileReport> {
        let mut conn = self.pool.lease()?;
        conn.set_dry(self.dry);
        if self.dry {
            self.pool.clear_cache();
        }

        let mut report = ReconcileReport::new(self.pool.name(), self.dry);
        let mut result = Ok(());
        for table in tables {
            result = self.reconcile_table(&mut conn, table, &mut report);
            if result.is_err() {
                break;
            }
        }

        if self.dry {
            self.pool.clear_cache();
        }
        result.map(|()| report)
    }

    fn reconcile_table(
        &self,
        conn: &mut Connection,
        table: &TableSpec,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let added_before = report.fields_added;
        let altered_before = report.fields_altered;
        let mut simulated = false;

        let mut passes = 0;
        loop {
            if passes == self.max_passes {
                return Err(DbError::NotConverged {
                    pool: self.pool.name().to_string(),
                    table: table.name().to_string(),
                    passes,
                });
            }
            passes += 1;
            let pass = self.run_pass(conn, table, report, &mut simulated)?;
            debug!(pool = %self.pool.name(), table = %table.name(), pass = passes, changes = pass.changes, "reconcile pass");
            if pass.changes == 0 {
                report.fields_unchanged += pass.unchanged;
                break;
            }
        }
        report.passes += passes;

        let added = report.fields_added - added_before;
        let altered = report.fields_altered - altered_before;
        report.messages.push(if added + altered == 0 {
            "No fields need changes.".to_string()
        } else {
            format!("Added {added} field(s), and modified {altered} field(s)")
        });
        Ok(())
    }

    fn run_pass(
        &self,
        conn: &mut Connection,
        table: &TableSpec,
        report: &mut ReconcileReport,
        simulated: &mut bool,
    ) -> Result<Pass> {
        let driver = self.pool.driver();
        let Some(first) = table.fields().first() else {
            return Ok(Pass::default());
        };

        let Some(mut live) = self.pool.live_table(conn, table.name())? else {
            let first = filled(first)?;
            report
                .messages
                .push(format!("Creating table: {}:{} ..", self.pool.name(), table.name()));
            let created = LiveTable {
                name: table.name().to_string(),
                definition: (driver == Driver::Sqlite).then(|| StoredDefinition {
                    columns: vec![(first.name().to_string(), driver.column_definition(&first))],
                    ..StoredDefinition::default()
                }),
                fields: vec![first.clone()],
            };
            let sql = driver.create_table_sql(table.name(), &first);
            *simulated |= self.dry;
            self.apply(conn, report, table.name(), first.name(), vec![sql], &created, simulated)?;
            report.tables_created += 1;
            return Ok(Pass {
                changes: 1,
                unchanged: 0,
            });
        };

        let mut pass = Pass::default();
        let mut after: Option<&str> = None;
        for field in table.fields() {
            let declared = filled(field)?;
            let next = match live.field(field.name()) {
                None => {
                    report.messages.push(format!(
                        "Adding field: {} {}",
                        declared.name(),
                        declared.describe()
                    ));
                    let (statements, patched) = if driver.can_add_column(&declared) {
                        let statements = driver.add_field_sql(table.name(), &declared, after)?;
                        // SQLite's ADD COLUMN always appends.
                        let placement = match driver {
                            Driver::MySql => Placement::Add { after },
                            Driver::Sqlite => Placement::Append,
                        };
                        (statements, patch_fields(&live, &declared, &placement, driver))
                    } else {
                        self.rebuild(&live, &declared, &Placement::Add { after })?
                    };
                    self.apply(conn, report, table.name(), declared.name(), statements, &patched, simulated)?;
                    report.fields_added += 1;
                    pass.changes += 1;
                    Some(patched)
                }
                Some(existing) => match check_field_needs_changes(existing, &declared)? {
                    None => {
                        pass.unchanged += 1;
                        None
                    }
                    Some(changes) => {
                        let list = changes.iter().map(ToString::to_string).collect::<Vec<_>>();
                        report.messages.push(format!(
                            "Changing field: {} {} -> {} [{}]",
                            declared.name(),
                            existing.describe(),
                            declared.describe(),
                            list.join(", ")
                        ));
                        let (statements, patched) = match driver {
                            Driver::MySql => (
                                driver.change_field_sql(table.name(), existing, &declared)?,
                                patch_fields(&live, &declared, &Placement::Replace, driver),
                            ),
                            Driver::Sqlite => self.rebuild(&live, &declared, &Placement::Replace)?,
                        };
                        self.apply(conn, report, table.name(), declared.name(), statements, &patched, simulated)?;
                        report.fields_altered += 1;
                        pass.changes += 1;
                        Some(patched)
                    }
                },
            };
            if let Some(patched) = next {
                live = patched;
            }

            // SQLite re-reads the table after every change.
            if pass.changes > 0 && driver == Driver::Sqlite {
                return Ok(pass);
            }
            after = Some(field.name());
        }
        Ok(pass)
    }

    /// SQLite table recreation carrying `declared` in its new form.
    fn rebuild(
        &self,
        live: &LiveTable,
        declared: &FieldSpec,
        placement: &Placement<'_>,
    ) -> Result<(Vec<String>, LiveTable)> {
        let driver = self.pool.driver();
        let definition = live.definition.clone().unwrap_or_default();
        let copy_columns = definition.column_names();
        let patched = patch_fields(live, declared, placement, driver);

        let mut columns: Vec<String> = patched
            .definition
            .iter()
            .flat_map(|d| d.columns.iter().map(|(_, ddl)| ddl.clone()))
            .collect();
        let mut constraints = definition.constraints.clone();
        if declared.is_primary() {
            constraints.retain(|c| !c.trim_start().to_ascii_uppercase().starts_with("PRIMARY"));
        }
        columns.extend(constraints);

        let mut statements = driver.rebuild_table_sql(live.name.as_str(), &columns, &copy_columns)?;
        statements.extend(definition.indexes.iter().cloned());
        info!(pool = %self.pool.name(), table = %live.name, field = %declared.name(), "rebuilding table");
        Ok((statements, patched))
    }

    fn apply(
        &self,
        conn: &mut Connection,
        report: &mut ReconcileReport,
        table: &str,
        field: &str,
        statements: Vec<String>,
        patched: &LiveTable,
        simulated: &mut bool,
    ) -> Result<()> {
        for sql in &statements {
            let outcome = if *simulated {
                conn.prepare_unchecked(sql).execute().map(|_| ())
            } else {
                conn.query(sql).map(|_| ())
            };
            if let Err(source) = outcome {
                if !self.dry {
                    self.pool.clear_cache();
                }
                return Err(DbError::Schema {
                    pool: self.pool.name().to_string(),
                    table: table.to_string(),
                    field: field.to_string(),
                    source: Box::new(source),
                });
            }
            let applied = conn.sql().unwrap_or(sql).to_string();
            info!(pool = %self.pool.name(), table, field, sql = %applied, dry = self.dry, "schema change");
            report.statements.push(applied);
            *simulated |= self.dry;
        }

        if self.dry {
            self.pool.patch_cache(patched.clone());
        } else {
            self.pool.clear_cache();
        }
        Ok(())
    }

    /// Compares one declared table with the database without changing it.
    pub fn check_table(&self, table: &TableSpec) -> Result<TableCheck> {
        let mut conn = self.pool.lease()?;
        let live = self.pool.live_table(&mut conn, table.name())?;

        let mut fields = Vec::with_capacity(table.len());
        for field in table.fields() {
            let declared = filled(field)?;
            let existing = live.as_ref().and_then(|l| l.field(field.name()));
            let status = match existing {
                None => FieldStatus::Missing,
                Some(existing) => match check_field_needs_changes(existing, &declared)? {
                    Some(changes) => FieldStatus::Changes(changes),
                    None => FieldStatus::Unchanged,
                },
            };
            fields.push(FieldCheck {
                name: declared.name().to_string(),
                declared: declared.describe(),
                existing: existing.map(FieldSpec::describe),
                status,
            });
        }

        Ok(TableCheck {
            table: table.name().to_string(),
            exists: live.is_some(),
            fields,
        })
    }
}

/// Locked, normalized copy of a declared field.
fn filled(field: &FieldSpec) -> Result<FieldSpec> {
    let mut field = field.duplicate();
    field.fill_keys_schema()?;
    field.lock();
    Ok(field)
}

/// `live` as it looks once `declared` is added or replaced.
fn patch_fields(
    live: &LiveTable,
    declared: &FieldSpec,
    placement: &Placement<'_>,
    driver: Driver,
) -> LiveTable {
    let mut patched = live.clone();
    let ddl = driver.column_definition(declared);
    let name = declared.name();

    match placement {
        Placement::Replace => {
            if let Some(slot) = patched
                .fields
                .iter_mut()
                .find(|f| f.name().eq_ignore_ascii_case(name))
            {
                *slot = declared.clone();
            }
            if let Some(definition) = patched.definition.as_mut() {
                if let Some(column) = definition
                    .columns
                    .iter_mut()
                    .find(|(c, _)| c.eq_ignore_ascii_case(name))
                {
                    column.1 = ddl;
                }
            }
        }
        Placement::Add { after } => {
            let field_at = after
                .and_then(|a| patched.fields.iter().position(|f| f.name().eq_ignore_ascii_case(a)))
                .map_or(0, |i| i + 1);
            patched.fields.insert(field_at, declared.clone());
            if let Some(definition) = patched.definition.as_mut() {
                let column_at = after
                    .and_then(|a| definition.columns.iter().position(|(c, _)| c.eq_ignore_ascii_case(a)))
                    .map_or(0, |i| i + 1);
                definition.columns.insert(column_at, (name.to_string(), ddl));
            }
        }
        Placement::Append => {
            patched.fields.push(declared.clone());
            if let Some(definition) = patched.definition.as_mut() {
                definition.columns.push((name.to_string(), ddl));
            }
        }
    }
    patched
}
