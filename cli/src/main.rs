use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use pxdb_config::ConfigError;
use pxdb_core::SpecError;
use pxdb_sql::{
    DbError, FieldStatus, Pool, PoolRegistry, SchemaReconciler, export_table, import_table,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const EXIT_OTHER: i32 = 1;
const EXIT_USAGE: i32 = 64;
const EXIT_VALIDATION: i32 = 65;
const EXIT_CONFIG: i32 = 78;

/// Selects every pool or every table.
const WILDCARDS: [&str; 2] = ["*", "all"];

#[derive(Debug, Parser)]
#[command(name = "pxdb", version)]
#[command(about = "List, check and update database schemas declared in pool configs")]
struct Cli {
    /// Directory holding one configuration file per pool.
    #[arg(long, global = true, env = "PXDB_CONFIG", default_value = "db")]
    config: PathBuf,
    /// Log SQL statements and schema actions to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List tables and whether they exist in the database.
    List(ListArgs),
    /// Compare declared tables with the database without changing it.
    Check(CheckArgs),
    /// Create missing tables and add or change fields. Dry unless --confirm.
    Update(TargetArgs),
    /// Insert rows from an export file. Dry unless --confirm.
    Import(TransferArgs),
    /// Write every row of a table to an export file.
    Export(TransferArgs),
}

/// Table selection shared by every subcommand.
#[derive(Debug, Args)]
struct TargetArgs {
    /// Tables as `[pool:]table`; `*` or `all` selects every pool or table.
    targets: Vec<String>,
    /// Pool to operate on.
    #[arg(short, long)]
    pool: Option<String>,
    /// Table to operate on.
    #[arg(short, long)]
    table: Option<String>,
    /// Report what would change without changing anything.
    #[arg(short = 'D', long)]
    dry: bool,
    /// Apply changes; overrides --dry.
    #[arg(long)]
    confirm: bool,
}

impl TargetArgs {
    fn is_dry(&self, default: bool) -> bool {
        if self.confirm {
            false
        } else if self.dry {
            true
        } else {
            default
        }
    }
}

#[derive(Debug, Args)]
struct ListArgs {
    #[command(flatten)]
    targets: TargetArgs,
    /// Print the live fields of each table.
    #[arg(short = 'f', long)]
    show_fields: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[command(flatten)]
    targets: TargetArgs,
    /// Only report which tables need changes.
    #[arg(short = 'F', long)]
    no_fields: bool,
}

#[derive(Debug, Args)]
struct TransferArgs {
    #[command(flatten)]
    targets: TargetArgs,
    /// Export file; a directory when more than one table is selected.
    #[arg(long)]
    file: PathBuf,
}

/// Error carrying the process exit code it maps to.
#[derive(Debug)]
enum CliError {
    Config(String),
    Usage(String),
    Validation(String),
    Other(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::Usage(_) => EXIT_USAGE,
            Self::Validation(_) => EXIT_VALIDATION,
            Self::Other(_) => EXIT_OTHER,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) | Self::Usage(msg) | Self::Validation(msg) | Self::Other(msg) => {
                f.write_str(msg)
            }
        }
    }
}

impl From<DbError> for CliError {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::Config(ConfigError::UnknownPool(_)) => Self::Usage(err.to_string()),
            DbError::Config(ConfigError::InvalidPool {
                source: SpecError::Validation(_),
                ..
            }) => Self::Validation(err.to_string()),
            DbError::Config(_) => Self::Config(err.to_string()),
            DbError::Spec(SpecError::Validation(_)) => Self::Validation(err.to_string()),
            _ => Self::Other(err.to_string()),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = PoolRegistry::load_all(&cli.config)
        .map_err(CliError::from)
        .and_then(|registry| match cli.command {
            Command::List(args) => run_list(&registry, args),
            Command::Check(args) => run_check(&registry, args),
            Command::Update(args) => run_update(&registry, args),
            Command::Import(args) => run_import(&registry, args),
            Command::Export(args) => run_export(&registry, args),
        });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: could not install logger: {err}");
    }
}

// ---------------------------------------------------------------------------
// Target selection
// ---------------------------------------------------------------------------

/// One `pool:table` pair the command runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    pool: String,
    table: String,
}

/// A `[pool:]table` argument before wildcards are expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector {
    pool: Option<String>,
    table: Option<String>,
}

fn is_wildcard(raw: &str) -> bool {
    raw.is_empty() || WILDCARDS.iter().any(|w| raw.eq_ignore_ascii_case(w))
}

fn named(raw: &str) -> Option<String> {
    if is_wildcard(raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Parses `table`, `pool:table`, `pool:`, `*:table` and `*`.
///
/// A bare table name belongs to the default pool, while a bare wildcard
/// selects every pool.
fn parse_selector(raw: &str, default_pool: &str) -> Selector {
    match raw.split_once(':') {
        Some((pool, table)) => Selector {
            pool: named(pool),
            table: named(table),
        },
        None if is_wildcard(raw) => Selector {
            pool: None,
            table: None,
        },
        None => Selector {
            pool: Some(default_pool.to_string()),
            table: Some(raw.to_string()),
        },
    }
}

/// Collects the selectors named on the command line.
///
/// Returns an empty list when nothing was named.
fn selectors(args: &TargetArgs, default_pool: &str) -> Vec<Selector> {
    let mut out: Vec<Selector> = args
        .targets
        .iter()
        .map(|raw| parse_selector(raw, default_pool))
        .collect();
    if args.pool.is_some() || args.table.is_some() {
        let pool = match &args.pool {
            Some(pool) => named(pool),
            None => Some(default_pool.to_string()),
        };
        out.push(Selector {
            pool,
            table: args.table.as_deref().and_then(named),
        });
    }
    out
}

/// Expands selectors against the declared tables of each pool.
///
/// A named table is kept even when its pool declares no schema for it, so
/// `list` and `export` can reach undeclared tables.
fn expand(registry: &PoolRegistry, selectors: &[Selector]) -> Result<Vec<Target>, CliError> {
    let mut targets: Vec<Target> = Vec::new();
    let mut push = |target: Target| {
        if !targets.contains(&target) {
            targets.push(target);
        }
    };

    for selector in selectors {
        let pools: Vec<&Pool> = match &selector.pool {
            Some(name) => vec![registry.get_pool(name)?],
            None => registry.pools().iter().collect(),
        };
        for pool in pools {
            match &selector.table {
                Some(table) if selector.pool.is_some() || pool.table_schema(table).is_some() => {
                    push(Target {
                        pool: pool.name().to_string(),
                        table: table.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    for spec in pool.table_schemas() {
                        push(Target {
                            pool: pool.name().to_string(),
                            table: spec.name().to_string(),
                        });
                    }
                }
            }
        }
    }
    Ok(targets)
}

/// Resolves the tables a command runs on.
///
/// With no selection, `default_all` picks every declared table of every
/// pool; otherwise a missing selection is a usage error.
fn resolve_targets(
    registry: &PoolRegistry,
    args: &TargetArgs,
    cmd: &str,
    default_all: bool,
) -> Result<(Vec<Target>, String), CliError> {
    if registry.pools().is_empty() {
        return Err(CliError::Config("no database pools configured".to_string()));
    }
    let mut selected = selectors(args, registry.default_pool_name());
    if selected.is_empty() {
        if !default_all {
            return Err(CliError::Usage(format!(
                "{cmd} needs a [pool:]table argument, --pool or --table"
            )));
        }
        selected.push(Selector {
            pool: None,
            table: None,
        });
    }
    let header = header_line(cmd, &selected);
    Ok((expand(registry, &selected)?, header))
}

fn header_line(cmd: &str, selected: &[Selector]) -> String {
    let (pool, table) = match selected {
        [one] => (
            one.pool.as_deref().unwrap_or("-all-"),
            one.table.as_deref().unwrap_or("-all-"),
        ),
        _ => ("-all-", "-all-"),
    };
    format!(" Cmd: {cmd}  Pool: {pool}  Table: {table}")
}

/// Runs `once` for every target, printing the header and the final count.
fn for_each_target(
    cmd: &str,
    header: &str,
    targets: &[Target],
    dry: bool,
    mut once: impl FnMut(&Target) -> Result<(), CliError>,
) -> Result<(), CliError> {
    if dry {
        println!(" [Dry Mode]");
    }
    println!("{header}");
    println!();

    for (count, target) in targets.iter().enumerate() {
        if let Err(err) = once(target) {
            println!();
            println!(" Ran {cmd} on {count} tables, then failed!");
            return Err(err);
        }
    }
    println!();
    println!(" Ran {cmd} on {} tables", targets.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// list / check
// ---------------------------------------------------------------------------

fn run_list(registry: &PoolRegistry, args: ListArgs) -> Result<(), CliError> {
    let (targets, header) = resolve_targets(registry, &args.targets, "list", true)?;

    for_each_target("list", &header, &targets, false, |target| {
        let pool = registry.get_pool(&target.pool)?;
        let mut conn = pool.lease()?;
        let live = pool.live_table(&mut conn, &target.table)?;
        let Some(live) = live else {
            println!("<MISSING> {}:{}", target.pool, target.table);
            return Ok(());
        };
        println!(
            "<found> {}:{}  Fields: {}",
            target.pool,
            target.table,
            live.fields.len()
        );
        if args.show_fields {
            let rows: Vec<[String; 3]> = live
                .fields
                .iter()
                .map(|field| {
                    [
                        column_type(field.field_type().as_str(), field.size()),
                        field.name().to_string(),
                        field.describe(),
                    ]
                })
                .collect();
            print_table(["Type", "Name", "Definition"], &rows);
        }
        Ok(())
    })
}

fn run_check(registry: &PoolRegistry, args: CheckArgs) -> Result<(), CliError> {
    let (targets, header) = resolve_targets(registry, &args.targets, "check", true)?;

    for_each_target("check", &header, &targets, false, |target| {
        let pool = registry.get_pool(&target.pool)?;
        let spec = declared(pool, &target.table)?;
        let check = SchemaReconciler::new(pool).check_table(spec)?;
        if !check.exists {
            println!("<MISSING> {}:{}", target.pool, target.table);
            return Ok(());
        }
        let needed = check
            .fields
            .iter()
            .filter(|f| f.status != FieldStatus::Unchanged)
            .count();
        println!(
            "<found> {}:{}  Fields: {}  Changes: {needed}",
            target.pool,
            target.table,
            check.fields.len()
        );
        if !args.no_fields {
            let rows: Vec<[String; 3]> = spec
                .fields()
                .iter()
                .zip(&check.fields)
                .map(|(field, status)| {
                    let changes = match &status.status {
                        FieldStatus::Missing => "MISSING".to_string(),
                        FieldStatus::Changes(changes) => changes
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                        FieldStatus::Unchanged => String::new(),
                    };
                    let kind = field.field_type();
                    [
                        column_type(kind.as_str(), field.size().or(kind.default_size())),
                        status.name.clone(),
                        changes,
                    ]
                })
                .collect();
            print_table(["Type", "Name", "Changes Needed"], &rows);
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

fn run_update(registry: &PoolRegistry, args: TargetArgs) -> Result<(), CliError> {
    let dry = args.is_dry(true);
    let (targets, header) = resolve_targets(registry, &args, "update", false)?;
    let prefix = dry_prefix(dry);

    for_each_target("update", &header, &targets, dry, |target| {
        let pool = registry.get_pool(&target.pool)?;
        let spec = declared(pool, &target.table)?;
        let report = SchemaReconciler::new(pool)
            .dry_run(dry)
            .reconcile(std::slice::from_ref(spec))?;
        for line in &report.messages {
            println!("{prefix}{line}");
        }
        Ok(())
    })?;

    if dry {
        println!(" Nothing was changed; run again with --confirm to apply.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// import / export
// ---------------------------------------------------------------------------

fn run_export(registry: &PoolRegistry, args: TransferArgs) -> Result<(), CliError> {
    let dry = args.targets.is_dry(false);
    let (targets, header) = resolve_targets(registry, &args.targets, "export", false)?;
    let multiple = targets.len() > 1;
    if multiple && !dry {
        std::fs::create_dir_all(&args.file).map_err(|e| {
            CliError::Other(format!(
                "failed to create directory '{}': {e}",
                args.file.display()
            ))
        })?;
    }
    let prefix = dry_prefix(dry);

    for_each_target("export", &header, &targets, dry, |target| {
        let pool = registry.get_pool(&target.pool)?;
        let path = transfer_path(&args.file, target, multiple);
        let export = export_table(pool, &target.table, &path, dry)?;
        println!(
            "{prefix}Exported {} rows from {}:{} to {}",
            export.rows.len(),
            target.pool,
            target.table,
            path.display()
        );
        Ok(())
    })
}

fn run_import(registry: &PoolRegistry, args: TransferArgs) -> Result<(), CliError> {
    let dry = args.targets.is_dry(true);
    let (targets, header) = resolve_targets(registry, &args.targets, "import", false)?;
    let multiple = targets.len() > 1;
    let prefix = dry_prefix(dry);

    for_each_target("import", &header, &targets, dry, |target| {
        let pool = registry.get_pool(&target.pool)?;
        let path = transfer_path(&args.file, target, multiple);
        let count = import_table(pool, &target.table, &path, dry)?;
        println!(
            "{prefix}Imported {count} rows into {}:{} from {}",
            target.pool,
            target.table,
            path.display()
        );
        Ok(())
    })
}

/// `file` itself for one table, `<file>/<pool>.<table>.json` for several.
fn transfer_path(file: &Path, target: &Target, multiple: bool) -> PathBuf {
    if multiple {
        file.join(format!("{}.{}.json", target.pool, target.table))
    } else {
        file.to_path_buf()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn declared<'p>(pool: &'p Pool, table: &str) -> Result<&'p pxdb_core::TableSpec, CliError> {
    pool.table_schema(table).ok_or_else(|| {
        CliError::Usage(format!(
            "no schema declared for {}:{table}",
            pool.name()
        ))
    })
}

fn dry_prefix(dry: bool) -> &'static str {
    if dry { "[DRY] " } else { "" }
}

/// `varchar(64)`, or the bare type name when there is no size.
fn column_type(type_name: &str, size: Option<&str>) -> String {
    match size {
        Some(size) if !size.is_empty() => format!("{type_name}({size})"),
        _ => type_name.to_string(),
    }
}

/// Left-aligned columns with a dashed rule under the heading.
fn format_table(heading: [&str; 3], rows: &[[String; 3]]) -> Vec<String> {
    let mut widths = heading.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: [&str; 3]| {
        let text = format!(
            "  {:w0$}  {:w1$}  {}",
            cells[0],
            cells[1],
            cells[2],
            w0 = widths[0],
            w1 = widths[1]
        );
        text.trim_end().to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(heading));
    out.push(line(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)));
    for row in rows {
        out.push(line(row.each_ref().map(String::as_str)));
    }
    out
}

fn print_table(heading: [&str; 3], rows: &[[String; 3]]) {
    for line in format_table(heading, rows) {
        println!("{line}");
    }
    println!();
}
