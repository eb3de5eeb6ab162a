//! Reading the live schema back from a database.
//!
//! Each driver has a [`SchemaIntrospector`]. MySQL answers `DESCRIBE` with
//! one row per column. SQLite only keeps the original `CREATE TABLE` text,
//! so its introspector parses that statement and also keeps the raw column
//! definitions, which table rebuilds reuse verbatim.
//!
//! Table names are reported without the pool prefix. Tables and columns
//! whose name starts with `_` are internal and never reported.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use pxdb_core::{Driver, FieldSpec, FieldType, TABLE_TOKEN, quote_literal};
use regex::Regex;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{DbError, Result};
use crate::value::Value;

/// A table as it exists in the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTable {
    pub name: String,
    /// Locked specs in column order, internal columns excluded.
    pub fields: Vec<FieldSpec>,
    /// Stored definition, SQLite only.
    pub definition: Option<StoredDefinition>,
}

impl LiveTable {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(FieldSpec::name).collect()
    }
}

/// Raw pieces of a SQLite `CREATE TABLE` statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredDefinition {
    /// `(column, definition)` pairs in order, internal columns included.
    pub columns: Vec<(String, String)>,
    /// Table-level constraints such as `PRIMARY KEY (a, b)`.
    pub constraints: Vec<String>,
    /// `CREATE INDEX` statements attached to the table.
    pub indexes: Vec<String>,
}

impl StoredDefinition {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Reads table names and column metadata from a live connection.
pub trait SchemaIntrospector: Send + Sync {
    /// Unprefixed names of every table the pool owns.
    fn list_tables(&self, conn: &mut Connection) -> Result<Vec<String>>;

    /// Columns of `table`, or `None` when it does not exist.
    fn describe_table(&self, conn: &mut Connection, table: &str) -> Result<Option<LiveTable>>;
}

/// Introspector matching a driver.
pub fn introspector_for(driver: Driver) -> Box<dyn SchemaIntrospector> {
    match driver {
        Driver::MySql => Box::new(MySqlIntrospector),
        Driver::Sqlite => Box::new(SqliteIntrospector),
    }
}

fn list_prefixed_tables(conn: &mut Connection) -> Result<Vec<String>> {
    let prefix = conn.prefix().to_string();
    let query = conn.driver().table_list_query();
    conn.query(query)?;

    let mut tables = Vec::new();
    while conn.has_next() {
        let Some(name) = conn.row().and_then(|r| r.get_index(0)).and_then(Value::to_text) else {
            continue;
        };
        let Some(bare) = name.strip_prefix(&prefix) else {
            continue;
        };
        if bare.is_empty() || bare.starts_with('_') || bare.starts_with("sqlite_") {
            continue;
        }
        tables.push(bare.to_string());
    }
    tables.sort();
    Ok(tables)
}

fn finish_field(mut field: FieldSpec) -> Result<FieldSpec> {
    field.fill_keys_existing()?;
    field.lock();
    Ok(field)
}

// ---------------------------------------------------------------------------
// MySQL
// ---------------------------------------------------------------------------

static MYSQL_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)(?:\((.*)\))?").expect("static regex must compile"));

/// Introspection through `SHOW TABLES` and `DESCRIBE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlIntrospector;

impl SchemaIntrospector for MySqlIntrospector {
    fn list_tables(&self, conn: &mut Connection) -> Result<Vec<String>> {
        list_prefixed_tables(conn)
    }

    fn describe_table(&self, conn: &mut Connection, table: &str) -> Result<Option<LiveTable>> {
        if !self.list_tables(conn)?.iter().any(|t| t == table) {
            return Ok(None);
        }

        conn.query(&Driver::MySql.column_list_query(table))?;
        let mut fields = Vec::new();
        while conn.has_next() {
            let column = |name: &str| conn.get_string(name);
            let Some(name) = column("Field") else {
                continue;
            };
            if name.starts_with('_') {
                continue;
            }
            let type_text = column("Type").unwrap_or_default();
            let field = parse_mysql_column(
                table,
                &name,
                &type_text,
                column("Null").as_deref() == Some("YES"),
                column("Key").unwrap_or_default().as_str(),
                column("Default"),
                column("Extra").unwrap_or_default().as_str(),
            )?;
            fields.push(finish_field(field)?);
        }
        debug!(table, fields = fields.len(), "described mysql table");

        Ok(Some(LiveTable {
            name: table.to_string(),
            fields,
            definition: None,
        }))
    }
}

fn parse_mysql_column(
    table: &str,
    name: &str,
    type_text: &str,
    nullable: bool,
    key: &str,
    default: Option<String>,
    extra: &str,
) -> Result<FieldSpec> {
    let unparsable = || DbError::SchemaParse {
        table: table.to_string(),
        fragment: format!("{name} {type_text}"),
    };
    let caps = MYSQL_TYPE_RE.captures(type_text.trim()).ok_or_else(unparsable)?;
    let base = caps.get(1).map_or("", |m| m.as_str());
    let size = caps.get(2).map(|m| m.as_str().to_string());

    let (field_type, size) = if base.eq_ignore_ascii_case("tinyint") && size.as_deref() == Some("1") {
        (FieldType::Bool, size)
    } else {
        let ty = base.parse::<FieldType>().map_err(|_| unparsable())?;
        (ty, size.filter(|_| ty.has_size()))
    };

    let mut field = FieldSpec::with_type(name, field_type)?;
    field
        .set_size(size)?
        .set_nullable(Some(nullable))?
        .set_default(default)?
        .set_primary(key == "PRI")?
        .set_unique(key == "UNI")?
        .set_increment(extra.to_ascii_lowercase().contains("auto_increment"))?;
    Ok(field)
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Introspection through `sqlite_master`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteIntrospector;

impl SchemaIntrospector for SqliteIntrospector {
    fn list_tables(&self, conn: &mut Connection) -> Result<Vec<String>> {
        list_prefixed_tables(conn)
    }

    fn describe_table(&self, conn: &mut Connection, table: &str) -> Result<Option<LiveTable>> {
        conn.query(&Driver::Sqlite.column_list_query(table))?;
        if !conn.has_next() {
            return Ok(None);
        }
        let sql = conn.get_string("sql").unwrap_or_default();

        conn.query(&format!(
            "SELECT sql FROM sqlite_master WHERE type='index' AND tbl_name={} AND sql IS NOT NULL",
            quote_literal(&format!("{TABLE_TOKEN}{table}"))
        ))?;
        let mut indexes = Vec::new();
        while conn.has_next() {
            if let Some(index) = conn.get_string("sql") {
                indexes.push(index);
            }
        }

        let mut live = parse_create_table(table, &sql)?;
        if let Some(definition) = live.definition.as_mut() {
            definition.indexes = indexes;
        }
        debug!(table, fields = live.fields.len(), "described sqlite table");
        Ok(Some(live))
    }
}

/// Parses a stored `CREATE TABLE` statement.
///
/// # Errors
///
/// [`DbError::SchemaParse`] naming the first column or constraint that
/// could not be understood.
pub fn parse_create_table(table: &str, sql: &str) -> Result<LiveTable> {
    let unparsable = |fragment: &str| DbError::SchemaParse {
        table: table.to_string(),
        fragment: fragment.to_string(),
    };
    let (Some(open), Some(close)) = (sql.find('('), sql.rfind(')')) else {
        return Err(unparsable(sql));
    };
    if close <= open {
        return Err(unparsable(sql));
    }

    let mut definition = StoredDefinition::default();
    let mut fields = Vec::new();
    let mut table_primary: Vec<String> = Vec::new();

    for part in split_top_level(&sql[open + 1..close]) {
        let tokens = tokenize(&part);
        match tokens.first() {
            Some(Token::Word(word)) if is_table_constraint(word) => {
                if let [Token::Word(primary), Token::Word(key), Token::Group(cols), ..] = tokens.as_slice() {
                    if primary.eq_ignore_ascii_case("PRIMARY") && key.eq_ignore_ascii_case("KEY") {
                        table_primary.extend(cols.split(',').map(|c| unquote(c.trim())));
                    }
                }
                definition.constraints.push(part);
            }
            Some(Token::Word(name) | Token::Ident(name)) => {
                let name = name.clone();
                definition.columns.push((name.clone(), part.clone()));
                if name.starts_with('_') {
                    continue;
                }
                let field = parse_sqlite_column(&name, &tokens[1..]).ok_or_else(|| unparsable(&part))?;
                fields.push(field);
            }
            _ => return Err(unparsable(&part)),
        }
    }

    let mut locked = Vec::with_capacity(fields.len());
    for mut field in fields {
        if table_primary.iter().any(|c| c.eq_ignore_ascii_case(field.name())) {
            field.set_primary(true)?;
        }
        locked.push(finish_field(field)?);
    }

    Ok(LiveTable {
        name: table.to_string(),
        fields: locked,
        definition: Some(definition),
    })
}

fn is_table_constraint(word: &str) -> bool {
    ["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"]
        .iter()
        .any(|k| k.eq_ignore_ascii_case(word))
}

fn is_column_constraint(word: &str) -> bool {
    [
        "CONSTRAINT", "PRIMARY", "NOT", "NULL", "UNIQUE", "DEFAULT", "COLLATE", "CHECK",
        "REFERENCES", "GENERATED", "AS",
    ]
    .iter()
    .any(|k| k.eq_ignore_ascii_case(word))
}

fn sqlite_type(words: &[String], size: Option<String>) -> Option<(FieldType, Option<String>)> {
    let base = words.first()?.to_ascii_uppercase();
    let ty = match base.as_str() {
        "TINYINT" if size.as_deref() == Some("1") => FieldType::Bool,
        "BOOL" | "BOOLEAN" => return Some((FieldType::Bool, Some("1".to_string()))),
        other => other.parse::<FieldType>().ok()?,
    };
    Some((ty, size.filter(|_| ty.has_size())))
}

/// Builds an unlocked spec from the tokens following the column name.
fn parse_sqlite_column(name: &str, tokens: &[Token]) -> Option<FieldSpec> {
    let mut i = 0;
    let mut type_words = Vec::new();
    while let Some(token) = tokens.get(i) {
        match token {
            Token::Word(w) if !is_column_constraint(w) => type_words.push(w.clone()),
            Token::Ident(w) if type_words.is_empty() => type_words.push(w.clone()),
            _ => break,
        }
        i += 1;
    }
    let mut size = None;
    if let Some(Token::Group(group)) = tokens.get(i) {
        size = Some(group.trim().to_string());
        i += 1;
    }
    let (field_type, size) = sqlite_type(&type_words, size)?;

    let mut field = FieldSpec::with_type(name, field_type).ok()?;
    field.set_size(size).ok()?;
    let mut nullable = None;
    let mut default = None;
    let mut primary = false;
    let mut increment = false;
    let mut unique = false;

    while let Some(token) = tokens.get(i) {
        i += 1;
        let Token::Word(word) = token else {
            return None;
        };
        match word.to_ascii_uppercase().as_str() {
            "PRIMARY" => {
                if !matches!(tokens.get(i), Some(Token::Word(w)) if w.eq_ignore_ascii_case("KEY")) {
                    return None;
                }
                i += 1;
                primary = true;
                while let Some(Token::Word(w)) = tokens.get(i) {
                    match w.to_ascii_uppercase().as_str() {
                        "ASC" | "DESC" => {}
                        "AUTOINCREMENT" => increment = true,
                        _ => break,
                    }
                    i += 1;
                }
            }
            "NOT" => {
                if !matches!(tokens.get(i), Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL")) {
                    return None;
                }
                i += 1;
                nullable = Some(false);
            }
            "NULL" => nullable = Some(true),
            "UNIQUE" => unique = true,
            "DEFAULT" => {
                let (value, used) = default_value(&tokens[i..])?;
                default = value;
                i += used;
            }
            "COLLATE" | "CONSTRAINT" => i += 1,
            "CHECK" => {
                if matches!(tokens.get(i), Some(Token::Group(_))) {
                    i += 1;
                }
            }
            "ON" => {
                // ON CONFLICT <resolution>
                i += 2;
            }
            "REFERENCES" => break,
            _ => return None,
        }
    }

    if nullable.is_none() {
        nullable = Some(!primary);
    }
    field
        .set_nullable(nullable)
        .and_then(|f| f.set_default(default))
        .and_then(|f| f.set_primary(primary))
        .and_then(|f| f.set_increment(increment))
        .and_then(|f| f.set_unique(unique))
        .ok()?;
    Some(field)
}

/// Value after `DEFAULT` and the number of tokens it spans.
fn default_value(tokens: &[Token]) -> Option<(Option<String>, usize)> {
    match tokens.first()? {
        Token::Str(s) => Some((Some(s.clone()), 1)),
        Token::Word(w) if w.eq_ignore_ascii_case("NULL") => Some((None, 1)),
        Token::Word(w) => Some((Some(w.clone()), 1)),
        Token::Group(g) => Some((Some(unquote(g.trim())), 1)),
        Token::Other(sign @ ('-' | '+')) => match tokens.get(1)? {
            Token::Word(n) => {
                let value = if *sign == '-' { format!("-{n}") } else { n.clone() };
                Some((Some(value), 2))
            }
            _ => None,
        },
        _ => None,
    }
}

fn unquote(s: &str) -> String {
    let quoted = s.len() >= 2
        && matches!(
            (s.chars().next(), s.chars().last()),
            (Some('\''), Some('\'')) | (Some('"'), Some('"')) | (Some('`'), Some('`')) | (Some('['), Some(']'))
        );
    if quoted {
        s[1..s.len() - 1].replace("''", "'")
    } else {
        s.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Bare word or number.
    Word(String),
    /// Quoted identifier, quotes removed.
    Ident(String),
    /// String literal, quotes removed.
    Str(String),
    /// Parenthesized text, parentheses removed.
    Group(String),
    Other(char),
}

fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_alphanumeric() || c == '_' || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else if c == '\'' {
            let (s, next) = read_quoted(&chars, i, '\'');
            tokens.push(Token::Str(s));
            i = next;
        } else if c == '"' || c == '`' || c == '[' {
            let close = if c == '[' { ']' } else { c };
            let (s, next) = read_quoted(&chars, i, close);
            tokens.push(Token::Ident(s));
            i = next;
        } else if c == '(' {
            let start = i + 1;
            let mut depth = 0usize;
            let mut quote = None;
            while i < chars.len() {
                let ch = chars[i];
                match quote {
                    Some(q) if ch == q => quote = None,
                    Some(_) => {}
                    None => match ch {
                        '\'' | '"' | '`' => quote = Some(ch),
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    },
                }
                i += 1;
            }
            let end = i.min(chars.len());
            tokens.push(Token::Group(chars[start..end].iter().collect()));
            i = end + 1;
        } else {
            tokens.push(Token::Other(c));
            i += 1;
        }
    }
    tokens
}

/// Reads a quoted run starting at `start`; a doubled closing quote escapes it.
fn read_quoted(chars: &[char], start: usize, close: char) -> (String, usize) {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == close {
            if chars.get(i + 1) == Some(&close) && close != ']' {
                out.push(close);
                i += 2;
                continue;
            }
            return (out, i + 1);
        }
        out.push(chars[i]);
        i += 1;
    }
    (out, i)
}

/// Splits on commas outside parentheses and quotes.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in body.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
                continue;
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                    continue;
                }
                _ => {}
            },
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Per-pool cache of the live schema.
///
/// Empty until first read. Listed tables start as `None` entries and are
/// described on first access.
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: Option<BTreeMap<String, Option<LiveTable>>>,
}

impl SchemaCache {
    pub fn is_loaded(&self) -> bool {
        self.tables.is_some()
    }

    pub fn clear(&mut self) {
        self.tables = None;
    }

    /// Table names, loading the list on first use.
    pub fn table_names(
        &mut self,
        introspector: &dyn SchemaIntrospector,
        conn: &mut Connection,
    ) -> Result<Vec<String>> {
        if self.tables.is_none() {
            let names = introspector.list_tables(conn)?;
            self.tables = Some(names.into_iter().map(|n| (n, None)).collect());
        }
        Ok(self
            .tables
            .iter()
            .flat_map(|tables| tables.keys().cloned())
            .collect())
    }

    /// One table, describing it on first use; `None` when absent.
    pub fn table(
        &mut self,
        introspector: &dyn SchemaIntrospector,
        conn: &mut Connection,
        name: &str,
    ) -> Result<Option<LiveTable>> {
        let names = self.table_names(introspector, conn)?;
        if !names.iter().any(|n| n == name) {
            return Ok(None);
        }
        let tables = self.tables.get_or_insert_with(BTreeMap::new);
        if let Some(Some(table)) = tables.get(name) {
            return Ok(Some(table.clone()));
        }
        let live = introspector.describe_table(conn, name)?;
        tables.insert(name.to_string(), live.clone());
        Ok(live)
    }

    /// Replaces the cached entry for one table.
    pub fn patch(&mut self, table: LiveTable) {
        let tables = self.tables.get_or_insert_with(BTreeMap::new);
        tables.insert(table.name.clone(), Some(table));
    }
}
