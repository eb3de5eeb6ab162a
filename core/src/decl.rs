//! Serializable table declarations.
//!
//! [`TableDecl`] and [`FieldDecl`] are the unvalidated, plain-data form of a
//! schema as it appears in pool configuration files or in a
//! [`TableSchema`](crate::TableSchema) implementation. Converting them with
//! [`TableDecl::to_spec`] produces a validated, filled and locked
//! [`TableSpec`].
//!
//! # Example YAML
//!
//! ```yaml
//! name: users
//! fields:
//!   - { name: id, type: increment }
//!   - { name: email, type: varchar, size: 190, unique: true }
//!   - { name: balance, type: decimal, size: "12,2" }
//!   - { name: active, type: bool, nullable: true, default: true }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::FieldSpec;
use crate::table::TableSpec;
use crate::validate::ValidationError;

/// A literal from a declaration file: sizes and defaults may be written as
/// numbers, booleans or strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Declaration of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// Type name, or `increment` for an auto-increment key.
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Scalar>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub increment: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            size: None,
            nullable: None,
            default: None,
            increment: false,
            primary: false,
            unique: false,
        }
    }

    pub fn size(mut self, size: impl Into<Scalar>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn default_value(mut self, value: impl Into<Scalar>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Builds the unlocked, unfilled spec.
    pub fn to_spec(&self) -> Result<FieldSpec> {
        let mut spec = FieldSpec::new(&self.name, &self.field_type)?;
        spec.set_size(self.size.as_ref().map(Scalar::to_string))?
            .set_nullable(self.nullable)?
            .set_default(self.default.as_ref().map(Scalar::to_string))?
            .set_primary(self.primary)?
            .set_unique(self.unique)?;
        if self.increment {
            spec.set_increment(true)?;
        }
        spec.validate_keys()?;
        Ok(spec)
    }
}

/// Declaration of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDecl {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl TableDecl {
    /// Validates, fills (`fill_keys_schema`) and locks every field.
    pub fn to_spec(&self) -> Result<TableSpec> {
        let mut table = TableSpec::new(&self.name)?;
        if self.fields.is_empty() {
            return Err(ValidationError::EmptyTable(self.name.clone()).into());
        }
        for decl in &self.fields {
            let mut field = decl.to_spec()?;
            field.fill_keys_schema()?.lock();
            table.add_field(field)?;
        }
        Ok(table)
    }
}
