//! Column specifications.
//!
//! A [`FieldSpec`] moves through a fixed lifecycle: it is constructed by
//! schema-declaring code (or by introspection), validated, normalized by one
//! of the two fill modes, and finally locked. A locked spec rejects every
//! mutation with [`SpecError::Locked`] before touching any state.
//!
//! # Examples
//!
//! ```
//! use pxdb_core::{FieldSpec, FieldType};
//!
//! let mut id = FieldSpec::new("id", "increment").unwrap();
//! id.fill_keys_schema().unwrap();
//! assert_eq!(id.field_type(), FieldType::Int);
//! assert!(id.is_primary());
//! assert_eq!(id.describe(), "int(11|NOT|NULL)");
//!
//! let mut name = FieldSpec::new("name", "varchar").unwrap();
//! name.fill_keys_schema().unwrap().lock();
//! assert_eq!(name.describe(), "varchar(255|NOT|'')");
//! assert!(name.set_size(Some("64")).is_err());
//! ```

use crate::error::{Result, SpecError};
use crate::types::FieldType;
use crate::validate::{ValidationError, validate_name, validate_size};

/// Describes one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    field_type: FieldType,
    size: Option<String>,
    nullable: Option<bool>,
    default: Option<String>,
    increment: bool,
    primary: bool,
    unique: bool,
    locked: bool,
}

impl FieldSpec {
    /// Creates an unlocked spec from a type name.
    ///
    /// The pseudo-type `increment` yields an auto-increment `int`.
    pub fn new(name: impl Into<String>, type_name: &str) -> Result<Self> {
        if type_name.trim().eq_ignore_ascii_case("increment") {
            let mut spec = Self::with_type(name, FieldType::Int)?;
            spec.increment = true;
            return Ok(spec);
        }
        let field_type = type_name.parse::<FieldType>()?;
        Self::with_type(name, field_type)
    }

    /// Creates an unlocked spec of the given type with every property unset.
    pub fn with_type(name: impl Into<String>, field_type: FieldType) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            field_type,
            size: None,
            nullable: None,
            default: None,
            increment: false,
            primary: false,
            unique: false,
            locked: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn size(&self) -> Option<&str> {
        self.size.as_deref()
    }

    /// `None` until a fill mode has run or a value was set explicitly.
    pub fn nullable(&self) -> Option<bool> {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn is_increment(&self) -> bool {
        self.increment
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_type(&mut self, field_type: FieldType) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        self.field_type = field_type;
        Ok(self)
    }

    /// Sets the size. Whitespace is stripped except inside enum/set value lists.
    pub fn set_size<S: Into<String>>(&mut self, size: Option<S>) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        self.size = size.map(Into::into).map(|s| {
            if self.field_type.requires_size() {
                s.trim().to_string()
            } else {
                s.split_whitespace().collect()
            }
        });
        Ok(self)
    }

    pub fn set_nullable(&mut self, nullable: Option<bool>) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        self.nullable = nullable;
        Ok(self)
    }

    pub fn set_default<S: Into<String>>(&mut self, default: Option<S>) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        self.default = default.map(Into::into);
        Ok(self)
    }

    pub fn set_increment(&mut self, increment: bool) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        self.increment = increment;
        Ok(self)
    }

    pub fn set_primary(&mut self, primary: bool) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        self.primary = primary;
        Ok(self)
    }

    pub fn set_unique(&mut self, unique: bool) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        self.unique = unique;
        Ok(self)
    }

    /// Finalizes the spec; every later mutation fails.
    pub fn lock(&mut self) -> &mut Self {
        self.locked = true;
        self
    }

    /// Returns an unlocked copy.
    pub fn duplicate(&self) -> Self {
        Self {
            locked: false,
            ..self.clone()
        }
    }

    /// Re-validates name, size and default against the field type.
    pub fn validate_keys(&self) -> std::result::Result<(), ValidationError> {
        validate_name(&self.name)?;
        match self.size.as_deref() {
            Some(size) => validate_size(&self.name, self.field_type, size)?,
            None if self.field_type.requires_size() => {
                return Err(ValidationError::MissingSize {
                    field: self.name.clone(),
                    field_type: self.field_type,
                });
            }
            None => {}
        }
        if let Some(value) = self.default.as_deref() {
            self.normalize_default(value)?;
        }
        Ok(())
    }

    /// Normalizes a declared spec before it is created or compared.
    ///
    /// Auto-increment fields become `int(11)` primary keys that are never
    /// nullable and have no default. Other fields get the type's default
    /// size, and when nullability was left unset they become `NOT NULL`
    /// with the type's zero value as default. Enum and set fields with no
    /// default become nullable instead.
    pub fn fill_keys_schema(&mut self) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        if self.increment {
            self.field_type = FieldType::Int;
            self.size = FieldType::Int.default_size().map(str::to_string);
            self.primary = true;
            self.nullable = Some(false);
            self.default = None;
            self.validate_keys()?;
            return Ok(self);
        }

        self.validate_keys()?;
        if self.size.is_none() {
            self.size = self.field_type.default_size().map(str::to_string);
        }
        if self.nullable.is_none() {
            match self.field_type.zero_value() {
                Some(zero) => {
                    self.nullable = Some(false);
                    if self.default.is_none() {
                        self.default = Some(zero.to_string());
                    }
                }
                None => self.nullable = Some(self.default.is_none()),
            }
        }
        self.normalize_in_place()?;
        Ok(self)
    }

    /// Normalizes a spec read back from a live database.
    ///
    /// Only an unset nullability is filled (as `NOT NULL`); live columns
    /// already carry their own defaults.
    pub fn fill_keys_existing(&mut self) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        if self.nullable.is_none() {
            self.nullable = Some(false);
        }
        self.normalize_in_place()?;
        Ok(self)
    }

    /// Compact signature `type(size|NUL|default)`.
    ///
    /// Nullability renders as `NUL` or `NOT` (`-` while unset); the default
    /// renders quoted, or as `NULL` when absent.
    pub fn describe(&self) -> String {
        format!(
            "{}({}|{}|{})",
            self.field_type,
            self.size.as_deref().unwrap_or(""),
            describe_nullable(self.nullable),
            describe_default(self.default.as_deref()),
        )
    }

    /// Normalized form of `value` for this field's type.
    ///
    /// Integers are reformatted as integers, decimals get the fixed scale
    /// from the size, booleans and bits become `0` or `1`.
    pub fn normalize_default(&self, value: &str) -> std::result::Result<String, ValidationError> {
        let invalid = || ValidationError::InvalidDefault {
            field: self.name.clone(),
            field_type: self.field_type,
            value: value.to_string(),
        };
        let trimmed = value.trim();

        match self.field_type {
            FieldType::Bool | FieldType::Bit => {
                let bare = trimmed
                    .strip_prefix("b'")
                    .and_then(|s| s.strip_suffix('\''))
                    .unwrap_or(trimmed);
                match bare.to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" | "y" | "t" => Ok("1".to_string()),
                    "0" | "false" | "no" | "off" | "n" | "f" | "" => Ok("0".to_string()),
                    _ => Err(invalid()),
                }
            }
            ty if ty.is_integer() => trimmed
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|_| invalid()),
            ty if ty.is_decimal() => {
                let number = trimmed.parse::<f64>().map_err(|_| invalid())?;
                Ok(match self.scale() {
                    Some(scale) => format!("{number:.scale$}"),
                    None => number.to_string(),
                })
            }
            _ => Ok(value.to_string()),
        }
    }

    fn scale(&self) -> Option<usize> {
        let size = self.size.as_deref()?;
        match size.split_once(',') {
            Some((_, scale)) => scale.parse().ok(),
            None => Some(0),
        }
    }

    fn normalize_in_place(&mut self) -> std::result::Result<(), ValidationError> {
        if let Some(value) = self.default.as_deref() {
            let normalized = self.normalize_default(value)?;
            self.default = Some(normalized);
        }
        Ok(())
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(SpecError::Locked {
                field: self.name.clone(),
            });
        }
        Ok(())
    }
}

pub(crate) fn describe_nullable(nullable: Option<bool>) -> &'static str {
    match nullable {
        Some(true) => "NUL",
        Some(false) => "NOT",
        None => "-",
    }
}

pub(crate) fn describe_default(default: Option<&str>) -> String {
    match default {
        Some(value) => format!("'{value}'"),
        None => "NULL".to_string(),
    }
}
