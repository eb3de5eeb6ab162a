//! Logical column types and database drivers.
//!
//! [`FieldType`] is the dialect-neutral type of a column; [`Driver`] selects
//! which SQL dialect a pool speaks. Both parse from the lowercase names used
//! in pool configuration files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::validate::ValidationError;

/// Placeholder replaced with the pool's table prefix before SQL is prepared.
pub const TABLE_TOKEN: &str = "__TABLE__";

/// Logical type of a column.
///
/// # Examples
///
/// ```
/// use pxdb_core::FieldType;
///
/// let ty: FieldType = "VARCHAR".parse().unwrap();
/// assert_eq!(ty, FieldType::Varchar);
/// assert_eq!(ty.default_size(), Some("255"));
///
/// // Aliases
/// assert_eq!("string".parse::<FieldType>().unwrap(), FieldType::Varchar);
/// assert_eq!("boolean".parse::<FieldType>().unwrap(), FieldType::Bool);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Int,
    TinyInt,
    SmallInt,
    MediumInt,
    BigInt,
    Decimal,
    Double,
    Float,
    Bit,
    Bool,
    Char,
    Varchar,
    Enum,
    Set,
    Text,
    LongText,
    Blob,
    Date,
    Time,
    DateTime,
}

impl FieldType {
    /// Lowercase type name, as used in `describe()` signatures.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::MediumInt => "mediumint",
            Self::BigInt => "bigint",
            Self::Decimal => "decimal",
            Self::Double => "double",
            Self::Float => "float",
            Self::Bit => "bit",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::Varchar => "varchar",
            Self::Enum => "enum",
            Self::Set => "set",
            Self::Text => "text",
            Self::LongText => "longtext",
            Self::Blob => "blob",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
        }
    }

    /// Size filled in by `fill_keys_schema` when none was declared.
    pub fn default_size(self) -> Option<&'static str> {
        match self {
            Self::Int => Some("11"),
            Self::TinyInt => Some("4"),
            Self::SmallInt => Some("6"),
            Self::MediumInt => Some("9"),
            Self::BigInt => Some("20"),
            Self::Decimal | Self::Double | Self::Float => Some("16,4"),
            Self::Bit | Self::Bool | Self::Char => Some("1"),
            Self::Varchar => Some("255"),
            _ => None,
        }
    }

    /// Default value filled in for a non-nullable column with no declared default.
    ///
    /// Returns `None` for enum and set, which are made nullable instead.
    pub fn zero_value(self) -> Option<&'static str> {
        match self {
            Self::Date => Some("0000-00-00"),
            Self::Time => Some("00:00:00"),
            Self::DateTime => Some("0000-00-00 00:00:00"),
            Self::Enum | Self::Set => None,
            ty if ty.is_numeric() => Some("0"),
            _ => Some(""),
        }
    }

    /// Integer family, including `bool` (stored as `tinyint(1)`).
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int | Self::TinyInt | Self::SmallInt | Self::MediumInt | Self::BigInt | Self::Bool
        )
    }

    /// Fixed or floating point types whose size is `precision,scale`.
    pub fn is_decimal(self) -> bool {
        matches!(self, Self::Decimal | Self::Double | Self::Float)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_decimal() || self == Self::Bit
    }

    /// Types carrying a character set clause on MySQL.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            Self::Char | Self::Varchar | Self::Text | Self::LongText | Self::Enum | Self::Set
        )
    }

    /// Types whose size participates in rendering and diffing.
    pub fn has_size(self) -> bool {
        self.is_numeric()
            || matches!(self, Self::Char | Self::Varchar | Self::Enum | Self::Set)
    }

    /// Enum and set carry their value list in the size slot.
    pub fn requires_size(self) -> bool {
        matches!(self, Self::Enum | Self::Set)
    }

    /// Types for which MySQL rejects a literal `DEFAULT`.
    pub fn forbids_default(self) -> bool {
        matches!(self, Self::Text | Self::LongText | Self::Blob)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Self::Int,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "mediumint" => Self::MediumInt,
            "bigint" => Self::BigInt,
            "decimal" | "numeric" => Self::Decimal,
            "double" | "real" => Self::Double,
            "float" => Self::Float,
            "bit" => Self::Bit,
            "bool" | "boolean" => Self::Bool,
            "char" => Self::Char,
            "varchar" | "string" | "str" => Self::Varchar,
            "enum" => Self::Enum,
            "set" => Self::Set,
            "text" => Self::Text,
            "longtext" => Self::LongText,
            "blob" => Self::Blob,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" | "timestamp" => Self::DateTime,
            _ => return Err(ValidationError::UnknownType(s.to_string())),
        };
        Ok(ty)
    }
}

impl TryFrom<String> for FieldType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.as_str().to_string()
    }
}

/// SQL dialect spoken by a pool.
///
/// # Examples
///
/// ```
/// use pxdb_core::Driver;
///
/// assert_eq!("mysql".parse::<Driver>().unwrap(), Driver::MySql);
/// assert!("postgres".parse::<Driver>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    MySql,
    Sqlite,
}

impl Driver {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(SpecError::UnsupportedDriver {
                driver: other.to_string(),
                operation: "connect",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("DateTime".parse::<FieldType>().unwrap(), FieldType::DateTime);
        assert_eq!(" LONGTEXT ".parse::<FieldType>().unwrap(), FieldType::LongText);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = "jsonb".parse::<FieldType>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownType("jsonb".into()));
    }

    #[test]
    fn test_default_sizes() {
        assert_eq!(FieldType::Int.default_size(), Some("11"));
        assert_eq!(FieldType::Decimal.default_size(), Some("16,4"));
        assert_eq!(FieldType::Text.default_size(), None);
        assert_eq!(FieldType::Enum.default_size(), None);
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(FieldType::BigInt.zero_value(), Some("0"));
        assert_eq!(FieldType::Varchar.zero_value(), Some(""));
        assert_eq!(FieldType::DateTime.zero_value(), Some("0000-00-00 00:00:00"));
        assert_eq!(FieldType::Set.zero_value(), None);
    }

    #[test]
    fn test_serde_uses_type_names() {
        let json = serde_json::to_string(&FieldType::MediumInt).unwrap();
        assert_eq!(json, "\"mediumint\"");
        let back: FieldType = serde_json::from_str("\"string\"").unwrap();
        assert_eq!(back, FieldType::Varchar);
    }

    #[test]
    fn test_unknown_driver() {
        let err = "oracle".parse::<Driver>().unwrap_err();
        assert!(matches!(err, SpecError::UnsupportedDriver { ref driver, .. } if driver == "oracle"));
    }
}
