//! Name and size validation.
//!
//! Table and field names are restricted to ASCII alphanumerics and
//! underscores, and may not begin with `_`: that prefix is reserved for
//! internal tables and columns, which introspection skips.
//!
//! # Examples
//!
//! ```
//! use pxdb_core::{ValidationError, validate_name};
//!
//! assert!(validate_name("user_accounts").is_ok());
//! assert_eq!(validate_name(""), Err(ValidationError::EmptyName));
//! assert!(matches!(validate_name("_rebuild"), Err(ValidationError::ReservedName(_))));
//! assert!(matches!(validate_name("user-accounts"), Err(ValidationError::InvalidName(_))));
//! ```

use thiserror::Error;

use crate::types::FieldType;

/// Malformed field or table declarations.
///
/// Always caller-fixable; nothing in this crate retries on one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Name is empty.
    #[error("name cannot be empty")]
    EmptyName,
    /// Name contains characters other than ASCII alphanumerics and `_`.
    #[error("invalid name '{0}': must contain only alphanumeric characters and underscores")]
    InvalidName(String),
    /// Name begins with the reserved `_` prefix.
    #[error("invalid name '{0}': names starting with '_' are reserved")]
    ReservedName(String),
    /// Type name is not recognized.
    #[error("unknown field type: {0}")]
    UnknownType(String),
    /// Enum or set declared without its value list.
    #[error("field '{field}' of type {field_type} requires a size")]
    MissingSize { field: String, field_type: FieldType },
    /// Size does not fit the field type.
    #[error("field '{field}' has invalid size '{size}' for type {field_type}")]
    InvalidSize {
        field: String,
        field_type: FieldType,
        size: String,
    },
    /// Default value cannot be represented in the field type.
    #[error("field '{field}' has invalid default '{value}' for type {field_type}")]
    InvalidDefault {
        field: String,
        field_type: FieldType,
        value: String,
    },
    /// Two fields in one table share a name.
    #[error("duplicate field '{field}' in table '{table}'")]
    DuplicateField { table: String, field: String },
    /// Two declared schemas in one pool share a table name.
    #[error("duplicate table '{0}'")]
    DuplicateTable(String),
    /// Table declares no fields.
    #[error("table '{0}' declares no fields")]
    EmptyTable(String),
}

/// Validates a table or field name.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    if name.starts_with('_') {
        return Err(ValidationError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Checks that `size` is well-formed for `field_type`.
///
/// Integer, bit and character types take a positive length; decimal types
/// take `precision` or `precision,scale`; enum and set take a non-empty
/// value list. Types without a size reject one.
pub(crate) fn validate_size(
    field: &str,
    field_type: FieldType,
    size: &str,
) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidSize {
        field: field.to_string(),
        field_type,
        size: size.to_string(),
    };
    let is_length = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    if !field_type.has_size() {
        return Err(invalid());
    }
    if field_type.requires_size() {
        return if size.trim().is_empty() { Err(invalid()) } else { Ok(()) };
    }
    if field_type.is_decimal() {
        let mut parts = size.split(',');
        let ok = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), None, None) => is_length(p),
            (Some(p), Some(s), None) => is_length(p) && is_length(s),
            _ => false,
        };
        return if ok { Ok(()) } else { Err(invalid()) };
    }
    if is_length(size) && size.parse::<u32>().is_ok_and(|n| n > 0) {
        Ok(())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["id", "user_id", "Table2", "a"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(validate_name(""), Err(ValidationError::EmptyName));
        assert_eq!(
            validate_name("_internal"),
            Err(ValidationError::ReservedName("_internal".into()))
        );
        for name in ["has space", "semi;colon", "dash-ed", "tick`", "ünï"] {
            assert_eq!(
                validate_name(name),
                Err(ValidationError::InvalidName(name.into())),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_sizes() {
        assert!(validate_size("n", FieldType::Int, "11").is_ok());
        assert!(validate_size("n", FieldType::Int, "0").is_err());
        assert!(validate_size("n", FieldType::Int, "eleven").is_err());
        assert!(validate_size("n", FieldType::Decimal, "16,4").is_ok());
        assert!(validate_size("n", FieldType::Decimal, "10").is_ok());
        assert!(validate_size("n", FieldType::Decimal, "16,4,2").is_err());
        assert!(validate_size("n", FieldType::Enum, "'a','b'").is_ok());
        assert!(validate_size("n", FieldType::Enum, " ").is_err());
        assert!(validate_size("n", FieldType::Text, "100").is_err());
    }
}
