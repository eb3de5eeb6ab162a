//! Field comparison.
//!
//! [`check_field_needs_changes`] decides whether a live column matches its
//! declaration. Both sides are normalized first (`fill_keys_existing` on
//! the live column, `fill_keys_schema` on the declaration) and then compared
//! in a fixed order: increment, primary, type, size, nullable, default. A
//! type mismatch ends the comparison since finer properties mean nothing
//! across types.
//!
//! # Examples
//!
//! ```
//! use pxdb_core::{FieldSpec, check_field_needs_changes};
//!
//! let mut existing = FieldSpec::new("age", "int").unwrap();
//! existing.set_size(Some("11")).unwrap().set_default(Some("0")).unwrap();
//!
//! let mut declared = FieldSpec::new("age", "int").unwrap();
//! declared.set_nullable(Some(true)).unwrap();
//!
//! let changes = check_field_needs_changes(&existing, &declared).unwrap().unwrap();
//! let rendered: Vec<String> = changes.iter().map(ToString::to_string).collect();
//! assert_eq!(rendered, ["nullable(NOT -> NUL)", "default('0' -> NULL)"]);
//! ```

use std::fmt;

use crate::error::Result;
use crate::field::{FieldSpec, describe_default, describe_nullable};

/// One difference between a live column and its declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    /// Auto-increment flag differs.
    Increment,
    /// Primary key flag differs.
    Primary,
    /// Base type differs; carries both `describe()` signatures.
    Type { from: String, to: String },
    Size {
        from: Option<String>,
        to: Option<String>,
    },
    Nullable {
        from: Option<bool>,
        to: Option<bool>,
    },
    Default {
        from: Option<String>,
        to: Option<String>,
    },
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increment => f.write_str("increment"),
            Self::Primary => f.write_str("primary"),
            Self::Type { from, to } => write!(f, "type: {from} -> {to}"),
            Self::Size { from, to } => write!(
                f,
                "size({} -> {})",
                from.as_deref().unwrap_or("NULL"),
                to.as_deref().unwrap_or("NULL")
            ),
            Self::Nullable { from, to } => write!(
                f,
                "nullable({} -> {})",
                describe_nullable(*from),
                describe_nullable(*to)
            ),
            Self::Default { from, to } => write!(
                f,
                "default({} -> {})",
                describe_default(from.as_deref()),
                describe_default(to.as_deref())
            ),
        }
    }
}

/// Compares a live column against its declaration.
///
/// Returns `Ok(None)` when nothing needs to change, otherwise the list of
/// differences (never empty). Neither argument is modified; normalization
/// runs on unlocked duplicates.
///
/// Size-less types (text, longtext, blob, date, time, datetime) are only
/// compared on increment, primary and type. An integer, enum or set column
/// that reports no size at all matches any declared size, since MySQL 8
/// drops integer display widths and SQLite does not keep enum value lists.
pub fn check_field_needs_changes(
    existing: &FieldSpec,
    declared: &FieldSpec,
) -> Result<Option<Vec<FieldChange>>> {
    let mut existing = existing.duplicate();
    existing.fill_keys_existing()?;
    let mut declared = declared.duplicate();
    declared.fill_keys_schema()?;

    let mut changes = Vec::new();
    if existing.is_increment() != declared.is_increment() {
        changes.push(FieldChange::Increment);
    }
    if existing.is_primary() != declared.is_primary() {
        changes.push(FieldChange::Primary);
    }

    let ty = declared.field_type();
    if existing.field_type() != ty {
        changes.push(FieldChange::Type {
            from: existing.describe(),
            to: declared.describe(),
        });
        return Ok(Some(changes));
    }

    if ty.has_size() {
        let unsized_match = existing.size().is_none()
            && (ty.is_integer() || ty.requires_size());
        if !unsized_match && existing.size() != declared.size() {
            changes.push(FieldChange::Size {
                from: existing.size().map(str::to_string),
                to: declared.size().map(str::to_string),
            });
        }

        // An unset declared nullability asserts nothing.
        if let Some(nullable) = declared.nullable() {
            if existing.nullable() != Some(nullable) {
                changes.push(FieldChange::Nullable {
                    from: existing.nullable(),
                    to: Some(nullable),
                });
            }
        }

        if existing.default_value() != declared.default_value() {
            changes.push(FieldChange::Default {
                from: existing.default_value().map(str::to_string),
                to: declared.default_value().map(str::to_string),
            });
        }
    }

    if changes.is_empty() {
        Ok(None)
    } else {
        Ok(Some(changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn live(name: &str, ty: &str, size: Option<&str>, nullable: bool, default: Option<&str>) -> FieldSpec {
        let mut spec = FieldSpec::new(name, ty).unwrap();
        spec.set_size(size)
            .unwrap()
            .set_nullable(Some(nullable))
            .unwrap()
            .set_default(default)
            .unwrap();
        spec.lock();
        spec
    }

    fn rendered(changes: Option<Vec<FieldChange>>) -> Vec<String> {
        changes
            .unwrap_or_default()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_identical_fields_need_no_changes() {
        let existing = live("name", "varchar", Some("255"), false, Some(""));
        let declared = FieldSpec::new("name", "varchar").unwrap();
        assert_eq!(check_field_needs_changes(&existing, &declared).unwrap(), None);
    }

    #[test]
    fn test_size_only_difference() {
        let existing = live("name", "varchar", Some("100"), false, Some(""));
        let declared = FieldSpec::new("name", "varchar").unwrap();
        let changes = check_field_needs_changes(&existing, &declared).unwrap();
        assert_eq!(rendered(changes), ["size(100 -> 255)"]);
    }

    #[test]
    fn test_type_change_short_circuits() {
        let existing = live("count", "int", Some("11"), true, None);
        let mut declared = FieldSpec::new("count", "varchar").unwrap();
        declared.set_size(Some("20")).unwrap();
        let changes = check_field_needs_changes(&existing, &declared).unwrap().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].to_string(),
            "type: int(11|NUL|NULL) -> varchar(20|NOT|'')"
        );
    }

    #[test]
    fn test_increment_and_primary_precede_type() {
        let existing = live("id", "bigint", Some("20"), false, Some("0"));
        let declared = FieldSpec::new("id", "increment").unwrap();
        let changes = check_field_needs_changes(&existing, &declared).unwrap().unwrap();
        assert_eq!(changes[0], FieldChange::Increment);
        assert_eq!(changes[1], FieldChange::Primary);
        assert!(matches!(changes[2], FieldChange::Type { .. }));
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn test_nullable_and_default_change() {
        let existing = live("age", "int", Some("11"), false, Some("0"));
        let mut declared = FieldSpec::new("age", "int").unwrap();
        declared.set_size(Some("11")).unwrap().set_nullable(Some(true)).unwrap();
        let changes = check_field_needs_changes(&existing, &declared).unwrap();
        assert_eq!(rendered(changes), ["nullable(NOT -> NUL)", "default('0' -> NULL)"]);
    }

    #[test]
    fn test_sizeless_types_ignore_nullable_and_default() {
        let existing = live("body", "text", None, true, None);
        let declared = FieldSpec::new("body", "text").unwrap();
        assert_eq!(check_field_needs_changes(&existing, &declared).unwrap(), None);
    }

    #[test]
    fn test_integer_without_display_width_matches() {
        let existing = live("count", "int", None, false, Some("0"));
        let declared = FieldSpec::new("count", "int").unwrap();
        assert_eq!(check_field_needs_changes(&existing, &declared).unwrap(), None);
    }

    #[test]
    fn test_decimal_defaults_compare_after_normalization() {
        let existing = live("price", "decimal", Some("16,4"), false, Some("0.0000"));
        let mut declared = FieldSpec::new("price", "decimal").unwrap();
        declared.set_default(Some("0")).unwrap();
        assert_eq!(check_field_needs_changes(&existing, &declared).unwrap(), None);
    }

    #[test]
    fn test_inputs_are_untouched() {
        let existing = live("flag", "bool", Some("1"), false, Some("0"));
        let declared = FieldSpec::new("flag", "bool").unwrap();
        check_field_needs_changes(&existing, &declared).unwrap();
        assert!(existing.is_locked());
        assert_eq!(declared.nullable(), None);
        assert_eq!(declared.field_type(), FieldType::Bool);
    }
}
