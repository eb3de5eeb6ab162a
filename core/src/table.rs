//! Table specifications.
//!
//! A [`TableSpec`] is an ordered list of [`FieldSpec`]s. Order is
//! significant: the first field is the one a missing table is created
//! with, and later fields are added one by one after their predecessor.

use crate::decl::{FieldDecl, TableDecl};
use crate::error::Result;
use crate::field::FieldSpec;
use crate::validate::{ValidationError, validate_name};

/// Ordered collection of fields naming one logical table.
///
/// Field names are unique within a table, compared case-insensitively as
/// MySQL does.
///
/// # Examples
///
/// ```
/// use pxdb_core::{FieldSpec, TableSpec};
///
/// let mut table = TableSpec::new("users").unwrap();
/// table.add_field(FieldSpec::new("id", "increment").unwrap()).unwrap();
/// table.add_field(FieldSpec::new("name", "varchar").unwrap()).unwrap();
///
/// assert_eq!(table.first_field().unwrap().name(), "id");
/// assert!(table.add_field(FieldSpec::new("NAME", "text").unwrap()).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    name: String,
    fields: Vec<FieldSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> std::result::Result<Self, ValidationError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            fields: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a field, rejecting a duplicate name.
    pub fn add_field(&mut self, field: FieldSpec) -> std::result::Result<&mut Self, ValidationError> {
        if self.field(field.name()).is_some() {
            return Err(ValidationError::DuplicateField {
                table: self.name.clone(),
                field: field.name().to_string(),
            });
        }
        self.fields.push(field);
        Ok(self)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn first_field(&self) -> Option<&FieldSpec> {
        self.fields.first()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A table whose fields are declared in code.
///
/// Implementors name the table and list its fields once; [`to_spec`]
/// validates, fills and locks every field in declaration order.
///
/// [`to_spec`]: TableSchema::to_spec
///
/// # Examples
///
/// ```
/// use pxdb_core::{FieldDecl, TableSchema};
///
/// struct Users;
///
/// impl TableSchema for Users {
///     fn table_name(&self) -> &str {
///         "users"
///     }
///
///     fn fields(&self) -> Vec<FieldDecl> {
///         vec![
///             FieldDecl::new("id", "increment"),
///             FieldDecl::new("name", "varchar"),
///             FieldDecl::new("active", "bool").nullable(true).default_value(true),
///         ]
///     }
/// }
///
/// let spec = Users.to_spec().unwrap();
/// assert_eq!(spec.len(), 3);
/// assert!(spec.fields().iter().all(|f| f.is_locked()));
/// ```
pub trait TableSchema {
    fn table_name(&self) -> &str;

    fn fields(&self) -> Vec<FieldDecl>;

    fn to_spec(&self) -> Result<TableSpec> {
        TableDecl {
            name: self.table_name().to_string(),
            fields: self.fields(),
        }
        .to_spec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_declaration_order() {
        let mut table = TableSpec::new("orders").unwrap();
        for name in ["id", "customer", "total", "placed"] {
            table.add_field(FieldSpec::new(name, "int").unwrap()).unwrap();
        }
        let names: Vec<&str> = table.fields().iter().map(FieldSpec::name).collect();
        assert_eq!(names, ["id", "customer", "total", "placed"]);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut table = TableSpec::new("orders").unwrap();
        table.add_field(FieldSpec::new("id", "int").unwrap()).unwrap();
        let err = table
            .add_field(FieldSpec::new("Id", "int").unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateField {
                table: "orders".into(),
                field: "Id".into()
            }
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_invalid_table_name() {
        assert!(TableSpec::new("order items").is_err());
        assert!(TableSpec::new("_shadow").is_err());
    }
}
